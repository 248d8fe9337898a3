//! Turns raw session outcomes into typed results.
//!
//! The rules, in order:
//! 1. No transport error: the body is a success.
//! 2. A JSON error envelope with at least one item wins over everything else
//!    and is mapped through the reserved server code bands.
//! 3. Response metadata present: [`NetworkError::HttpStatus`].
//! 4. Otherwise the transport error kind decides.

use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{NetworkError, TransportErrorKind};
use crate::session::SessionOutcome;

/// Server codes reporting an application-level error with a user-facing message.
pub const SERVER_MESSAGE_CODES: Range<i64> = 10001..10051;

/// Server codes reporting an expired or rejected auth token.
pub const TOKEN_EXPIRED_CODES: Range<i64> = 20001..20021;

/// Message used when a server error carries no code in a known band.
pub const UNDECODABLE_SERVER_ERROR: &str = "There was a problem decoding the network error";

/// Message used when a server error in the message band carries no message.
pub const UNKNOWN_SERVER_ERROR: &str = "Unknown error";

/// The JSON error body returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorEnvelope {
    pub error: ServerErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerErrors {
    pub errors: Option<Vec<ServerErrorItem>>,
    #[serde(rename = "statusCode")]
    pub status_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerErrorItem {
    pub code: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

impl ServerErrorEnvelope {
    /// The only item that matters: the first one, if any.
    pub fn first_error(&self) -> Option<&ServerErrorItem> {
        self.error.errors.as_deref().and_then(<[_]>::first)
    }
}

/// Best-effort decode of a server error envelope. Never fails.
pub fn try_parse_envelope(body: Option<&[u8]>) -> Option<ServerErrorEnvelope> {
    let body = body.filter(|b| !b.is_empty())?;
    match serde_json::from_slice::<ServerErrorEnvelope>(body) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!("Response body is not a server error envelope: {}", e);
            None
        }
    }
}

/// Maps one server error item onto the reserved code bands.
pub fn map_server_error(item: &ServerErrorItem) -> NetworkError {
    match item.code {
        Some(code) if SERVER_MESSAGE_CODES.contains(&code) => NetworkError::ServerError(
            item.message
                .clone()
                .unwrap_or_else(|| UNKNOWN_SERVER_ERROR.to_string()),
        ),
        Some(code) if TOKEN_EXPIRED_CODES.contains(&code) => NetworkError::TokenExpired,
        _ => NetworkError::ServerError(UNDECODABLE_SERVER_ERROR.to_string()),
    }
}

/// Resolves a session outcome into exactly one success or error.
pub fn classify(outcome: SessionOutcome) -> Result<Option<Bytes>, NetworkError> {
    let SessionOutcome {
        data,
        response,
        error,
    } = outcome;

    let Some(transport_error) = error else {
        return Ok(data);
    };

    if let Some(item) = try_parse_envelope(data.as_deref())
        .as_ref()
        .and_then(ServerErrorEnvelope::first_error)
    {
        return Err(map_server_error(item));
    }

    if let Some(response) = response {
        return Err(NetworkError::HttpStatus {
            status_code: response.status_code,
            body: data,
        });
    }

    Err(match transport_error.kind {
        TransportErrorKind::NotConnected => NetworkError::NotConnected,
        TransportErrorKind::Cancelled => NetworkError::Cancelled,
        _ => NetworkError::Generic(transport_error),
    })
}
