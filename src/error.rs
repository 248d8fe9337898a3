//! Error taxonomy for network and data transfer failures.

use bytes::Bytes;
use std::fmt;

/// What went wrong at the transport level, independent of any HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    ///
    /// reqwest does not separate "offline" from "host refused" or a failed
    /// TLS handshake, so every connect failure lands here, not only a
    /// missing network.
    NotConnected,
    /// The exchange was cancelled through its handle.
    Cancelled,
    /// The exchange did not complete in time.
    TimedOut,
    /// The server answered with a non-success HTTP status.
    Status,
    /// Anything else the transport reported.
    Other,
}

/// A failure reported by a session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "request cancelled")
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotConnected, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl From<&reqwest::Error> for TransportError {
    fn from(error: &reqwest::Error) -> Self {
        let kind = if error.is_connect() {
            TransportErrorKind::NotConnected
        } else if error.is_timeout() {
            TransportErrorKind::TimedOut
        } else if error.is_status() {
            TransportErrorKind::Status
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl std::error::Error for TransportError {}

/// The classified outcome of a failed request.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// The server answered with an error status and no structured error body.
    HttpStatus {
        status_code: u16,
        body: Option<Bytes>,
    },
    NotConnected,
    Cancelled,
    /// A transport failure with no more specific classification.
    Generic(TransportError),
    /// The endpoint could not be turned into a request.
    UrlGeneration,
    /// The server reported an application-level error.
    ServerError(String),
    /// The server reported an authentication error in the token band.
    TokenExpired,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::HttpStatus { status_code, body } => {
                write!(f, "HTTP {}", status_code)?;
                if let Some(body) = body.as_ref().filter(|b| !b.is_empty()) {
                    write!(f, ": {}", String::from_utf8_lossy(body))?;
                }
                Ok(())
            }
            NetworkError::NotConnected => write!(f, "Not connected to the network"),
            NetworkError::Cancelled => write!(f, "Request was cancelled"),
            NetworkError::Generic(err) => write!(f, "Network error: {}", err),
            NetworkError::UrlGeneration => write!(f, "Failed to generate request URL"),
            NetworkError::ServerError(msg) => write!(f, "Server error: {}", msg),
            NetworkError::TokenExpired => write!(f, "Token expired"),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Generic(err) => Some(err),
            _ => None,
        }
    }
}

/// Failures seen by callers that decode response bodies.
#[derive(Debug)]
pub enum DataTransferError {
    /// The request succeeded but carried no body to decode.
    NoResponse,
    Parsing(anyhow::Error),
    NetworkFailure(NetworkError),
    /// A network failure that an error resolver replaced.
    ResolvedNetworkFailure(anyhow::Error),
}

impl fmt::Display for DataTransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTransferError::NoResponse => write!(f, "No response body"),
            DataTransferError::Parsing(err) => write!(f, "Failed to parse response: {}", err),
            DataTransferError::NetworkFailure(err) => write!(f, "{}", err),
            DataTransferError::ResolvedNetworkFailure(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DataTransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataTransferError::NetworkFailure(err) => Some(err),
            DataTransferError::Parsing(err) | DataTransferError::ResolvedNetworkFailure(err) => {
                Some(&**err)
            }
            DataTransferError::NoResponse => None,
        }
    }
}

impl From<NetworkError> for DataTransferError {
    fn from(error: NetworkError) -> Self {
        DataTransferError::NetworkFailure(error)
    }
}

/// Error domain used in every [`ErrorReport`].
pub const ERROR_DOMAIN: &str = "cgnet.network";

/// Report code for [`NetworkError::NotConnected`].
pub const NOT_CONNECTED_CODE: i64 = 10001;

/// Report code for [`NetworkError::TokenExpired`].
pub const TOKEN_EXPIRED_CODE: i64 = 10002;

/// A flat, presentation-ready view of a [`DataTransferError`].
///
/// Only `NotConnected` and `TokenExpired` carry a non-zero code; callers
/// branch on those two and show `description` for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub domain: &'static str,
    pub code: i64,
    pub description: String,
}

impl From<&DataTransferError> for ErrorReport {
    fn from(error: &DataTransferError) -> Self {
        let (code, description) = match error {
            DataTransferError::NetworkFailure(network_error) => match network_error {
                NetworkError::Cancelled => (0, "Network request cancelled".to_string()),
                NetworkError::HttpStatus { status_code, body } => {
                    let body = body
                        .as_ref()
                        .map(|b| String::from_utf8_lossy(b).into_owned())
                        .unwrap_or_default();
                    (
                        0,
                        format!("Status Code: {} and description: {}", status_code, body),
                    )
                }
                NetworkError::NotConnected => (NOT_CONNECTED_CODE, "Not connected".to_string()),
                NetworkError::Generic(err) => (0, format!("Generic error {}", err)),
                NetworkError::ServerError(msg) => (0, format!("Server Error: {}", msg)),
                NetworkError::TokenExpired => (TOKEN_EXPIRED_CODE, "Token Expired".to_string()),
                NetworkError::UrlGeneration => (0, "URL Generation Error".to_string()),
            },
            DataTransferError::NoResponse => (0, "no response".to_string()),
            DataTransferError::Parsing(err) => (0, format!("Parsing Error: {}", err)),
            DataTransferError::ResolvedNetworkFailure(err) => {
                (0, format!("Resolves network failure {}", err))
            }
        };

        ErrorReport {
            domain: ERROR_DOMAIN,
            code,
            description,
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (domain: {}, code: {})", self.description, self.domain, self.code)
    }
}
