//! Lifecycle logging for requests and their results.

use log::{debug, info, log_enabled, Level};

use crate::endpoint::Request;
use crate::error::NetworkError;
use crate::session::ResponseMeta;

/// Observes the request/response lifecycle. Must never block or fail.
pub trait NetworkLogger: Send + Sync {
    fn log_request(&self, request: &Request);
    fn log_response(&self, data: Option<&[u8]>, response: Option<&ResponseMeta>);
    fn log_error(&self, error: &NetworkError);
}

/// Writes to the `log` facade. Bodies are only rendered at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNetworkLogger;

impl NetworkLogger for DefaultNetworkLogger {
    fn log_request(&self, request: &Request) {
        info!("{} {}", request.method, request.url);
        debug!("headers: {:?}", request.headers);
        if log_enabled!(Level::Debug) {
            if let Some(body) = request.body.as_deref().and_then(describe_body) {
                debug!("body: {}", body);
            }
        }
    }

    fn log_response(&self, data: Option<&[u8]>, response: Option<&ResponseMeta>) {
        if let Some(response) = response {
            debug!("status: {}", response.status_code);
        }
        if log_enabled!(Level::Debug) {
            if let Some(json) = data.and_then(describe_json_object) {
                debug!("responseData: {}", json);
            }
        }
    }

    fn log_error(&self, error: &NetworkError) {
        debug!("{}", error);
    }
}

/// Renders a JSON object body, or failing that, UTF-8 text.
pub fn describe_body(body: &[u8]) -> Option<String> {
    describe_json_object(body).or_else(|| std::str::from_utf8(body).ok().map(str::to_string))
}

/// Renders `body` only when it is a JSON object.
pub fn describe_json_object(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<serde_json::Value>(body).ok()? {
        value @ serde_json::Value::Object(_) => Some(value.to_string()),
        _ => None,
    }
}
