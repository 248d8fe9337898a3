//! Decodes successful responses into typed values.

use bytes::Bytes;
use log::debug;
use serde::de::DeserializeOwned;

use crate::endpoint::Requestable;
use crate::error::{DataTransferError, NetworkError};
use crate::service::NetworkService;

/// Gives callers a chance to replace a network failure with their own error,
/// e.g. to turn a 401 into a "please sign in again" error.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorResolver: Send + Sync {
    fn resolve(&self, error: &NetworkError) -> Option<anyhow::Error>;
}

/// Leaves every failure as [`DataTransferError::NetworkFailure`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

impl ErrorResolver for PassthroughResolver {
    fn resolve(&self, _error: &NetworkError) -> Option<anyhow::Error> {
        None
    }
}

pub struct DataTransferService<N: NetworkService> {
    network: N,
    resolver: Box<dyn ErrorResolver>,
}

impl<N: NetworkService> DataTransferService<N> {
    pub fn new(network: N) -> Self {
        Self {
            network,
            resolver: Box::new(PassthroughResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: impl ErrorResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Sends `endpoint` and decodes the JSON body as `T`.
    #[tracing::instrument(skip(self, endpoint), fields(path = endpoint.path()))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &dyn Requestable,
    ) -> Result<T, DataTransferError> {
        let data = self
            .network
            .request(endpoint)
            .await
            .map_err(|e| self.resolve(e))?;
        decode(data)
    }

    /// Sends `endpoint` as multipart/form-data and decodes the JSON body as `T`.
    #[tracing::instrument(skip(self, endpoint), fields(path = endpoint.path()))]
    pub async fn request_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &dyn Requestable,
    ) -> Result<T, DataTransferError> {
        let data = self
            .network
            .request_multipart(endpoint)
            .await
            .map_err(|e| self.resolve(e))?;
        decode(data)
    }

    /// Sends `endpoint` and ignores whatever body comes back.
    pub async fn request_unit(&self, endpoint: &dyn Requestable) -> Result<(), DataTransferError> {
        self.network
            .request(endpoint)
            .await
            .map(|_| ())
            .map_err(|e| self.resolve(e))
    }

    fn resolve(&self, error: NetworkError) -> DataTransferError {
        match self.resolver.resolve(&error) {
            Some(resolved) => {
                debug!("Network failure '{}' resolved to '{}'", error, resolved);
                DataTransferError::ResolvedNetworkFailure(resolved)
            }
            None => DataTransferError::NetworkFailure(error),
        }
    }
}

/// Decodes a JSON body; an absent or empty body is [`DataTransferError::NoResponse`].
pub fn decode<T: DeserializeOwned>(data: Option<Bytes>) -> Result<T, DataTransferError> {
    let data = data
        .filter(|d| !d.is_empty())
        .ok_or(DataTransferError::NoResponse)?;
    serde_json::from_slice(&data).map_err(|e| DataTransferError::Parsing(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::endpoint::Endpoint;
    use crate::service::DefaultNetworkService;
    use crate::session::{CancellationHandle, MockSessionManager, ResponseMeta, SessionOutcome};
    use crate::error::{TransportError, TransportErrorKind};
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    fn service(outcome: SessionOutcome) -> DataTransferService<DefaultNetworkService<MockSessionManager>> {
        let mut session = MockSessionManager::new();
        session.expect_send().returning(move |_, callback| {
            callback(outcome.clone());
            CancellationHandle::new()
        });
        let config = NetworkConfig::parse("https://api.example.com").unwrap();
        DataTransferService::new(DefaultNetworkService::new(config, session))
    }

    fn ok(body: &'static [u8]) -> SessionOutcome {
        SessionOutcome {
            data: Some(Bytes::from_static(body)),
            response: Some(ResponseMeta::new(200)),
            error: None,
        }
    }

    #[test]
    fn test_decode() {
        let user: User = decode(Some(Bytes::from_static(br#"{"id":1,"name":"ada"}"#))).unwrap();
        assert_eq!(user, User { id: 1, name: "ada".to_string() });
    }

    #[test]
    fn test_decode_empty_is_no_response() {
        assert!(matches!(
            decode::<User>(None),
            Err(DataTransferError::NoResponse)
        ));
        assert!(matches!(
            decode::<User>(Some(Bytes::new())),
            Err(DataTransferError::NoResponse)
        ));
    }

    #[test]
    fn test_decode_bad_json_is_parsing() {
        assert!(matches!(
            decode::<User>(Some(Bytes::from_static(b"{\"id\":\"x\"}"))),
            Err(DataTransferError::Parsing(_))
        ));
    }

    #[tokio::test]
    async fn test_request_decodes() {
        let service = service(ok(br#"{"id":7,"name":"grace"}"#));
        let user: User = service.request(&Endpoint::get("users/7")).await.unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user.name, "grace");
    }

    #[tokio::test]
    async fn test_request_network_failure() {
        let service = service(SessionOutcome::failure(TransportError::new(
            TransportErrorKind::Cancelled,
            "cancelled",
        )));
        let result = service.request::<User>(&Endpoint::get("users/7")).await;
        assert!(matches!(
            result,
            Err(DataTransferError::NetworkFailure(NetworkError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_request_resolved_failure() {
        let mut resolver = MockErrorResolver::new();
        resolver
            .expect_resolve()
            .withf(|e| *e == NetworkError::TokenExpired)
            .times(1)
            .returning(|_| Some(anyhow::anyhow!("session ended")));

        let service = service(SessionOutcome {
            data: Some(Bytes::from_static(br#"{"error":{"errors":[{"code":20001}]}}"#)),
            response: Some(ResponseMeta::new(401)),
            error: Some(TransportError::new(TransportErrorKind::Status, "HTTP 401")),
        })
        .with_resolver(resolver);

        let result = service.request::<User>(&Endpoint::get("me")).await;
        match result {
            Err(DataTransferError::ResolvedNetworkFailure(e)) => {
                assert_eq!(e.to_string(), "session ended")
            }
            other => panic!("Expected ResolvedNetworkFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_unit_ignores_body() {
        let service = service(ok(b""));
        assert!(service.request_unit(&Endpoint::post("ping")).await.is_ok());
    }

    #[tokio::test]
    async fn test_request_multipart_decodes() {
        let service = service(ok(br#"{"id":2,"name":"upload"}"#));
        let endpoint = Endpoint::post("files").with_form_field("k", "v");
        let user: User = service.request_multipart(&endpoint).await.unwrap();
        assert_eq!(user.name, "upload");
    }
}
