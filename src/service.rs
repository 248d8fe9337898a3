//! The network service: endpoint in, exactly one classified result out.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::classify::classify;
use crate::config::NetworkConfig;
use crate::endpoint::{DefaultRequestBuilder, Request, RequestBuilder, Requestable};
use crate::error::NetworkError;
use crate::logger::{DefaultNetworkLogger, NetworkLogger};
use crate::multipart::{
    content_type, BoundaryGenerator, FileNameGenerator, MultipartEncoder, RandomFileNames,
    UuidBoundary,
};
use crate::session::{CancellationHandle, ReqwestSessionManager, SessionManager};

/// Result delivered to a completion handler.
pub type NetworkResult = Result<Option<Bytes>, NetworkError>;

/// Receives the result of one request. Called exactly once.
pub type CompletionHandler = Box<dyn FnOnce(NetworkResult) + Send + 'static>;

/// Contract for a network service.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Sends `endpoint` and reports through `completion`.
    ///
    /// Returns `None` only when no request could be built, in which case
    /// `completion` has already been called with [`NetworkError::UrlGeneration`].
    fn execute(
        &self,
        endpoint: &dyn Requestable,
        completion: CompletionHandler,
    ) -> Option<CancellationHandle>;

    /// Like [`execute`](Self::execute), with the body encoded as
    /// multipart/form-data from the endpoint's form fields and attachments.
    fn execute_multipart(
        &self,
        endpoint: &dyn Requestable,
        completion: CompletionHandler,
    ) -> Option<CancellationHandle>;

    /// Awaits the result of [`execute`](Self::execute).
    async fn request(&self, endpoint: &dyn Requestable) -> NetworkResult {
        let (tx, rx) = oneshot::channel();
        self.execute(endpoint, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        rx.await.unwrap_or(Err(NetworkError::Cancelled))
    }

    /// Awaits the result of [`execute_multipart`](Self::execute_multipart).
    async fn request_multipart(&self, endpoint: &dyn Requestable) -> NetworkResult {
        let (tx, rx) = oneshot::channel();
        self.execute_multipart(endpoint, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        rx.await.unwrap_or(Err(NetworkError::Cancelled))
    }
}

/// Builds requests from a [`NetworkConfig`] and sends them through `S`.
pub struct DefaultNetworkService<S: SessionManager = ReqwestSessionManager> {
    config: NetworkConfig,
    session: S,
    builder: Box<dyn RequestBuilder>,
    logger: Arc<dyn NetworkLogger>,
    boundaries: Box<dyn BoundaryGenerator>,
    encoder: MultipartEncoder<Box<dyn FileNameGenerator>>,
}

impl<S: SessionManager> DefaultNetworkService<S> {
    pub fn new(config: NetworkConfig, session: S) -> Self {
        Self {
            config,
            session,
            builder: Box::new(DefaultRequestBuilder),
            logger: Arc::new(DefaultNetworkLogger),
            boundaries: Box::new(UuidBoundary),
            encoder: MultipartEncoder::new(Box::new(RandomFileNames) as Box<dyn FileNameGenerator>),
        }
    }

    pub fn with_request_builder(mut self, builder: impl RequestBuilder + 'static) -> Self {
        self.builder = Box::new(builder);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn NetworkLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_boundaries(mut self, boundaries: impl BoundaryGenerator + 'static) -> Self {
        self.boundaries = Box::new(boundaries);
        self
    }

    pub fn with_file_names(mut self, file_names: impl FileNameGenerator + 'static) -> Self {
        self.encoder = MultipartEncoder::new(Box::new(file_names) as Box<dyn FileNameGenerator>);
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn build(
        &self,
        endpoint: &dyn Requestable,
        completion: CompletionHandler,
    ) -> Option<(Request, CompletionHandler)> {
        match self.builder.build(endpoint, &self.config) {
            Ok(request) => Some((request, completion)),
            Err(e) => {
                warn!("{}", e);
                let error = NetworkError::UrlGeneration;
                self.logger.log_error(&error);
                completion(Err(error));
                None
            }
        }
    }

    fn dispatch(&self, request: Request, completion: CompletionHandler) -> CancellationHandle {
        self.logger.log_request(&request);

        let logger = Arc::clone(&self.logger);
        self.session.send(
            request,
            Box::new(move |outcome| {
                let response = outcome.response.clone();
                let result = classify(outcome);
                match &result {
                    Ok(data) => logger.log_response(data.as_deref(), response.as_ref()),
                    Err(error) => logger.log_error(error),
                }
                completion(result);
            }),
        )
    }
}

impl DefaultNetworkService<ReqwestSessionManager> {
    /// A service over a fresh reqwest client.
    pub fn with_config(config: NetworkConfig) -> Self {
        Self::new(config, ReqwestSessionManager::default())
    }
}

#[async_trait]
impl<S: SessionManager> NetworkService for DefaultNetworkService<S> {
    #[tracing::instrument(skip(self, endpoint, completion), fields(path = endpoint.path()))]
    fn execute(
        &self,
        endpoint: &dyn Requestable,
        completion: CompletionHandler,
    ) -> Option<CancellationHandle> {
        let (request, completion) = self.build(endpoint, completion)?;
        Some(self.dispatch(request, completion))
    }

    #[tracing::instrument(skip(self, endpoint, completion), fields(path = endpoint.path()))]
    fn execute_multipart(
        &self,
        endpoint: &dyn Requestable,
        completion: CompletionHandler,
    ) -> Option<CancellationHandle> {
        let (mut request, completion) = self.build(endpoint, completion)?;

        let boundary = self.boundaries.boundary();
        debug!("Encoding multipart body with boundary {}", boundary);
        request.set_header("Content-Type", content_type(&boundary));
        request.body = Some(Bytes::from(self.encoder.encode(
            endpoint.form_fields(),
            endpoint.attachments(),
            &boundary,
        )));

        Some(self.dispatch(request, completion))
    }
}
