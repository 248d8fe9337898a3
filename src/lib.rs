pub mod classify;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logger;
pub mod multipart;
pub mod service;
pub mod session;
pub mod transfer;

pub use config::NetworkConfig;
pub use endpoint::{
    DefaultRequestBuilder, Endpoint, HttpMethod, Request, RequestBuilder, Requestable,
};
pub use error::{
    DataTransferError, ErrorReport, NetworkError, TransportError, TransportErrorKind,
};
pub use logger::{DefaultNetworkLogger, NetworkLogger};
pub use multipart::{Attachment, MultipartEncoder};
pub use service::{CompletionHandler, DefaultNetworkService, NetworkResult, NetworkService};
pub use session::{CancellationHandle, ReqwestSessionManager, SessionManager, SessionOutcome};
pub use transfer::{DataTransferService, ErrorResolver};
