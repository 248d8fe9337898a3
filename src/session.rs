//! Session managers perform a single HTTP exchange and report the raw outcome.

use bytes::Bytes;
use log::{debug, warn};
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::endpoint::Request;
use crate::error::{TransportError, TransportErrorKind};

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseMeta {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
        }
    }
}

impl From<&reqwest::Response> for ResponseMeta {
    fn from(response: &reqwest::Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            status_code: response.status().as_u16(),
            headers,
        }
    }
}

/// What a session manager saw: any combination of body, metadata and error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionOutcome {
    pub data: Option<Bytes>,
    pub response: Option<ResponseMeta>,
    pub error: Option<TransportError>,
}

impl SessionOutcome {
    pub fn failure(error: TransportError) -> Self {
        Self {
            data: None,
            response: None,
            error: Some(error),
        }
    }
}

/// Receives the outcome of one exchange. Called exactly once.
pub type SessionCallback = Box<dyn FnOnce(SessionOutcome) + Send + 'static>;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    finished: AtomicBool,
    notify: Notify,
}

/// Lets a caller ask for an in-flight exchange to stop.
///
/// Cancellation is advisory: once the exchange has finished, `cancel` does
/// nothing. A cancelled exchange still reports exactly once, with a
/// [`TransportErrorKind::Cancelled`] error.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    state: Arc<CancelState>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if self.state.finished.load(Ordering::SeqCst) {
            debug!("Cancel requested after completion, ignoring");
            return;
        }
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Marks the exchange as done so later `cancel` calls are no-ops.
    pub fn finish(&self) {
        self.state.finished.store(true, Ordering::SeqCst);
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.state.notify.notified().await;
    }
}

/// Performs one HTTP exchange.
///
/// Implementations must invoke `callback` exactly once, from any thread,
/// and return without waiting for the exchange.
#[cfg_attr(test, mockall::automock)]
pub trait SessionManager: Send + Sync {
    fn send(&self, request: Request, callback: SessionCallback) -> CancellationHandle;
}

/// Session manager backed by a shared [`reqwest::Client`].
///
/// Exchanges run as tasks on the ambient tokio runtime. Non-2xx responses are
/// reported as [`TransportErrorKind::Status`] errors alongside their metadata
/// and body so the classifier can inspect them.
#[derive(Clone, Default)]
pub struct ReqwestSessionManager {
    client: Client,
}

impl ReqwestSessionManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

}

/// Holds a callback until the exchange reports.
///
/// If the task is dropped first, e.g. because the runtime shut down, the
/// callback still runs once with a cancellation error.
struct PendingCallback {
    callback: Option<SessionCallback>,
    handle: CancellationHandle,
}

impl PendingCallback {
    fn new(callback: SessionCallback, handle: CancellationHandle) -> Self {
        Self {
            callback: Some(callback),
            handle,
        }
    }

    fn complete(mut self, outcome: SessionOutcome) {
        self.handle.finish();
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("Exchange dropped before completion, reporting cancellation");
            self.handle.finish();
            callback(SessionOutcome::failure(TransportError::cancelled()));
        }
    }
}

impl SessionManager for ReqwestSessionManager {
    #[tracing::instrument(skip(self, request, callback), fields(method = %request.method, url = %request.url))]
    fn send(&self, request: Request, callback: SessionCallback) -> CancellationHandle {
        let handle = CancellationHandle::new();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("No tokio runtime available to send the request: {}", e);
                handle.finish();
                callback(SessionOutcome::failure(TransportError::other(format!(
                    "no async runtime: {}",
                    e
                ))));
                return handle;
            }
        };

        let client = self.client.clone();
        let task_handle = handle.clone();
        let pending = PendingCallback::new(callback, handle.clone());
        runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = task_handle.cancelled() => {
                    debug!("Request cancelled before completion");
                    SessionOutcome::failure(TransportError::cancelled())
                }
                outcome = perform(&client, request) => outcome,
            };
            pending.complete(outcome);
        });

        handle
    }
}

async fn perform(client: &Client, request: Request) -> SessionOutcome {
    let mut builder = client.request(request.method.to_reqwest(), request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("Request failed before a response arrived: {}", e);
            return SessionOutcome::failure(TransportError::from(&e));
        }
    };

    let meta = ResponseMeta::from(&response);
    let status = response.status();

    match response.bytes().await {
        Ok(data) => {
            let error = (!status.is_success()).then(|| {
                TransportError::new(TransportErrorKind::Status, format!("HTTP status {}", status))
            });
            SessionOutcome {
                data: Some(data),
                response: Some(meta),
                error,
            }
        }
        Err(e) => {
            debug!("Failed to read response body: {}", e);
            SessionOutcome {
                data: None,
                response: Some(meta),
                error: Some(TransportError::from(&e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HttpMethod;
    use reqwest::Url;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn request(method: HttpMethod, url: &str) -> Request {
        Request::new(method, Url::parse(url).unwrap())
    }

    async fn send_and_wait(
        session: &ReqwestSessionManager,
        request: Request,
    ) -> (SessionOutcome, CancellationHandle) {
        let (tx, rx) = oneshot::channel();
        let handle = session.send(
            request,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        (rx.await.unwrap(), handle)
    }

    #[test]
    fn test_cancellation_handle_flags() {
        let handle = CancellationHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());

        let finished = CancellationHandle::new();
        finished.finish();
        finished.cancel();
        assert!(finished.is_finished());
        assert!(!finished.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let handle = CancellationHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/items")
            .match_header("x-token", "abc")
            .match_body("payload")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let mut req = request(HttpMethod::Post, &format!("{}/items", server.url()));
        req.set_header("X-Token", "abc");
        req.body = Some(Bytes::from_static(b"payload"));

        let session = ReqwestSessionManager::new(Client::new());
        let (outcome, handle) = send_and_wait(&session, req).await;

        mock.assert_async().await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.data, Some(Bytes::from_static(br#"{"id":1}"#)));
        let meta = outcome.response.unwrap();
        assert_eq!(meta.status_code, 201);
        assert!(meta
            .headers
            .iter()
            .any(|(n, v)| n == "content-type" && v == "application/json"));
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_send_error_status_keeps_body_and_meta() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let session = ReqwestSessionManager::new(Client::new());
        let (outcome, _) = send_and_wait(
            &session,
            request(HttpMethod::Get, &format!("{}/missing", server.url())),
        )
        .await;

        assert_eq!(outcome.error.unwrap().kind, TransportErrorKind::Status);
        assert_eq!(outcome.response.unwrap().status_code, 404);
        assert_eq!(outcome.data, Some(Bytes::from_static(b"nope")));
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_not_connected() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = ReqwestSessionManager::new(Client::new());
        let (outcome, _) =
            send_and_wait(&session, request(HttpMethod::Get, &format!("http://{}/", addr))).await;

        assert!(outcome.response.is_none());
        assert_eq!(outcome.error.unwrap().kind, TransportErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_reports_cancelled_once() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let counter = calls.clone();
        let session = ReqwestSessionManager::new(Client::new());
        let handle = session.send(
            request(HttpMethod::Get, &format!("http://{}/slow", addr)),
            Box::new(move |outcome| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(outcome);
            }),
        );

        handle.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.error.unwrap().kind, TransportErrorKind::Cancelled);
        assert!(handle.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/done")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let counter = calls.clone();
        let session = ReqwestSessionManager::new(Client::new());
        let handle = session.send(
            request(HttpMethod::Get, &format!("{}/done", server.url())),
            Box::new(move |outcome| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(outcome);
            }),
        );

        let outcome = rx.await.unwrap();
        assert!(outcome.error.is_none());

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_runtime_shutdown_in_flight_reports_cancelled_once() {
        // Accepts connections (via the backlog) but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let session = ReqwestSessionManager::new(Client::new());

        let handle = runtime.block_on(async {
            session.send(
                request(HttpMethod::Get, &format!("http://{}/hang", addr)),
                Box::new(move |outcome| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(outcome);
                }),
            )
        });
        runtime.block_on(async { tokio::time::sleep(Duration::from_millis(100)).await });
        drop(runtime);

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.error.unwrap().kind, TransportErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        drop(listener);
    }

    #[test]
    fn test_send_without_runtime_reports_failure() {
        let session = ReqwestSessionManager::new(Client::new());
        let result = Arc::new(std::sync::Mutex::new(None));
        let slot = result.clone();

        let handle = session.send(
            request(HttpMethod::Get, "http://127.0.0.1:9/"),
            Box::new(move |outcome| {
                *slot.lock().unwrap() = Some(outcome);
            }),
        );

        let outcome = result.lock().unwrap().take().unwrap();
        assert_eq!(outcome.error.unwrap().kind, TransportErrorKind::Other);
        assert!(handle.is_finished());
    }
}
