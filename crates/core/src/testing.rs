//! Mock implementations of the core ports
//!
//! Enabled with the `test-utils` feature. Every mock records what it was asked
//! to do so tests can assert on call counts and payloads.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rentline_domain::{ApiError, Notice, TokenPair};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::ports::{LoginRedirect, TokenRefresher};
use crate::http::ports::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::notify::ports::NotificationSink;
use crate::realtime::ports::{RealtimeError, SocketConnector, SocketFrame, SocketStream};

/// Outcome a mock transport hands back for one request.
pub type MockReply = Result<TransportResponse, TransportError>;

type Responder = Arc<dyn Fn(&TransportRequest) -> Option<MockReply> + Send + Sync>;

/// JSON response with the matching content type.
pub fn json_response(status: u16, body: &Value) -> TransportResponse {
    TransportResponse::new(status, body.to_string().into_bytes())
        .with_header("content-type", "application/json")
}

/// Mock HTTP transport
///
/// Replies are looked up by path suffix of the request URL (query string
/// ignored). Sequences are consumed one reply per call; the last element
/// repeats once the sequence is drained. Unmatched requests get a 404.
///
/// # Examples
///
/// ```ignore
/// use rentline_core::testing::{json_response, MockTransport};
///
/// let transport = MockTransport::new();
/// let healthy = serde_json::json!({"status": "healthy"});
/// transport.add_response("/health/", json_response(200, &healthy));
/// assert_eq!(transport.call_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<HashMap<String, Vec<MockReply>>>>,
    responder: Option<Responder>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide replies with a closure; `None` falls through to the reply table.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&TransportRequest) -> Option<MockReply> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_response(&self, path: &str, response: TransportResponse) {
        self.add_reply_sequence(path, vec![Ok(response)]);
    }

    pub fn add_error(&self, path: &str, error: TransportError) {
        self.add_reply_sequence(path, vec![Err(error)]);
    }

    pub fn add_reply_sequence(&self, path: &str, replies: Vec<MockReply>) {
        self.replies.lock().insert(path.to_string(), replies);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests whose URL path ends with `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| url_path(&r.url).ends_with(path)).count()
    }

    fn lookup(&self, request: &TransportRequest) -> MockReply {
        if let Some(responder) = &self.responder {
            if let Some(reply) = responder(request) {
                return reply;
            }
        }

        let path = url_path(&request.url);
        let mut replies = self.replies.lock();
        let key = replies
            .keys()
            .filter(|key| path.ends_with(key.as_str()))
            .max_by_key(|key| key.len())
            .cloned();

        match key.and_then(|key| replies.get_mut(&key)) {
            Some(sequence) if sequence.len() > 1 => sequence.remove(0),
            Some(sequence) if !sequence.is_empty() => sequence[0].clone(),
            _ => Ok(TransportResponse::new(404, Vec::new())),
        }
    }
}

fn url_path(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.lookup(&request)
    }
}

/// Mock token refresher that counts calls
#[derive(Clone)]
pub struct MockRefresher {
    result: Arc<Mutex<Result<TokenPair, ApiError>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockRefresher {
    pub fn succeeding(tokens: TokenPair) -> Self {
        Self { result: Arc::new(Mutex::new(Ok(tokens))), calls: Arc::default(), delay: None }
    }

    pub fn failing(error: ApiError) -> Self {
        Self { result: Arc::new(Mutex::new(Err(error))), calls: Arc::default(), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.lock().clone()
    }
}

/// Counts login redirects
#[derive(Debug, Clone, Default)]
pub struct RecordingRedirect {
    count: Arc<AtomicUsize>,
}

impl RecordingRedirect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects every notice it is shown
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Server side of a [`MockSocketConnector`] connection
pub struct MockSocketPeer {
    url: String,
    inbound: Option<mpsc::UnboundedSender<SocketFrame>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_by_client: Arc<AtomicBool>,
}

impl MockSocketPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(SocketFrame::Text(text.into()));
        }
    }

    /// Text frames the client has sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Drop the connection without a close frame.
    pub fn drop_connection(&mut self) {
        self.inbound = None;
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<SocketFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_by_client: Arc<AtomicBool>,
}

#[async_trait]
impl SocketStream for MockSocket {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError> {
        if self.closed_by_client.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<SocketFrame, RealtimeError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.closed_by_client.store(true, Ordering::SeqCst);
        self.inbound.close();
        Ok(())
    }
}

/// In-memory socket connector
///
/// Every accepted connection hands its [`MockSocketPeer`] to the receiver
/// returned by [`MockSocketConnector::new`].
pub struct MockSocketConnector {
    urls: Mutex<Vec<String>>,
    peers: mpsc::UnboundedSender<MockSocketPeer>,
    refuse: AtomicBool,
}

impl MockSocketConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockSocketPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (Self { urls: Mutex::new(Vec::new()), peers, refuse: AtomicBool::new(false) }, accepted)
    }

    /// Make every following connect attempt fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// URLs of every connect attempt, including refused ones.
    pub fn attempts(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl SocketConnector for MockSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketStream>, RealtimeError> {
        self.urls.lock().push(url.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Connect("connection refused".to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed_by_client = Arc::new(AtomicBool::new(false));

        let peer = MockSocketPeer {
            url: url.to_string(),
            inbound: Some(inbound_tx),
            sent: Arc::clone(&sent),
            closed_by_client: Arc::clone(&closed_by_client),
        };
        self.peers
            .send(peer)
            .map_err(|_| RealtimeError::Connect("mock server is gone".to_string()))?;

        Ok(Box::new(MockSocket { inbound: inbound_rx, sent, closed_by_client }))
    }
}
