//! Network abstraction.
//!
//! The engine never talks to a concrete HTTP library. Implement
//! [`Network`] over reqwest, hyper, a browser fetch bridge or anything
//! else that can send a request and return a status code.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use deferq_protocol::{ApiInfo, Method, Payload};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// An outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Encoded body.
    pub body: Vec<u8>,
    /// Whether cookies and other credentials are sent.
    pub include_credentials: bool,
}

impl NetworkRequest {
    /// Creates a request with no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            include_credentials: true,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the first value of header `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response with a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl NetworkResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Decides whether a response means the request was delivered.
#[derive(Clone, Copy)]
pub struct SuccessPredicate(fn(&NetworkResponse) -> bool);

impl SuccessPredicate {
    /// Wraps a predicate.
    pub const fn new(predicate: fn(&NetworkResponse) -> bool) -> Self {
        Self(predicate)
    }

    /// Applies the predicate.
    pub fn accepts(&self, response: &NetworkResponse) -> bool {
        (self.0)(response)
    }
}

impl Default for SuccessPredicate {
    fn default() -> Self {
        Self(NetworkResponse::is_success)
    }
}

impl fmt::Debug for SuccessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SuccessPredicate(..)")
    }
}

/// Sends requests over the network.
///
/// `Err` means no response was received (a network fault). Any response,
/// including a 5xx, is `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    /// Sends a request and waits for the response.
    async fn send(&self, request: NetworkRequest) -> SyncResult<NetworkResponse>;
}

/// Builds the wire request for `payload` against `api`.
///
/// Attaches the current anti-forgery token and asks for credentials to be
/// included.
pub fn rehydrate(payload: &Payload, api: &ApiInfo, config: &SyncConfig) -> SyncResult<NetworkRequest> {
    let mut request = NetworkRequest::new(payload.method, api.endpoint.clone())
        .with_body(payload.encode_body()?);
    if !request.body.is_empty() {
        request = request.with_header("Content-Type", payload.body_type.content_type());
    }
    if let Some(token) = &api.auth.csrf_token {
        request = request.with_header(config.csrf_header.clone(), token.clone());
    }
    Ok(request)
}

/// A scripted reply of [`MockNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Answer with a status and body.
    Status(u16, Vec<u8>),
    /// Fail without a response.
    Offline,
}

impl MockReply {
    /// A 200 with an empty body.
    pub fn ok() -> Self {
        MockReply::Status(200, Vec::new())
    }

    /// A 200 with a JSON body.
    pub fn json(body: &serde_json::Value) -> Self {
        MockReply::Status(200, body.to_string().into_bytes())
    }
}

#[derive(Debug, Default)]
struct Route {
    queued: VecDeque<MockReply>,
    standing: Option<MockReply>,
}

/// A mock network for testing.
///
/// Replies are scripted per exact URL: one-shot replies are consumed first,
/// then the standing reply applies. Unscripted URLs and an offline mock
/// fail with a transport error.
#[derive(Debug)]
pub struct MockNetwork {
    online: AtomicBool,
    routes: Mutex<HashMap<String, Route>>,
    sent: Mutex<Vec<NetworkRequest>>,
}

impl MockNetwork {
    /// Creates an online mock with no routes.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the reply for every request to `url`.
    pub fn reply(&self, url: impl Into<String>, reply: MockReply) {
        self.routes.lock().entry(url.into()).or_default().standing = Some(reply);
    }

    /// Queues a reply for the next request to `url`.
    pub fn reply_once(&self, url: impl Into<String>, reply: MockReply) {
        self.routes
            .lock()
            .entry(url.into())
            .or_default()
            .queued
            .push_back(reply);
    }

    /// Sets the connected state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns every request sent so far.
    pub fn sent(&self) -> Vec<NetworkRequest> {
        self.sent.lock().clone()
    }

    /// Returns how many requests were sent to `url`.
    pub fn sent_to(&self, url: &str) -> usize {
        self.sent.lock().iter().filter(|r| r.url == url).count()
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn send(&self, request: NetworkRequest) -> SyncResult<NetworkResponse> {
        let url = request.url.clone();
        self.sent.lock().push(request);

        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("network offline"));
        }

        let reply = {
            let mut routes = self.routes.lock();
            routes
                .get_mut(&url)
                .and_then(|route| route.queued.pop_front().or_else(|| route.standing.clone()))
        };

        match reply {
            Some(MockReply::Status(status, body)) => Ok(NetworkResponse::new(status, body)),
            Some(MockReply::Offline) => Err(SyncError::transport_retryable("connection reset")),
            None => Err(SyncError::transport_retryable(format!("no route to {url}"))),
        }
    }
}
