//! MCP Session Client
//!
//! This module provides [`Session`], the stateful client for one MCP server
//! reached over HTTP.
//!
//! # Lifecycle
//!
//! 1. `connect(url)` records the target (no network I/O)
//! 2. `send_request("initialize", ..)` negotiates the protocol version and,
//!    if the server hands one out, a session id; the client then sends
//!    `notifications/initialized`
//! 3. Further requests echo the negotiated values as headers
//! 4. `uninitialize()` forgets the negotiation, `disconnect()` forgets everything
//!
//! # Transport modes
//!
//! Every message is one HTTP POST. The server answers either with a single
//! JSON body or with a `text/event-stream` body carrying one or more messages;
//! the last message of a stream is the result of the call.
//!
//! # Request ids
//!
//! The id used for `initialize` is pinned and reused by every later request
//! until `uninitialize()`. Servers that key responses on the id see the same
//! id for the whole session.
//!
//! # Example
//!
//! ```ignore
//! use wireview::mcp::{RequestOptions, Session};
//!
//! let mut session = Session::new();
//! session.connect("http://localhost:3000/mcp");
//! session.send_request("initialize", Some(params), RequestOptions::new()).await?;
//! let tools = session.send_request("tools/list", None, RequestOptions::new()).await?;
//! ```

use crate::mcp::error::{ClientError, Phase};
use crate::mcp::protocol::{
    ExchangeEvent, McpMethod, McpNotification, McpRequest, McpResponse, RequestId,
    JSONRPC_VERSION,
};
use crate::mcp::sse;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

/// Header carrying the negotiated protocol version
pub const HEADER_PROTOCOL_VERSION: &str = "MCP-Protocol-Version";

/// Header carrying the server-assigned session id
pub const HEADER_SESSION_ID: &str = "Mcp-Session-Id";

const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const EVENT_STREAM: &str = "text/event-stream";

/// Per-call options for [`Session::send_request`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Id to use when the session has no pinned id
    pub id: Option<RequestId>,

    /// Receives the request before it is sent, then every message in order
    pub events: Option<UnboundedSender<ExchangeEvent>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit request id
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Deliver exchange events to `tx`
    pub fn with_events(mut self, tx: UnboundedSender<ExchangeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: ExchangeEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

/// Which negotiated headers go on an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Negotiated {
    /// Neither header (the initialize request)
    None,
    /// Session id only (`notifications/initialized`)
    SessionIdOnly,
    /// Both, whenever known
    All,
}

/// One logical MCP session with one server
///
/// All state-changing operations take `&mut self`, so a session has at most
/// one request in flight. Independent sessions share nothing.
#[derive(Debug)]
pub struct Session {
    /// Reqwest HTTP client
    http: reqwest::Client,

    /// MCP server endpoint URL; connected iff set
    server_url: Option<String>,

    /// Negotiated protocol version; initialized iff set
    protocol_version: Option<String>,

    /// Session id assigned by the server during initialize
    session_id: Option<String>,

    /// Id of the initialize request, reused by later requests
    initialize_request_id: Option<RequestId>,

    /// Extra headers sent with every message
    custom_headers: BTreeMap<String, String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a disconnected session
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a disconnected session on top of a preconfigured HTTP client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            server_url: None,
            protocol_version: None,
            session_id: None,
            initialize_request_id: None,
            custom_headers: BTreeMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.server_url.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.protocol_version.is_some()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The id pinned by the last `initialize` call
    pub fn pinned_id(&self) -> Option<&RequestId> {
        self.initialize_request_id.as_ref()
    }

    pub fn custom_headers(&self) -> &BTreeMap<String, String> {
        &self.custom_headers
    }

    /// Set the target server
    ///
    /// Does not contact the server and does not reset protocol state: switching
    /// URLs mid-session keeps the old negotiation until `uninitialize()`.
    pub fn connect(&mut self, url: impl Into<String>) {
        let url = url.into();
        tracing::info!("Server URL set: {}", url);
        self.server_url = Some(url);
    }

    /// Replace all custom headers; an empty map clears them
    pub fn set_custom_headers(&mut self, headers: BTreeMap<String, String>) {
        tracing::debug!("Custom headers replaced ({} set)", headers.len());
        self.custom_headers = headers;
    }

    /// Forget the negotiated protocol version, session id and pinned id
    pub fn uninitialize(&mut self) {
        if self.initialize_request_id.is_some() || self.protocol_version.is_some() {
            tracing::info!("Session uninitialized");
        }
        self.initialize_request_id = None;
        self.protocol_version = None;
        self.session_id = None;
    }

    /// Forget the server and all negotiated state
    pub fn disconnect(&mut self) {
        self.uninitialize();
        self.server_url = None;
    }

    fn require_url(&self) -> Result<String, ClientError> {
        self.server_url.clone().ok_or(ClientError::NotConnected)
    }

    /// Pick the id for an outgoing request, pinning it for `initialize`
    fn assign_id(&mut self, is_initialize: bool, explicit: Option<RequestId>) -> RequestId {
        if is_initialize {
            let id = explicit.unwrap_or_else(RequestId::generate);
            self.initialize_request_id = Some(id.clone());
            return id;
        }
        match &self.initialize_request_id {
            Some(pinned) => pinned.clone(),
            None => explicit.unwrap_or_else(RequestId::generate),
        }
    }

    fn headers(&self, negotiated: Negotiated, phase: Phase) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_BOTH));

        for (name, value) in &self.custom_headers {
            let header_name = HeaderName::try_from(name.as_str()).map_err(|e| {
                ClientError::InvalidHeader {
                    phase,
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|e| ClientError::InvalidHeader {
                    phase,
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let version = match negotiated {
            Negotiated::All => self.protocol_version.as_deref(),
            Negotiated::None | Negotiated::SessionIdOnly => None,
        };
        let session = match negotiated {
            Negotiated::All | Negotiated::SessionIdOnly => self.session_id.as_deref(),
            Negotiated::None => None,
        };
        for (name, value) in [
            (HeaderName::from_static("mcp-protocol-version"), version),
            (HeaderName::from_static("mcp-session-id"), session),
        ] {
            if let Some(value) = value {
                let value = HeaderValue::try_from(value).map_err(|e| ClientError::InvalidHeader {
                    phase,
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                headers.insert(name, value);
            }
        }

        Ok(headers)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
        phase: Phase,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(ClientError::http(phase))?;

        let status = response.status();
        tracing::debug!("HTTP {} from {}", status, url);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Transport {
            phase,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }

    /// Send a notification (a message without `id`)
    ///
    /// Waits for the HTTP exchange to finish but does not read the body.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] if no URL is set
    /// - [`ClientError::Transport`] on a non-2xx status
    /// - [`ClientError::Http`] on network failure
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        let url = self.require_url()?;
        let notification = McpNotification::new(method, params);

        let negotiated = if method == McpMethod::Initialized.as_str() {
            Negotiated::SessionIdOnly
        } else {
            Negotiated::All
        };
        let headers = self.headers(negotiated, Phase::Notification)?;

        tracing::debug!("Sending notification {} to {}", method, url);
        self.post(&url, headers, &notification, Phase::Notification)
            .await?;
        Ok(())
    }

    /// Send a request and wait for its final response
    ///
    /// For a streamed response every message is delivered to
    /// `options.events` as it is decoded and the last one is returned. A
    /// single JSON body is delivered once and returned.
    ///
    /// A successful `initialize` (no `error` member) stores
    /// `result.protocolVersion` and the `Mcp-Session-Id` response header, then
    /// sends `notifications/initialized`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] before any network I/O
    /// - [`ClientError::Transport`] on a non-2xx status
    /// - [`ClientError::EmptyStream`] if a stream carried no message
    /// - [`ClientError::InvalidResponse`] if a non-streamed body is not valid JSON
    /// - any error of the follow-up `notifications/initialized`
    pub async fn send_request(
        &mut self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<McpResponse, ClientError> {
        let url = self.require_url()?;
        let is_initialize = method == McpMethod::Initialize.as_str();

        let id = self.assign_id(is_initialize, options.id.clone());
        let request = McpRequest::new(id, method, params);
        options.emit(ExchangeEvent::RequestSent(request.clone()));

        let negotiated = if is_initialize {
            Negotiated::None
        } else {
            Negotiated::All
        };
        let headers = self.headers(negotiated, Phase::Request)?;

        tracing::debug!("Sending {} (id {}) to {}", method, request.id, url);
        let response = self.post(&url, headers, &request, Phase::Request).await?;

        let session_header = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let result = if is_event_stream(response.headers()) {
            tracing::debug!("Decoding SSE response for {}", method);
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::http(Phase::Request)));
            sse::decode_final(body, options.events.as_ref()).await?
        } else {
            let text = response
                .text()
                .await
                .map_err(ClientError::http(Phase::Request))?;
            tracing::debug!("Received HTTP response: {}", text);
            let message = parse_body(&text)?;
            options.emit(ExchangeEvent::Message(message.clone()));
            message
        };

        if is_initialize && result.is_success() {
            if let Some(version) = result.protocol_version() {
                self.protocol_version = Some(version.to_string());
            }
            if let Some(session_id) = session_header {
                self.session_id = Some(session_id);
            }
            tracing::info!(
                "Session initialized: protocol {}, session id {}",
                self.protocol_version.as_deref().unwrap_or("unknown"),
                self.session_id.as_deref().unwrap_or("none")
            );
            if let Some(init) = result.initialize_result() {
                tracing::info!(
                    "Server: {} {}",
                    init.server_info.name,
                    init.server_info.version
                );
            }
            self.send_notification(McpMethod::Initialized.as_str(), None)
                .await?;
        }

        Ok(result)
    }

    /// Send caller-written JSON-RPC text as-is
    ///
    /// Missing `jsonrpc` and `id` members are filled in. Negotiated headers are
    /// always attached when known. The response must be a single JSON body.
    ///
    /// Returns the request that was actually sent together with the response.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] before any parsing or network I/O
    /// - [`ClientError::MalformedInput`] if the text is not a JSON object
    /// - [`ClientError::Transport`] / [`ClientError::Http`] /
    ///   [`ClientError::InvalidResponse`] as for [`Session::send_request`]
    pub async fn send_custom_request(
        &self,
        raw: &str,
    ) -> Result<(Value, McpResponse), ClientError> {
        let url = self.require_url()?;
        let request = prepare_custom_request(raw)?;
        let headers = self.headers(Negotiated::All, Phase::Request)?;

        tracing::debug!("Sending custom request to {}: {}", url, request);
        let response = self.post(&url, headers, &request, Phase::Request).await?;
        let text = response
            .text()
            .await
            .map_err(ClientError::http(Phase::Request))?;
        let message = parse_body(&text)?;

        Ok((request, message))
    }
}

/// Parse a single JSON body; any valid JSON is kept as the message
fn parse_body(text: &str) -> Result<McpResponse, ClientError> {
    serde_json::from_str::<Value>(text)
        .map(McpResponse::from)
        .map_err(|source| ClientError::InvalidResponse {
            phase: Phase::Request,
            source,
        })
}

/// Parse caller-written request text and fill in `jsonrpc` and `id`
pub fn prepare_custom_request(raw: &str) -> Result<Value, ClientError> {
    let mut request: Value =
        serde_json::from_str(raw).map_err(|e| ClientError::MalformedInput(e.to_string()))?;

    let object = request.as_object_mut().ok_or_else(|| {
        ClientError::MalformedInput("a JSON-RPC request must be a JSON object".to_string())
    })?;

    if is_blank(object.get("jsonrpc")) {
        object.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
    }
    if object.get("id").map_or(true, Value::is_null) {
        let id = serde_json::to_value(RequestId::generate())
            .map_err(|e| ClientError::MalformedInput(e.to_string()))?;
        object.insert("id".to_string(), id);
    }

    Ok(request)
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(EVENT_STREAM))
}
