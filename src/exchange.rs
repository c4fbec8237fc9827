//! Exchange Module
//!
//! This module runs one protocol command against a [`Session`] and captures
//! everything observable about it in an [`Exchange`] record: the request that
//! went out, every message that came back, and the final outcome.
//!
//! # Design
//!
//! - CLI logic lives in main.rs; command wiring lives here
//! - Runners never fail: errors become part of the record
//! - Records are plain data so any front end can render them

use crate::mcp::{
    ExchangeEvent, InitializeParams, McpMethod, McpResponse, RequestOptions, Session,
    ToolCallParams,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A message received during an exchange
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    /// 1-based position in arrival order
    pub index: usize,

    /// When the message was observed
    pub timestamp: DateTime<Utc>,

    pub message: McpResponse,
}

/// Result of one command
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// Human-readable title ("Tools List Response", "Call Tool - ERROR", ...)
    pub title: String,

    /// The request as sent (or as typed, for custom requests)
    pub request: Option<Value>,

    /// Messages received, in order
    pub events: Vec<RecordedEvent>,

    /// Final response (if any)
    pub response: Option<McpResponse>,

    /// Error message (if failed)
    pub error: Option<String>,

    /// Whether the command failed
    pub is_error: bool,
}

impl Exchange {
    fn success(title: impl Into<String>, request: Option<Value>, response: McpResponse) -> Self {
        Self {
            title: title.into(),
            request,
            events: Vec::new(),
            response: Some(response),
            error: None,
            is_error: false,
        }
    }

    fn failure(label: &str, request: Option<Value>, error: impl fmt::Display) -> Self {
        let message = error.to_string();
        warn!("{} failed: {}", label, message);
        Self {
            title: format!("{} - ERROR", label),
            request,
            events: Vec::new(),
            response: None,
            error: Some(message),
            is_error: true,
        }
    }

    /// Whether the server streamed more than the final message
    pub fn is_streamed(&self) -> bool {
        self.events.len() > 1
    }

    /// Render the exchange as plain text
    ///
    /// Events are listed only when more than one message arrived; a single
    /// message is the response itself.
    pub fn render(&self) -> String {
        let mut out = format!("=== {} ===\n", self.title);

        if let Some(request) = &self.request {
            out.push_str("\nRequest:\n");
            out.push_str(&pretty(request));
            out.push('\n');
        }

        if self.is_streamed() {
            out.push_str(&format!("\nEvents ({}):\n", self.events.len()));
            for event in &self.events {
                out.push_str(&format!(
                    "[{}] {}\n{}\n",
                    event.index,
                    event.timestamp.format("%H:%M:%S%.3f"),
                    pretty(&event.message)
                ));
            }
        }

        if let Some(response) = &self.response {
            out.push_str("\nResponse:\n");
            out.push_str(&pretty(response));
            out.push('\n');
        }

        if let Some(error) = &self.error {
            out.push_str("\nError:\n");
            out.push_str(error);
            out.push('\n');
        }

        out
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}

/// Send one request and record everything the session reports about it
async fn run_request(
    session: &mut Session,
    title: &str,
    label: &str,
    method: &str,
    params: Option<Value>,
) -> Exchange {
    info!("Running {}", method);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = RequestOptions::new().with_events(tx);

    // The sender lives inside the request future, so the collector ends
    // exactly when the request does.
    let request = session.send_request(method, params, options);
    let collect = async {
        let mut sent = None;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ExchangeEvent::RequestSent(request) => {
                    sent = serde_json::to_value(&request).ok();
                }
                ExchangeEvent::Message(message) => events.push(RecordedEvent {
                    index: events.len() + 1,
                    timestamp: Utc::now(),
                    message,
                }),
            }
        }
        (sent, events)
    };

    let (outcome, (sent, events)) = tokio::join!(request, collect);

    let mut exchange = match outcome {
        Ok(response) => {
            if let Some(error) = response.error() {
                match response.typed_error() {
                    Some(typed) => warn!("{} answered with {}", method, typed),
                    None => warn!("{} answered with error {}", method, error),
                }
            }
            Exchange::success(title, sent, response)
        }
        Err(e) => Exchange::failure(label, sent, e),
    };
    exchange.events = events;
    exchange
}

/// Run the initialize handshake with the default client parameters
pub async fn initialize(session: &mut Session) -> Exchange {
    let params = match serde_json::to_value(InitializeParams::default()) {
        Ok(params) => params,
        Err(e) => return Exchange::failure("Initialize", None, e),
    };
    run_request(
        session,
        "Initialize Response",
        "Initialize",
        McpMethod::Initialize.as_str(),
        Some(params),
    )
    .await
}

pub async fn list_tools(session: &mut Session) -> Exchange {
    run_request(
        session,
        "Tools List Response",
        "List Tools",
        McpMethod::ToolsList.as_str(),
        None,
    )
    .await
}

pub async fn list_prompts(session: &mut Session) -> Exchange {
    run_request(
        session,
        "Prompts List Response",
        "List Prompts",
        McpMethod::PromptsList.as_str(),
        None,
    )
    .await
}

pub async fn list_resources(session: &mut Session) -> Exchange {
    run_request(
        session,
        "Resources List Response",
        "List Resources",
        McpMethod::ResourcesList.as_str(),
        None,
    )
    .await
}

/// Call a tool
///
/// `arguments` is JSON text; `None` or a blank string sends `{}`.
pub async fn call_tool(session: &mut Session, name: &str, arguments: Option<&str>) -> Exchange {
    let params = match tool_call_params(name, arguments) {
        Ok(params) => params,
        Err(e) => return Exchange::failure("Call Tool", None, format!("{:#}", e)),
    };
    run_request(
        session,
        &format!("Call Tool: {}", name),
        "Call Tool",
        McpMethod::ToolsCall.as_str(),
        Some(params),
    )
    .await
}

fn tool_call_params(name: &str, arguments: Option<&str>) -> Result<Value> {
    let arguments = match arguments.map(str::trim).filter(|a| !a.is_empty()) {
        Some(text) => serde_json::from_str(text).context("Invalid JSON format")?,
        None => Value::Object(Default::default()),
    };
    let params = ToolCallParams {
        name: name.to_string(),
        arguments,
    };
    serde_json::to_value(params).context("Failed to serialize tool call")
}

/// Send caller-written JSON-RPC text
///
/// On failure the typed text is kept as the request when it parses, so the
/// record shows what the user attempted.
pub async fn custom(session: &Session, raw: &str) -> Exchange {
    info!("Running custom request");
    match session.send_custom_request(raw).await {
        Ok((request, response)) => {
            Exchange::success("Custom Request", Some(request), response)
        }
        Err(e) => Exchange::failure("Custom Request", serde_json::from_str(raw).ok(), e),
    }
}

/// Connection state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    UrlNotSet,
    Uninitialized { url: String },
    Initialized { url: String },
}

impl SessionStatus {
    pub fn of(session: &Session) -> Self {
        match session.server_url() {
            None => Self::UrlNotSet,
            Some(url) if session.is_initialized() => Self::Initialized {
                url: url.to_string(),
            },
            Some(url) => Self::Uninitialized {
                url: url.to_string(),
            },
        }
    }

    /// Longer explanation with a hint at the next step
    pub fn detail(&self) -> String {
        match self {
            Self::UrlNotSet => "Set the MCP server URL with `url <URL>`".to_string(),
            Self::Uninitialized { url } => format!(
                "Server: {}\nStatus: Not initialized\nRun `initialize` to initialize",
                url
            ),
            Self::Initialized { url } => format!("Server: {}\nStatus: Ready", url),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlNotSet => f.write_str("MCP: URL Not Set"),
            Self::Uninitialized { .. } => f.write_str("MCP: Uninitialized"),
            Self::Initialized { .. } => f.write_str("MCP: Initialized"),
        }
    }
}
