//! MCP (Model Context Protocol) Client Implementation
//!
//! This module provides a pure Rust client for MCP servers reachable over
//! HTTP, built on Tokio and Reqwest (no external SDK).
//!
//! # Architecture
//!
//! The implementation is organized into three layers:
//!
//! 1. **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types
//! 2. **Stream Layer** (`sse`): incremental Server-Sent-Events decoder
//! 3. **Session Layer** (`client`): session state, handshake and HTTP exchange
//!
//! # Design Principles
//!
//! - **Explicit state**: a [`Session`] value owns everything negotiated with a server
//! - **Inspectable**: callers can observe the exact request and every streamed message
//! - **Type Safety**: errors are typed ([`ClientError`]) so callers can branch on them

// Protocol layer: JSON-RPC 2.0 message types
pub mod protocol;

// Error types for session operations
pub mod error;

// Stream layer: SSE body decoding
pub mod sse;

// Session layer: connection state and HTTP exchange
pub mod client;

// Re-export commonly used types for convenience
pub use protocol::{
    ClientCapabilities, ExchangeEvent, Implementation, InitializeParams, InitializeResult,
    McpError, McpMethod, McpNotification, McpRequest, McpResponse, RequestId, ToolCallParams,
};

pub use client::{RequestOptions, Session, HEADER_PROTOCOL_VERSION, HEADER_SESSION_ID};
pub use error::{ClientError, Phase};
pub use sse::SseDecoder;

// Property-based tests module
#[cfg(test)]
mod proptests;
