//! Wireview Library
//!
//! This library provides the core functionality for wireview, an inspector for
//! MCP servers reachable over HTTP: the session client with its SSE decoder,
//! the settings store, and the exchange records the CLI renders.

pub mod config;
pub mod exchange;
pub mod mcp;
