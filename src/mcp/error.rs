//! Session Client Error Types
//!
//! Every failure a [`Session`](crate::mcp::Session) can report. Messages are
//! written to be shown to the end user as-is.

use std::fmt;

/// Which kind of outgoing message failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Request,
    Notification,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Notification => f.write_str("notification"),
        }
    }
}

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No server URL configured; raised before any network I/O
    #[error("Not connected to any server. Please connect first.")]
    NotConnected,

    /// HTTP status outside the success range
    #[error(
        "Failed to send {phase}: HTTP error! status: {status} {status_text}{}",
        body_suffix(.body)
    )]
    Transport {
        phase: Phase,
        status: u16,
        status_text: String,
        /// Response body, empty when it could not be read
        body: String,
    },

    /// Caller-supplied JSON text could not be used as a request
    #[error("Invalid JSON: {0}")]
    MalformedInput(String),

    /// A custom header or negotiated value that cannot go on the wire
    #[error("Failed to send {phase}: invalid header '{name}': {reason}")]
    InvalidHeader {
        phase: Phase,
        name: String,
        reason: String,
    },

    /// An SSE stream ended without a single parseable message
    #[error("Failed to send request: No valid response received from SSE stream")]
    EmptyStream,

    /// Network failure while sending or reading the body
    #[error("Failed to send {phase}: {source}")]
    Http {
        phase: Phase,
        #[source]
        source: reqwest::Error,
    },

    /// A non-streamed body that is not valid JSON
    #[error("Failed to send {phase}: response body is not valid JSON: {source}")]
    InvalidResponse {
        phase: Phase,
        #[source]
        source: serde_json::Error,
    },
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("\nResponse body: {}", body)
    }
}

impl ClientError {
    pub(crate) fn http(phase: Phase) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { phase, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_with_body() {
        let err = ClientError::Transport {
            phase: Phase::Request,
            status: 404,
            status_text: "Not Found".to_string(),
            body: "no such endpoint".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Failed to send request: HTTP error! status: 404 Not Found\nResponse body: no such endpoint"
        );
    }

    #[test]
    fn test_transport_message_without_body() {
        let err = ClientError::Transport {
            phase: Phase::Notification,
            status: 500,
            status_text: "Internal Server Error".to_string(),
            body: String::new(),
        };

        assert_eq!(
            err.to_string(),
            "Failed to send notification: HTTP error! status: 500 Internal Server Error"
        );
    }

    #[test]
    fn test_malformed_input_message() {
        let err = ClientError::MalformedInput("expected value at line 1 column 1".to_string());
        assert!(err.to_string().starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_invalid_header_message_carries_phase() {
        let err = ClientError::InvalidHeader {
            phase: Phase::Notification,
            name: "X-Bad".to_string(),
            reason: "invalid HTTP header value".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Failed to send notification: invalid header 'X-Bad': invalid HTTP header value"
        );
    }
}
