//! SSE Stream Decoder
//!
//! Turns a streamed `text/event-stream` body into JSON-RPC messages.
//!
//! Only `data: ` lines are looked at. Each one carries a complete JSON-RPC
//! message; `data: [DONE]` marks the end of the stream and is not a message.
//! Any valid JSON is kept as a message, conforming or not. A line that is not
//! valid JSON is logged and skipped, the rest of the stream is still decoded.
//!
//! Chunks may split lines (or UTF-8 sequences) anywhere: the decoder buffers
//! bytes and only decodes complete lines.

use crate::mcp::error::ClientError;
use crate::mcp::protocol::{ExchangeEvent, McpResponse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedSender;

/// Prefix of a data line, including the space
const DATA_PREFIX: &str = "data: ";

/// Stream end marker
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental line decoder
///
/// Feed it chunks as they arrive, then call [`SseDecoder::finish`] once the
/// body is exhausted to flush a final line that had no trailing newline.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every message completed by it, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<McpResponse> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(message) = parse_line(&self.buffer[start..end]) {
                messages.push(message);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        messages
    }

    /// Process whatever is left in the buffer
    pub fn finish(&mut self) -> Option<McpResponse> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_line(raw: &[u8]) -> Option<McpResponse> {
    let line = String::from_utf8_lossy(raw);
    let data = line.strip_prefix(DATA_PREFIX)?.trim();

    if data == DONE_SENTINEL {
        tracing::debug!("SSE stream end marker received");
        return None;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(message) => Some(McpResponse::from(message)),
        Err(e) => {
            tracing::warn!("Failed to parse SSE data: {} ({})", data, e);
            None
        }
    }
}

struct DecodeState<S> {
    chunks: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<McpResponse>,
    exhausted: bool,
}

/// Lazily decode a chunked body into messages
///
/// The returned stream yields messages in the order they appear on the wire.
/// A chunk error is yielded once and ends the stream. The body is owned by
/// the stream, so dropping the stream at any point releases it.
pub fn messages<S, B, E>(chunks: S) -> impl Stream<Item = Result<McpResponse, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        chunks: Box::pin(chunks),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(message) = state.ready.pop_front() {
                return Some((Ok(message), state));
            }
            if state.exhausted {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.feed(chunk.as_ref());
                    state.ready.extend(decoded);
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.exhausted = true;
                    if state.decoder.pending() > 0 {
                        tracing::debug!(
                            "SSE body ended mid-line, flushing {} byte(s)",
                            state.decoder.pending()
                        );
                    }
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}

/// Drain a chunked body and return its last message
///
/// Every decoded message is forwarded to `events` (if given) before the next
/// one is decoded. The last message is the result even when it carries an
/// `error`.
///
/// # Errors
///
/// - the first chunk error, unchanged
/// - [`ClientError::EmptyStream`] if no message could be decoded
pub async fn decode_final<S, B>(
    chunks: S,
    events: Option<&UnboundedSender<ExchangeEvent>>,
) -> Result<McpResponse, ClientError>
where
    S: Stream<Item = Result<B, ClientError>>,
    B: AsRef<[u8]>,
{
    let mut decoded = std::pin::pin!(messages(chunks));
    let mut last = None;
    let mut count = 0usize;

    while let Some(message) = decoded.next().await {
        let message = message?;
        count += 1;
        if let Some(tx) = events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(ExchangeEvent::Message(message.clone()));
        }
        last = Some(message);
    }

    tracing::debug!("SSE stream drained: {} message(s)", count);
    last.ok_or(ClientError::EmptyStream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    const LINE: &str = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n";

    fn chunked(parts: Vec<&'static str>) -> impl Stream<Item = Result<&'static [u8], ClientError>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes())))
    }

    #[test]
    fn test_single_line_single_chunk() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(LINE.as_bytes());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), Some(&json!(1)));
        assert_eq!(decoder.pending(), 0);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_line_split_mid_json() {
        let mut decoder = SseDecoder::new();
        let (a, b) = LINE.split_at(20);

        assert!(decoder.feed(a.as_bytes()).is_empty());
        assert_eq!(decoder.pending(), 20);
        assert_eq!(decoder.feed(b.as_bytes()).len(), 1);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = SseDecoder::new();
        let total: usize = LINE.bytes().map(|b| decoder.feed(&[b]).len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let line = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"text\":\"héllo\"}}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let out = decoder.feed(&bytes[split..]);

        assert_eq!(out[0].result(), Some(&json!({"text": "héllo"})));
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"event: message\nid: 4\n: comment\n\ndata:{\"id\":1}\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\r\n");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_malformed_line_skipped() {
        let mut decoder = SseDecoder::new();
        let mut out = decoder.feed(b"data: {not json\n");
        out.extend(decoder.feed(LINE.as_bytes()));

        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_nonconforming_json_is_kept_verbatim() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(
            concat!(
                "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"error\":\"boom\"}\n",
                "data: {\"jsonrpc\":\"2.0\",\"id\":1.5,\"result\":null}\n",
                "data: {\"jsonrpc\":\"2.0\",\"id\":18446744073709551615,\"result\":{}}\n",
            )
            .as_bytes(),
        );

        assert_eq!(out.len(), 3);
        assert!(!out[0].is_success());
        assert_eq!(out[0].error(), Some(&json!("boom")));
        assert_eq!(out[1].id(), Some(&json!(1.5)));
        assert_eq!(out[1].result(), Some(&Value::Null));
        assert_eq!(
            serde_json::to_value(&out[1]).unwrap(),
            json!({"jsonrpc": "2.0", "id": 1.5, "result": null})
        );
        assert_eq!(out[2].id(), Some(&json!(u64::MAX)));
    }

    #[test]
    fn test_many_lines_in_one_chunk() {
        let body = LINE.repeat(500) + "data: {\"id\":";
        let mut decoder = SseDecoder::new();

        assert_eq!(decoder.feed(body.as_bytes()).len(), 500);
        assert_eq!(decoder.pending(), "data: {\"id\":".len());
        assert_eq!(decoder.feed(b"2}\n").len(), 1);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_done_marker_is_not_a_message() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]\n").is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(LINE.trim_end().as_bytes()).is_empty());
        assert!(decoder.finish().is_some());
        assert_eq!(decoder.pending(), 0);
    }

    #[tokio::test]
    async fn test_messages_stream_in_order() {
        let stream = messages(chunked(vec![
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"n\":1}}\ndata: {\"jsonrpc\":",
            "\"2.0\",\"id\":1,\"result\":{\"n\":2}}\n",
            "data: [DONE]\n",
        ]));
        let out: Vec<_> = stream.collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().result(), Some(&json!({"n": 1})));
        assert_eq!(out[1].as_ref().unwrap().result(), Some(&json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_messages_stream_stops_at_chunk_error() {
        let chunks = stream::iter(vec![
            Ok(LINE.as_bytes()),
            Err(ClientError::EmptyStream),
            Ok(LINE.as_bytes()),
        ]);
        let out: Vec<_> = messages(chunks).collect().await;

        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(ClientError::EmptyStream)));
    }

    #[tokio::test]
    async fn test_decode_final_returns_last_and_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let last = decode_final(
            chunked(vec![
                "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"step\":\"a\"}}\n",
                "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"step\":\"b\"}}\n",
                "data: [DONE]\n",
            ]),
            Some(&tx),
        )
        .await
        .unwrap();

        assert_eq!(last.result(), Some(&json!({"step": "b"})));

        let mut steps = Vec::new();
        while let Ok(ExchangeEvent::Message(m)) = rx.try_recv() {
            steps.push(m.result().unwrap()["step"].clone());
        }
        assert_eq!(steps, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_decode_final_done_only_is_empty() {
        let result = decode_final(chunked(vec!["data: [DONE]\n"]), None).await;
        assert!(matches!(result, Err(ClientError::EmptyStream)));
    }

    #[tokio::test]
    async fn test_decode_final_empty_body() {
        let result = decode_final(chunked(vec![]), None).await;
        assert!(matches!(result, Err(ClientError::EmptyStream)));
    }

    #[tokio::test]
    async fn test_decode_final_malformed_then_good() {
        let last = decode_final(chunked(vec!["data: {oops}\n", LINE]), None)
            .await
            .unwrap();
        assert_eq!(last.id(), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_decode_final_error_message_is_final() {
        let last = decode_final(
            chunked(vec![
                "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32000,\"message\":\"boom\"}}\n",
            ]),
            None,
        )
        .await
        .unwrap();

        assert!(!last.is_success());
        assert_eq!(last.error().unwrap()["message"], "boom");
    }

    /// Shared buffer the test subscriber writes into
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_malformed_line_is_logged_as_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let out = tracing::subscriber::with_default(subscriber, || {
            SseDecoder::new().feed(b"data: {broken\n")
        });

        assert!(out.is_empty());
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("WARN"));
        assert!(text.contains("Failed to parse SSE data: {broken"));
    }
}
