//! Property-Based Tests for the MCP Client
//!
//! This module contains property-based tests using proptest to verify invariants
//! hold for random inputs across the protocol types and the SSE decoder.
//!
//! # Test Strategies
//!
//! - **Chunk Boundaries**: decoding must not depend on where the body is split
//! - **Malformed Lines**: bad `data:` lines are skipped without losing good ones
//! - **Request Framing**: ids and params survive serialization
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib mcp::proptests
//! ```

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::mcp::protocol::{McpRequest, McpResponse, RequestId};
use crate::mcp::sse::SseDecoder;

// Helper: Generate arbitrary JSON values
fn arb_json_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
        prop::collection::vec(any::<i64>().prop_map(|n| Value::Number(n.into())), 0..3)
            .prop_map(Value::Array),
    ]
}

// Helper: Generate arbitrary request ids
fn arb_request_id() -> impl Strategy<Value = RequestId> {
    prop_oneof![
        any::<i64>().prop_map(RequestId::Number),
        "[a-zA-Z0-9-]{1,36}".prop_map(RequestId::String),
    ]
}

// Helper: Render responses as an SSE body, one data line each, plus [DONE]
fn sse_body(responses: &[McpResponse]) -> Vec<u8> {
    let mut body = String::new();
    for response in responses {
        body.push_str("data: ");
        body.push_str(&serde_json::to_string(response).unwrap());
        body.push('\n');
    }
    body.push_str("data: [DONE]\n");
    body.into_bytes()
}

// Helper: Split bytes at the given (unsorted, possibly duplicate) offsets
fn split_at_offsets(bytes: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = offsets.iter().map(|o| o % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

fn decode_all(chunks: &[Vec<u8>]) -> Vec<McpResponse> {
    let mut decoder = SseDecoder::new();
    let mut out: Vec<McpResponse> = chunks.iter().flat_map(|c| decoder.feed(c)).collect();
    out.extend(decoder.finish());
    out
}

// ============================================================================
// Property 1: Chunk Boundary Independence
// ============================================================================

proptest! {
    /// The same body decodes to the same messages however it is chunked
    #[test]
    fn prop_chunking_does_not_change_output(
        ids in prop::collection::vec(arb_request_id(), 1..5),
        results in prop::collection::vec(arb_json_value(), 1..5),
        offsets in prop::collection::vec(any::<usize>(), 0..12)
    ) {
        let responses: Vec<McpResponse> = ids
            .into_iter()
            .zip(results)
            .map(|(id, result)| {
                McpResponse::from(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            })
            .collect();
        let body = sse_body(&responses);

        let whole = decode_all(&[body.clone()]);
        let split = decode_all(&split_at_offsets(&body, &offsets));

        prop_assert_eq!(&whole, &responses);
        prop_assert_eq!(split, whole);
    }

    /// A single message split anywhere yields exactly one message
    #[test]
    fn prop_single_line_split_anywhere(cut in 0usize..=44) {
        let line = b"data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n";
        let cut = cut.min(line.len());

        let out = decode_all(&[line[..cut].to_vec(), line[cut..].to_vec()]);
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out[0].id(), Some(&json!(1)));
    }

    /// A missing trailing newline does not lose the last message
    #[test]
    fn prop_unterminated_last_line_is_flushed(n in 1i64..1000) {
        let body = format!("data: {{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":null}}", n);
        let out = decode_all(&[body.into_bytes()]);

        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out[0].id(), Some(&json!(n)));
    }
}

// ============================================================================
// Property 2: Malformed Lines Are Skipped
// ============================================================================

proptest! {
    /// Garbage data lines between good ones never drop the good ones
    #[test]
    fn prop_garbage_lines_skipped(
        garbage in prop::collection::vec("[a-z{}:,]{1,20}", 0..5),
        good in 1i64..100
    ) {
        let mut body = String::new();
        for g in &garbage {
            body.push_str(&format!("data: {{,{}\n", g));
        }
        body.push_str(&format!("data: {}\n", json!({"jsonrpc": "2.0", "id": good, "result": {}})));

        let out = decode_all(&[body.into_bytes()]);
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out[0].id(), Some(&json!(good)));
    }

    /// Lines without the exact `data: ` prefix never produce messages
    #[test]
    fn prop_non_data_lines_ignored(field in "(event|id|retry|:)", value in "[a-z0-9]{0,10}") {
        let body = format!("{}: {}\n\n", field, value);
        prop_assert!(decode_all(&[body.into_bytes()]).is_empty());
    }
}

// ============================================================================
// Property 3: Request Framing
// ============================================================================

proptest! {
    /// Ids and params survive serialization
    #[test]
    fn prop_request_serialization_roundtrip(
        id in arb_request_id(),
        method in "[a-z_/]+",
        params in prop::option::of(arb_json_value().prop_map(|v| json!({"value": v})))
    ) {
        let original = McpRequest::new(id, &method, params);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: McpRequest = serde_json::from_str(&serialized).unwrap();

        prop_assert_eq!(original, deserialized);
    }

    /// Requests are always tagged with jsonrpc 2.0
    #[test]
    fn prop_request_always_tagged(id in any::<i64>(), method in "[a-z_/]+") {
        let value = serde_json::to_value(McpRequest::new(id, method, None)).unwrap();
        prop_assert_eq!(&value["jsonrpc"], "2.0");
        prop_assert!(value.get("params").is_none());
    }
}
