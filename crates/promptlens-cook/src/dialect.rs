//! Per-record dialect detection.
//!
//! Records are probed as untyped `serde_json::Value` so unknown fields and
//! new content block types never make detection fail.

use serde_json::Value;

use crate::record::TraceRecord;
use crate::sse;

/// The API surface convention a trace record conforms to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAi,
    Claude,
}

const CLAUDE_EVENT_TYPES: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "message_delta",
    "message_stop",
];

const CLAUDE_BLOCK_TYPES: &[&str] = &["tool_use", "tool_result", "thinking"];

/// Detect the dialect of a record. Claude wins if any Claude marker is
/// present; everything else is treated as OpenAI.
pub fn detect(record: &TraceRecord) -> Dialect {
    let claude = stream_has_claude_events(record.response.as_ref())
        || record.request.get("system").is_some_and(Value::is_array)
        || first_tool_has_input_schema(&record.request)
        || any_message_has_claude_block(&record.request);
    if claude {
        Dialect::Claude
    } else {
        Dialect::OpenAi
    }
}

/// Streamed response whose SSE payloads carry Claude event types.
fn stream_has_claude_events(response: Option<&Value>) -> bool {
    let Some(response) = response else {
        return false;
    };
    if response.get("stream").and_then(Value::as_bool) != Some(true) {
        return false;
    }
    let Some(lines) = response.get("sse_lines").and_then(Value::as_array) else {
        return false;
    };
    lines
        .iter()
        .filter_map(Value::as_str)
        .filter_map(sse::data_payload)
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .any(|payload| {
            payload
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| CLAUDE_EVENT_TYPES.contains(&t))
        })
}

/// `request.tools[0].input_schema` is the Claude tool shape.
fn first_tool_has_input_schema(request: &Value) -> bool {
    request
        .get("tools")
        .and_then(Value::as_array)
        .and_then(|tools| tools.first())
        .is_some_and(|tool| tool.get("input_schema").is_some())
}

/// Any request message containing a `tool_use`/`tool_result`/`thinking`
/// content block is Claude-shaped.
fn any_message_has_claude_block(request: &Value) -> bool {
    let Some(messages) = request.get("messages").and_then(Value::as_array) else {
        return false;
    };
    messages
        .iter()
        .filter_map(|msg| msg.get("content").and_then(Value::as_array))
        .flatten()
        .any(|block| {
            block
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| CLAUDE_BLOCK_TYPES.contains(&t))
        })
}
