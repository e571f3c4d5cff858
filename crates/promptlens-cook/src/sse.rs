//! Reassembly of captured SSE line sequences into complete response bodies.
//!
//! The proxy stores every raw line (`data:`, `event:`, comments, blank
//! separators) verbatim; classification happens here. Both reassemblers
//! drive off the `data:` payloads alone, since Claude repeats the event
//! type inside each payload and the `event:` lines are redundant.
//!
//! Individual unparseable data lines are tolerated with a diagnostic; a
//! stream with no parseable payload at all is a reassembly failure and the
//! record's artifact slot gets flagged instead.

use std::collections::BTreeMap;

use serde_json::{json, Value};

/// Extract the payload of a `data:` line, if this is one.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Reassemble an OpenAI chat-completions stream.
///
/// `choices[0].delta.content` concatenates in arrival order; `tool_calls`
/// deltas merge per their numeric `index` with `function.arguments`
/// string-concatenated; `id` and `model` come from the first chunk that
/// supplies them. The output conforms to the non-streaming shape.
pub fn reassemble_openai(lines: &[String]) -> Result<Value, String> {
    let mut id: Option<String> = None;
    let mut model: Option<String> = None;
    let mut role: Option<String> = None;
    let mut content: Option<String> = None;
    let mut tool_calls: BTreeMap<u64, ToolCallAcc> = BTreeMap::new();
    let mut parsed = 0usize;

    for line in lines {
        let Some(data) = data_payload(line) else {
            continue;
        };
        if data == "[DONE]" || data.is_empty() {
            continue;
        }
        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable OpenAI SSE data line");
                continue;
            }
        };
        parsed += 1;

        if id.is_none() {
            id = chunk.get("id").and_then(Value::as_str).map(String::from);
        }
        if model.is_none() {
            model = chunk.get("model").and_then(Value::as_str).map(String::from);
        }

        let Some(delta) = chunk
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
        else {
            continue;
        };
        if role.is_none() {
            role = delta.get("role").and_then(Value::as_str).map(String::from);
        }
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            content.get_or_insert_with(String::new).push_str(text);
        }
        if let Some(deltas) = delta.get("tool_calls").and_then(Value::as_array) {
            for tc in deltas {
                let index = tc.get("index").and_then(Value::as_u64).unwrap_or(0);
                let acc = tool_calls.entry(index).or_default();
                if acc.id.is_none() {
                    acc.id = tc.get("id").and_then(Value::as_str).map(String::from);
                }
                if let Some(function) = tc.get("function") {
                    if acc.name.is_none() {
                        acc.name = function.get("name").and_then(Value::as_str).map(String::from);
                    }
                    if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                        acc.arguments.push_str(args);
                    }
                }
            }
        }
    }

    if parsed == 0 {
        return Err("no parseable SSE data lines".to_string());
    }

    let tool_calls_out = if tool_calls.is_empty() {
        Value::Null
    } else {
        Value::Array(
            tool_calls
                .into_values()
                .map(|acc| {
                    json!({
                        "id": acc.id,
                        "type": "function",
                        "function": {
                            "name": acc.name,
                            "arguments": acc.arguments,
                        }
                    })
                })
                .collect(),
        )
    };

    Ok(json!({
        "id": id,
        "model": model,
        "choices": [{
            "message": {
                "role": role.unwrap_or_else(|| "assistant".to_string()),
                "content": content,
                "tool_calls": tool_calls_out,
            }
        }]
    }))
}

#[derive(Default)]
struct ToolCallAcc {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassemble a Claude messages stream.
///
/// A small state machine keyed by `content_block_start`'s `index`:
/// `text_delta` appends to `text`, `thinking_delta` to `thinking`, and
/// `input_json_delta.partial_json` accumulates the JSON-encoded tool input,
/// parsed when the block stops. `message_start` yields `id`/`model`/`role`;
/// `message_delta` yields `stop_reason`. The output mirrors the
/// non-streaming Claude response shape.
pub fn reassemble_claude(lines: &[String]) -> Result<Value, String> {
    let mut id: Option<String> = None;
    let mut model: Option<String> = None;
    let mut role: Option<String> = None;
    let mut stop_reason: Option<String> = None;
    let mut blocks: BTreeMap<u64, BlockAcc> = BTreeMap::new();
    let mut parsed = 0usize;

    for line in lines {
        let Some(data) = data_payload(line) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable Claude SSE data line");
                continue;
            }
        };
        parsed += 1;

        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(message) = event.get("message") {
                    id = message.get("id").and_then(Value::as_str).map(String::from);
                    model = message.get("model").and_then(Value::as_str).map(String::from);
                    role = message.get("role").and_then(Value::as_str).map(String::from);
                }
            }
            Some("content_block_start") => {
                let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
                if let Some(cb) = event.get("content_block") {
                    let kind = cb
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("text")
                        .to_string();
                    blocks.insert(
                        index,
                        BlockAcc {
                            kind,
                            id: cb.get("id").and_then(Value::as_str).map(String::from),
                            name: cb.get("name").and_then(Value::as_str).map(String::from),
                            text: cb
                                .get("text")
                                .or_else(|| cb.get("thinking"))
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            partial_json: String::new(),
                        },
                    );
                }
            }
            Some("content_block_delta") => {
                let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
                let Some(block) = blocks.get_mut(&index) else {
                    continue;
                };
                match event
                    .get("delta")
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                {
                    Some("text_delta") => {
                        if let Some(t) = event
                            .get("delta")
                            .and_then(|d| d.get("text"))
                            .and_then(Value::as_str)
                        {
                            block.text.push_str(t);
                        }
                    }
                    Some("thinking_delta") => {
                        if let Some(t) = event
                            .get("delta")
                            .and_then(|d| d.get("thinking"))
                            .and_then(Value::as_str)
                        {
                            block.text.push_str(t);
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(pj) = event
                            .get("delta")
                            .and_then(|d| d.get("partial_json"))
                            .and_then(Value::as_str)
                        {
                            block.partial_json.push_str(pj);
                        }
                    }
                    _ => {}
                }
            }
            Some("message_delta") => {
                if let Some(sr) = event
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    stop_reason = Some(sr.to_string());
                }
            }
            // content_block_stop carries no payload we need; blocks are
            // finalised below so truncated streams still reassemble.
            _ => {}
        }
    }

    if parsed == 0 {
        return Err("no parseable SSE data lines".to_string());
    }

    let content: Vec<Value> = blocks.into_values().map(BlockAcc::finish).collect();

    Ok(json!({
        "id": id,
        "model": model,
        "role": role.unwrap_or_else(|| "assistant".to_string()),
        "content": content,
        "stop_reason": stop_reason,
    }))
}

struct BlockAcc {
    kind: String,
    id: Option<String>,
    name: Option<String>,
    text: String,
    partial_json: String,
}

impl BlockAcc {
    fn finish(self) -> Value {
        match self.kind.as_str() {
            "tool_use" => {
                let input = if self.partial_json.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&self.partial_json).unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Tool input JSON did not reassemble cleanly");
                        json!({})
                    })
                };
                json!({
                    "type": "tool_use",
                    "id": self.id,
                    "name": self.name,
                    "input": input,
                })
            }
            "thinking" => json!({ "type": "thinking", "thinking": self.text }),
            _ => json!({ "type": "text", "text": self.text }),
        }
    }
}
