//! Translation of both dialects into the canonical message/tool model.
//!
//! All parsing works on `serde_json::Value` so unknown fields and new
//! content block types degrade to skipped blocks instead of failed records.
//! Non-text parts (images) are encoded as the literal `[image]` placeholder.

use serde_json::Value;

use crate::record::{MessageBody, ToolCall};

const IMAGE_PLACEHOLDER: &str = "[image]";

/// A normalised tool definition before interning.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Translate an OpenAI chat-completions request into canonical messages, in
/// surface conversation order.
pub fn translate_openai_request(request: &Value) -> Vec<MessageBody> {
    let mut out = Vec::new();
    let Some(messages) = request.get("messages").and_then(Value::as_array) else {
        return out;
    };

    for msg in messages {
        let role = msg.get("role").and_then(Value::as_str).unwrap_or_default();
        match role {
            "system" => out.push(MessageBody::System {
                content: flatten_openai_content(msg.get("content")),
            }),
            "user" => out.push(MessageBody::User {
                content: flatten_openai_content(msg.get("content")),
            }),
            "assistant" => {
                let content = flatten_openai_content(msg.get("content"));
                let tool_calls = openai_tool_calls(msg.get("tool_calls"));
                if tool_calls.is_empty() {
                    out.push(MessageBody::Assistant { content });
                } else {
                    out.push(MessageBody::ToolUse {
                        content,
                        tool_calls,
                    });
                }
            }
            "tool" => out.push(MessageBody::ToolResult {
                content: flatten_openai_content(msg.get("content")),
                tool_use_id: msg
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_error: false,
            }),
            other => {
                tracing::warn!(role = other, "Skipping message with unknown OpenAI role");
            }
        }
    }
    out
}

/// Translate a Claude messages request into canonical messages: the
/// request-level `system` prompt (string or block list) is prepended, then
/// each message's blocks are emitted preserving block order.
pub fn translate_claude_request(request: &Value) -> Vec<MessageBody> {
    let mut out = Vec::new();

    match request.get("system") {
        Some(Value::String(text)) => out.push(MessageBody::System {
            content: text.clone(),
        }),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    out.push(MessageBody::System {
                        content: text.to_string(),
                    });
                }
            }
        }
        _ => {}
    }

    let Some(messages) = request.get("messages").and_then(Value::as_array) else {
        return out;
    };

    for msg in messages {
        let role = msg.get("role").and_then(Value::as_str).unwrap_or_default();
        match (role, msg.get("content")) {
            ("user", Some(Value::String(text))) => out.push(MessageBody::User {
                content: text.clone(),
            }),
            ("user", Some(Value::Array(blocks))) => translate_claude_user_blocks(blocks, &mut out),
            ("assistant", Some(Value::String(text))) => out.push(MessageBody::Assistant {
                content: text.clone(),
            }),
            ("assistant", Some(Value::Array(blocks))) => {
                translate_claude_assistant_blocks(blocks, &mut out)
            }
            (other, _) => {
                tracing::warn!(role = other, "Skipping message with unknown Claude role");
            }
        }
    }
    out
}

/// User-role content blocks: text (and `[image]` placeholders) accumulate
/// into user messages, flushed around each `tool_result` block so block
/// order is preserved.
fn translate_claude_user_blocks(blocks: &[Value], out: &mut Vec<MessageBody>) {
    let mut text_parts: Vec<String> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(text.to_string());
                }
            }
            Some("image") => text_parts.push(IMAGE_PLACEHOLDER.to_string()),
            Some("tool_result") => {
                if !text_parts.is_empty() {
                    out.push(MessageBody::User {
                        content: text_parts.join(""),
                    });
                    text_parts.clear();
                }
                out.push(MessageBody::ToolResult {
                    content: flatten_tool_result_content(block.get("content")),
                    tool_use_id: block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    is_error: block
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
            _ => {}
        }
    }

    if !text_parts.is_empty() {
        out.push(MessageBody::User {
            content: text_parts.join(""),
        });
    }
}

/// Assistant-role content blocks: one `assistant` message per text block,
/// one `thinking` message per thinking block (block order preserved), and a
/// single `tool_use` message aggregating every tool_use block of the turn,
/// emitted after the turn's other messages.
fn translate_claude_assistant_blocks(blocks: &[Value], out: &mut Vec<MessageBody>) {
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    out.push(MessageBody::Assistant {
                        content: text.to_string(),
                    });
                }
            }
            Some("thinking") => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    out.push(MessageBody::Thinking {
                        content: text.to_string(),
                    });
                }
            }
            Some("tool_use") => tool_calls.push(claude_tool_call(block)),
            Some("image") => out.push(MessageBody::Assistant {
                content: IMAGE_PLACEHOLDER.to_string(),
            }),
            _ => {}
        }
    }

    if !tool_calls.is_empty() {
        out.push(MessageBody::ToolUse {
            content: String::new(),
            tool_calls,
        });
    }
}

/// Translate a (possibly reassembled) OpenAI response body. At most one
/// message: `tool_use` if the assistant called tools, else `assistant`.
pub fn translate_openai_response(response: &Value) -> Vec<MessageBody> {
    let Some(message) = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
    else {
        return Vec::new();
    };

    let content = flatten_openai_content(message.get("content"));
    let tool_calls = openai_tool_calls(message.get("tool_calls"));
    if tool_calls.is_empty() {
        vec![MessageBody::Assistant { content }]
    } else {
        vec![MessageBody::ToolUse {
            content,
            tool_calls,
        }]
    }
}

/// Translate a (possibly reassembled) Claude response body into
/// `[thinking?, main]`: thinking blocks concatenate into one message, and
/// the main message is a `tool_use` aggregate when any tool_use block is
/// present, else an `assistant` message with the text blocks concatenated.
pub fn translate_claude_response(response: &Value) -> Vec<MessageBody> {
    let Some(blocks) = response.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut thinking_parts: Vec<String> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(text.to_string());
                }
            }
            Some("thinking") => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    thinking_parts.push(text.to_string());
                }
            }
            Some("tool_use") => tool_calls.push(claude_tool_call(block)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    if !thinking_parts.is_empty() {
        out.push(MessageBody::Thinking {
            content: thinking_parts.join("\n"),
        });
    }
    if !tool_calls.is_empty() {
        out.push(MessageBody::ToolUse {
            content: text_parts.join(""),
            tool_calls,
        });
    } else if !text_parts.is_empty() || !blocks.is_empty() {
        out.push(MessageBody::Assistant {
            content: text_parts.join(""),
        });
    }
    out
}

/// Normalise the request's tool declarations. OpenAI
/// `{function: {name, description, parameters}}` and Claude
/// `{name, description, input_schema}` both come out as
/// `{name, description, parameters}`; a missing description is empty.
pub fn translate_tools(request: &Value) -> Vec<ToolDef> {
    let Some(tools) = request.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };

    tools
        .iter()
        .filter_map(|tool| {
            if let Some(function) = tool.get("function") {
                Some(ToolDef {
                    name: function
                        .get("name")
                        .and_then(Value::as_str)?
                        .to_string(),
                    description: function
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    parameters: function
                        .get("parameters")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({})),
                })
            } else {
                Some(ToolDef {
                    name: tool.get("name").and_then(Value::as_str)?.to_string(),
                    description: tool
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    parameters: tool
                        .get("input_schema")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({})),
                })
            }
        })
        .collect()
}

/// OpenAI message content: a plain string, or a multimodal part list whose
/// text parts concatenate and whose image parts become `[image]`.
fn flatten_openai_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => {
            let mut buf = String::new();
            for part in parts {
                match part.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            buf.push_str(text);
                        }
                    }
                    Some("image_url") | Some("image") | Some("input_image") => {
                        buf.push_str(IMAGE_PLACEHOLDER)
                    }
                    _ => {}
                }
            }
            buf
        }
        _ => String::new(),
    }
}

/// `tool_result` content: a plain string or a block list (text blocks
/// concatenated, images as `[image]`).
fn flatten_tool_result_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => {
            let mut buf = String::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            buf.push_str(text);
                        }
                    }
                    Some("image") => buf.push_str(IMAGE_PLACEHOLDER),
                    _ => {}
                }
            }
            buf
        }
        _ => String::new(),
    }
}

/// OpenAI tool_calls: `function.arguments` is a JSON-encoded string; decode
/// it, falling back to the raw string when it does not parse.
fn openai_tool_calls(tool_calls: Option<&Value>) -> Vec<ToolCall> {
    let Some(calls) = tool_calls.and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|tc| {
            let function = tc.get("function")?;
            let raw_args = function
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let arguments = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::String(raw_args.to_string()));
            Some(ToolCall {
                name: function
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments,
                id: tc
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

fn claude_tool_call(block: &Value) -> ToolCall {
    ToolCall {
        name: block
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        arguments: block.get("input").cloned().unwrap_or_else(|| serde_json::json!({})),
        id: block
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}
