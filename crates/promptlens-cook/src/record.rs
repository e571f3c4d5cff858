//! Capture log records and the cooked (normalised) data model.
//!
//! A [`TraceRecord`] is what the proxy appends per upstream call. The cooked
//! types are what a cook run derives from a set of records: deduplicated
//! messages and tools referenced by id from per-call request entries.
//! References are ids, never pointers: the artifact is a flat document and
//! traversal is by map lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One captured upstream call: the forwarded request body, the upstream
/// response (or raw SSE lines), timing, and an optional error tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub request: Value,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl TraceRecord {
    /// Start a record at request arrival. Response, duration, and error are
    /// filled in when the upstream exchange completes.
    pub fn begin(request: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request,
            response: None,
            duration_ms: 0,
            error: None,
        }
    }

    /// Wrap captured SSE lines in the `{stream: true, sse_lines: [...]}`
    /// response shape.
    pub fn sse_response(lines: Vec<String>) -> Value {
        serde_json::json!({ "stream": true, "sse_lines": lines })
    }
}

/// A normalised message, deduplicated across the whole cook run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookedMessage {
    pub id: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// Role-discriminated message content. Six roles, each with only the fields
/// that role actually carries; the `role` tag is the serde discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageBody {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    ToolUse {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        content: String,
        tool_use_id: String,
        is_error: bool,
    },
    Thinking {
        content: String,
    },
}

/// One tool invocation inside a `tool_use` message. `arguments` is the
/// decoded JSON object, regardless of which dialect produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub id: String,
}

impl MessageBody {
    /// Content hash for deduplication: SHA-256 of the canonical JSON tuple
    /// `(role, content, tool_calls, tool_use_id, is_error)` with unspecified
    /// fields as null, truncated to 16 hex characters.
    pub fn content_hash(&self) -> String {
        let (role, content) = (self.role(), self.content());
        let tool_calls: Option<&Vec<ToolCall>> = match self {
            MessageBody::ToolUse { tool_calls, .. } => Some(tool_calls),
            _ => None,
        };
        let (tool_use_id, is_error) = match self {
            MessageBody::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => (Some(tool_use_id.as_str()), Some(*is_error)),
            _ => (None, None),
        };
        short_hash(&serde_json::json!([
            role,
            content,
            tool_calls,
            tool_use_id,
            is_error
        ]))
    }

    /// The wire-level role string for this variant.
    pub fn role(&self) -> &'static str {
        match self {
            MessageBody::System { .. } => "system",
            MessageBody::User { .. } => "user",
            MessageBody::Assistant { .. } => "assistant",
            MessageBody::ToolUse { .. } => "tool_use",
            MessageBody::ToolResult { .. } => "tool_result",
            MessageBody::Thinking { .. } => "thinking",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            MessageBody::System { content }
            | MessageBody::User { content }
            | MessageBody::Assistant { content }
            | MessageBody::ToolUse { content, .. }
            | MessageBody::ToolResult { content, .. }
            | MessageBody::Thinking { content } => content,
        }
    }
}

/// A normalised tool definition, deduplicated across the whole cook run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookedTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl CookedTool {
    /// Content hash over `(name, description, parameters)`, same scheme as
    /// [`MessageBody::content_hash`].
    pub fn content_hash(name: &str, description: &str, parameters: &Value) -> String {
        short_hash(&serde_json::json!([name, description, parameters]))
    }
}

/// One cooked upstream call. `request_messages` is the ordered prompt
/// prefix; `response_messages` is `[thinking?, main?]`; `tools` is the
/// deduplicated set in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookedRequest {
    pub id: String,
    pub parent_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub request_messages: Vec<String>,
    pub response_messages: Vec<String>,
    pub model: String,
    pub tools: Vec<String>,
    pub duration_ms: u64,
    /// Set when the source record carried an upstream error or could not be
    /// cooked; such slots keep their position but take no part in lineage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The derived document: everything the viewer needs, in one JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub messages: Vec<CookedMessage>,
    pub tools: Vec<CookedTool>,
    pub requests: Vec<CookedRequest>,
}

/// SHA-256 of the serialised value, truncated to 16 hex characters.
///
/// serde_json's default map is ordered by key, so nested objects serialise
/// canonically without extra work.
fn short_hash(value: &Value) -> String {
    let canonical = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = TraceRecord {
            id: "r1".into(),
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            request: serde_json::json!({"model": "gpt-4o", "messages": []}),
            response: Some(serde_json::json!({"choices": []})),
            duration_ms: 42,
            error: None,
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains('\n'));
        let back: TraceRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, "r1");
        assert_eq!(back.duration_ms, 42);
    }

    #[test]
    fn test_message_role_tagging() {
        let msg = CookedMessage {
            id: "m0".into(),
            body: MessageBody::ToolResult {
                content: "4".into(),
                tool_use_id: "call_abc".into(),
                is_error: false,
            },
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["id"], "m0");
        assert_eq!(v["role"], "tool_result");
        assert_eq!(v["tool_use_id"], "call_abc");
        assert_eq!(v["is_error"], false);
        // Role-specific fields stay off the other variants
        let plain = serde_json::to_value(CookedMessage {
            id: "m1".into(),
            body: MessageBody::User {
                content: "hi".into(),
            },
        })
        .unwrap();
        assert!(plain.get("tool_use_id").is_none());
        assert!(plain.get("tool_calls").is_none());
    }

    #[test]
    fn test_hash_equal_for_equal_fields() {
        let a = MessageBody::User {
            content: "What's 2+2?".into(),
        };
        let b = MessageBody::User {
            content: "What's 2+2?".into(),
        };
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 16);
    }

    #[test]
    fn test_hash_differs_across_roles_and_fields() {
        let user = MessageBody::User { content: "x".into() };
        let system = MessageBody::System { content: "x".into() };
        assert_ne!(user.content_hash(), system.content_hash());

        let ok = MessageBody::ToolResult {
            content: "4".into(),
            tool_use_id: "t1".into(),
            is_error: false,
        };
        let err = MessageBody::ToolResult {
            content: "4".into(),
            tool_use_id: "t1".into(),
            is_error: true,
        };
        assert_ne!(ok.content_hash(), err.content_hash());
    }

    #[test]
    fn test_tool_hash_sensitive_to_schema() {
        let schema_a = serde_json::json!({"type": "object", "properties": {"expr": {"type": "string"}}});
        let schema_b = serde_json::json!({"type": "object", "properties": {}});
        let a = CookedTool::content_hash("calc", "", &schema_a);
        let b = CookedTool::content_hash("calc", "", &schema_b);
        assert_ne!(a, b);
        assert_eq!(a, CookedTool::content_hash("calc", "", &schema_a));
    }

    #[test]
    fn test_error_field_omitted_when_none() {
        let req = CookedRequest {
            id: "r1".into(),
            parent_id: None,
            timestamp: 1_700_000_000_000,
            request_messages: vec!["m0".into()],
            response_messages: vec![],
            model: "claude-sonnet-4".into(),
            tools: vec![],
            duration_ms: 10,
            error: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("error").is_none());
        // parent_id stays explicit as null
        assert!(v["parent_id"].is_null());
    }
}
