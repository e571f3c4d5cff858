//! The cook run: capture log in, derived artifact out.
//!
//! A run owns the two hash→id maps that deduplicate messages and tools
//! across every record; ids (`m{N}`, `t{N}`) are assigned in first-seen
//! order by a monotone counter, which keeps artifacts diff-friendly and
//! makes cooking the same log twice produce byte-identical output.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::capture;
use crate::dialect::{self, Dialect};
use crate::error::CookError;
use crate::lineage;
use crate::record::{Artifact, CookedMessage, CookedRequest, CookedTool, MessageBody, TraceRecord};
use crate::sse;
use crate::translate::{self, ToolDef};

/// Accumulates deduplicated messages and tools across one cook run.
#[derive(Default)]
pub struct Cooker {
    messages: Vec<CookedMessage>,
    message_ids: HashMap<String, String>,
    tools: Vec<CookedTool>,
    tool_ids: HashMap<String, String>,
}

impl Cooker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a message, returning its artifact id. The first occurrence of
    /// a given normalised content assigns the next `m{N}`; later
    /// occurrences reuse it.
    fn intern_message(&mut self, body: MessageBody) -> String {
        let hash = body.content_hash();
        if let Some(id) = self.message_ids.get(&hash) {
            return id.clone();
        }
        let id = format!("m{}", self.messages.len());
        self.message_ids.insert(hash, id.clone());
        self.messages.push(CookedMessage {
            id: id.clone(),
            body,
        });
        id
    }

    fn intern_tool(&mut self, def: ToolDef) -> String {
        let hash = CookedTool::content_hash(&def.name, &def.description, &def.parameters);
        if let Some(id) = self.tool_ids.get(&hash) {
            return id.clone();
        }
        let id = format!("t{}", self.tools.len());
        self.tool_ids.insert(hash, id.clone());
        self.tools.push(CookedTool {
            id: id.clone(),
            name: def.name,
            description: def.description,
            parameters: def.parameters,
        });
        id
    }

    /// Normalise one record into its artifact slot. Never fails: problems
    /// become a diagnostic plus the slot's `error` flag.
    pub fn cook_record(&mut self, record: &TraceRecord) -> CookedRequest {
        let dialect = dialect::detect(record);
        let mut slot_error = record.error.clone();

        // Streamed responses are reassembled; structured ones pass through.
        let response = match &record.response {
            Some(v) if v.get("stream").and_then(Value::as_bool) == Some(true) => {
                let lines: Vec<String> = v
                    .get("sse_lines")
                    .and_then(Value::as_array)
                    .map(|lines| {
                        lines
                            .iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                let reassembled = match dialect {
                    Dialect::Claude => sse::reassemble_claude(&lines),
                    Dialect::OpenAi => sse::reassemble_openai(&lines),
                };
                match reassembled {
                    Ok(body) => Some(body),
                    Err(e) => {
                        tracing::warn!(record = %record.id, error = %e, "SSE reassembly failed");
                        if slot_error.is_none() {
                            slot_error = Some(format!("sse reassembly failed: {e}"));
                        }
                        None
                    }
                }
            }
            other => other.clone(),
        };

        if !record.request.is_object() || record.request.get("messages").is_none() {
            tracing::warn!(record = %record.id, "Request body has no message list");
            if slot_error.is_none() {
                slot_error = Some("unrecognised request shape".to_string());
            }
        }

        let request_bodies = match dialect {
            Dialect::OpenAi => translate::translate_openai_request(&record.request),
            Dialect::Claude => translate::translate_claude_request(&record.request),
        };
        let response_bodies = response
            .as_ref()
            .map(|body| match dialect {
                Dialect::OpenAi => translate::translate_openai_response(body),
                Dialect::Claude => translate::translate_claude_response(body),
            })
            .unwrap_or_default();

        let model = extract_model(&record.request, response.as_ref());

        let request_messages: Vec<String> = request_bodies
            .into_iter()
            .map(|body| self.intern_message(body))
            .collect();
        let response_messages: Vec<String> = response_bodies
            .into_iter()
            .map(|body| self.intern_message(body))
            .collect();

        let mut seen = HashSet::new();
        let tools: Vec<String> = translate::translate_tools(&record.request)
            .into_iter()
            .map(|def| self.intern_tool(def))
            .filter(|id| seen.insert(id.clone()))
            .collect();

        CookedRequest {
            id: record.id.clone(),
            parent_id: None,
            timestamp: record.timestamp.timestamp_millis(),
            request_messages,
            response_messages,
            model,
            tools,
            duration_ms: record.duration_ms,
            error: slot_error,
        }
    }

    pub fn finish(self, requests: Vec<CookedRequest>) -> Artifact {
        Artifact {
            messages: self.messages,
            tools: self.tools,
            requests,
        }
    }
}

/// Cook an in-memory record list: normalise every record, then reconstruct
/// lineage over the result.
pub fn cook_records(records: &[TraceRecord]) -> Artifact {
    let mut cooker = Cooker::new();
    let mut requests: Vec<CookedRequest> = records
        .iter()
        .map(|record| cooker.cook_record(record))
        .collect();
    lineage::assign_parents(&mut requests);
    cooker.finish(requests)
}

/// Cook a capture log file and atomically replace the output artifact.
pub fn cook_file(input: &Path, output: &Path) -> Result<Artifact, CookError> {
    let (records, skipped) = capture::read_records(input)?;
    if skipped > 0 {
        tracing::warn!(skipped, "Capture log contained unparseable lines");
    }
    let artifact = cook_records(&records);
    write_artifact(&artifact, output)?;
    tracing::info!(
        records = records.len(),
        messages = artifact.messages.len(),
        tools = artifact.tools.len(),
        "Cooked capture log"
    );
    Ok(artifact)
}

/// Write the artifact as a single atomic replacement: serialise to a
/// sibling temp file, then rename over the target.
pub fn write_artifact(artifact: &Artifact, path: &Path) -> Result<(), CookError> {
    let json = serde_json::to_vec_pretty(artifact)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let write_err = |source: std::io::Error| CookError::WriteArtifact {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, &json).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

/// The model string for a cooked request: the upstream's report when the
/// response carries one, else the request's.
fn extract_model(request: &Value, response: Option<&Value>) -> String {
    response
        .and_then(|r| r.get("model"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| request.get("model").and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(id: &str, secs: i64, request: Value, response: Option<Value>) -> TraceRecord {
        TraceRecord {
            id: id.into(),
            timestamp: chrono::Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap(),
            request,
            response,
            duration_ms: 5,
            error: None,
        }
    }

    fn openai_tool_round_trip() -> Value {
        serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "Be helpful"},
                {"role": "user", "content": "What's 2+2?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_abc", "type": "function",
                     "function": {"name": "calc", "arguments": "{\"expr\":\"2+2\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_abc", "content": "4"}
            ],
            "tools": [{"type": "function", "function": {
                "name": "calc", "description": "Evaluate arithmetic",
                "parameters": {"type": "object", "properties": {"expr": {"type": "string"}}}
            }}]
        })
    }

    #[test]
    fn test_openai_round_trip_assignment_order() {
        let record = record_at(
            "r1",
            0,
            openai_tool_round_trip(),
            Some(serde_json::json!({
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "2+2 is 4."}}]
            })),
        );
        let artifact = cook_records(&[record]);

        let roles: Vec<&str> = artifact
            .messages
            .iter()
            .map(|m| m.body.role())
            .collect();
        assert_eq!(
            roles,
            vec!["system", "user", "tool_use", "tool_result", "assistant"]
        );
        assert_eq!(artifact.messages[0].id, "m0");
        assert_eq!(artifact.messages[0].body.content(), "Be helpful");
        assert_eq!(artifact.messages[2].id, "m2");
        assert_eq!(artifact.messages[3].body.content(), "4");

        let request = &artifact.requests[0];
        assert_eq!(request.request_messages, vec!["m0", "m1", "m2", "m3"]);
        assert_eq!(request.response_messages, vec!["m4"]);
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.tools, vec!["t0"]);
        assert_eq!(artifact.tools[0].name, "calc");
    }

    #[test]
    fn test_dedup_across_records() {
        let first = record_at(
            "r1",
            0,
            openai_tool_round_trip(),
            Some(serde_json::json!({
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "4."}}]
            })),
        );
        // Second call repeats the whole prefix plus the first answer.
        let mut followup = openai_tool_round_trip();
        followup["messages"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"role": "assistant", "content": "4."}));
        followup["messages"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"role": "user", "content": "And 3+3?"}));
        let second = record_at("r2", 10, followup, None);

        let artifact = cook_records(&[first, second]);
        // Shared prefix messages and the tool interned exactly once.
        assert_eq!(artifact.tools.len(), 1);
        let r1 = &artifact.requests[0];
        let r2 = &artifact.requests[1];
        assert_eq!(&r2.request_messages[..4], &r1.request_messages[..]);
        assert_eq!(r2.request_messages[4], r1.response_messages[0]);
        // Only the new user turn is a fresh id.
        assert_eq!(artifact.messages.len(), 6);
    }

    #[test]
    fn test_claude_streamed_record_cooks_end_to_end() {
        let request = serde_json::json!({
            "model": "claude-sonnet-4",
            "system": "Be helpful",
            "stream": true,
            "messages": [{"role": "user", "content": "What's 2+2?"}],
            "tools": [{"name": "calc", "input_schema": {"type": "object"}}]
        });
        let response = TraceRecord::sse_response(vec![
            "event: message_start".into(),
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4\",\"role\":\"assistant\"}}".into(),
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}".into(),
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Simple math question\"}}".into(),
            "data: {\"type\":\"content_block_stop\",\"index\":0}".into(),
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"call_1\",\"name\":\"calc\"}}".into(),
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"expr\\\":\\\"2+2\\\"}\"}}".into(),
            "data: {\"type\":\"content_block_stop\",\"index\":1}".into(),
            "data: {\"type\":\"message_stop\"}".into(),
        ]);
        let record = record_at("r1", 0, request, Some(response));

        let artifact = cook_records(&[record]);
        let request = &artifact.requests[0];
        assert!(request.error.is_none());
        assert_eq!(request.model, "claude-sonnet-4");
        assert_eq!(request.request_messages, vec!["m0", "m1"]);
        // thinking first, then the tool_use main message
        assert_eq!(request.response_messages.len(), 2);
        let thinking = &artifact.messages[2];
        assert_eq!(thinking.body.role(), "thinking");
        assert_eq!(thinking.body.content(), "Simple math question");
        let main = &artifact.messages[3];
        assert_eq!(main.body.role(), "tool_use");
    }

    #[test]
    fn test_cook_is_deterministic() {
        let records = vec![
            record_at(
                "r1",
                0,
                openai_tool_round_trip(),
                Some(serde_json::json!({
                    "model": "gpt-4o",
                    "choices": [{"message": {"role": "assistant", "content": "4."}}]
                })),
            ),
            record_at("r2", 5, openai_tool_round_trip(), None),
        ];
        let a = serde_json::to_vec(&cook_records(&records)).unwrap();
        let b = serde_json::to_vec(&cook_records(&records)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_upstream_error_record_keeps_its_slot() {
        let mut record = record_at(
            "r1",
            0,
            serde_json::json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
            None,
        );
        record.error = Some("upstream connection error".into());
        let artifact = cook_records(&[record]);
        let slot = &artifact.requests[0];
        assert_eq!(slot.error.as_deref(), Some("upstream connection error"));
        assert_eq!(slot.request_messages, vec!["m0"]);
        assert!(slot.response_messages.is_empty());
    }

    #[test]
    fn test_unrecognised_request_is_flagged_not_fatal() {
        let record = record_at(
            "r1",
            0,
            serde_json::json!({"content_type": "text/plain", "raw": "not an API call"}),
            None,
        );
        let artifact = cook_records(&[record]);
        assert_eq!(artifact.requests.len(), 1);
        assert!(artifact.requests[0].error.is_some());
    }

    #[test]
    fn test_cook_file_atomically_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("capture.jsonl");
        let output = dir.path().join("capture.cooked.json");

        let log = capture::CaptureLog::open(&input).unwrap();
        log.append(&record_at(
            "r1",
            0,
            serde_json::json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
            Some(serde_json::json!({"model": "m", "choices": [{"message": {"role": "assistant", "content": "hello"}}]})),
        ))
        .unwrap();

        let first = cook_file(&input, &output).unwrap();
        assert!(output.exists());
        let second = cook_file(&input, &output).unwrap();
        assert_eq!(first, second);

        let on_disk: Artifact =
            serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(on_disk, second);
    }
}
