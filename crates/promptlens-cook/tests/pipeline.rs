//! Whole-pipeline test: a capture log of a realistic mixed session cooks
//! into an artifact whose ids resolve, whose content is deduplicated, and
//! whose lineage forms the expected forest.

use chrono::TimeZone;
use serde_json::{json, Value};

use promptlens_cook::capture::CaptureLog;
use promptlens_cook::record::TraceRecord;
use promptlens_cook::{cook_file, Artifact, MessageBody};

fn record(id: &str, secs: i64, request: Value, response: Option<Value>) -> TraceRecord {
    TraceRecord {
        id: id.into(),
        timestamp: chrono::Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap(),
        request,
        response,
        duration_ms: 120,
        error: None,
    }
}

fn openai_request(messages: Value) -> Value {
    json!({
        "model": "gpt-4o",
        "messages": messages,
        "tools": [{"type": "function", "function": {
            "name": "calc",
            "description": "Evaluate arithmetic",
            "parameters": {"type": "object", "properties": {"expr": {"type": "string"}}}
        }}]
    })
}

fn openai_response(content: &str) -> Value {
    json!({
        "model": "gpt-4o",
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

#[test]
fn test_mixed_session_cooks_into_a_consistent_forest() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.jsonl");
    let output = dir.path().join("capture.cooked.json");
    let log = CaptureLog::open(&input).unwrap();

    // An OpenAI conversation that grows turn by turn.
    let base = json!([
        {"role": "system", "content": "Be helpful"},
        {"role": "user", "content": "What's 2+2?"}
    ]);
    log.append(&record("c1", 0, openai_request(base.clone()), Some(openai_response("4."))))
        .unwrap();

    let mut turn2 = base.as_array().unwrap().clone();
    turn2.push(json!({"role": "assistant", "content": "4."}));
    turn2.push(json!({"role": "user", "content": "And 3+3?"}));
    log.append(&record(
        "c2",
        10,
        openai_request(Value::Array(turn2.clone())),
        Some(openai_response("6.")),
    ))
    .unwrap();

    let mut turn3 = turn2.clone();
    turn3.push(json!({"role": "assistant", "content": "6."}));
    turn3.push(json!({"role": "user", "content": "Now multiply them."}));
    log.append(&record(
        "c3",
        20,
        openai_request(Value::Array(turn3)),
        Some(openai_response("24.")),
    ))
    .unwrap();

    // An unrelated Claude call sharing the log: different model, streamed.
    let claude_request = json!({
        "model": "claude-sonnet-4",
        "system": "Be helpful",
        "stream": true,
        "messages": [{"role": "user", "content": "What's 2+2?"}]
    });
    let claude_response = TraceRecord::sse_response(vec![
        "event: message_start".into(),
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4\",\"role\":\"assistant\"}}".into(),
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}".into(),
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"It is 4.\"}}".into(),
        "data: {\"type\":\"message_stop\"}".into(),
        "".into(),
    ]);
    log.append(&record("c4", 30, claude_request, Some(claude_response)))
        .unwrap();

    let artifact = cook_file(&input, &output).unwrap();

    // Lineage: the OpenAI chain links linearly; the Claude call roots.
    let parents: Vec<(&str, Option<&str>)> = artifact
        .requests
        .iter()
        .map(|r| (r.id.as_str(), r.parent_id.as_deref()))
        .collect();
    assert_eq!(
        parents,
        vec![
            ("c1", None),
            ("c2", Some("c1")),
            ("c3", Some("c2")),
            ("c4", None),
        ]
    );

    // Every id referenced by a request resolves inside the artifact.
    let message_ids: std::collections::HashSet<&str> =
        artifact.messages.iter().map(|m| m.id.as_str()).collect();
    let tool_ids: std::collections::HashSet<&str> =
        artifact.tools.iter().map(|t| t.id.as_str()).collect();
    for request in &artifact.requests {
        for id in request
            .request_messages
            .iter()
            .chain(request.response_messages.iter())
        {
            assert!(message_ids.contains(id.as_str()), "unresolved message {id}");
        }
        for id in &request.tools {
            assert!(tool_ids.contains(id.as_str()), "unresolved tool {id}");
        }
    }

    // Dedup: "Be helpful" and "What's 2+2?" appear once each even though
    // both dialects used them; the calc tool interned once.
    let helpful: Vec<&MessageBody> = artifact
        .messages
        .iter()
        .map(|m| &m.body)
        .filter(|b| b.content() == "Be helpful")
        .collect();
    assert_eq!(helpful.len(), 1);
    assert_eq!(artifact.tools.len(), 1);
    let c1 = &artifact.requests[0];
    let c4 = &artifact.requests[3];
    assert_eq!(c1.request_messages, c4.request_messages);

    // The artifact on disk is what cook returned, and a re-cook is
    // byte-identical.
    let first = std::fs::read(&output).unwrap();
    let parsed: Artifact = serde_json::from_slice(&first).unwrap();
    assert_eq!(parsed, artifact);
    cook_file(&input, &output).unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), first);
}
