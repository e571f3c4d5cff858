//! Upstream forwarding and trace capture.
//!
//! The forward path streams bytes verbatim: no parsing, no transformation.
//! Non-SSE responses are read in full, returned byte-identically, and
//! recorded. SSE responses stream through [`CaptureBody`], which forwards
//! every upstream chunk to the client untouched while splitting a private
//! copy into lines for the trace record; the record is appended when the
//! stream ends on any path (completion, upstream error, or client
//! disconnect).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tracing::Instrument;

use promptlens_cook::record::TraceRecord;
use promptlens_cook::CaptureLog;

use super::stats::ProxyStats;

/// Headers that must not be forwarded in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Forward one client request to the upstream and return the response,
/// appending exactly zero or one trace record: one iff the upstream
/// connection completed (delivered or tagged with an error).
#[allow(clippy::too_many_arguments)]
pub async fn forward(
    client: &reqwest::Client,
    log: &Arc<CaptureLog>,
    stats: &ProxyStats,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: Bytes,
    mut record: TraceRecord,
    started: Instant,
) -> Response {
    let mut req_builder = client.request(method, url).body(body);
    for (name, value) in headers.iter() {
        let name_str = name.as_str().to_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&name_str.as_str()) {
            continue;
        }
        // reqwest recomputes content-length from the actual body
        if name_str == "content-length" {
            continue;
        }
        req_builder = req_builder.header(name, value);
    }

    let forward_span = promptlens_tracing::upstream_forward_span!(&record.id, url);
    let upstream = match req_builder.send().instrument(forward_span).await {
        Ok(resp) => resp,
        Err(e) => {
            record.duration_ms = started.elapsed().as_millis() as u64;
            record.error = Some(if e.is_timeout() {
                "timeout".to_string()
            } else {
                format!("upstream connection error: {e}")
            });
            tracing::error!(error = %e, "Upstream connection failed");
            stats.inc_upstream_errors();
            append_record(log, stats, &record);
            return (StatusCode::BAD_GATEWAY, "upstream connection error").into_response();
        }
    };

    let status = upstream.status();
    tracing::Span::current().record("status", status.as_u16());

    let mut response_builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in upstream.headers().iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str().to_lowercase().as_str()) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    if is_event_stream(upstream.headers()) {
        stats.inc_streamed();
        let tee = CaptureBody::new(
            upstream.bytes_stream(),
            record,
            log.clone(),
            stats.clone(),
            started,
        );
        return response_builder
            .body(Body::from_stream(tee))
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build streaming response");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            });
    }

    // Non-SSE: read the whole body, record it, return it byte-identically.
    match upstream.bytes().await {
        Ok(bytes) => {
            record.duration_ms = started.elapsed().as_millis() as u64;
            record.response = Some(decode_body(&bytes));
            tracing::Span::current().record("latency_ms", record.duration_ms);
            append_record(log, stats, &record);
            response_builder
                .body(Body::from(bytes))
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Failed to build response");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
                })
        }
        Err(e) => {
            record.duration_ms = started.elapsed().as_millis() as u64;
            record.error = Some(if e.is_timeout() {
                "timeout".to_string()
            } else {
                format!("upstream read error: {e}")
            });
            tracing::error!(error = %e, "Upstream body read failed");
            stats.inc_upstream_errors();
            append_record(log, stats, &record);
            (StatusCode::BAD_GATEWAY, "upstream read error").into_response()
        }
    }
}

/// Upstream response is SSE iff Content-Type starts with text/event-stream.
fn is_event_stream(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

/// Decode a captured body: parsed JSON when parseable, else a string.
pub fn decode_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Decode a client request body for the record: JSON when parseable, else
/// raw text with a content-type marker, null when empty.
pub fn decode_request_body(headers: &HeaderMap, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream");
        serde_json::json!({
            "content_type": content_type,
            "raw": String::from_utf8_lossy(bytes),
        })
    })
}

/// Append a fully-built record; a write failure is logged and counted but
/// never affects the client.
fn append_record(log: &CaptureLog, stats: &ProxyStats, record: &TraceRecord) {
    match log.append(record) {
        Ok(()) => stats.inc_records_written(),
        Err(e) => {
            stats.inc_write_failures();
            tracing::error!(error = %e, record = %record.id, "Failed to append trace record");
        }
    }
}

/// Per-line capture state for one in-flight SSE response. Scoped to the
/// body wrapper and consumed exactly once, on whichever exit path ends the
/// stream first.
struct SseCapture {
    record: TraceRecord,
    lines: Vec<String>,
    partial: Vec<u8>,
    log: Arc<CaptureLog>,
    stats: ProxyStats,
    started: Instant,
}

impl SseCapture {
    /// Split a chunk on LF, tolerating CRLF; completed lines are stored
    /// without their terminator, the rest stays buffered.
    fn push_chunk(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                if self.partial.last() == Some(&b'\r') {
                    self.partial.pop();
                }
                self.lines
                    .push(String::from_utf8_lossy(&self.partial).into_owned());
                self.partial.clear();
            } else {
                self.partial.push(byte);
            }
        }
    }

    fn finish(mut self, error: Option<String>) {
        if !self.partial.is_empty() {
            let tail = String::from_utf8_lossy(&self.partial).into_owned();
            self.lines.push(tail);
        }
        self.record.duration_ms = self.started.elapsed().as_millis() as u64;
        if self.record.error.is_none() {
            self.record.error = error;
        }
        self.record.response = Some(TraceRecord::sse_response(std::mem::take(&mut self.lines)));
        append_record(&self.log, &self.stats, &self.record);
    }
}

/// A stream wrapper that passes upstream chunks through unchanged while
/// accumulating the SSE lines for the trace record. Each chunk is handed to
/// the client as soon as it is read; the capture never buffers ahead of
/// the client.
struct CaptureBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    capture: Option<SseCapture>,
}

impl CaptureBody {
    fn new(
        inner: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        record: TraceRecord,
        log: Arc<CaptureLog>,
        stats: ProxyStats,
        started: Instant,
    ) -> Self {
        Self {
            inner: Box::pin(inner),
            capture: Some(SseCapture {
                record,
                lines: Vec::new(),
                partial: Vec::new(),
                log,
                stats,
                started,
            }),
        }
    }
}

impl Stream for CaptureBody {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(capture) = self.capture.as_mut() {
                    capture.push_chunk(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(capture) = self.capture.take() {
                    capture.stats.inc_upstream_errors();
                    let error = if e.is_timeout() {
                        "timeout".to_string()
                    } else {
                        format!("upstream stream error: {e}")
                    };
                    capture.finish(Some(error));
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(capture) = self.capture.take() {
                    capture.finish(None);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        // Client went away before the upstream finished; keep what we have.
        if let Some(capture) = self.capture.take() {
            capture.finish(Some("client disconnected".to_string()));
        }
    }
}
