//! Trace normalisation for promptlens.
//!
//! The capture log written by the proxy is a JSON-Lines file of
//! [`TraceRecord`]s, one per upstream call. This crate turns a capture log
//! into the derived artifact consumed by the viewer: dialect detection,
//! SSE response reassembly, translation into the canonical message/tool
//! model, content deduplication, and lineage reconstruction.
//!
//! Everything here is synchronous and deterministic: the same capture log
//! always cooks to the same artifact, byte for byte.

pub mod capture;
pub mod cook;
pub mod dialect;
pub mod error;
pub mod lineage;
pub mod record;
pub mod sse;
pub mod translate;

pub use capture::CaptureLog;
pub use cook::{cook_file, cook_records, write_artifact};
pub use error::CookError;
pub use record::{
    Artifact, CookedMessage, CookedRequest, CookedTool, MessageBody, ToolCall, TraceRecord,
};
