//! Error types for the capture and cook pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a cook run or a capture append.
///
/// Per-record problems (malformed lines, unknown shapes, reassembly
/// failures) are deliberately *not* represented here: they are diagnostics
/// plus an error-flagged artifact slot, never a hard failure.
#[derive(Debug, Error)]
pub enum CookError {
    #[error("failed to read capture log {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open capture log {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to append to capture log: {0}")]
    Append(#[source] std::io::Error),
}
