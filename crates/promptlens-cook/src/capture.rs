//! Append-only JSON-Lines capture log.
//!
//! Writes: the record is serialised in full first, then appended as a single
//! `write_all` under the process-local lock, so concurrent in-flight requests
//! can never interleave bytes within a line. The lock guards nothing but the
//! append itself.
//!
//! Reads: top-to-bottom scan; a line that fails to parse is skipped with a
//! diagnostic. One corrupt line never aborts a cook run.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CookError;
use crate::record::TraceRecord;

/// Exclusive-append handle to a capture log file.
pub struct CaptureLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CaptureLog {
    /// Open (creating if needed) a capture log for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CookError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CookError::OpenLog {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single `\n`-terminated JSON line.
    pub fn append(&self, record: &TraceRecord) -> Result<(), CookError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(&line).map_err(CookError::Append)?;
        file.flush().map_err(CookError::Append)
    }
}

/// Read every parseable record from a capture log, in file order.
///
/// Returns the records plus the number of skipped lines; skipped lines are
/// logged with their line number.
pub fn read_records(path: impl AsRef<Path>) -> Result<(Vec<TraceRecord>, usize), CookError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CookError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CookError::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TraceRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(line = lineno + 1, error = %e, "Skipping malformed capture line");
            }
        }
    }
    Ok((records, skipped))
}
