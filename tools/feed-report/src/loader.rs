//! Log Loader — reads connector log directories into raw records
//!
//! Features:
//! - Non-recursive directory scan, files taken in name order
//! - One JSON object per line, decoded into `RawRecord`
//! - Undecodable lines logged and skipped
//! - Compressed archives (`.gz`) and other extensions skipped with a warning

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use feed_analyzer::RawRecord;
use thiserror::Error;
use tracing::{error, info, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Log directory does not exist: {0}")]
    MissingDirectory(PathBuf),
}

// ── Load summary ────────────────────────────────────────────────────

/// Records read from a directory, plus what was passed over.
#[derive(Debug, Clone, Default)]
pub struct LoadedLogs {
    pub records: Vec<RawRecord>,
    pub files_read: usize,
    pub files_skipped: usize,
    pub bad_lines: usize,
}

// ── Loader ──────────────────────────────────────────────────────────

const LOG_EXTENSION: &str = "log";

/// Read every `.log` file directly inside `dir`.
pub fn load_dir(dir: &Path) -> Result<LoadedLogs, LoaderError> {
    if !dir.is_dir() {
        error!(dir = %dir.display(), "Log directory does not exist");
        return Err(LoaderError::MissingDirectory(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut loaded = LoadedLogs::default();
    for path in paths {
        let is_log = path
            .extension()
            .map_or(false, |ext| ext == LOG_EXTENSION);
        if !is_log {
            warn!(file = %path.display(), "Skipping unsupported file format");
            loaded.files_skipped += 1;
            continue;
        }

        let before = loaded.records.len();
        loaded.bad_lines += read_file(&path, &mut loaded.records)?;
        loaded.files_read += 1;
        info!(
            file = %path.display(),
            records = loaded.records.len() - before,
            "Loaded log file"
        );
    }

    info!(
        files = loaded.files_read,
        skipped = loaded.files_skipped,
        records = loaded.records.len(),
        bad_lines = loaded.bad_lines,
        "Log loading complete"
    );
    Ok(loaded)
}

/// Append the records of one file; returns the number of bad lines.
fn read_file(path: &Path, records: &mut Vec<RawRecord>) -> Result<usize, LoaderError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut bad_lines = 0;

    for (idx, line) in reader.split(b'\n').enumerate() {
        let bytes = line?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(text) {
            Ok(record) => records.push(record),
            Err(e) => {
                bad_lines += 1;
                error!(file = %path.display(), line = idx + 1, error = %e, "Error parsing JSON line");
            }
        }
    }
    Ok(bad_lines)
}
