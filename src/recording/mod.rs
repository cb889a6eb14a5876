//! Recording pipeline
//!
//! The [`AutomationRecorder`] snapshots the registry each recorded tick and
//! fans the snapshot out to every active [`RecordingSession`]. Each session
//! owns a background worker that writes `snapshot.<frame>.json` and
//! `screenshot.<frame>.png` files, and on stop the session directory is
//! compressed into a `<name>.<id>.rgrec.zip` archive.

pub mod archive;
pub mod catalog;
pub mod info;
pub mod reader;
pub mod recorder;
pub mod session;
pub mod worker;

use std::path::{Path, PathBuf};

pub use catalog::RecordingCatalog;
pub use info::RecordingInfo;
pub use reader::{FrameEntry, RecordingReader};
pub use recorder::{AutomationRecorder, RecorderConfig, ScreenshotSource};
pub use session::{FinalizeReport, RecordingSession};
pub use worker::{RecorderWorker, WorkItem, WorkerStats};

/// Errors from session setup, archiving and reading recordings
#[derive(Debug)]
pub enum RecordingError {
    Io { path: PathBuf, source: std::io::Error },
    Archive { path: PathBuf, message: String },
    Format { path: PathBuf, message: String },
    /// Lookup of a frame or file that the recording does not contain
    Missing(String),
}

impl RecordingError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        RecordingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for RecordingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            RecordingError::Archive { path, message } => {
                write!(f, "archive {}: {}", path.display(), message)
            }
            RecordingError::Format { path, message } => {
                write!(f, "invalid recording data in {}: {}", path.display(), message)
            }
            RecordingError::Missing(what) => write!(f, "not in recording: {}", what),
        }
    }
}

impl std::error::Error for RecordingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordingError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Replace characters that are not safe in file names with `_`
pub fn file_safe_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        crate::constants::DEFAULT_SESSION_NAME.to_string()
    } else {
        cleaned
    }
}
