//! Recording sessions
//!
//! A session runs from `start` until its first `stop`. Stopping joins the
//! worker, zips the session directory into the archive and removes the
//! directory. Later stops (including the one from `Drop`) return the same
//! report without touching the filesystem again.

use bevy::log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::archive::archive_directory;
use super::info::RecordingInfo;
use super::worker::{RecorderWorker, WorkItem, WorkerStats};
use super::{RecordingError, file_safe_name};
use crate::constants::ARCHIVE_EXTENSION;
use crate::snapshot::FrameSnapshot;

/// Outcome of finalizing a session
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub session_id: Uuid,
    pub name: String,
    /// Archive path, or why no archive exists
    pub archive: Result<PathBuf, String>,
    /// False when the working directory was kept (archive failure or delete failure)
    pub directory_removed: bool,
    pub stats: WorkerStats,
}

impl FinalizeReport {
    pub fn is_archived(&self) -> bool {
        self.archive.is_ok()
    }
}

pub struct RecordingSession {
    id: Uuid,
    name: String,
    directory: PathBuf,
    archive_path: PathBuf,
    save_only_when_changed: bool,
    worker: RecorderWorker,
    report: Option<FinalizeReport>,
}

impl RecordingSession {
    /// Start a session under `root`, using `<name>.<id>` for the working
    /// directory and `<name>.<id>.rgrec.zip` for the archive
    pub fn start(
        root: &Path,
        name: &str,
        save_only_when_changed: bool,
    ) -> Result<Self, RecordingError> {
        let id = Uuid::new_v4();
        let name = file_safe_name(name);
        let stem = format!("{}.{}", name, id.simple());
        let directory = root.join(&stem);
        let archive_path = root.join(format!("{}{}", stem, ARCHIVE_EXTENSION));

        let worker = RecorderWorker::spawn(
            RecordingInfo::new(id, &name),
            directory.clone(),
            save_only_when_changed,
        )?;
        info!(
            "Starting recording session {} ({}). Recording to {}",
            id.simple(),
            name,
            directory.display()
        );

        Ok(Self {
            id,
            name,
            directory,
            archive_path,
            save_only_when_changed,
            worker,
            report: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn save_only_when_changed(&self) -> bool {
        self.save_only_when_changed
    }

    pub fn is_stopped(&self) -> bool {
        self.report.is_some() || self.worker.is_stop_requested()
    }

    pub fn stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    /// Queue a frame. Silently dropped once stop has been requested.
    pub fn record(&self, screenshot: Option<Arc<Vec<u8>>>, snapshot: Arc<FrameSnapshot>) -> bool {
        if self.report.is_some() {
            return false;
        }
        self.worker.enqueue(WorkItem {
            screenshot,
            snapshot,
        })
    }

    /// Wait up to `drain_timeout` for queued frames, then stop
    pub fn finish(&mut self, drain_timeout: Duration) -> FinalizeReport {
        if self.report.is_none() && !self.worker.wait_until_idle(drain_timeout) {
            warn!(
                "Session {}: queue not drained within {:?}, remaining frames are discarded",
                self.id.simple(),
                drain_timeout
            );
        }
        self.stop()
    }

    /// Stop recording and produce the archive. Idempotent.
    pub fn stop(&mut self) -> FinalizeReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.worker.request_stop();
        self.worker.join();

        let archive = self.write_archive();
        let directory_removed = match &archive {
            Ok(_) => match fs::remove_dir_all(&self.directory) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Session {}: failed to remove {}: {}",
                        self.id.simple(),
                        self.directory.display(),
                        e
                    );
                    false
                }
            },
            Err(_) => false,
        };

        let report = FinalizeReport {
            session_id: self.id,
            name: self.name.clone(),
            archive,
            directory_removed,
            stats: self.worker.stats(),
        };
        match &report.archive {
            Ok(path) => info!(
                "Session {} saved to {} ({} frames, {} snapshots, {} screenshots, {} write failures)",
                self.id.simple(),
                path.display(),
                report.stats.frames_processed,
                report.stats.snapshots_written,
                report.stats.screenshots_written,
                report.stats.write_failures
            ),
            Err(e) => error!(
                "Session {}: archive not created, working directory kept at {}: {}",
                self.id.simple(),
                self.directory.display(),
                e
            ),
        }
        self.report = Some(report.clone());
        report
    }

    fn write_archive(&self) -> Result<PathBuf, String> {
        if !self.directory.exists() {
            return Err(format!("{} does not exist", self.directory.display()));
        }
        if self.archive_path.exists() {
            warn!(
                "Session {}: replacing existing archive {}",
                self.id.simple(),
                self.archive_path.display()
            );
            fs::remove_file(&self.archive_path).map_err(|e| {
                format!("failed to remove stale {}: {}", self.archive_path.display(), e)
            })?;
        }
        match archive_directory(&self.directory, &self.archive_path) {
            Ok(()) => Ok(self.archive_path.clone()),
            Err(e) => {
                // Don't leave a truncated archive behind
                let _ = fs::remove_file(&self.archive_path);
                Err(e.to_string())
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}
