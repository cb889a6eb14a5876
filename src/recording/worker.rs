//! Per-session background writer
//!
//! One named thread per session drains a FIFO of [`WorkItem`]s. Frames are
//! written in enqueue order; the screenshot and snapshot of a single frame
//! are written concurrently. Stop is cooperative and prompt: the thread wakes
//! from a blocked take, and anything still queued is discarded.

use bevy::log::{debug, error, warn};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::RecordingError;
use super::info::RecordingInfo;
use crate::constants::{RECORDING_INFO_FILE, screenshot_file_name, snapshot_file_name};
use crate::snapshot::FrameSnapshot;

/// One recorded frame. Both halves are shared with the other sessions.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub screenshot: Option<Arc<Vec<u8>>>,
    pub snapshot: Arc<FrameSnapshot>,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    frames_processed: AtomicU64,
    snapshots_written: AtomicU64,
    screenshots_written: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of a worker's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub frames_enqueued: u64,
    pub frames_processed: u64,
    pub snapshots_written: u64,
    pub screenshots_written: u64,
    pub write_failures: u64,
}

pub struct RecorderWorker {
    session_id: Uuid,
    work_tx: Sender<WorkItem>,
    stop_tx: Sender<()>,
    stop_requested: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl RecorderWorker {
    /// Spawn the worker thread. It creates `directory` and writes the
    /// session header before taking any work.
    pub fn spawn(
        info: RecordingInfo,
        directory: PathBuf,
        save_only_when_changed: bool,
    ) -> Result<Self, RecordingError> {
        let (work_tx, work_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded(1);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let session_id = info.id;

        let mut state = WorkerState {
            info,
            directory: directory.clone(),
            save_only_when_changed,
            last_seen: None,
            counters: counters.clone(),
        };
        let stop_flag = stop_requested.clone();

        let handle = std::thread::Builder::new()
            .name(format!("recorder-{}", session_id.simple()))
            .spawn(move || state.run(work_rx, stop_rx, stop_flag))
            .map_err(|e| RecordingError::io(&directory, e))?;

        Ok(Self {
            session_id,
            work_tx,
            stop_tx,
            stop_requested,
            counters,
            handle: Some(handle),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue a frame. Never blocks; returns false if the frame was dropped
    /// because stop was already requested.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        if self.work_tx.send(item).is_err() {
            // Thread already gone
            self.counters.enqueued.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            // Capacity 1 and sent once, so this never blocks
            let _ = self.stop_tx.try_send(());
        }
    }

    /// Wait for the thread to exit. Call after [`request_stop`](Self::request_stop).
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Recorder thread for session {} panicked", self.session_id.simple());
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            frames_enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            frames_processed: self.counters.frames_processed.load(Ordering::SeqCst),
            snapshots_written: self.counters.snapshots_written.load(Ordering::SeqCst),
            screenshots_written: self.counters.screenshots_written.load(Ordering::SeqCst),
            write_failures: self.counters.write_failures.load(Ordering::SeqCst),
        }
    }

    /// Block until every enqueued frame has been processed or the timeout
    /// elapses. Returns true if the queue drained.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.frames_processed >= stats.frames_enqueued {
                return true;
            }
            if Instant::now() >= deadline || self.handle.as_ref().is_none_or(|h| h.is_finished()) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for RecorderWorker {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}

// =============================================================================
// THREAD SIDE
// =============================================================================

struct WorkerState {
    info: RecordingInfo,
    directory: PathBuf,
    save_only_when_changed: bool,
    /// Last snapshot taken off the queue, written or not
    last_seen: Option<Arc<FrameSnapshot>>,
    counters: Arc<Counters>,
}

impl WorkerState {
    fn run(&mut self, work_rx: Receiver<WorkItem>, stop_rx: Receiver<()>, stop: Arc<AtomicBool>) {
        let session = self.info.id.simple().to_string();
        if let Err(e) = self.write_header() {
            error!("Session {}: failed to write session header: {}", session, e);
            self.counters.write_failures.fetch_add(1, Ordering::SeqCst);
        }

        while !stop.load(Ordering::SeqCst) {
            select! {
                recv(stop_rx) -> _ => break,
                recv(work_rx) -> msg => match msg {
                    Ok(item) => self.process(&session, item),
                    Err(_) => break,
                },
            }
        }
        debug!("Session {}: recorder thread exiting", session);
    }

    fn write_header(&self) -> Result<(), RecordingError> {
        fs::create_dir_all(&self.directory).map_err(|e| RecordingError::io(&self.directory, e))?;
        let path = self.directory.join(RECORDING_INFO_FILE);
        let json = serde_json::to_string_pretty(&self.info).map_err(|e| RecordingError::Format {
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| RecordingError::io(&path, e))
    }

    fn should_save_snapshot(&self, snapshot: &FrameSnapshot) -> bool {
        if !self.save_only_when_changed {
            return true;
        }
        match &self.last_seen {
            Some(last) => snapshot.has_changes_from(last),
            None => true,
        }
    }

    fn process(&mut self, session: &str, item: WorkItem) {
        let frame = item.snapshot.frame.frame_count;
        let save_json = self.should_save_snapshot(&item.snapshot);
        let dir = self.directory.as_path();

        let (png, json) = rayon::join(
            || {
                item.screenshot
                    .as_ref()
                    .map(|bytes| write_screenshot(dir, frame, bytes))
            },
            || save_json.then(|| write_snapshot(dir, frame, &item.snapshot)),
        );

        match png {
            Some(Ok(())) => {
                self.counters.screenshots_written.fetch_add(1, Ordering::SeqCst);
            }
            Some(Err(e)) => {
                warn!("Session {}: frame {} screenshot: {}", session, frame, e);
                self.counters.write_failures.fetch_add(1, Ordering::SeqCst);
            }
            None => {}
        }
        match json {
            Some(Ok(())) => {
                self.counters.snapshots_written.fetch_add(1, Ordering::SeqCst);
            }
            Some(Err(e)) => {
                warn!("Session {}: frame {} snapshot: {}", session, frame, e);
                self.counters.write_failures.fetch_add(1, Ordering::SeqCst);
            }
            None => {}
        }

        self.last_seen = Some(item.snapshot);
        self.counters.frames_processed.fetch_add(1, Ordering::SeqCst);
    }
}

fn write_screenshot(dir: &Path, frame: u64, bytes: &[u8]) -> Result<(), RecordingError> {
    let path = dir.join(screenshot_file_name(frame));
    fs::write(&path, bytes).map_err(|e| RecordingError::io(&path, e))
}

fn write_snapshot(dir: &Path, frame: u64, snapshot: &FrameSnapshot) -> Result<(), RecordingError> {
    let path = dir.join(snapshot_file_name(frame));
    let json = snapshot.to_pretty_json().map_err(|e| RecordingError::Format {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| RecordingError::io(&path, e))
}
