//! Recorder front-end
//!
//! Runs at the end of each automated tick. Builds one snapshot, captures a
//! screenshot when one was requested for this tick, and hands both to every
//! active session as shared `Arc`s.

use bevy::log::{info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::RecordingError;
use super::catalog::RecordingCatalog;
use super::session::{FinalizeReport, RecordingSession};
use crate::automation::Registry;
use crate::constants::DEFAULT_RECORDING_DIR;
use crate::snapshot::{FrameInfo, FrameSnapshot, SceneInfo, build_snapshot};

/// Produces PNG bytes of the host's current frame
pub trait ScreenshotSource: Send {
    fn capture_png(&mut self) -> Result<Vec<u8>, String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Root for session directories and archives
    pub directory: PathBuf,
    /// Ticks between snapshots (1 = every tick)
    pub snapshot_rate: u64,
    /// Default change filter for new sessions
    pub save_only_when_changed: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_RECORDING_DIR),
            snapshot_rate: 1,
            save_only_when_changed: true,
        }
    }
}

/// Resolve a configured recording directory. Empty means the default,
/// relative paths are taken relative to `base`.
pub fn resolve_recording_dir(configured: &str, base: &Path) -> PathBuf {
    let configured = configured.trim();
    let dir = if configured.is_empty() {
        Path::new(DEFAULT_RECORDING_DIR)
    } else {
        Path::new(configured)
    };
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

pub struct AutomationRecorder {
    config: RecorderConfig,
    sessions: Vec<RecordingSession>,
    /// Ticks on which a screenshot should be captured
    screenshot_requests: BTreeSet<u64>,
    screenshot_source: Option<Box<dyn ScreenshotSource>>,
    catalog: Option<RecordingCatalog>,
    current_tick: u64,
    last_snapshot_tick: Option<u64>,
    missing_source_warned: bool,
    finished: Vec<FinalizeReport>,
}

impl AutomationRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            sessions: Vec::new(),
            screenshot_requests: BTreeSet::new(),
            screenshot_source: None,
            catalog: None,
            current_tick: 0,
            last_snapshot_tick: None,
            missing_source_warned: false,
            finished: Vec::new(),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn set_screenshot_source(&mut self, source: impl ScreenshotSource + 'static) {
        self.screenshot_source = Some(Box::new(source));
    }

    pub fn set_catalog(&mut self, catalog: RecordingCatalog) {
        self.catalog = Some(catalog);
    }

    pub fn catalog(&self) -> Option<&RecordingCatalog> {
        self.catalog.as_ref()
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    pub fn start_recording(&mut self, name: &str) -> Result<Uuid, RecordingError> {
        let save_only_when_changed = self.config.save_only_when_changed;
        self.start_recording_with(name, save_only_when_changed)
    }

    pub fn start_recording_with(
        &mut self,
        name: &str,
        save_only_when_changed: bool,
    ) -> Result<Uuid, RecordingError> {
        let session =
            RecordingSession::start(&self.config.directory, name, save_only_when_changed)?;
        if let Some(catalog) = &self.catalog {
            catalog.session_started(&session);
        }
        let id = session.id();
        self.sessions.push(session);
        Ok(id)
    }

    /// Stop one session. Returns `None` for unknown or already stopped ids.
    pub fn stop_recording(&mut self, id: Uuid) -> Option<FinalizeReport> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        let mut session = self.sessions.remove(index);
        Some(self.finalize(&mut session, None))
    }

    /// Stop every session immediately, discarding queued frames
    pub fn stop_all(&mut self) -> Vec<FinalizeReport> {
        self.drain_sessions(None)
    }

    /// Stop every session after giving its queue up to `drain_timeout` to flush
    pub fn finish_all(&mut self, drain_timeout: Duration) -> Vec<FinalizeReport> {
        self.drain_sessions(Some(drain_timeout))
    }

    fn drain_sessions(&mut self, drain_timeout: Option<Duration>) -> Vec<FinalizeReport> {
        let sessions: Vec<RecordingSession> = self.sessions.drain(..).collect();
        sessions
            .into_iter()
            .map(|mut session| self.finalize(&mut session, drain_timeout))
            .collect()
    }

    fn finalize(
        &mut self,
        session: &mut RecordingSession,
        drain_timeout: Option<Duration>,
    ) -> FinalizeReport {
        let report = match drain_timeout {
            Some(timeout) => session.finish(timeout),
            None => session.stop(),
        };
        if let Some(catalog) = &self.catalog {
            catalog.session_finished(&report);
        }
        self.finished.push(report.clone());
        report
    }

    pub fn is_recording(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub fn sessions(&self) -> &[RecordingSession] {
        &self.sessions
    }

    /// Reports for every session finalized so far
    pub fn finished_reports(&self) -> &[FinalizeReport] {
        &self.finished
    }

    // =========================================================================
    // SCREENSHOTS
    // =========================================================================

    /// Request a screenshot `delay` ticks after the current one
    pub fn request_screenshot(&mut self, delay: u64) {
        self.screenshot_requests.insert(self.current_tick + delay);
    }

    pub fn request_screenshot_at(&mut self, tick: u64) {
        self.screenshot_requests.insert(tick);
    }

    pub fn has_screenshot_request(&self, tick: u64) -> bool {
        self.screenshot_requests.contains(&tick)
    }

    /// Mark the start of a tick so relative screenshot requests land correctly
    pub fn begin_tick(&mut self, tick: u64) {
        self.current_tick = tick;
    }

    fn take_screenshot_if_requested(&mut self, tick: u64) -> Option<Arc<Vec<u8>>> {
        let requested = self.screenshot_requests.remove(&tick);
        // Requests for ticks that were never recorded are dropped
        self.screenshot_requests.retain(|&t| t > tick);
        if !requested {
            return None;
        }
        let Some(source) = self.screenshot_source.as_mut() else {
            if !self.missing_source_warned {
                warn!("Screenshot requested but no screenshot source is configured");
                self.missing_source_warned = true;
            }
            return None;
        };
        match source.capture_png() {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(e) => {
                warn!("Screenshot capture failed on tick {}: {}", tick, e);
                None
            }
        }
    }

    // =========================================================================
    // PER-TICK
    // =========================================================================

    /// Record the current tick. Returns the snapshot if one was taken.
    pub fn record_tick(
        &mut self,
        registry: &Registry,
        frame: FrameInfo,
        scene: &SceneInfo,
    ) -> Option<Arc<FrameSnapshot>> {
        let tick = frame.frame_count;
        self.current_tick = tick;

        let due = match self.last_snapshot_tick {
            None => true,
            Some(last) => tick.saturating_sub(last) >= self.config.snapshot_rate.max(1),
        };
        if !due {
            return None;
        }
        self.last_snapshot_tick = Some(tick);

        if self.sessions.is_empty() {
            self.screenshot_requests.retain(|&t| t > tick);
            return None;
        }

        let snapshot = Arc::new(build_snapshot(registry, frame, scene));
        if snapshot.any_action_activated() {
            // Capture the result of the activation on the next tick
            self.request_screenshot_at(tick + 1);
        }
        let screenshot = self.take_screenshot_if_requested(tick);

        for session in &self.sessions {
            session.record(screenshot.clone(), snapshot.clone());
        }
        Some(snapshot)
    }
}

impl Drop for AutomationRecorder {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            info!("Recorder shutting down, stopping {} session(s)", self.sessions.len());
            self.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Action, Entity};
    use crate::recording::archive::list_entries;
    use std::fs;

    struct FixedPng;

    impl ScreenshotSource for FixedPng {
        fn capture_png(&mut self) -> Result<Vec<u8>, String> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    fn temp_config(label: &str) -> RecorderConfig {
        RecorderConfig {
            directory: std::env::temp_dir()
                .join(format!("playtest-{}-{}", label, Uuid::new_v4().simple())),
            ..Default::default()
        }
    }

    fn frame(n: u64) -> FrameInfo {
        FrameInfo {
            frame_count: n,
            time: n as f64,
            time_scale: 1.0,
            delta_time: 1.0,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Entity::new(1, "StartButton", "Button")
                    .with_action(Action::from_fn("Click", "Start", || true, || {})),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_resolve_recording_dir() {
        let base = Path::new("/data");
        assert_eq!(resolve_recording_dir("", base), PathBuf::from("/data/recordings"));
        assert_eq!(resolve_recording_dir("runs", base), PathBuf::from("/data/runs"));
        assert_eq!(resolve_recording_dir("/tmp/runs", base), PathBuf::from("/tmp/runs"));
    }

    #[test]
    fn test_activation_requests_next_tick_screenshot() {
        let config = temp_config("recorder-shot");
        let root = config.directory.clone();
        let mut recorder = AutomationRecorder::new(config);
        recorder.set_screenshot_source(FixedPng);
        let id = recorder.start_recording("shots").unwrap();

        let mut registry = registry();
        let scene = SceneInfo::new("Menu", "menu");
        let key = registry.action_keys().remove(0);

        recorder.begin_tick(1);
        registry.activate(&key, 1).unwrap();
        let first = recorder.record_tick(&registry, frame(1), &scene).unwrap();
        assert!(first.any_action_activated());
        assert!(recorder.has_screenshot_request(2));

        recorder.begin_tick(2);
        recorder.record_tick(&registry, frame(2), &scene);
        assert!(!recorder.has_screenshot_request(2));

        let session = &recorder.sessions()[0];
        assert!(session.stats().frames_enqueued == 2);
        let report = recorder.finish_all(Duration::from_secs(10)).remove(0);
        assert_eq!(report.session_id, id);
        assert_eq!(report.stats.screenshots_written, 1);
        // Frame 2 differs from frame 1 (activation cleared)
        assert_eq!(report.stats.snapshots_written, 2);

        let entries = list_entries(report.archive.as_ref().unwrap()).unwrap();
        assert!(entries.contains(&"screenshot.2.png".to_string()));
        assert!(!entries.contains(&"screenshot.1.png".to_string()));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_snapshot_rate_skips_ticks() {
        let config = RecorderConfig {
            snapshot_rate: 3,
            ..temp_config("recorder-rate")
        };
        let root = config.directory.clone();
        let mut recorder = AutomationRecorder::new(config);
        recorder.start_recording("rate").unwrap();

        let registry = registry();
        let scene = SceneInfo::new("Menu", "menu");
        let taken: Vec<u64> = (1..=7)
            .filter(|&tick| recorder.record_tick(&registry, frame(tick), &scene).is_some())
            .collect();
        assert_eq!(taken, vec![1, 4, 7]);

        recorder.stop_all();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_no_sessions_records_nothing() {
        let mut recorder = AutomationRecorder::new(temp_config("recorder-idle"));
        let registry = registry();
        assert!(
            recorder
                .record_tick(&registry, frame(1), &SceneInfo::default())
                .is_none()
        );
    }

    #[test]
    fn test_drop_stops_all_sessions() {
        let config = temp_config("recorder-drop");
        let root = config.directory.clone();
        let mut recorder = AutomationRecorder::new(config);
        recorder.start_recording("a").unwrap();
        recorder.start_recording("b").unwrap();
        drop(recorder);

        let archives = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".rgrec.zip"))
            .count();
        assert_eq!(archives, 2);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_catalog_tracks_sessions() {
        let config = temp_config("recorder-catalog");
        let root = config.directory.clone();
        let mut recorder = AutomationRecorder::new(config);
        recorder.set_catalog(RecordingCatalog::open_in_memory().unwrap());
        let id = recorder.start_recording("cataloged").unwrap();
        recorder.stop_recording(id).unwrap();
        assert!(recorder.stop_recording(id).is_none());

        let entry = recorder.catalog().unwrap().get(id).unwrap().unwrap();
        assert_eq!(entry.status, "archived");
        assert_eq!(recorder.finished_reports().len(), 1);
        let _ = fs::remove_dir_all(&root);
    }
}
