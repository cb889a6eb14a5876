//! Reader for finished or in-progress recordings
//!
//! Opens either a session directory or its `.rgrec.zip` archive. Snapshots
//! are only stored for frames that changed, so [`RecordingReader::snapshot_at`]
//! falls back to the latest stored snapshot at or before a frame.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::archive::{list_entries, read_entry};
use super::info::RecordingInfo;
use super::RecordingError;
use crate::constants::{RECORDING_INFO_FILE, screenshot_file_name, snapshot_file_name};
use crate::snapshot::FrameSnapshot;

/// Files stored for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    pub frame: u64,
    pub has_snapshot: bool,
    pub has_screenshot: bool,
}

enum Source {
    Directory(PathBuf),
    Archive(PathBuf),
}

pub struct RecordingReader {
    source: Source,
    info: RecordingInfo,
    /// Sorted by frame
    frames: Vec<FrameEntry>,
}

impl RecordingReader {
    pub fn open(path: &Path) -> Result<Self, RecordingError> {
        let source = if path.is_dir() {
            Source::Directory(path.to_path_buf())
        } else if path.is_file() {
            Source::Archive(path.to_path_buf())
        } else {
            return Err(RecordingError::Missing(path.display().to_string()));
        };

        let names: Vec<String> = match &source {
            Source::Directory(dir) => {
                let entries = fs::read_dir(dir).map_err(|e| RecordingError::io(dir, e))?;
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            }
            Source::Archive(file) => list_entries(file)?,
        };

        let mut frames: BTreeMap<u64, FrameEntry> = BTreeMap::new();
        for name in &names {
            if let Some((frame, is_snapshot)) = parse_frame_file(name) {
                let entry = frames.entry(frame).or_insert(FrameEntry {
                    frame,
                    has_snapshot: false,
                    has_screenshot: false,
                });
                if is_snapshot {
                    entry.has_snapshot = true;
                } else {
                    entry.has_screenshot = true;
                }
            }
        }

        let info_bytes = source.read(RECORDING_INFO_FILE)?;
        let info = serde_json::from_slice(&info_bytes).map_err(|e| RecordingError::Format {
            path: source.path().join(RECORDING_INFO_FILE),
            message: e.to_string(),
        })?;

        Ok(Self {
            source,
            info,
            frames: frames.into_values().collect(),
        })
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.source, Source::Archive(_))
    }

    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    pub fn frames(&self) -> &[FrameEntry] {
        &self.frames
    }

    pub fn snapshot_count(&self) -> usize {
        self.frames.iter().filter(|f| f.has_snapshot).count()
    }

    pub fn screenshot_count(&self) -> usize {
        self.frames.iter().filter(|f| f.has_screenshot).count()
    }

    /// Snapshot stored for exactly this frame
    pub fn snapshot(&self, frame: u64) -> Result<FrameSnapshot, RecordingError> {
        let name = snapshot_file_name(frame);
        let bytes = self.source.read(&name)?;
        serde_json::from_slice(&bytes).map_err(|e| RecordingError::Format {
            path: self.path().join(&name),
            message: e.to_string(),
        })
    }

    /// World state as of `frame`: the latest stored snapshot at or before it
    pub fn snapshot_at(&self, frame: u64) -> Result<Option<FrameSnapshot>, RecordingError> {
        match self
            .frames
            .iter()
            .rev()
            .find(|f| f.has_snapshot && f.frame <= frame)
        {
            Some(entry) => self.snapshot(entry.frame).map(Some),
            None => Ok(None),
        }
    }

    pub fn screenshot(&self, frame: u64) -> Result<Vec<u8>, RecordingError> {
        self.source.read(&screenshot_file_name(frame))
    }
}

impl Source {
    fn path(&self) -> &Path {
        match self {
            Source::Directory(p) | Source::Archive(p) => p,
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, RecordingError> {
        match self {
            Source::Directory(dir) => {
                let path = dir.join(name);
                if !path.exists() {
                    return Err(RecordingError::Missing(name.to_string()));
                }
                fs::read(&path).map_err(|e| RecordingError::io(&path, e))
            }
            Source::Archive(file) => read_entry(file, name),
        }
    }
}

/// `snapshot.<n>.json` -> (n, true), `screenshot.<n>.png` -> (n, false)
fn parse_frame_file(name: &str) -> Option<(u64, bool)> {
    if let Some(rest) = name.strip_prefix("snapshot.")
        && let Some(number) = rest.strip_suffix(".json")
    {
        return number.parse().ok().map(|n| (n, true));
    }
    if let Some(rest) = name.strip_prefix("screenshot.")
        && let Some(number) = rest.strip_suffix(".png")
    {
        return number.parse().ok().map(|n| (n, false));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::session::RecordingSession;
    use crate::snapshot::{FrameInfo, SceneInfo};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn snapshot(frame: u64, scene: &str) -> Arc<FrameSnapshot> {
        Arc::new(FrameSnapshot {
            frame: FrameInfo {
                frame_count: frame,
                ..Default::default()
            },
            active_scene: SceneInfo::new(scene, scene),
            entities: Vec::new(),
        })
    }

    #[test]
    fn test_parse_frame_file() {
        assert_eq!(parse_frame_file("snapshot.12.json"), Some((12, true)));
        assert_eq!(parse_frame_file("screenshot.3.png"), Some((3, false)));
        assert_eq!(parse_frame_file("recording.json"), None);
        assert_eq!(parse_frame_file("snapshot.x.json"), None);
    }

    #[test]
    fn test_read_archive() {
        let root =
            std::env::temp_dir().join(format!("playtest-reader-{}", Uuid::new_v4().simple()));
        let mut session = RecordingSession::start(&root, "reader", true).unwrap();
        session.record(Some(Arc::new(vec![1, 2, 3])), snapshot(1, "Menu"));
        session.record(None, snapshot(2, "Menu"));
        session.record(None, snapshot(3, "Options"));
        let report = session.finish(Duration::from_secs(10));
        let archive = report.archive.clone().unwrap();

        let reader = RecordingReader::open(&archive).unwrap();
        assert!(reader.is_archive());
        assert_eq!(reader.info().id, session.id());
        assert_eq!(reader.info().name, "reader");
        assert_eq!(reader.snapshot_count(), 2);
        assert_eq!(reader.screenshot_count(), 1);
        assert_eq!(reader.screenshot(1).unwrap(), vec![1, 2, 3]);

        // Frame 2 was unchanged, so it resolves to frame 1's snapshot
        let at_two = reader.snapshot_at(2).unwrap().unwrap();
        assert_eq!(at_two.frame.frame_count, 1);
        assert_eq!(reader.snapshot(3).unwrap().active_scene.name, "Options");
        assert!(reader.snapshot(2).is_err());
        assert!(reader.snapshot_at(0).unwrap().is_none());

        drop(session);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_open_missing_path() {
        let path = std::env::temp_dir().join(format!("playtest-none-{}", Uuid::new_v4().simple()));
        assert!(matches!(
            RecordingReader::open(&path),
            Err(RecordingError::Missing(_))
        ));
    }
}
