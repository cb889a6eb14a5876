//! Session archives (`.rgrec.zip`)
//!
//! The archive holds the session directory's files at its root.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::RecordingError;

fn archive_error(path: &Path, e: impl std::fmt::Display) -> RecordingError {
    RecordingError::Archive {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Compress every file under `dir` into a new archive at `archive`.
/// An existing file at `archive` is overwritten.
pub fn archive_directory(dir: &Path, archive: &Path) -> Result<(), RecordingError> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let file = File::create(archive).map_err(|e| RecordingError::io(archive, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in files {
        let source = dir.join(&relative);
        let bytes = fs::read(&source).map_err(|e| RecordingError::io(&source, e))?;
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        writer
            .start_file(entry_name, options)
            .map_err(|e| archive_error(archive, e))?;
        writer
            .write_all(&bytes)
            .map_err(|e| RecordingError::io(archive, e))?;
    }

    writer.finish().map_err(|e| archive_error(archive, e))?;
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RecordingError> {
    let entries = fs::read_dir(dir).map_err(|e| RecordingError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RecordingError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Names of the entries in an archive
pub fn list_entries(archive: &Path) -> Result<Vec<String>, RecordingError> {
    let file = File::open(archive).map_err(|e| RecordingError::io(archive, e))?;
    let zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    Ok(zip.file_names().map(|n| n.to_string()).collect())
}

/// Read one entry from an archive
pub fn read_entry(archive: &Path, name: &str) -> Result<Vec<u8>, RecordingError> {
    let file = File::open(archive).map_err(|e| RecordingError::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    let mut entry = zip.by_name(name).map_err(|e| archive_error(archive, e))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| RecordingError::io(archive, e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_archive_round_trip() {
        let root =
            std::env::temp_dir().join(format!("playtest-archive-{}", Uuid::new_v4().simple()));
        let dir = root.join("session");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("recording.json"), "{}").unwrap();
        fs::write(dir.join("snapshot.1.json"), "{\"frame\":1}").unwrap();

        let archive = root.join("session.rgrec.zip");
        archive_directory(&dir, &archive).unwrap();

        let mut names = list_entries(&archive).unwrap();
        names.sort();
        assert_eq!(names, vec!["recording.json", "snapshot.1.json"]);
        assert_eq!(read_entry(&archive, "snapshot.1.json").unwrap(), b"{\"frame\":1}");
        assert!(read_entry(&archive, "missing.json").is_err());

        let _ = fs::remove_dir_all(&root);
    }
}
