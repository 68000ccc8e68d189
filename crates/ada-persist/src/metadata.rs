//! JSON-lines writer for closed window metadata (§7).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::window::Window;
use crate::PersistError;

const METADATA_FILE_NAME: &str = "window_metadata.jsonl";

/// Appends one JSON object per closed [`Window`] to `window_metadata.jsonl`
/// inside a session directory.
pub struct MetadataWriter {
    file: BufWriter<File>,
}

impl MetadataWriter {
    /// Opens (creating if absent) the metadata file under `session_dir`.
    /// `session_dir` must already exist and must not be empty.
    pub fn open(session_dir: &Path) -> Result<Self, PersistError> {
        if session_dir.as_os_str().is_empty() {
            return Err(PersistError::InvalidArgument(
                "session directory path must not be empty".into(),
            ));
        }
        let path = session_dir.join(METADATA_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(PersistError::IoFailure)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Serializes `window` as one JSON line and flushes it immediately:
    /// metadata is cheap and rare enough that buffering across calls isn't
    /// worth risking a lost record on an unclean shutdown.
    pub fn append(&mut self, window: &Window) -> Result<(), PersistError> {
        serde_json::to_writer(&mut self.file, window).map_err(|e| PersistError::IoFailure(e.into()))?;
        self.file.write_all(b"\n").map_err(PersistError::IoFailure)?;
        self.file.flush().map_err(PersistError::IoFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn append_writes_one_json_line_per_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetadataWriter::open(dir.path()).unwrap();
        let w1 = Window::open(1, 100);
        let mut w2 = Window::open(2, 200);
        w2.record_event(210, true);
        writer.append(&w1).unwrap();
        writer.append(&w2).unwrap();

        let contents = std::fs::read(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let lines: Vec<_> = BufReader::new(contents.as_slice()).lines().map(Result::unwrap).collect();
        assert_eq!(lines.len(), 2);
        let parsed: Window = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(parsed.window_id, 2);
        assert!(parsed.mark_seen);
    }

    #[test]
    fn open_rejects_empty_session_dir() {
        let err = MetadataWriter::open(Path::new("")).unwrap_err();
        assert!(matches!(err, PersistError::InvalidArgument(_)));
    }
}
