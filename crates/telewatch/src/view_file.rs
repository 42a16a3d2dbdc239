//! File-backed view token sink for `watch --view-file`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use telewatch_core::{CoreError, TokenSink};

/// Keeps the dashboard token in a plain text file.
#[derive(Debug, Clone)]
pub struct FileTokenSink {
    path: PathBuf,
}

impl FileTokenSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSink for FileTokenSink {
    fn read(&self) -> Result<Option<String>, CoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let token = text.trim();
                Ok((!token.is_empty()).then(|| token.to_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Internal(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, token: &str) -> Result<(), CoreError> {
        std::fs::write(&self.path, format!("{token}\n")).map_err(|e| {
            CoreError::Internal(format!("cannot write {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_file_has_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTokenSink::new(dir.path().join("view"));
        assert_eq!(sink.read().unwrap(), None);

        std::fs::write(sink.path(), "  \n").unwrap();
        assert_eq!(sink.read().unwrap(), None);
    }

    #[test]
    fn write_then_read_trims() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTokenSink::new(dir.path().join("view"));
        sink.write("eyJsYXlvdXQiOltdfQ").unwrap();
        assert_eq!(sink.read().unwrap().as_deref(), Some("eyJsYXlvdXQiOltdfQ"));
    }
}
