use super::{Storage, StorageError};
use crate::{
    format::{strip_js_prefix, Document},
    model::Run,
};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Backend writing the dashboard document to a single file
///
/// Every store rewrites the whole file through a temporary sibling that is
/// renamed over the original, so readers never observe a partial document.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
    js_prefix: bool,
}

impl JsonStorage {
    pub fn new(path: PathBuf, js_prefix: bool) -> Self {
        Self { path, js_prefix }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Storage for JsonStorage {
    fn load(&mut self, suite: &str) -> Result<Option<Document>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!(path = ?self.path, "No history file yet, starting empty");

                return Ok(None);
            }
            Err(error) => return Err(self.io_error(error)),
        };

        // keep writing the assignment if the file already had it
        if strip_js_prefix(&text).1 {
            self.js_prefix = true;
        }

        let document = Document::parse(&text, suite)?;
        info!(path = ?self.path, runs = document.runs.len(), "Loaded history file");

        Ok(Some(document))
    }

    fn store(&mut self, document: &Document, appended: &[Run]) -> Result<(), StorageError> {
        let text = document.render(self.js_prefix)?;

        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&directory).map_err(|error| self.io_error(error))?;

        let mut file = NamedTempFile::new_in(&directory).map_err(|error| self.io_error(error))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .map_err(|error| self.io_error(error))?;
        file.persist(&self.path)
            .map_err(|source| StorageError::Persist {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = ?self.path, runs = appended.len(), "Replaced history file");

        Ok(())
    }
}
