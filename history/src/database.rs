pub mod json;
pub mod memory;
#[cfg(feature = "rusqlite")]
pub mod sqlite;


use crate::{
    config::StorageConfig,
    format::{Document, FormatError},
    model::Run,
};
use std::{fmt::Debug, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O failed on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to replace {path:?}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
    #[error("Stored history is malformed")]
    Format(#[from] FormatError),
    #[cfg(feature = "rusqlite")]
    #[error("SQLite query failed")]
    SQLite(rusqlite::Error),
    #[error("Storage backend {0} is not available in this build")]
    Unsupported(&'static str),
}

/// Persistence injected into a history store
///
/// The store owns the authoritative in-memory document and hands the backend
/// the full document together with the runs that were just appended to it.
/// A backend must either persist all of `appended` or none of it.
pub trait Storage: Debug + Send {
    /// read the persisted document for `suite`, `None` if nothing was stored yet
    fn load(&mut self, suite: &str) -> Result<Option<Document>, StorageError>;

    /// persist `appended`, the trailing runs of `document`
    fn store(
        &mut self,
        document: &Document,
        appended: &[Run],
    ) -> Result<(), StorageError>;
}

/// All storage backends selectable from the configuration
#[derive(Debug)]
pub enum StorageAdapters {
    Memory(memory::MemoryStorage),
    Json(json::JsonStorage),
    #[cfg(feature = "rusqlite")]
    SQLite(sqlite::SqliteStorage),
}

impl StorageAdapters {
    pub fn load(config: &StorageConfig) -> Result<Self, StorageError> {
        match config {
            StorageConfig::Memory => Ok(Self::Memory(memory::MemoryStorage::default())),
            StorageConfig::Json { path, js_prefix } => {
                Ok(Self::Json(json::JsonStorage::new(path.clone(), *js_prefix)))
            }
            #[cfg(feature = "rusqlite")]
            StorageConfig::SQLite { path } => Ok(Self::SQLite(sqlite::SqliteStorage::open(path)?)),
            #[cfg(not(feature = "rusqlite"))]
            StorageConfig::SQLite { .. } => Err(StorageError::Unsupported("sqlite")),
        }
    }
}

impl Storage for StorageAdapters {
    fn load(&mut self, suite: &str) -> Result<Option<Document>, StorageError> {
        match self {
            Self::Memory(storage) => storage.load(suite),
            Self::Json(storage) => storage.load(suite),
            #[cfg(feature = "rusqlite")]
            Self::SQLite(storage) => storage.load(suite),
        }
    }

    fn store(
        &mut self,
        document: &Document,
        appended: &[Run],
    ) -> Result<(), StorageError> {
        match self {
            Self::Memory(storage) => storage.store(document, appended),
            Self::Json(storage) => storage.store(document, appended),
            #[cfg(feature = "rusqlite")]
            Self::SQLite(storage) => storage.store(document, appended),
        }
    }
}
