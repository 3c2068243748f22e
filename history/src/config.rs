use crate::format::DEFAULT_SUITE;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Error, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Config file could not be read")]
    Unreadable(#[from] Error),
    #[error("Config file is not valid YAML for a history config")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks")]
    FailedPreflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    // repository the benchmarked commits belong to, written as `repoUrl`
    #[serde(default)]
    pub repo_url: String,
    // key under `entries` this store reads and appends to
    #[serde(default = "default_suite")]
    pub suite: String,

    #[serde(alias = "db")]
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Json {
        path: PathBuf,
        // write the `window.BENCHMARK_DATA = ` assignment in front of the document
        #[serde(default)]
        js_prefix: bool,
    },
    SQLite {
        path: PathBuf,
    },
}

impl StorageConfig {
    /// Pick the backend from the file extension of `path`
    pub fn infer(path: PathBuf) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => Self::SQLite { path },
            Some("js") => Self::Json {
                path,
                js_prefix: true,
            },
            _ => Self::Json {
                path,
                js_prefix: false,
            },
        }
    }
}

impl HistoryConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_reader(File::open(path)?)?)
    }

    pub fn for_store(path: PathBuf) -> Self {
        Self {
            repo_url: String::new(),
            suite: default_suite(),
            storage: StorageConfig::infer(path),
        }
    }

    /// Check the config and report every problem found, returns true if any
    /// of them is fatal
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        self.suite = self.suite.trim().to_owned();
        if self.suite.is_empty() {
            error!("suite cannot be empty, it names the series under `entries`");
            contains_error = true;
        }

        if self.repo_url.is_empty() {
            warn!("repo_url is empty, it will be taken from an existing history if there is one");
        }

        match &self.storage {
            StorageConfig::Memory => {
                warn!("Using memory storage, appended runs will not be persisted");
            }
            StorageConfig::Json { path, js_prefix } => {
                if path.is_dir() {
                    error!(
                        "storage.path {} is a directory, expected a file",
                        path.to_string_lossy()
                    );
                    contains_error = true;
                }

                if *js_prefix && path.extension().map_or(false, |extension| extension == "json") {
                    warn!(
                        "storage.js_prefix is set for {}, the file will not be plain JSON",
                        path.to_string_lossy()
                    );
                }
            }
            StorageConfig::SQLite { path } => {
                if path.is_dir() {
                    error!(
                        "storage.path {} is a directory, expected a database file",
                        path.to_string_lossy()
                    );
                    contains_error = true;
                }

                if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty())
                {
                    if !parent.is_dir() {
                        error!(
                            "Directory {} for storage.path does not exist",
                            parent.to_string_lossy()
                        );
                        contains_error = true;
                    }
                }
            }
        }

        contains_error
    }
}

fn default_suite() -> String {
    DEFAULT_SUITE.to_owned()
}
