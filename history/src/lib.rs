//! Append-only history of benchmark runs keyed by commit, persisted as the
//! `data.js` document read by the benchmark dashboard or in SQLite.

pub mod config;
pub mod database;
pub mod format;
pub mod ingest;
pub mod model;
pub mod store;

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod format_test;
#[cfg(test)]
mod model_test;
#[cfg(test)]
pub(crate) mod test_util;

pub use format::Document;
pub use model::{Commit, CommitWindow, Latency, LatencyUnit, Measurement, Person, Run};
pub use store::{HistoryStore, SharedStore, StoreError};
