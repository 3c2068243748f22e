use crate::{
    database::{Storage, StorageAdapters, StorageError},
    format::{Document, FormatError},
    model::{CommitWindow, EpochMillis, Run, SeriesPoint},
};
use globset::GlobBuilder;
use itertools::Itertools;
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use tracing_unwrap::ResultExt;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Commit {0} is already recorded")]
    DuplicateCommit(String),
    #[error("Malformed record")]
    Malformed(#[from] FormatError),
    #[error("No run records a test named {0}")]
    UnknownTest(String),
    #[error("Storage backend failed")]
    Storage(#[from] StorageError),
    #[error("Test name pattern is not a valid glob")]
    InvalidGlob(#[from] globset::Error),
}

/// Outcome of migrating runs from another history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub appended: usize,
    pub skipped: usize,
}

/// Append-only history of benchmark runs for a single suite
///
/// Runs are kept in append order, which is `recorded_at` order as long as the
/// producing job appends chronologically. Every append is persisted through
/// the injected [`Storage`] before it becomes visible.
#[derive(Debug)]
pub struct HistoryStore<S: Storage = StorageAdapters> {
    document: Document,
    // commit id -> position in `document.runs`
    commits: BTreeMap<String, usize>,
    storage: S,
}

impl<S: Storage> HistoryStore<S> {
    /// Open the history of `suite` stored in `storage`, an empty history is
    /// created if the backend has none yet
    pub fn open(mut storage: S, suite: &str, repo_url: &str) -> Result<Self, StoreError> {
        let mut document = storage
            .load(suite)?
            .unwrap_or_else(|| Document::new(suite, repo_url));

        if document.repo_url.is_empty() {
            document.repo_url = repo_url.to_owned();
        } else if !repo_url.is_empty() && document.repo_url != repo_url {
            warn!(
                stored = %document.repo_url,
                configured = %repo_url,
                "Stored repo url differs from the configured one, keeping the stored url"
            );
        }

        let mut commits = BTreeMap::new();
        for (position, run) in document.runs.iter().enumerate() {
            if commits.insert(run.commit.id.clone(), position).is_some() {
                return Err(FormatError::DuplicateCommit {
                    suite: suite.to_owned(),
                    commit: run.commit.id.clone(),
                }
                .into());
            }
        }

        info!(suite = suite, runs = document.runs.len(), "Opened history");

        Ok(Self {
            document,
            commits,
            storage,
        })
    }

    fn check(&self, run: &Run) -> Result<(), StoreError> {
        if let Some(name) = run.duplicate_measurement() {
            return Err(FormatError::DuplicateMeasurement {
                commit: run.commit.id.clone(),
                name: name.to_owned(),
            }
            .into());
        }

        for measurement in &run.measurements {
            if let Some((field, statistic)) = measurement.invalid_statistic() {
                return Err(FormatError::Field {
                    name: measurement.name.clone(),
                    field,
                    value: statistic.to_string(),
                }
                .into());
            }
        }

        if self.commits.contains_key(run.commit_id()) {
            return Err(StoreError::DuplicateCommit(run.commit.id.clone()));
        }

        Ok(())
    }

    /// Persist the runs from `start` on, rolling the document back to
    /// `previous_update` and its first `start` runs if the backend fails
    fn commit(&mut self, start: usize, previous_update: EpochMillis) -> Result<(), StoreError> {
        if let Err(error) = self
            .storage
            .store(&self.document, &self.document.runs[start..])
        {
            for run in self.document.runs.drain(start..) {
                self.commits.remove(run.commit_id());
            }
            self.document.last_update = previous_update;

            return Err(error.into());
        }

        Ok(())
    }

    fn push(&mut self, run: Run) {
        if run.recorded_at < self.document.last_update {
            warn!(
                commit = %run.commit.id,
                recorded_at = run.recorded_at,
                last_update = self.document.last_update,
                "Appending a run recorded before the last update"
            );
        }

        self.document.last_update = self.document.last_update.max(run.recorded_at);
        self.commits
            .insert(run.commit.id.clone(), self.document.runs.len());
        self.document.runs.push(run);
    }

    /// Append a new run, the history is left unchanged if the commit is
    /// already recorded or the backend fails to persist it
    #[instrument(level = "debug", skip_all, fields(commit = %run.commit.id))]
    pub fn append_run(&mut self, run: Run) -> Result<&Run, StoreError> {
        self.check(&run)?;

        let start = self.document.runs.len();
        let previous_update = self.document.last_update;
        self.push(run);
        self.commit(start, previous_update)?;

        let run = &self.document.runs[start];
        info!(
            commit = %run.commit.id,
            measurements = run.measurements.len(),
            "Appended run"
        );

        Ok(run)
    }

    /// Append every run of `runs` whose commit isn't recorded yet, persisting
    /// them together
    #[instrument(level = "debug", skip_all)]
    pub fn import_from<I: IntoIterator<Item = Run>>(
        &mut self,
        runs: I,
    ) -> Result<ImportSummary, StoreError> {
        let start = self.document.runs.len();
        let previous_update = self.document.last_update;
        let mut summary = ImportSummary::default();

        for run in runs {
            match self.check(&run) {
                Ok(()) => {
                    self.push(run);
                    summary.appended += 1;
                }
                Err(StoreError::DuplicateCommit(commit)) => {
                    debug!(commit = %commit, "Skipping already recorded commit");
                    summary.skipped += 1;
                }
                Err(error) => {
                    for run in self.document.runs.drain(start..) {
                        self.commits.remove(run.commit_id());
                    }
                    self.document.last_update = previous_update;

                    return Err(error);
                }
            }
        }

        if summary.appended > 0 {
            self.commit(start, previous_update)?;
        }

        info!(
            appended = summary.appended,
            skipped = summary.skipped,
            "Imported runs"
        );

        Ok(summary)
    }

    /// Runs in append order, restricted to commits whose timestamp falls in
    /// `window`
    pub fn list_runs(
        &self,
        window: Option<CommitWindow>,
    ) -> impl Iterator<Item = &Run> + Clone + '_ {
        self.document.runs.iter().filter(move |run| {
            window.map_or(true, |window| window.contains(&run.commit.timestamp))
        })
    }

    /// `(commit, value, stddev)` of `test_name` over all runs that recorded it
    pub fn get_measurement_series<'a>(
        &'a self,
        test_name: &'a str,
    ) -> Result<impl Iterator<Item = SeriesPoint<'a>> + Clone + 'a, StoreError> {
        if !self
            .document
            .runs
            .iter()
            .any(|run| run.measurement(test_name).is_some())
        {
            return Err(StoreError::UnknownTest(test_name.to_owned()));
        }

        Ok(self.document.runs.iter().filter_map(move |run| {
            run.measurement(test_name).map(|measurement| SeriesPoint {
                commit_id: run.commit_id(),
                recorded_at: run.recorded_at,
                value: measurement.value,
                stddev: measurement.stddev,
            })
        }))
    }

    pub fn get_run(&self, commit_id: &str) -> Option<&Run> {
        self.commits
            .get(commit_id)
            .map(|position| &self.document.runs[*position])
    }

    pub fn latest_run(&self) -> Option<&Run> {
        self.document.runs.last()
    }

    /// Sorted names of all recorded tests, optionally filtered by a glob
    pub fn test_names(&self, glob: Option<&str>) -> Result<Vec<&str>, StoreError> {
        let matcher = glob
            .map(|glob| GlobBuilder::new(glob).build().map(|glob| glob.compile_matcher()))
            .transpose()?;

        Ok(self
            .document
            .runs
            .iter()
            .flat_map(|run| run.measurements.iter())
            .map(|measurement| measurement.name.as_str())
            .filter(|name| matcher.as_ref().map_or(true, |matcher| matcher.is_match(name)))
            .unique()
            .sorted()
            .collect_vec())
    }

    pub fn last_update(&self) -> EpochMillis {
        self.document.last_update
    }

    pub fn repo_url(&self) -> &str {
        &self.document.repo_url
    }

    pub fn suite(&self) -> &str {
        &self.document.suite
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn len(&self) -> usize {
        self.document.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.runs.is_empty()
    }

    pub fn into_runs(self) -> Vec<Run> {
        self.document.runs
    }
}

/// Transparent, thread safe wrapper over `HistoryStore`, appends from several
/// writers are serialized by a fair lock
#[derive(Debug)]
pub struct SharedStore<S: Storage = StorageAdapters>(Arc<FairMutex<HistoryStore<S>>>);

impl<S: Storage> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Storage> SharedStore<S> {
    pub fn new(store: HistoryStore<S>) -> Self {
        Self(Arc::new(FairMutex::new(store)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, HistoryStore<S>> {
        self.0.lock_arc()
    }

    pub fn append_run(&self, run: Run) -> Result<(), StoreError> {
        self.lock().append_run(run).map(|_| ())
    }

    /// Run `read` against the store while holding the lock
    pub fn read<R>(&self, read: impl FnOnce(&HistoryStore<S>) -> R) -> R {
        read(&self.lock())
    }

    pub fn last_update(&self) -> EpochMillis {
        self.lock().last_update()
    }

    /// Take the store back, all other handles must have been dropped
    pub fn into_inner(self) -> HistoryStore<S> {
        Arc::try_unwrap(self.0).unwrap_or_log().into_inner()
    }
}
