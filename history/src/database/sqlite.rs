use super::{Storage, StorageError};
use crate::{
    format::{render_timestamp, Document, FormatError},
    model::{Commit, Latency, LatencyUnit, Measurement, Person, Run},
};
use chrono::DateTime;
use rusqlite::{params, Connection, DropBehavior, OptionalExtension};
use std::path::Path;
use tracing::{debug, error, info, trace};

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        StorageError::SQLite(error)
    }
}

#[derive(Debug)]
pub struct SqliteStorage {
    connection: Connection,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let connection = Connection::open(path)?;
        info!(path = ?path, "Opened SQLite history");

        Self::with_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, StorageError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");
                    trace!("schema: {table}");

                    return Err(StorageError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(Self { connection })
    }

    pub fn close(mut self) -> Result<(), StorageError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                return Err(StorageError::SQLite(error));
            }
        }

        info!("Closed SQLite connection");

        Ok(())
    }

    fn load_measurements(&self, run: i64) -> Result<Vec<Measurement>, StorageError> {
        self.connection
            .prepare_cached(
                "select name, value, unit, stddev, mean_latency, mean_unit, rounds
                 from measurements where run = ? order by position",
            )?
            .query_map(params![run], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .map(|row| -> Result<Measurement, StorageError> {
                let (name, value, unit, stddev, mean, mean_unit, rounds) = row?;
                let mean_unit = mean_unit.parse::<LatencyUnit>().map_err(|_| FormatError::Field {
                    name: name.clone(),
                    field: "mean_unit",
                    value: mean_unit.clone(),
                })?;
                let sample_count = u64::try_from(rounds).map_err(|_| FormatError::Field {
                    name: name.clone(),
                    field: "rounds",
                    value: rounds.to_string(),
                })?;

                Ok(Measurement {
                    name,
                    value,
                    unit,
                    stddev,
                    mean_latency: Latency::new(mean, mean_unit),
                    sample_count,
                })
            })
            .collect()
    }
}

type RunRow = (i64, Commit, i64, String);

fn person(name: String, email: String, username: Option<String>) -> Person {
    Person {
        name,
        email,
        username,
    }
}

impl Storage for SqliteStorage {
    fn load(&mut self, suite: &str) -> Result<Option<Document>, StorageError> {
        let header = self
            .connection
            .prepare_cached("select repo_url, last_update from documents where suite = ?")?
            .query_row(params![suite], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?;

        let Some((repo_url, last_update)) = header else {
            info!(suite = suite, "No stored history for suite, starting empty");

            return Ok(None);
        };

        let rows = self
            .connection
            .prepare_cached(
                "select id, commit_id, message,
                        author_name, author_email, author_username,
                        committer_name, committer_email, committer_username,
                        timestamp, distinct_commit, tree_id, url, recorded_at, tool
                 from runs where suite = ? order by id",
            )?
            .query_map(params![suite], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    person(row.get(3)?, row.get(4)?, row.get(5)?),
                    person(row.get(6)?, row.get(7)?, row.get(8)?),
                    row.get::<_, String>(9)?,
                    row.get::<_, bool>(10)?,
                    row.get::<_, String>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, i64>(13)?,
                    row.get::<_, String>(14)?,
                ))
            })?
            .map(|row| -> Result<RunRow, StorageError> {
                let (
                    id,
                    commit_id,
                    message,
                    author,
                    committer,
                    timestamp,
                    distinct,
                    tree_id,
                    url,
                    recorded_at,
                    tool,
                ) = row?;
                let timestamp = DateTime::parse_from_rfc3339(&timestamp).map_err(|source| {
                    FormatError::Timestamp {
                        commit: commit_id.clone(),
                        value: timestamp.clone(),
                        source,
                    }
                })?;

                Ok((
                    id,
                    Commit {
                        id: commit_id,
                        message,
                        author,
                        committer,
                        timestamp,
                        distinct,
                        tree_id,
                        url,
                    },
                    recorded_at,
                    tool,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut runs = Vec::with_capacity(rows.len());
        for (id, commit, recorded_at, tool) in rows {
            runs.push(Run {
                commit,
                recorded_at,
                tool,
                measurements: self.load_measurements(id)?,
            });
        }

        info!(suite = suite, runs = runs.len(), "Loaded SQLite history");

        Ok(Some(Document {
            last_update,
            repo_url,
            suite: suite.to_owned(),
            runs,
            other_suites: Default::default(),
        }))
    }

    fn store(&mut self, document: &Document, appended: &[Run]) -> Result<(), StorageError> {
        let mut tx = self.connection.transaction()?;
        tx.set_drop_behavior(DropBehavior::Rollback);

        tx.prepare_cached(
            "insert into documents (suite, repo_url, last_update) values (?, ?, ?)
             on conflict (suite) do update
             set repo_url = excluded.repo_url, last_update = excluded.last_update",
        )?
        .execute(params![
            document.suite.as_str(),
            document.repo_url.as_str(),
            document.last_update
        ])?;

        for run in appended {
            let id: i64 = tx
                .prepare_cached(
                    "insert into runs
                    (suite, commit_id, message,
                     author_name, author_email, author_username,
                     committer_name, committer_email, committer_username,
                     timestamp, distinct_commit, tree_id, url, recorded_at, tool)
                    values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    returning id",
                )?
                .query_row(
                    params![
                        document.suite.as_str(),
                        run.commit.id.as_str(),
                        run.commit.message.as_str(),
                        run.commit.author.name.as_str(),
                        run.commit.author.email.as_str(),
                        run.commit.author.username.as_deref(),
                        run.commit.committer.name.as_str(),
                        run.commit.committer.email.as_str(),
                        run.commit.committer.username.as_deref(),
                        render_timestamp(&run.commit),
                        run.commit.distinct,
                        run.commit.tree_id.as_str(),
                        run.commit.url.as_str(),
                        run.recorded_at,
                        run.tool.as_str(),
                    ],
                    |row| row.get(0),
                )?;

            for (position, measurement) in run.measurements.iter().enumerate() {
                let position = i64::try_from(position).map_err(|_| FormatError::Field {
                    name: measurement.name.clone(),
                    field: "position",
                    value: position.to_string(),
                })?;
                let rounds =
                    i64::try_from(measurement.sample_count).map_err(|_| FormatError::Field {
                        name: measurement.name.clone(),
                        field: "rounds",
                        value: measurement.sample_count.to_string(),
                    })?;

                tx.prepare_cached(
                    "insert into measurements
                    (run, position, name, value, unit, stddev, mean_latency, mean_unit, rounds)
                    values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )?
                .execute(params![
                    id,
                    position,
                    measurement.name.as_str(),
                    measurement.value,
                    measurement.unit.as_str(),
                    measurement.stddev,
                    measurement.mean_latency.value,
                    measurement.mean_latency.unit.as_str(),
                    rounds,
                ])?;
            }

            debug!(id = id, commit = %run.commit.id, "Inserted run");
        }

        tx.commit()?;

        info!("Stored {} runs", appended.len());

        Ok(())
    }
}

pub const SQL_SCHEMA: [&str; 3] = [
    "create table if not exists documents (
    suite text primary key,
    repo_url text not null,
    last_update integer not null
);",
    "create table if not exists runs (
    id integer primary key,
    suite text not null references documents (suite),
    commit_id text not null,
    message text not null,

    author_name text not null,
    author_email text not null,
    author_username text,
    committer_name text not null,
    committer_email text not null,
    committer_username text,

    timestamp text not null,
    distinct_commit integer not null,
    tree_id text not null,
    url text not null,
    recorded_at integer not null,
    tool text not null,

    unique (suite, commit_id)
);",
    "create table if not exists measurements (
    id integer primary key,
    run integer not null references runs (id),
    position integer not null,

    name text not null,
    value real not null,
    unit text not null,
    stddev real not null,
    mean_latency real not null,
    mean_unit text not null,
    rounds integer not null,

    unique (run, name)
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
