use benchtrack::{
    config::{ConfigErrors, HistoryConfig, StorageConfig},
    database::{StorageAdapters, StorageError},
    format::{parse_commit, FormatError},
    ingest::{IngestorError, Ingestors},
    model::{CommitWindow, Run},
    store::{HistoryStore, StoreError},
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    error::Error as _,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE: &str = "dev/bench/data.js";

#[derive(Parser, Debug)]
#[command(author, version, about = "Append-only history of benchmark runs keyed by commit")]
struct Cli {
    /// YAML config selecting suite and storage
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// history to operate on, `.db`/`.sqlite` selects SQLite, anything else JSON
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// series under `entries` to operate on
    #[arg(long, global = true)]
    suite: Option<String>,

    /// repository url recorded in a new history
    #[arg(long, global = true)]
    repo_url: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a run from a commit object and the benchmark tool's output
    Append {
        /// commit object as found in the push event (`head_commit`)
        #[arg(long)]
        commit: PathBuf,
        /// output of the benchmark tool
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Ingestors::Pytest)]
        ingestor: Ingestors,
        /// tool name to record instead of the ingestor's
        #[arg(long)]
        tool: Option<String>,
        /// capture time in epoch milliseconds, defaults to now
        #[arg(long)]
        date: Option<i64>,
    },
    /// List recorded runs in append order
    List {
        /// only commits at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// only commits before this RFC 3339 timestamp
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Print the value/stddev series of one test
    Series { test: String },
    /// List the recorded test names
    Tests {
        #[arg(long)]
        glob: Option<String>,
    },
    /// Print a single run
    Show { commit: String },
    /// Append the runs of another history that are not recorded yet
    Import {
        source: PathBuf,
        /// suite to read from the source, defaults to the target suite
        #[arg(long)]
        source_suite: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Invalid configuration")]
    Config(#[from] ConfigErrors),
    #[error("History operation failed")]
    Store(#[from] StoreError),
    #[error("Failed to open storage")]
    Storage(#[from] StorageError),
    #[error("Failed to ingest tool output")]
    Ingest(#[from] IngestorError),
    #[error("Commit metadata is malformed")]
    Commit(#[from] FormatError),
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Commit {0} is not recorded")]
    UnknownCommit(String),
    #[error("Failed to write output")]
    Output(#[from] io::Error),
    #[error("Failed to write JSON output")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write CSV output")]
    Csv(#[from] csv::Error),
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(cli: &Cli) -> Result<HistoryConfig, CliError> {
    let mut config = match (&cli.config, &cli.store) {
        (Some(path), store) => {
            let mut config = HistoryConfig::load(path)?;
            if let Some(store) = store {
                config.storage = StorageConfig::infer(store.clone());
            }

            config
        }
        (None, Some(store)) => HistoryConfig::for_store(store.clone()),
        (None, None) => HistoryConfig::for_store(PathBuf::from(DEFAULT_STORE)),
    };

    if let Some(suite) = &cli.suite {
        config.suite = suite.clone();
    }
    if let Some(repo_url) = &cli.repo_url {
        config.repo_url = repo_url.clone();
    }

    if config.preflight_checks() {
        return Err(ConfigErrors::FailedPreflight.into());
    }

    Ok(config)
}

fn open(config: &HistoryConfig) -> Result<HistoryStore, CliError> {
    let storage = StorageAdapters::load(&config.storage)?;

    Ok(HistoryStore::open(storage, &config.suite, &config.repo_url)?)
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

fn write_run_line(out: &mut impl Write, run: &Run) -> io::Result<()> {
    let recorded_at = DateTime::<Utc>::from_timestamp_millis(run.recorded_at)
        .map(|date| date.to_rfc3339())
        .unwrap_or_else(|| run.recorded_at.to_string());

    writeln!(
        out,
        "{}  {}  recorded {}  {}  {} benches  {}",
        short_id(run.commit_id()),
        run.commit.timestamp.to_rfc3339(),
        recorded_at,
        run.tool,
        run.measurements.len(),
        run.commit.message.lines().next().unwrap_or_default()
    )
}

fn write_run(out: &mut impl Write, run: &Run) -> io::Result<()> {
    writeln!(out, "commit    {}", run.commit.id)?;
    writeln!(
        out,
        "author    {} <{}>",
        run.commit.author.name, run.commit.author.email
    )?;
    writeln!(out, "timestamp {}", run.commit.timestamp.to_rfc3339())?;
    writeln!(out, "recorded  {}", run.recorded_at)?;
    writeln!(out, "tool      {}", run.tool)?;
    writeln!(out, "message   {}", run.commit.message)?;

    for measurement in &run.measurements {
        writeln!(
            out,
            "  {}: {} {} (stddev {}, mean {}, rounds {})",
            measurement.name,
            measurement.value,
            measurement.unit,
            measurement.stddev,
            measurement.mean_latency,
            measurement.sample_count
        )?;
    }

    Ok(())
}

fn execute(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let mut store = open(&config)?;
    let mut out = io::stdout().lock();

    let format = match (cli.format, &cli.command) {
        (OutputFormat::Csv, Command::Series { .. }) => OutputFormat::Csv,
        (OutputFormat::Csv, _) => {
            warn!("CSV output is only available for series, falling back to text");
            OutputFormat::Text
        }
        (format, _) => format,
    };

    match cli.command {
        Command::Append {
            commit,
            input,
            ingestor,
            tool,
            date,
        } => {
            let commit = parse_commit(&read(&commit)?)?;
            let measurements = ingestor.ingest(&read(&input)?)?;
            let run = store.append_run(Run {
                commit,
                recorded_at: date.unwrap_or_else(|| Utc::now().timestamp_millis()),
                tool: tool.unwrap_or_else(|| ingestor.tool().to_owned()),
                measurements,
            })?;

            match format {
                OutputFormat::Json => serde_json::to_writer_pretty(&mut out, run)?,
                _ => write_run_line(&mut out, run)?,
            }
        }
        Command::List { since, until } => {
            let window = (since.is_some() || until.is_some()).then(|| CommitWindow::new(since, until));
            let runs = store.list_runs(window);

            match format {
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &runs.collect::<Vec<_>>())?
                }
                _ => {
                    for run in runs {
                        write_run_line(&mut out, run)?;
                    }
                }
            }
        }
        Command::Series { test } => {
            let series = store.get_measurement_series(&test)?;

            match format {
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &series.collect::<Vec<_>>())?
                }
                OutputFormat::Csv => {
                    let mut writer = csv::Writer::from_writer(&mut out);
                    for point in series {
                        writer.serialize(point)?;
                    }
                    writer.flush()?;
                }
                OutputFormat::Text => {
                    for point in series {
                        writeln!(
                            out,
                            "{}  {}  {}  ± {}",
                            short_id(point.commit_id),
                            point.recorded_at,
                            point.value,
                            point.stddev
                        )?;
                    }
                }
            }
        }
        Command::Tests { glob } => {
            let names = store.test_names(glob.as_deref())?;

            match format {
                OutputFormat::Json => serde_json::to_writer_pretty(&mut out, &names)?,
                _ => {
                    for name in names {
                        writeln!(out, "{name}")?;
                    }
                }
            }
        }
        Command::Show { commit } => {
            let run = store
                .get_run(&commit)
                .ok_or_else(|| CliError::UnknownCommit(commit.clone()))?;

            match format {
                OutputFormat::Json => serde_json::to_writer_pretty(&mut out, run)?,
                _ => write_run(&mut out, run)?,
            }
        }
        Command::Import {
            source,
            source_suite,
        } => {
            // a missing source is an error, not an empty history
            if !source.is_file() {
                return Err(CliError::Read {
                    path: source,
                    source: io::Error::new(io::ErrorKind::NotFound, "import source is not a file"),
                });
            }

            let suite = source_suite.unwrap_or_else(|| config.suite.clone());
            let storage = StorageAdapters::load(&StorageConfig::infer(source.clone()))?;
            let runs = HistoryStore::open(storage, &suite, "")?.into_runs();
            info!(source = ?source, runs = runs.len(), "Read source history");

            let summary = store.import_from(runs)?;
            writeln!(
                out,
                "appended {} runs, skipped {} already recorded",
                summary.appended, summary.skipped
            )?;
        }
    }

    if format == OutputFormat::Json {
        writeln!(out)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut message = error.to_string();
            let mut source = error.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            error!("{message}");

            ExitCode::FAILURE
        }
    }
}
