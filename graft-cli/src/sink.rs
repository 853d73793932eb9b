//! Result sinks: durable persistence of the run report.

use std::path::{Path, PathBuf};

use graft_types::RunReport;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persists a finished run report.
pub trait ResultSink {
    fn persist(&self, report: &RunReport) -> SinkResult<()>;
}

/// Writes `entities.json`, `relations.json`, and `summary.json` into
/// one output directory, creating it if absent.
pub struct JsonFileSink {
    directory: PathBuf,
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    run_id: &'a graft_types::RunId,
    started_at: &'a chrono::DateTime<chrono::Utc>,
    finished_at: &'a chrono::DateTime<chrono::Utc>,
    summary: &'a graft_types::RunSummary,
}

impl JsonFileSink {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The directory this sink writes into.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn write_json(&self, name: &str, value: &impl Serialize) -> SinkResult<PathBuf> {
        let path = self.directory.join(name);
        let body = serde_json::to_vec_pretty(value)?;
        std::fs::write(&path, body).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl ResultSink for JsonFileSink {
    fn persist(&self, report: &RunReport) -> SinkResult<()> {
        std::fs::create_dir_all(&self.directory).map_err(|source| SinkError::Io {
            path: self.directory.clone(),
            source,
        })?;

        self.write_json("entities.json", &report.entities)?;
        self.write_json("relations.json", &report.relations)?;
        self.write_json(
            "summary.json",
            &SummaryFile {
                run_id: &report.run_id,
                started_at: &report.started_at,
                finished_at: &report.finished_at,
                summary: &report.summary,
            },
        )?;

        info!(
            directory = %self.directory.display(),
            entities = report.entities.len(),
            relations = report.relations.len(),
            "persisted result logs"
        );
        Ok(())
    }
}
