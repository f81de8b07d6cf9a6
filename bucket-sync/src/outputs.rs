//! Step outputs for the CI runner.
//!
//! Values are appended to the file named by `GITHUB_OUTPUT`. Multi-line
//! values use the `name<<DELIM` form.

use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::sync::engine::{InvalidationOutcome, SyncReport};

pub const OUTPUT_FILE_ENV: &str = "GITHUB_OUTPUT";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to encode output {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write outputs to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputWriter {
    File(PathBuf),
    /// No output file; lines go to the log.
    Log,
}

impl OutputWriter {
    pub fn from_env() -> Self {
        match std::env::var_os(OUTPUT_FILE_ENV) {
            Some(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::Log,
        }
    }

    pub async fn write_report(&self, report: &SyncReport) -> Result<(), OutputError> {
        let pairs = render(report)?;
        match self {
            Self::Log => {
                for (name, value) in &pairs {
                    info!(output = *name, value = %value, "step output");
                }
                Ok(())
            }
            Self::File(path) => {
                let delimiter = delimiter();
                let text: String = pairs
                    .iter()
                    .map(|(name, value)| format_line(name, value, &delimiter))
                    .collect();
                append(path, &text).await
            }
        }
    }
}

/// Output name/value pairs for a finished (or aborted) run.
pub fn render(report: &SyncReport) -> Result<Vec<(&'static str, String)>, OutputError> {
    let json = |name: &'static str, keys: &[String]| {
        serde_json::to_string(keys).map_err(|source| OutputError::Encode { name, source })
    };
    let mut pairs = vec![
        ("total_files", report.total.to_string()),
        ("need_upload_files", report.needs_upload.to_string()),
        ("uploaded_files", json("uploaded_files", &report.uploaded)?),
        ("failed_files", json("failed_files", &report.failed)?),
    ];
    match &report.invalidation {
        Some(InvalidationOutcome::Created { id, .. }) => pairs.push(("invalidation_id", id.clone())),
        Some(InvalidationOutcome::Failed { message, .. }) => {
            pairs.push(("invalidation_error", message.clone()))
        }
        None => {}
    }
    Ok(pairs)
}

/// Whole report as one JSON object, for the run log.
pub fn summary_json(report: &SyncReport) -> Result<String, OutputError> {
    serde_json::to_string(report).map_err(|source| OutputError::Encode {
        name: "summary",
        source,
    })
}

pub fn format_line(name: &str, value: &str, delimiter: &str) -> String {
    if value.contains('\n') || value.contains('\r') {
        format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
    } else {
        format!("{name}={value}\n")
    }
}

fn delimiter() -> String {
    format!(
        "ghadelimiter_{}",
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    )
}

async fn append(path: &Path, text: &str) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(text.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)
}
