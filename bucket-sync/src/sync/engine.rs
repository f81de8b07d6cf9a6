use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bucket_sync_core::{
    CdnClient, Fingerprint, HeadResult, Md5ETag, ObjectStore, PutOptions, StoreError,
};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::content_type::content_type_for;
use super::paths::{invalidation_path, object_key};
use super::scheduler::{Scheduler, SchedulerError};
use super::walker::{FileRecord, WalkError, collect_files};
use crate::config::{FailurePolicy, InvalidationScope, SyncConfig};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("walk error: {0}")]
    Walk(#[from] WalkError),
    #[error("upload of {key} failed: {message}")]
    UploadFailed {
        key: String,
        message: String,
        report: Box<SyncReport>,
    },
}

impl SyncError {
    /// Partial results gathered before the run was aborted.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncError::UploadFailed { report, .. } => Some(report),
            SyncError::Walk(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0} has no recognized content type")]
    UnknownContentType(String),
    #[error("failed to read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    Completed,
    /// The source directory holds no files.
    NothingToUpload,
    /// Every file matched its remote copy.
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum InvalidationOutcome {
    Created { id: String, paths: Vec<String> },
    Failed { message: String, paths: Vec<String> },
}

/// Outcome of one run. Lists are append-only and in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub total: usize,
    pub needs_upload: usize,
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
    /// Uploads never started because the batch was aborted.
    pub skipped: Vec<String>,
    pub needs_invalidation: Vec<String>,
    pub invalidation: Option<InvalidationOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffDecision {
    /// Remote tag equals the local fingerprint.
    Unchanged,
    /// No remote object; nothing cached to evict.
    New,
    /// Remote object differs; a stale cached copy may exist.
    Changed,
}

impl DiffDecision {
    pub fn classify(local_tag: &str, remote: &HeadResult) -> Self {
        if !remote.exists {
            DiffDecision::New
        } else if remote.tag.as_deref() == Some(local_tag) {
            DiffDecision::Unchanged
        } else {
            DiffDecision::Changed
        }
    }
}

struct DiffOutcome {
    file: FileRecord,
    decision: Result<DiffDecision, UploadError>,
}

#[derive(Default)]
struct UploadPlan {
    files: Vec<FileRecord>,
    needs_invalidation: Vec<String>,
}

pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn ObjectStore>,
    cdn: Option<Arc<dyn CdnClient>>,
    fingerprint: Arc<dyn Fingerprint>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            cdn: None,
            fingerprint: Arc::new(Md5ETag),
        }
    }

    pub fn with_cdn(mut self, cdn: Arc<dyn CdnClient>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Arc<dyn Fingerprint>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let began = Instant::now();
        let files = collect_files(&self.config.source).await?;
        let mut report = SyncReport {
            total: files.len(),
            ..SyncReport::default()
        };
        if files.is_empty() {
            warn!(source = %self.config.source.display(), "nothing to upload");
            report.status = SyncStatus::NothingToUpload;
            return Ok(report);
        }

        let (plan, diff_failure) = if self.config.compare {
            info!(elapsed_ms = elapsed_ms(began), "compare begin");
            let outcome = self.diff_phase(files, &mut report).await;
            info!(elapsed_ms = elapsed_ms(began), "compare end");
            outcome
        } else {
            let plan = UploadPlan {
                needs_invalidation: files.iter().map(|file| file.key.clone()).collect(),
                files,
            };
            (plan, None)
        };
        report.needs_upload = plan.files.len();
        report.needs_invalidation = plan.needs_invalidation;

        if let Some((key, message)) = diff_failure {
            return Err(SyncError::UploadFailed {
                key,
                message,
                report: Box::new(report),
            });
        }
        if plan.files.is_empty() {
            if report.failed.is_empty() {
                warn!("nothing to upload after comparing tags");
                report.status = SyncStatus::UpToDate;
            } else {
                warn!(failed = ?report.failed, "nothing to upload; some files could not be read");
            }
            return Ok(report);
        }
        info!(
            total = report.total,
            need_upload = report.needs_upload,
            "files to upload"
        );

        info!(elapsed_ms = elapsed_ms(began), "upload begin");
        let first_failure = self.upload_phase(plan.files, &mut report).await;
        info!(elapsed_ms = elapsed_ms(began), "upload end");
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "some files failed to upload");
        }
        if let Some((key, message)) = first_failure {
            return Err(SyncError::UploadFailed {
                key,
                message,
                report: Box::new(report),
            });
        }

        self.invalidate_phase(&mut report, began).await;
        info!(elapsed_ms = elapsed_ms(began), "sync end");
        Ok(report)
    }

    /// Returns the plan and, under [`FailurePolicy::Fail`], the read failure
    /// that aborted the batch.
    async fn diff_phase(
        &self,
        files: Vec<FileRecord>,
        report: &mut SyncReport,
    ) -> (UploadPlan, Option<(String, String)>) {
        let scheduler = Scheduler::with_on_drained(self.config.compare_concurrency, || {
            debug!(phase = "compare", "batch drained");
        });
        let mut running = FuturesUnordered::new();
        for file in files {
            let store = Arc::clone(&self.store);
            let fingerprint = Arc::clone(&self.fingerprint);
            let key = file.key.clone();
            let remote_key = object_key(&self.config.prefix, &file.key);
            let task = scheduler.submit(move || diff_file(store, fingerprint, file, remote_key));
            running.push(async move { (key, task.await) });
        }
        scheduler.close();

        let mut plan = UploadPlan::default();
        let mut first_failure = None;
        while let Some((key, result)) = running.next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(SchedulerError::Aborted | SchedulerError::Closed) => {
                    report.skipped.push(key);
                    continue;
                }
            };
            match outcome.decision {
                Ok(DiffDecision::Unchanged) => {
                    debug!(key = %outcome.file.key, "unchanged");
                }
                Ok(DiffDecision::New) => {
                    if self.config.invalidation_scope == InvalidationScope::AllUploaded {
                        plan.needs_invalidation.push(outcome.file.key.clone());
                    }
                    plan.files.push(outcome.file);
                }
                Ok(DiffDecision::Changed) => {
                    plan.needs_invalidation.push(outcome.file.key.clone());
                    plan.files.push(outcome.file);
                }
                Err(err) => {
                    warn!(key = %outcome.file.key, error = %err, "failed to read local file");
                    if self.config.failure_policy == FailurePolicy::Fail && first_failure.is_none()
                    {
                        scheduler.abort();
                        first_failure = Some((outcome.file.key.clone(), err.to_string()));
                    }
                    report.failed.push(outcome.file.key);
                }
            }
        }
        scheduler.drained().await;
        (plan, first_failure)
    }

    /// Returns the failure that aborted the batch under [`FailurePolicy::Fail`].
    async fn upload_phase(
        &self,
        files: Vec<FileRecord>,
        report: &mut SyncReport,
    ) -> Option<(String, String)> {
        let scheduler = Scheduler::with_on_drained(self.config.upload_concurrency, || {
            debug!(phase = "upload", "batch drained");
        });
        let options = Arc::new(self.config.put_options());
        let mut running = FuturesUnordered::new();
        for file in files {
            let store = Arc::clone(&self.store);
            let options = Arc::clone(&options);
            let key = file.key.clone();
            let remote_key = object_key(&self.config.prefix, &file.key);
            let task = scheduler.submit(move || upload_file(store, file, remote_key, options));
            running.push(async move { (key, task.await) });
        }
        scheduler.close();

        let mut first_failure = None;
        while let Some((key, result)) = running.next().await {
            match result {
                Ok(Ok(remote_key)) => {
                    info!(key = %remote_key, "uploaded");
                    report.uploaded.push(key);
                }
                Ok(Err(err)) => {
                    warn!(key = %key, error = %err, "upload failed");
                    if self.config.failure_policy == FailurePolicy::Fail && first_failure.is_none()
                    {
                        scheduler.abort();
                        first_failure = Some((key.clone(), err.to_string()));
                    }
                    report.failed.push(key);
                }
                Err(SchedulerError::Aborted | SchedulerError::Closed) => {
                    report.skipped.push(key);
                }
            }
        }
        scheduler.drained().await;
        first_failure
    }

    async fn invalidate_phase(&self, report: &mut SyncReport, began: Instant) {
        let Some(distribution_id) = self.config.distribution_id.as_deref() else {
            return;
        };
        let Some(cdn) = self.cdn.as_ref() else {
            warn!("distribution id is set but no CDN client is configured");
            return;
        };

        let uploaded: HashSet<&str> = report.uploaded.iter().map(String::as_str).collect();
        let paths: Vec<String> = report
            .needs_invalidation
            .iter()
            .filter(|key| uploaded.contains(key.as_str()))
            .map(|key| invalidation_path(&self.config.prefix, key))
            .collect();
        if paths.is_empty() {
            debug!("no uploaded file needs invalidation");
            return;
        }

        info!(elapsed_ms = elapsed_ms(began), "invalidation begin");
        for path in &paths {
            info!(path = %path, "invalidating");
        }
        let outcome = match cdn
            .invalidate(distribution_id, &paths, &caller_reference())
            .await
        {
            Ok(id) => {
                info!(invalidation_id = %id, "invalidation created");
                InvalidationOutcome::Created { id, paths }
            }
            Err(err) => {
                warn!(error = %err, "create invalidation failed");
                InvalidationOutcome::Failed {
                    message: err.to_string(),
                    paths,
                }
            }
        };
        report.invalidation = Some(outcome);
        info!(elapsed_ms = elapsed_ms(began), "invalidation end");
    }
}

async fn diff_file(
    store: Arc<dyn ObjectStore>,
    fingerprint: Arc<dyn Fingerprint>,
    file: FileRecord,
    remote_key: String,
) -> DiffOutcome {
    let bytes = match tokio::fs::read(&file.local_path).await {
        Ok(bytes) => bytes,
        Err(source) => {
            let key = file.key.clone();
            return DiffOutcome {
                file,
                decision: Err(UploadError::Read { key, source }),
            };
        }
    };
    let local_tag = fingerprint.fingerprint(&bytes);
    let remote = store.head(&remote_key).await;
    DiffOutcome {
        file,
        decision: Ok(DiffDecision::classify(&local_tag, &remote)),
    }
}

async fn upload_file(
    store: Arc<dyn ObjectStore>,
    file: FileRecord,
    remote_key: String,
    options: Arc<PutOptions>,
) -> Result<String, UploadError> {
    let content_type = content_type_for(&file.key)
        .ok_or_else(|| UploadError::UnknownContentType(file.key.clone()))?;
    let body = tokio::fs::read(&file.local_path)
        .await
        .map_err(|source| UploadError::Read {
            key: file.key.clone(),
            source,
        })?;
    Ok(store.put(&remote_key, body, content_type, &options).await?)
}

// Unix milliseconds; unique per run.
fn caller_reference() -> String {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).to_string()
}

fn elapsed_ms(began: Instant) -> u64 {
    began.elapsed().as_millis() as u64
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
