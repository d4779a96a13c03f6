//! Bounded-concurrency artifact fetching.
//!
//! A fixed pool of workers drains a shared queue of paths. Every attempt
//! ends in one of four outcomes (loaded, missing, failed, invalid) and each
//! one counts toward progress. None of them aborts the batch: a missing or
//! corrupt artifact only means the runtime will not find that file.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use oleander_common::{artifact, ArtifactKind, ArtifactLayout, ArtifactPath};
use oleander_config::FetchConfig;
use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::error::LoaderError;
use crate::transport::Transport;

/// Progress callback: `(loaded, total)` after every completed attempt.
///
/// Called while the batch lock is held, so calls arrive with strictly
/// increasing `loaded` and the last one reports `loaded == total`. The
/// callback must not block.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Knobs for one [`fetch_many`] batch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Number of invalid primary artifacts logged individually.
    pub max_invalid_reports: usize,
    /// Wall-clock limit for the whole batch.
    pub timeout: Duration,
    /// Layout used to tell primary artifacts from variants.
    pub layout: ArtifactLayout,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default(), ArtifactLayout::default())
    }
}

impl FetchOptions {
    /// Builds options from the `[fetch]` config section.
    pub fn from_config(config: &FetchConfig, layout: ArtifactLayout) -> Self {
        Self {
            workers: config.workers,
            max_invalid_reports: config.max_invalid_reports,
            timeout: config.timeout(),
            layout,
        }
    }
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Retrieved artifacts that passed validation.
    pub files: BTreeMap<ArtifactPath, Arc<[u8]>>,
    /// Paths that were not found or could not be retrieved.
    pub missing: Vec<ArtifactPath>,
    /// Primary artifacts rejected by the header check.
    pub invalid: Vec<ArtifactPath>,
    /// Number of paths attempted.
    pub total: usize,
}

/// Shared state of a running batch.
struct Batch {
    queue: VecDeque<ArtifactPath>,
    /// Set when the batch timed out. No new attempt starts and finished
    /// attempts are neither recorded nor reported.
    cancelled: bool,
    loaded: usize,
    report: FetchReport,
}

enum Attempt {
    Loaded(Vec<u8>),
    Missing,
    Failed(String),
    Invalid(artifact::ArtifactDefect),
}

/// Fetches `paths` with at most `options.workers` requests in flight.
///
/// The caller passes only paths it has not cached yet. Returns
/// [`LoaderError::Timeout`] if the batch outlives `options.timeout`. Queued
/// paths are then dropped and requests already in flight are left to finish
/// on their own, unrecorded.
pub async fn fetch_many(
    transport: Arc<dyn Transport>,
    paths: Vec<ArtifactPath>,
    options: &FetchOptions,
    progress: Option<ProgressFn>,
) -> Result<FetchReport, LoaderError> {
    let total = paths.len();
    if total == 0 {
        return Ok(FetchReport::default());
    }

    let batch = Arc::new(Mutex::new(Batch {
        queue: paths.into(),
        cancelled: false,
        loaded: 0,
        report: FetchReport {
            total,
            ..FetchReport::default()
        },
    }));
    let worker_count = options.workers.clamp(1, total);
    tracing::debug!(total, workers = worker_count, "starting fetch batch");

    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        workers.spawn(run_worker(
            Arc::clone(&transport),
            Arc::clone(&batch),
            options.clone(),
            progress.clone(),
        ));
    }

    if tokio::time::timeout(options.timeout, drain(&mut workers))
        .await
        .is_err()
    {
        {
            let mut state = batch.lock();
            state.cancelled = true;
            state.queue.clear();
        }
        workers.detach_all();
        tracing::warn!(total, timeout = ?options.timeout, "fetch batch timed out");
        return Err(LoaderError::Timeout {
            after: options.timeout,
        });
    }

    let report = std::mem::take(&mut batch.lock().report);
    if report.invalid.len() > options.max_invalid_reports {
        tracing::warn!(
            invalid = report.invalid.len(),
            unreported = report.invalid.len() - options.max_invalid_reports,
            "further artifacts failed validation; library and runtime versions may not match"
        );
    }
    tracing::debug!(
        fetched = report.files.len(),
        missing = report.missing.len(),
        invalid = report.invalid.len(),
        "fetch batch finished"
    );
    Ok(report)
}

async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
    }
}

async fn run_worker(
    transport: Arc<dyn Transport>,
    batch: Arc<Mutex<Batch>>,
    options: FetchOptions,
    progress: Option<ProgressFn>,
) {
    loop {
        let path = {
            let mut state = batch.lock();
            if state.cancelled {
                break;
            }
            match state.queue.pop_front() {
                Some(path) => path,
                None => break,
            }
        };
        let kind = options.layout.kind_of(&path);
        let attempt = attempt(transport.as_ref(), &path).await;

        let mut state = batch.lock();
        if state.cancelled {
            break;
        }
        record(&mut state, path, kind, attempt, options.max_invalid_reports);
        state.loaded += 1;
        if let Some(progress) = &progress {
            progress(state.loaded, state.report.total);
        }
    }
}

async fn attempt(transport: &dyn Transport, path: &ArtifactPath) -> Attempt {
    match transport.get(path.as_str()).await {
        Ok(Some(bytes)) => match artifact::inspect(&bytes) {
            Ok(()) => Attempt::Loaded(bytes),
            Err(defect) => Attempt::Invalid(defect),
        },
        Ok(None) => Attempt::Missing,
        Err(e) => Attempt::Failed(e.to_string()),
    }
}

fn record(
    state: &mut Batch,
    path: ArtifactPath,
    kind: ArtifactKind,
    attempt: Attempt,
    max_invalid_reports: usize,
) {
    let report = &mut state.report;
    match (attempt, kind) {
        (Attempt::Loaded(bytes), _) => {
            report.files.insert(path, Arc::from(bytes));
        }
        (Attempt::Missing, ArtifactKind::Primary) => {
            tracing::warn!(path = %path, "primary artifact not found; assuming it is provided elsewhere");
            report.missing.push(path);
        }
        (Attempt::Failed(reason), ArtifactKind::Primary) => {
            tracing::warn!(path = %path, %reason, "primary artifact fetch failed");
            report.missing.push(path);
        }
        (Attempt::Missing, ArtifactKind::Variant) => {
            report.missing.push(path);
        }
        (Attempt::Failed(reason), ArtifactKind::Variant) => {
            tracing::debug!(path = %path, %reason, "variant artifact fetch failed");
            report.missing.push(path);
        }
        (Attempt::Invalid(defect), ArtifactKind::Primary) => {
            if report.invalid.len() < max_invalid_reports {
                tracing::warn!(
                    path = %path,
                    %defect,
                    "artifact failed validation; library and runtime versions may not match"
                );
            }
            report.invalid.push(path);
        }
        (Attempt::Invalid(_), ArtifactKind::Variant) => {}
    }
}
