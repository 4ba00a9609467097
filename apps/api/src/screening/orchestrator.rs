//! Batch Orchestrator: runs many records through extraction and scoring with bounded
//! concurrency.
//!
//! One bad record never aborts the batch: every input yields exactly one
//! `ProcessedCandidate`, in input order. Only caller bugs (bad requirements, a
//! concurrency limit outside `1..=max_concurrency`) fail the whole call, and they fail
//! before any model call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::llm_client::LlmClient;
use crate::models::candidate::{ProcessingStage, RecordProcessingFailure};
use crate::models::job::JobRequirements;
use crate::models::processed::{ProcessedCandidate, ProcessingStatus};
use crate::models::record::RawRecord;
use crate::screening::extraction::ExtractionEngine;
use crate::screening::scoring::ScoringEngine;
use crate::screening::ScreeningError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningMode {
    /// Extraction call, then a scoring call.
    #[default]
    TwoStep,
    /// One extract-and-score call per record.
    Fused,
}

/// Ceiling on in-flight records per batch unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub mode: ScreeningMode,
    /// In fused mode, retry a failed record through the two-step path.
    pub fused_fallback: bool,
    /// Largest concurrency limit a caller may ask for.
    pub max_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: ScreeningMode::default(),
            fused_fallback: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub partial: usize,
    pub pending: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ProcessedCandidate]) -> Self {
        results.iter().fold(
            BatchSummary {
                total: results.len(),
                ..Default::default()
            },
            |mut summary, candidate| {
                match candidate.status() {
                    ProcessingStatus::Success => summary.succeeded += 1,
                    ProcessingStatus::Failed => summary.failed += 1,
                    ProcessingStatus::Partial => summary.partial += 1,
                    ProcessingStatus::Pending => summary.pending += 1,
                }
                summary
            },
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cancellation
// ────────────────────────────────────────────────────────────────────────────

/// Cancels a running batch. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Stops scheduling new records; in-flight records are abandoned and come back `pending`.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Cancels the batch when dropped, so an abandoned caller does not leave work running.
struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// Resolves once cancellation is requested. Never resolves if every handle is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

/// A batch running in the background.
pub struct BatchHandle {
    cancel: CancelHandle,
    task: JoinHandle<Vec<ProcessedCandidate>>,
}

impl BatchHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<Vec<ProcessedCandidate>, ScreeningError> {
        self.task
            .await
            .map_err(|err| ScreeningError::Batch(err.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BatchOrchestrator {
    extractor: ExtractionEngine,
    scorer: ScoringEngine,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(llm: LlmClient, options: BatchOptions) -> Self {
        Self {
            extractor: ExtractionEngine::new(llm.clone()),
            scorer: ScoringEngine::new(llm),
            options,
        }
    }

    #[cfg(test)]
    pub fn with_clock(self, clock: crate::screening::Clock) -> Self {
        Self {
            extractor: self.extractor.with_clock(clock),
            scorer: self.scorer.with_clock(clock),
            options: self.options,
        }
    }

    pub fn extractor(&self) -> &ExtractionEngine {
        &self.extractor
    }

    /// Processes every record and returns one result per input, in input order.
    ///
    /// Dropping the returned future cancels the batch.
    pub async fn process_batch(
        &self,
        records: Vec<RawRecord>,
        job: &JobRequirements,
        concurrency_limit: usize,
    ) -> Result<Vec<ProcessedCandidate>, ScreeningError> {
        let handle = self.spawn_batch(records, job.clone(), concurrency_limit)?;
        let _guard = CancelOnDrop(handle.cancel_handle());
        handle.join().await
    }

    /// Like `process_batch`, but runs on a background task that can be cancelled.
    pub fn spawn_batch(
        &self,
        records: Vec<RawRecord>,
        job: JobRequirements,
        concurrency_limit: usize,
    ) -> Result<BatchHandle, ScreeningError> {
        self.check_batch(&job, concurrency_limit)?;
        let (cancel, signal) = cancellation();
        let this = self.clone();
        let task = tokio::spawn(async move {
            this.run(records, Arc::new(job), concurrency_limit, signal)
                .await
        });
        Ok(BatchHandle { cancel, task })
    }

    /// Screens one record. Never fails: problems are encoded in the result.
    pub async fn process_record(
        &self,
        record: &RawRecord,
        job: &JobRequirements,
    ) -> ProcessedCandidate {
        match self.options.mode {
            ScreeningMode::TwoStep => self.two_step(record, job).await,
            // Empty records fail in extraction without a model call.
            ScreeningMode::Fused if record.is_empty() => self.two_step(record, job).await,
            ScreeningMode::Fused => match self.scorer.extract_and_score(record, job).await {
                Ok(processed) => processed,
                Err(err) if self.options.fused_fallback => {
                    warn!(
                        source_id = %record.source_id,
                        "fused screening failed, falling back to two calls: {err}"
                    );
                    self.two_step(record, job).await
                }
                Err(err) => {
                    warn!(source_id = %record.source_id, "fused screening failed: {err}");
                    ProcessedCandidate::failed(
                        record.source_id.clone(),
                        err.to_failure(ProcessingStage::Screening),
                    )
                }
            },
        }
    }

    async fn two_step(&self, record: &RawRecord, job: &JobRequirements) -> ProcessedCandidate {
        let extraction = self.extractor.extract(record).await;
        if !extraction.is_success() {
            return ProcessedCandidate::from_failed_extraction(extraction);
        }

        match self.scorer.score(&extraction, job).await {
            Ok(fit) => ProcessedCandidate::success(extraction, fit),
            Err(err) => {
                warn!(source_id = %record.source_id, "scoring failed: {err}");
                ProcessedCandidate::partial(extraction, err.to_failure(ProcessingStage::Scoring))
            }
        }
    }

    async fn run(
        &self,
        records: Vec<RawRecord>,
        job: Arc<JobRequirements>,
        concurrency_limit: usize,
        mut cancel: CancelSignal,
    ) -> Vec<ProcessedCandidate> {
        let total = records.len();
        info!(
            records = total,
            concurrency_limit,
            mode = ?self.options.mode,
            "batch started"
        );

        let source_ids: Vec<String> = records.iter().map(|r| r.source_id.clone()).collect();
        let mut slots: Vec<Option<ProcessedCandidate>> = vec![None; total];
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let mut workers = JoinSet::new();
        let mut task_index = HashMap::with_capacity(total);
        let mut cancelled = false;

        for (idx, record) in records.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let this = self.clone();
            let job = Arc::clone(&job);
            let task = workers.spawn(async move {
                let _permit = permit;
                (idx, this.process_record(&record, &job).await)
            });
            task_index.insert(task.id(), idx);
        }

        if cancelled {
            workers.abort_all();
        }

        loop {
            let joined = if cancelled {
                workers.join_next().await
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        workers.abort_all();
                        continue;
                    }
                    joined = workers.join_next() => joined,
                }
            };

            match joined {
                None => break,
                Some(Ok((idx, processed))) => slots[idx] = Some(processed),
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => {
                    error!("screening worker died: {err}");
                    if let Some(&idx) = task_index.get(&err.id()) {
                        slots[idx] = Some(worker_died(&source_ids[idx]));
                    }
                }
            }
        }

        let results: Vec<ProcessedCandidate> = slots
            .into_iter()
            .zip(source_ids)
            .map(|(slot, source_id)| match slot {
                Some(processed) => processed,
                None if cancelled => ProcessedCandidate::pending(source_id),
                None => worker_died(&source_id),
            })
            .collect();

        let summary = BatchSummary::from_results(&results);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            partial = summary.partial,
            pending = summary.pending,
            cancelled,
            "batch finished"
        );
        results
    }

    fn check_batch(
        &self,
        job: &JobRequirements,
        concurrency_limit: usize,
    ) -> Result<(), ScreeningError> {
        job.validate().map_err(ScreeningError::InvalidRequirements)?;
        let max = self.options.max_concurrency.min(Semaphore::MAX_PERMITS);
        if concurrency_limit == 0 || concurrency_limit > max {
            return Err(ScreeningError::InvalidConcurrency { max });
        }
        Ok(())
    }
}

fn worker_died(source_id: &str) -> ProcessedCandidate {
    ProcessedCandidate::failed(
        source_id,
        RecordProcessingFailure::orchestration("worker task terminated unexpectedly"),
    )
}
