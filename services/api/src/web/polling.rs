//! services/api/src/web/polling.rs
//!
//! The job status poller: one asynchronous task per outstanding generation
//! job, all bookkeeping owned by a single `RunTracker` keyed by run id.
//! Cancellation is removal from the tracker plus a `CancellationToken`
//! cancel, never a closure-captured timer handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image_studio_core::chain::GenerationChain;
use image_studio_core::domain::{GeneratedImage, JobStatus, JobStatusReport};
use image_studio_core::ports::{DatabaseService, PortResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed polling cadence for outstanding jobs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Transport-level failures are retried this many times per poll...
pub const TRANSPORT_RETRY_LIMIT: u32 = 3;
/// ...with this fixed delay between retries.
pub const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Completed runs stay queryable for this long before being swept.
const RUN_RETENTION_SECS: i64 = 3600;

//=========================================================================================
// Run / Slot State
//=========================================================================================

/// The state of one result slot. Results are always written back to their
/// originating slot index, so out-of-order completion cannot scramble the
/// association between a request and its result. A slot leaves `Queued` at
/// most once and never leaves a terminal state.
#[derive(Debug, Clone)]
pub enum SlotState {
    Queued { job_id: String },
    Succeeded { image_url: String },
    Failed { message: String },
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotState::Queued { .. })
    }
}

/// One generation request: the prompt, who asked, and a fixed set of result
/// slots. The `CancellationToken` stops all of the run's poll tasks.
pub struct RunEntry {
    pub user_id: Uuid,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    pub slots: Mutex<Vec<SlotState>>,
}

/// The single owner of all in-flight runs: `{run_id -> entry}`.
#[derive(Default)]
pub struct RunTracker {
    runs: Mutex<HashMap<Uuid, Arc<RunEntry>>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new run and returns its id. Stale runs are swept
    /// opportunistically on insert.
    pub async fn insert(
        &self,
        user_id: Uuid,
        prompt: String,
        slots: Vec<SlotState>,
    ) -> (Uuid, Arc<RunEntry>) {
        let entry = Arc::new(RunEntry {
            user_id,
            prompt,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            slots: Mutex::new(slots),
        });
        let run_id = Uuid::new_v4();

        let mut runs = self.runs.lock().await;
        let cutoff = Utc::now().timestamp() - RUN_RETENTION_SECS;
        runs.retain(|_, entry| {
            let keep = entry.created_at.timestamp() > cutoff;
            if !keep {
                entry.cancel.cancel();
            }
            keep
        });
        runs.insert(run_id, entry.clone());
        (run_id, entry)
    }

    pub async fn get(&self, run_id: Uuid) -> Option<Arc<RunEntry>> {
        self.runs.lock().await.get(&run_id).cloned()
    }

    /// Cancels a run's outstanding poll tasks and forgets it. Only the
    /// owning user may cancel. Returns whether a run was removed.
    pub async fn cancel(&self, run_id: Uuid, user_id: Uuid) -> bool {
        let mut runs = self.runs.lock().await;
        let owned = runs
            .get(&run_id)
            .map(|entry| entry.user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return false;
        }
        if let Some(entry) = runs.remove(&run_id) {
            entry.cancel.cancel();
        }
        true
    }
}

//=========================================================================================
// Poll Task
//=========================================================================================

/// Spawns the polling task for one queued job.
///
/// The task fires at a fixed interval until the job reaches a terminal
/// state or the run is cancelled. On success, the result URL is written to
/// the job's slot and a gallery record is persisted fire-and-forget.
pub fn spawn_poll_task(
    db: Arc<dyn DatabaseService>,
    chain: Arc<GenerationChain>,
    run: Arc<RunEntry>,
    slot: usize,
    candidate: usize,
    job_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let cancel = run.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%job_id, "poll task cancelled");
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            let report = match status_with_retry(&chain, candidate, &job_id, &cancel).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(%job_id, error = %e, "giving up on job");
                    fail_slot(&run, slot, e.to_string()).await;
                    return;
                }
            };

            match report.status {
                JobStatus::Pending => continue,
                JobStatus::Succeeded => {
                    match report.image_url {
                        Some(url) => {
                            if resolve_slot(&run, slot, url.clone()).await {
                                persist_result(db.as_ref(), &run, &url).await;
                            }
                        }
                        None => {
                            fail_slot(&run, slot, "job succeeded without an image URL".to_string())
                                .await;
                        }
                    }
                    return;
                }
                JobStatus::Failed => {
                    fail_slot(&run, slot, "generation job failed".to_string()).await;
                    return;
                }
            }
        }
    })
}

/// One status query with up to `TRANSPORT_RETRY_LIMIT` retries on
/// transport-level failures. Non-transient errors (including an unknown
/// status string) are terminal immediately.
async fn status_with_retry(
    chain: &GenerationChain,
    candidate: usize,
    job_id: &str,
    cancel: &CancellationToken,
) -> PortResult<JobStatusReport> {
    let mut attempt = 0;
    loop {
        match chain.job_status(candidate, job_id).await {
            Ok(report) => return Ok(report),
            Err(e) if e.is_transient() && attempt < TRANSPORT_RETRY_LIMIT => {
                attempt += 1;
                warn!(%job_id, error = %e, attempt, "status check failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(e),
                    _ = tokio::time::sleep(TRANSPORT_RETRY_DELAY) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Writes the result URL into a slot, but only if the slot is still queued
/// (at most one transition out of `Queued`).
async fn resolve_slot(run: &RunEntry, slot: usize, image_url: String) -> bool {
    let mut slots = run.slots.lock().await;
    match slots.get(slot) {
        Some(SlotState::Queued { .. }) => {
            slots[slot] = SlotState::Succeeded { image_url };
            true
        }
        _ => false,
    }
}

async fn fail_slot(run: &RunEntry, slot: usize, message: String) {
    let mut slots = run.slots.lock().await;
    if let Some(SlotState::Queued { .. }) = slots.get(slot) {
        slots[slot] = SlotState::Failed { message };
    }
}

/// Persists the gallery record and bumps the profile counter. Both writes
/// are fire-and-forget: a failure is logged but the slot stays resolved.
pub async fn persist_result(db: &dyn DatabaseService, run: &RunEntry, image_url: &str) {
    let record = GeneratedImage {
        id: Uuid::new_v4(),
        user_id: run.user_id,
        prompt: run.prompt.clone(),
        image_url: image_url.to_string(),
        created_at: Utc::now(),
    };
    if let Err(e) = db.save_generated_image(&record).await {
        warn!(user_id = %run.user_id, error = %e, "failed to save gallery record");
    }
    if let Err(e) = db.increment_images_generated(run.user_id).await {
        warn!(user_id = %run.user_id, error = %e, "failed to bump images_generated");
    }
}
