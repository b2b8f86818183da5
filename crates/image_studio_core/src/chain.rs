//! crates/image_studio_core/src/chain.rs
//!
//! The provider fallback chain: an ordered list of generation candidates
//! tried in sequence with a uniform signature, stopping at the first
//! success. Replaces the nested try/catch fallback of the original design.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{JobStatusReport, JobSubmission};
use crate::ports::{GenerationRequest, ImageGenerationService, PortError, PortResult};

/// A successful submission, tagged with which candidate answered so that
/// later status polls go back to the same provider.
#[derive(Debug, Clone)]
pub struct ChainSubmission {
    pub submission: JobSubmission,
    pub candidate: usize,
    pub label: String,
}

/// An ordered sequence of generation candidates (primary model first,
/// fallbacks after) tried until one succeeds or all fail.
pub struct GenerationChain {
    candidates: Vec<Arc<dyn ImageGenerationService>>,
}

impl GenerationChain {
    /// Builds a chain from an ordered candidate list. At least one candidate
    /// is required.
    pub fn new(candidates: Vec<Arc<dyn ImageGenerationService>>) -> Self {
        assert!(!candidates.is_empty(), "chain requires at least one candidate");
        Self { candidates }
    }

    /// Submits a request to each candidate in order, returning the first
    /// success. Errors are classified before continuing: a rate-limited
    /// candidate still falls through to the next one (the fallback model has
    /// its own quota), but if every candidate fails and any of them was rate
    /// limited, the aggregate error is `RateLimited` so the caller can arm
    /// its cooldown instead of treating it as a generic failure.
    pub async fn submit(&self, request: &GenerationRequest) -> PortResult<ChainSubmission> {
        let mut rate_limited: Option<PortError> = None;
        let mut last_err: Option<PortError> = None;

        for (index, candidate) in self.candidates.iter().enumerate() {
            match candidate.submit(request).await {
                Ok(submission) => {
                    return Ok(ChainSubmission {
                        submission,
                        candidate: index,
                        label: candidate.label().to_string(),
                    });
                }
                Err(err @ PortError::RateLimited { .. }) => {
                    warn!(candidate = candidate.label(), "candidate rate limited, trying next");
                    rate_limited = Some(err);
                }
                Err(err) => {
                    warn!(candidate = candidate.label(), error = %err, "candidate failed, trying next");
                    last_err = Some(err);
                }
            }
        }

        // Rate limiting wins the classification so the cooldown engages even
        // when a later candidate failed for an unrelated reason.
        Err(rate_limited
            .or(last_err)
            .unwrap_or_else(|| PortError::Unexpected("no generation candidates".to_string())))
    }

    /// Polls the status of a job on the candidate that issued it.
    pub async fn job_status(&self, candidate: usize, job_id: &str) -> PortResult<JobStatusReport> {
        let service = self
            .candidates
            .get(candidate)
            .ok_or_else(|| PortError::Unexpected(format!("unknown candidate index {candidate}")))?;
        service.job_status(job_id).await
    }

    /// Status query against the primary candidate, used by the thin
    /// pass-through status endpoint where no candidate tag is available.
    pub async fn primary_job_status(&self, job_id: &str) -> PortResult<JobStatusReport> {
        self.candidates[0].job_status(job_id).await
    }
}
