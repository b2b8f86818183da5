//! services/api/src/adapters/prodia.rs
//!
//! This module contains the adapter for the external image-generation API.
//! It implements the `ImageGenerationService` port from the `core` crate.
//! The primary and fallback models of the chain are two instances of this
//! adapter configured with different model names.

use async_trait::async_trait;
use image_studio_core::domain::{ImagePayload, JobStatus, JobStatusReport, JobSubmission};
use image_studio_core::ports::{
    GenerationRequest, ImageGenerationService, PortError, PortResult,
};
use serde::Deserialize;
use serde_json::json;

const API_KEY_HEADER: &str = "X-Prodia-Key";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ImageGenerationService` port against a
/// Prodia-style REST generation API.
#[derive(Clone)]
pub struct ProdiaAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ProdiaAdapter {
    /// Creates a new `ProdiaAdapter` for one model.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

//=========================================================================================
// Upstream Wire Types
//=========================================================================================

/// The create-job response: `{ job }` in the asynchronous variant, or
/// `{ image }` (a base64 data URI) in the synchronous variant.
#[derive(Deserialize)]
struct SubmitResponse {
    job: Option<String>,
    image: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

fn transport(e: reqwest::Error) -> PortError {
    PortError::Upstream(e.to_string())
}

fn retry_after_secs(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for ProdiaAdapter {
    async fn submit(&self, request: &GenerationRequest) -> PortResult<JobSubmission> {
        let mut body = json!({
            "prompt": request.prompt,
            "model": request.model.as_deref().unwrap_or(&self.model),
        });
        // Optional tuning fields are forwarded verbatim when present.
        if let Some(negative) = &request.negative_prompt {
            body["negative_prompt"] = json!(negative);
        }
        if let Some(steps) = request.steps {
            body["steps"] = json!(steps);
        }
        if let Some(cfg_scale) = request.cfg_scale {
            body["cfg_scale"] = json!(cfg_scale);
        }

        let response = self
            .client
            .post(format!("{}/sdxl/generate", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PortError::RateLimited {
                retry_after_secs: retry_after_secs(&response),
            });
        }
        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "generation request failed with status {}",
                response.status()
            )));
        }

        let parsed: SubmitResponse = response.json().await.map_err(transport)?;
        match (parsed.job, parsed.image) {
            (Some(job), _) => Ok(JobSubmission::Queued(job)),
            (None, Some(image)) => Ok(JobSubmission::Ready(ImagePayload::DataUri(image))),
            (None, None) => Err(PortError::Unexpected(
                "generation response contained neither a job id nor an image".to_string(),
            )),
        }
    }

    async fn job_status(&self, job_id: &str) -> PortResult<JobStatusReport> {
        let response = self
            .client
            .get(format!("{}/job/{}", self.base_url, job_id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "status check failed with status {}",
                response.status()
            )));
        }

        let parsed: StatusResponse = response.json().await.map_err(transport)?;
        let status = JobStatus::parse(&parsed.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown job status '{}'", parsed.status))
        })?;

        Ok(JobStatusReport {
            status,
            image_url: parsed.image_url,
        })
    }

    fn label(&self) -> &str {
        &self.model
    }
}
