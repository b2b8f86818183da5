//! services/api/src/web/generation.rs
//!
//! The generation dispatch endpoints: prompt submission against the provider
//! fallback chain, per-run status queries, run cancellation, and the thin
//! job-status proxy.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use image_studio_core::domain::{JobStatus, JobSubmission};
use image_studio_core::ports::{GenerationRequest, PortError};

use crate::web::cooldown::{now_ms, CooldownState};
use crate::web::polling::{persist_result, spawn_poll_task, SlotState};
use crate::web::state::AppState;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 1000;
/// Most images one request may ask for.
pub const MAX_IMAGES_PER_REQUEST: u8 = 2;
/// Pause between consecutive submissions of the same request, to keep
/// fan-out gentle on the provider's rate limits.
pub const INTER_REQUEST_PAUSE: Duration = Duration::from_millis(250);

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub prompt: String,
    /// How many images to produce (1 or 2, default 1).
    pub count: Option<u8>,
    pub model: Option<String>,
    pub negative_prompt: Option<String>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f32>,
}

/// One result slot as reported to the client. Slot indices are fixed at
/// submission time; results always land in their originating slot.
#[derive(Serialize, ToSchema)]
pub struct SlotView {
    pub slot: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SlotView {
    fn from_state(slot: usize, state: &SlotState) -> Self {
        match state {
            SlotState::Queued { job_id } => Self {
                slot,
                status: "pending".to_string(),
                job_id: Some(job_id.clone()),
                image_url: None,
                message: None,
            },
            SlotState::Succeeded { image_url } => Self {
                slot,
                status: "succeeded".to_string(),
                job_id: None,
                image_url: Some(image_url.clone()),
                message: None,
            },
            SlotState::Failed { message } => Self {
                slot,
                status: "failed".to_string(),
                job_id: None,
                image_url: None,
                message: Some(message.clone()),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct GenerateResponse {
    pub run_id: Uuid,
    pub slots: Vec<SlotView>,
}

/// The structured rate-limit rejection body.
#[derive(Serialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
    pub details: String,
}

#[derive(Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct JobStatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

//=========================================================================================
// Validation
//=========================================================================================

/// Checks a generation request before any network call is made. Returns the
/// bounded image count on success.
fn validate_request(req: &GenerateRequest) -> Result<u8, (StatusCode, String)> {
    if req.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Please enter a prompt.".to_string()));
    }
    if req.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Prompt must be at most {} characters.", MAX_PROMPT_CHARS),
        ));
    }
    let count = req.count.unwrap_or(1);
    if count < 1 || count > MAX_IMAGES_PER_REQUEST {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("count must be between 1 and {}.", MAX_IMAGES_PER_REQUEST),
        ));
    }
    Ok(count)
}

fn rate_limit_response(retry_after: u64) -> RateLimitResponse {
    RateLimitResponse {
        error: "API Rate Limit Reached".to_string(),
        message: format!(
            "Too many generation requests. Please wait {} seconds and try again.",
            retry_after
        ),
        retry_after,
        details: "The image provider is limiting requests for this key.".to_string(),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /images/generations - Submit a prompt for image generation
#[utoipa::path(
    post,
    path = "/images/generations",
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "Generation run created", body = GenerateResponse),
        (status = 400, description = "Invalid request"),
        (status = 429, description = "Rate limit cooldown active", body = RateLimitResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, (StatusCode, String)> {
    // 1. Validate before any network call
    let count = validate_request(&req)?;

    // 2. Require a configured provider
    let chain = state.generation.clone().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Image generation is not configured".to_string(),
    ))?;

    // 3. Cooldown pre-check: reject locally without contacting the upstream
    let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    let cooldown = CooldownState::from_cookie_header(cookie_header);
    let now = now_ms();
    if cooldown.is_cooling_down(now) {
        let retry_after = cooldown.retry_after_secs(now);
        info!(user_id = %user_id, retry_after, "generation rejected by local cooldown");
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(rate_limit_response(retry_after)),
        )
            .into_response());
    }

    // 4. Dispatch sequentially, one slot per requested image
    let request = GenerationRequest {
        prompt: req.prompt.clone(),
        model: req.model.clone(),
        negative_prompt: req.negative_prompt.clone(),
        steps: req.steps,
        cfg_scale: req.cfg_scale,
    };

    let mut slots: Vec<SlotState> = Vec::with_capacity(count as usize);
    // (slot index, answering candidate, job id) for each queued submission.
    let mut queued: Vec<(usize, usize, String)> = Vec::new();
    let mut ready_urls: Vec<String> = Vec::new();
    let mut rate_limited = false;

    for slot in 0..count as usize {
        if slot > 0 {
            tokio::time::sleep(INTER_REQUEST_PAUSE).await;
        }
        match chain.submit(&request).await {
            Ok(outcome) => {
                info!(user_id = %user_id, slot, model = %outcome.label, "submission accepted");
                match outcome.submission {
                    JobSubmission::Queued(job_id) => {
                        queued.push((slot, outcome.candidate, job_id.clone()));
                        slots.push(SlotState::Queued { job_id });
                    }
                    JobSubmission::Ready(payload) => {
                        let image_url = payload.into_string();
                        ready_urls.push(image_url.clone());
                        slots.push(SlotState::Succeeded { image_url });
                    }
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, slot, error = %e, "submission failed");
                if matches!(e, PortError::RateLimited { .. }) {
                    rate_limited = true;
                }
                slots.push(SlotState::Failed {
                    message: e.to_string(),
                });
            }
        }
    }

    // 5. Aggregate failure: no slot got anywhere
    if slots.iter().all(|s| matches!(s, SlotState::Failed { .. })) {
        if rate_limited {
            let recorded = cooldown.record_attempt(now);
            let retry_after = recorded.retry_after_secs(now);
            let [attempts, last] = recorded.set_cookie_values();
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                [(header::SET_COOKIE, attempts), (header::SET_COOKIE, last)],
                Json(rate_limit_response(retry_after)),
            )
                .into_response());
        }
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "All generation attempts failed".to_string(),
        ));
    }

    // 6. Register the run, persist inline results, spawn poll tasks
    let (run_id, run) = state.runs.insert(user_id, req.prompt, slots).await;
    for url in &ready_urls {
        persist_result(state.db.as_ref(), &run, url).await;
    }
    for (slot, candidate, job_id) in queued {
        spawn_poll_task(
            state.db.clone(),
            chain.clone(),
            run.clone(),
            slot,
            candidate,
            job_id,
        );
    }

    let views = run
        .slots
        .lock()
        .await
        .iter()
        .enumerate()
        .map(|(i, s)| SlotView::from_state(i, s))
        .collect();
    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            run_id,
            slots: views,
        }),
    )
        .into_response())
}

/// GET /images/generations/{run_id} - Live slot states of a run
#[utoipa::path(
    get,
    path = "/images/generations/{run_id}",
    responses(
        (status = 200, description = "Current run state", body = GenerateResponse),
        (status = 404, description = "Run not found")
    ),
    params(
        ("run_id" = Uuid, Path, description = "The run to inspect.")
    )
)]
pub async fn run_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let run = state
        .runs
        .get(run_id)
        .await
        .filter(|run| run.user_id == user_id)
        .ok_or((StatusCode::NOT_FOUND, "Run not found".to_string()))?;

    let views = run
        .slots
        .lock()
        .await
        .iter()
        .enumerate()
        .map(|(i, s)| SlotView::from_state(i, s))
        .collect();
    Ok(Json(GenerateResponse {
        run_id,
        slots: views,
    }))
}

/// DELETE /images/generations/{run_id} - Cancel a run's outstanding polls
#[utoipa::path(
    delete,
    path = "/images/generations/{run_id}",
    responses(
        (status = 204, description = "Run cancelled"),
        (status = 404, description = "Run not found")
    ),
    params(
        ("run_id" = Uuid, Path, description = "The run to cancel.")
    )
)]
pub async fn cancel_run_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !state.runs.cancel(run_id, user_id).await {
        return Err((StatusCode::NOT_FOUND, "Run not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /images/job-status?jobId=... - Thin status proxy for one job
#[utoipa::path(
    get,
    path = "/images/job-status",
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 400, description = "Missing jobId"),
        (status = 500, description = "Upstream failure")
    ),
    params(
        ("jobId" = String, Query, description = "The upstream job id to query.")
    )
)]
pub async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobStatusQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let job_id = query.job_id.ok_or((
        StatusCode::BAD_REQUEST,
        "jobId query parameter is required".to_string(),
    ))?;

    let chain = state.generation.as_ref().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Image generation is not configured".to_string(),
    ))?;

    let report = chain.primary_job_status(&job_id).await.map_err(|e| {
        error!(%job_id, error = %e, "status proxy failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to check job status".to_string(),
        )
    })?;

    let status = match report.status {
        JobStatus::Pending => "pending",
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "failed",
    };
    Ok(Json(JobStatusResponse {
        status: status.to_string(),
        image_url: report.image_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::cooldown::COOLDOWN_WINDOW_MS;
    use crate::web::test_support::{test_state, MockDb, ScriptedGenerator};
    use image_studio_core::chain::GenerationChain;
    use image_studio_core::domain::ImagePayload;
    use std::sync::atomic::Ordering;

    fn request(prompt: &str, count: Option<u8>) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            count,
            model: None,
            negative_prompt: None,
            steps: None,
            cfg_scale: None,
        }
    }

    fn state_with(
        generator: Arc<ScriptedGenerator>,
    ) -> (Arc<MockDb>, Arc<AppState>) {
        let db = Arc::new(MockDb::default());
        let chain = Arc::new(GenerationChain::new(vec![generator]));
        (db.clone(), test_state(db, Some(chain)))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_upstream_call() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator.clone());

        let err = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("   ", None)),
        )
        .await
        .unwrap_err();

        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1, "Please enter a prompt.");
        assert_eq!(generator.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overlong_prompt_and_bad_count_are_rejected() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator.clone());

        let long = "x".repeat(MAX_PROMPT_CHARS + 1);
        let err = generate_handler(
            State(state.clone()),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request(&long, None)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", Some(3))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(generator.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_provider_key_is_a_config_error() {
        let db = Arc::new(MockDb::default());
        let state = test_state(db, None);

        let err = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn queued_submissions_come_back_as_pending_slots() {
        let generator = ScriptedGenerator::with_submissions(vec![Ok(JobSubmission::Queued(
            "job-1".to_string(),
        ))]);
        let (_, state) = state_with(generator.clone());

        let response = generate_handler(
            State(state.clone()),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["slots"].as_array().unwrap().len(), 1);
        assert_eq!(body["slots"][0]["status"], "pending");
        assert_eq!(body["slots"][0]["job_id"], "job-1");
        assert!(state
            .runs
            .get(body["run_id"].as_str().unwrap().parse().unwrap())
            .await
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn inline_results_are_persisted_immediately() {
        let generator = ScriptedGenerator::always_ready("https://x/img.png");
        let (db, state) = state_with(generator.clone());
        let user_id = Uuid::new_v4();

        let response = generate_handler(
            State(state),
            Extension(user_id),
            HeaderMap::new(),
            Json(request("a cat", Some(2))),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(generator.submit_calls.load(Ordering::SeqCst), 2);

        let body = body_json(response).await;
        assert_eq!(body["slots"][0]["status"], "succeeded");
        assert_eq!(body["slots"][1]["image_url"], "https://x/img.png");

        let saved = db.saved_images.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|i| i.user_id == user_id));
        assert_eq!(db.increments.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_reports_per_slot_outcomes() {
        let generator = ScriptedGenerator::with_submissions(vec![
            Err(PortError::Upstream("boom".to_string())),
            Ok(JobSubmission::Ready(ImagePayload::Url(
                "https://x/img.png".to_string(),
            ))),
        ]);
        let (_, state) = state_with(generator.clone());

        let response = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", Some(2))),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["slots"][0]["status"], "failed");
        assert_eq!(body["slots"][1]["status"], "succeeded");
    }

    #[tokio::test]
    async fn active_cooldown_rejects_without_contacting_the_upstream() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator.clone());

        let mut headers = HeaderMap::new();
        let cookie = format!("gen_attempts=4; gen_last_attempt={}", now_ms());
        headers.insert(header::COOKIE, cookie.parse().unwrap());

        let response = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            headers,
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(generator.submit_calls.load(Ordering::SeqCst), 0);

        let body = body_json(response).await;
        assert_eq!(body["error"], "API Rate Limit Reached");
        assert!(body["retryAfter"].as_u64().unwrap() <= 60);
    }

    #[tokio::test]
    async fn expired_cooldown_window_lets_requests_through() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator.clone());

        let mut headers = HeaderMap::new();
        let stale = now_ms() - COOLDOWN_WINDOW_MS - 1000;
        let cookie = format!("gen_attempts=4; gen_last_attempt={}", stale);
        headers.insert(header::COOKIE, cookie.parse().unwrap());

        let response = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            headers,
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(generator.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_rate_limited_chain_sets_cooldown_cookies() {
        let generator = ScriptedGenerator::always_rate_limited();
        let (_, state) = state_with(generator.clone());

        let response = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("gen_attempts=1")));
        assert!(cookies.iter().any(|c| c.starts_with("gen_last_attempt=")));
    }

    #[tokio::test]
    async fn all_slots_failing_without_rate_limit_is_a_500() {
        let generator = ScriptedGenerator::with_submissions(vec![Err(PortError::Upstream(
            "boom".to_string(),
        ))]);
        let (_, state) = state_with(generator.clone());

        let err = generate_handler(
            State(state),
            Extension(Uuid::new_v4()),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn run_status_is_owner_only() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator);
        let owner = Uuid::new_v4();

        let response = generate_handler(
            State(state.clone()),
            Extension(owner),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        let run_id: Uuid = body["run_id"].as_str().unwrap().parse().unwrap();

        let err = run_status_handler(
            State(state.clone()),
            Extension(Uuid::new_v4()),
            Path(run_id),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        assert!(run_status_handler(State(state), Extension(owner), Path(run_id))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn cancel_removes_the_run() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator);
        let owner = Uuid::new_v4();

        let response = generate_handler(
            State(state.clone()),
            Extension(owner),
            HeaderMap::new(),
            Json(request("a cat", None)),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        let run_id: Uuid = body["run_id"].as_str().unwrap().parse().unwrap();

        assert!(cancel_run_handler(State(state.clone()), Extension(owner), Path(run_id))
            .await
            .is_ok());
        assert!(state.runs.get(run_id).await.is_none());
    }

    #[tokio::test]
    async fn job_status_proxy_requires_a_job_id() {
        let generator = ScriptedGenerator::always_pending();
        let (_, state) = state_with(generator.clone());

        let err = job_status_handler(State(state), Query(JobStatusQuery { job_id: None }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(generator.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn job_status_proxy_passes_the_report_through() {
        let generator = ScriptedGenerator::with_statuses(vec![Ok(
            image_studio_core::domain::JobStatusReport {
                status: image_studio_core::domain::JobStatus::Succeeded,
                image_url: Some("https://x/img.png".to_string()),
            },
        )]);
        let (_, state) = state_with(generator);

        let response = job_status_handler(
            State(state),
            Query(JobStatusQuery {
                job_id: Some("job-1".to_string()),
            }),
        )
        .await
        .unwrap()
        .into_response();
        let body = body_json(response).await;
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["imageUrl"], "https://x/img.png");
    }
}
