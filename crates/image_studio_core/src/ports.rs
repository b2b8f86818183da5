//! crates/image_studio_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    FederatedIdentity, GeneratedImage, JobStatusReport, JobSubmission, PasswordResetToken,
    ProfileUpdate, User, UserCredentials, UserProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The upstream provider signalled quota exhaustion (HTTP 429 equivalent).
    /// Distinguished from other failures because it drives the cooldown
    /// bookkeeping instead of the generic failure path.
    #[error("Rate limited by upstream (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },
    /// A transport-level or non-2xx failure from an upstream call. These are
    /// the only errors the status poller retries.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl PortError {
    /// Whether the status poller should retry the operation. Only transport
    /// failures qualify; an unknown job status is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Upstream(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    /// Looks up (or creates, on first sight) the user bound to a federated
    /// identity subject.
    async fn get_or_create_federated_user(
        &self,
        subject: &str,
        email: &str,
    ) -> PortResult<(User, bool)>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Password Reset ---
    async fn create_password_reset_token(
        &self,
        token: &PasswordResetToken,
    ) -> PortResult<()>;

    /// Consumes a reset token, returning the owning user. Expired or unknown
    /// tokens are `NotFound`.
    async fn consume_password_reset_token(&self, token: &str) -> PortResult<Uuid>;

    // --- Profiles ---
    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()>;

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> PortResult<UserProfile>;

    async fn increment_images_generated(&self, user_id: Uuid) -> PortResult<()>;

    // --- Gallery Records ---
    async fn save_generated_image(&self, image: &GeneratedImage) -> PortResult<()>;

    async fn list_generated_images(&self, user_id: Uuid) -> PortResult<Vec<GeneratedImage>>;

    /// Deletes a record owned by `user_id`. A record that does not exist or
    /// belongs to someone else is `NotFound`.
    async fn delete_generated_image(&self, user_id: Uuid, image_id: Uuid) -> PortResult<()>;
}

/// The uniform candidate signature tried by the fallback chain: every
/// provider/model pair looks the same to the dispatcher.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Submits one prompt and returns either a queued job id or an inline
    /// image, depending on the provider variant.
    async fn submit(&self, request: &GenerationRequest) -> PortResult<JobSubmission>;

    /// Queries the status of a previously queued job.
    async fn job_status(&self, job_id: &str) -> PortResult<JobStatusReport>;

    /// A short human-readable name (model or provider) used in logs and
    /// per-slot failure messages.
    fn label(&self) -> &str;
}

/// One image-generation request as seen by a provider. Tuning fields are
/// forwarded verbatim when present.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Caller-requested model name; candidates fall back to their configured
    /// model when absent.
    pub model: Option<String>,
    pub negative_prompt: Option<String>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Delegates federated sign-in token verification to the external identity
/// provider's public interface.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> PortResult<FederatedIdentity>;
}
