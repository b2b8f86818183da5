//! crates/image_studio_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The lifecycle of an image-generation job as reported by the upstream API.
///
/// `Succeeded` and `Failed` are terminal; a job never transitions out of a
/// terminal state. Upstream status strings outside this set are an
/// unknown-status error, not a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Parses an upstream status string. Returns `None` for anything that is
    /// not one of the known states so callers can surface it as an
    /// unknown-status error.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "queued" | "generating" => Some(JobStatus::Pending),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// What a provider hands back for a finished image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// A plain URL pointing at the hosted result.
    Url(String),
    /// An inline base64 `data:` URI (the synchronous provider variant).
    DataUri(String),
}

impl ImagePayload {
    /// The string form stored in gallery records and returned to clients.
    pub fn as_str(&self) -> &str {
        match self {
            ImagePayload::Url(s) | ImagePayload::DataUri(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            ImagePayload::Url(s) | ImagePayload::DataUri(s) => s,
        }
    }
}

/// The outcome of submitting one prompt to a generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSubmission {
    /// Asynchronous variant: an opaque job id to be polled.
    Queued(String),
    /// Synchronous variant: the image came back inline.
    Ready(ImagePayload),
}

/// A point-in-time status answer for one job.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub image_url: Option<String>,
}

/// A persisted gallery record, created once per successfully produced image.
///
/// The id is always a random UUID; it is never derived from the prompt text,
/// so repeated generations of the same prompt produce distinct records.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The per-user profile document, created with defaults on first
/// authentication of a previously unseen identity.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub plan: String,
    pub images_generated: i64,
    pub created_at: DateTime<Utc>,
}

/// A partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

/// A short-lived token for the password reset flow.
#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A verified identity handed back by the external federated sign-in
/// provider. The application never inspects the raw token itself.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}
