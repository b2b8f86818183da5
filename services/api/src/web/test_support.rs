//! services/api/src/web/test_support.rs
//!
//! Shared hand-written mocks for the web-layer tests: an in-memory
//! `DatabaseService` and a scripted `ImageGenerationService` with call
//! counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image_studio_core::chain::GenerationChain;
use image_studio_core::domain::{
    FederatedIdentity, GeneratedImage, ImagePayload, JobStatus, JobStatusReport, JobSubmission,
    PasswordResetToken, ProfileUpdate, User, UserCredentials, UserProfile,
};
use image_studio_core::ports::{
    DatabaseService, GenerationRequest, IdentityVerifier, ImageGenerationService, PortError,
    PortResult,
};
use uuid::Uuid;

use crate::config::Config;
use crate::web::polling::RunTracker;
use crate::web::state::AppState;

/// Builds an `AppState` around the given mocks with a throwaway config.
pub fn test_state(
    db: Arc<MockDb>,
    generation: Option<Arc<GenerationChain>>,
) -> Arc<AppState> {
    test_state_with_identity(db, generation, Arc::new(MockIdentity::rejecting()))
}

pub fn test_state_with_identity(
    db: Arc<MockDb>,
    generation: Option<Arc<GenerationChain>>,
    identity: Arc<dyn IdentityVerifier>,
) -> Arc<AppState> {
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        prodia_api_key: Some("test-key".to_string()),
        prodia_base_url: "http://unused".to_string(),
        primary_model: "sdxl".to_string(),
        fallback_model: "sd".to_string(),
        google_tokeninfo_url: "http://unused".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
    };
    Arc::new(AppState {
        db,
        config: Arc::new(config),
        generation,
        identity,
        runs: Arc::new(RunTracker::new()),
    })
}

//=========================================================================================
// Identity Verifier
//=========================================================================================

/// An `IdentityVerifier` answering with a fixed identity, or rejecting
/// everything.
pub struct MockIdentity {
    identity: Option<FederatedIdentity>,
}

impl MockIdentity {
    pub fn verifying(identity: FederatedIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn rejecting() -> Self {
        Self { identity: None }
    }
}

#[async_trait]
impl IdentityVerifier for MockIdentity {
    async fn verify(&self, _id_token: &str) -> PortResult<FederatedIdentity> {
        self.identity.clone().ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// In-memory Database
//=========================================================================================

/// An in-memory `DatabaseService` mirroring the relational adapter's
/// semantics closely enough for handler tests: unique emails, expiring
/// sessions, single-use reset tokens.
#[derive(Default)]
pub struct MockDb {
    pub users: Mutex<Vec<UserCredentials>>,
    pub federated: Mutex<Vec<(String, Uuid, String)>>,
    pub sessions: Mutex<Vec<(String, Uuid, DateTime<Utc>)>>,
    pub reset_tokens: Mutex<Vec<(PasswordResetToken, bool)>>,
    pub saved_images: Mutex<Vec<GeneratedImage>>,
    pub increments: AtomicUsize,
    pub profiles: Mutex<Vec<UserProfile>>,
}

#[async_trait]
impl DatabaseService for MockDb {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(PortError::Unexpected("email already registered".to_string()));
        }
        let user_id = Uuid::new_v4();
        users.push(UserCredentials {
            user_id,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        });
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.hashed_password = hashed_password.to_string();
        Ok(())
    }

    async fn get_or_create_federated_user(
        &self,
        subject: &str,
        email: &str,
    ) -> PortResult<(User, bool)> {
        let mut federated = self.federated.lock().unwrap();
        if let Some((_, user_id, email)) = federated.iter().find(|(s, _, _)| s == subject) {
            return Ok((
                User {
                    user_id: *user_id,
                    email: Some(email.clone()),
                },
                false,
            ));
        }
        let user_id = Uuid::new_v4();
        federated.push((subject.to_string(), user_id, email.to_string()));
        Ok((
            User {
                user_id,
                email: Some(email.to_string()),
            },
            true,
        ))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .push((session_id.to_string(), user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _, expires_at)| id == session_id && *expires_at > Utc::now())
            .map(|(_, user_id, _)| *user_id)
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.sessions.lock().unwrap().retain(|(id, _, _)| id != session_id);
        Ok(())
    }

    async fn create_password_reset_token(&self, token: &PasswordResetToken) -> PortResult<()> {
        self.reset_tokens.lock().unwrap().push((token.clone(), false));
        Ok(())
    }

    async fn consume_password_reset_token(&self, token: &str) -> PortResult<Uuid> {
        let mut tokens = self.reset_tokens.lock().unwrap();
        let entry = tokens
            .iter_mut()
            .find(|(t, used)| t.token == token && !*used && t.expires_at > Utc::now())
            .ok_or_else(|| PortError::NotFound("Reset token not found".to_string()))?;
        entry.1 = true;
        Ok(entry.0.user_id)
    }

    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()> {
        self.profiles.lock().unwrap().push(profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile for user {} not found", user_id)))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> PortResult<UserProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile for user {} not found", user_id)))?;
        if let Some(v) = &update.display_name {
            profile.display_name = v.clone();
        }
        if let Some(v) = &update.photo_url {
            profile.photo_url = Some(v.clone());
        }
        if let Some(v) = &update.bio {
            profile.bio = Some(v.clone());
        }
        if let Some(v) = &update.website {
            profile.website = Some(v.clone());
        }
        Ok(profile.clone())
    }

    async fn increment_images_generated(&self, _user_id: Uuid) -> PortResult<()> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_generated_image(&self, image: &GeneratedImage) -> PortResult<()> {
        self.saved_images.lock().unwrap().push(image.clone());
        Ok(())
    }

    async fn list_generated_images(&self, user_id: Uuid) -> PortResult<Vec<GeneratedImage>> {
        Ok(self
            .saved_images
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_generated_image(&self, user_id: Uuid, image_id: Uuid) -> PortResult<()> {
        let mut images = self.saved_images.lock().unwrap();
        let before = images.len();
        images.retain(|i| !(i.id == image_id && i.user_id == user_id));
        if images.len() == before {
            return Err(PortError::NotFound(format!("Image {} not found", image_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// Scripted Generator
//=========================================================================================

/// A scripted `ImageGenerationService`. Submissions and status answers are
/// consumed from queues; an empty status queue falls back to the configured
/// default (pending, unless built otherwise). Every call is counted.
pub struct ScriptedGenerator {
    pub submissions: Mutex<VecDeque<PortResult<JobSubmission>>>,
    pub statuses: Mutex<VecDeque<PortResult<JobStatusReport>>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    default_submission: Box<dyn Fn() -> PortResult<JobSubmission> + Send + Sync>,
    default_status: fn() -> PortResult<JobStatusReport>,
}

fn pending() -> PortResult<JobStatusReport> {
    Ok(JobStatusReport {
        status: JobStatus::Pending,
        image_url: None,
    })
}

fn transport_error() -> PortResult<JobStatusReport> {
    Err(PortError::Upstream("connection reset".to_string()))
}

fn fresh_job() -> PortResult<JobSubmission> {
    Ok(JobSubmission::Queued(format!("job-{}", Uuid::new_v4())))
}

impl ScriptedGenerator {
    fn build(
        submissions: Vec<PortResult<JobSubmission>>,
        statuses: Vec<PortResult<JobStatusReport>>,
        default_submission: Box<dyn Fn() -> PortResult<JobSubmission> + Send + Sync>,
        default_status: fn() -> PortResult<JobStatusReport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(submissions.into()),
            statuses: Mutex::new(statuses.into()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            default_submission,
            default_status,
        })
    }

    /// Every submission queues a fresh job; every status query answers
    /// `pending`.
    pub fn always_pending() -> Arc<Self> {
        Self::build(Vec::new(), Vec::new(), Box::new(fresh_job), pending)
    }

    /// Every status query fails at the transport level.
    pub fn always_failing_transport() -> Arc<Self> {
        Self::build(Vec::new(), Vec::new(), Box::new(fresh_job), transport_error)
    }

    /// Plays back the given status answers in order, then `pending`.
    pub fn with_statuses(statuses: Vec<PortResult<JobStatusReport>>) -> Arc<Self> {
        Self::build(Vec::new(), statuses, Box::new(fresh_job), pending)
    }

    /// Plays back the given submission answers in order, then fresh job ids.
    pub fn with_submissions(submissions: Vec<PortResult<JobSubmission>>) -> Arc<Self> {
        Self::build(submissions, Vec::new(), Box::new(fresh_job), pending)
    }

    /// Every submission is rejected as rate limited.
    pub fn always_rate_limited() -> Arc<Self> {
        Self::build(
            Vec::new(),
            Vec::new(),
            Box::new(|| Err(PortError::RateLimited { retry_after_secs: 60 })),
            pending,
        )
    }

    /// Every submission immediately yields an inline image.
    pub fn always_ready(url: &str) -> Arc<Self> {
        let url = url.to_string();
        Self::build(
            Vec::new(),
            Vec::new(),
            Box::new(move || Ok(JobSubmission::Ready(ImagePayload::Url(url.clone())))),
            pending,
        )
    }
}

#[async_trait]
impl ImageGenerationService for ScriptedGenerator {
    async fn submit(&self, _request: &GenerationRequest) -> PortResult<JobSubmission> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (self.default_submission)())
    }

    async fn job_status(&self, _job_id: &str) -> PortResult<JobStatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (self.default_status)())
    }

    fn label(&self) -> &str {
        "scripted"
    }
}
