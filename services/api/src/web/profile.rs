//! services/api/src/web/profile.rs
//!
//! The current-user projection and profile updates.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use image_studio_core::domain::{ProfileUpdate, UserProfile};

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
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

impl From<UserProfile> for ProfileResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            user_id: p.user_id,
            display_name: p.display_name,
            email: p.email,
            photo_url: p.photo_url,
            bio: p.bio,
            website: p.website,
            plan: p.plan,
            images_generated: p.images_generated,
            created_at: p.created_at,
        }
    }
}

/// Omitted fields are left untouched.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /auth/me - Current user and profile projection
///
/// Clients call this once at startup to restore a session and gate their
/// protected views on the answer.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Profile missing")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state.db.get_profile(user_id).await.map_err(|e| {
        error!(user_id = %user_id, "Failed to load profile: {:?}", e);
        (StatusCode::NOT_FOUND, "Profile not found".to_string())
    })?;
    Ok(Json(ProfileResponse::from(profile)))
}

/// PATCH /profile - Partial profile update with merge semantics
#[utoipa::path(
    patch,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let update = ProfileUpdate {
        display_name: req.display_name,
        photo_url: req.photo_url,
        bio: req.bio,
        website: req.website,
    };
    let profile = state
        .db
        .update_profile(user_id, &update)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, "Failed to update profile: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update profile".to_string(),
            )
        })?;
    Ok(Json(ProfileResponse::from(profile)))
}
