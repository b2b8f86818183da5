//! services/api/src/web/gallery.rs
//!
//! The caller's gallery of generated images.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use image_studio_core::domain::GeneratedImage;
use image_studio_core::ports::PortError;

use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct GalleryImage {
    pub id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<GeneratedImage> for GalleryImage {
    fn from(i: GeneratedImage) -> Self {
        Self {
            id: i.id,
            prompt: i.prompt,
            image_url: i.image_url,
            created_at: i.created_at,
        }
    }
}

/// GET /images - The caller's generated images, newest first
#[utoipa::path(
    get,
    path = "/images",
    responses(
        (status = 200, description = "Gallery listing", body = [GalleryImage]),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_images_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut images = state.db.list_generated_images(user_id).await.map_err(|e| {
        error!(user_id = %user_id, "Failed to list images: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load images".to_string(),
        )
    })?;
    images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(
        images.into_iter().map(GalleryImage::from).collect::<Vec<_>>(),
    ))
}

/// DELETE /images/{id} - Owner-only delete of one gallery record
#[utoipa::path(
    delete,
    path = "/images/{id}",
    responses(
        (status = 204, description = "Image deleted"),
        (status = 404, description = "Image not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The gallery record to delete.")
    )
)]
pub async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(image_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .delete_generated_image(user_id, image_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Image not found".to_string()),
            e => {
                error!(user_id = %user_id, "Failed to delete image: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to delete image".to_string(),
                )
            }
        })?;
    Ok(StatusCode::NO_CONTENT)
}
