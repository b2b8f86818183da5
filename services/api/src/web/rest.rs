//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification. The handlers
//! themselves live in the per-area modules (`auth`, `generation`, `gallery`,
//! `profile`).

use utoipa::OpenApi;

use crate::web::auth::{self, AuthResponse, GoogleLoginRequest, LoginRequest, ResetPasswordConfirmRequest, ResetPasswordRequest, SignupRequest};
use crate::web::gallery::{self, GalleryImage};
use crate::web::generation::{
    self, GenerateRequest, GenerateResponse, JobStatusResponse, RateLimitResponse, SlotView,
};
use crate::web::profile::{self, ProfileResponse, UpdateProfileRequest};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::google_login_handler,
        auth::logout_handler,
        auth::reset_password_handler,
        auth::reset_password_confirm_handler,
        profile::me_handler,
        profile::update_profile_handler,
        generation::generate_handler,
        generation::run_status_handler,
        generation::cancel_run_handler,
        generation::job_status_handler,
        gallery::list_images_handler,
        gallery::delete_image_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            GoogleLoginRequest,
            ResetPasswordRequest,
            ResetPasswordConfirmRequest,
            AuthResponse,
            ProfileResponse,
            UpdateProfileRequest,
            GenerateRequest,
            GenerateResponse,
            SlotView,
            RateLimitResponse,
            JobStatusResponse,
            GalleryImage,
        )
    ),
    tags(
        (name = "Image Studio API", description = "API endpoints for prompt-based image generation, galleries, and accounts.")
    )
)]
pub struct ApiDoc;
