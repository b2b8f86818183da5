//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: signup, login, federated sign-in, logout, and
//! the password reset flow.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use image_studio_core::domain::{PasswordResetToken, UserProfile};

use crate::web::middleware::session_cookie;
use crate::web::state::AppState;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_CHARS: usize = 6;
/// How long a login session lasts.
const SESSION_DAYS: i64 = 30;
/// How long a password reset token stays valid.
const RESET_TOKEN_HOURS: i64 = 1;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub display_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

//=========================================================================================
// Validation and Helpers
//=========================================================================================

/// Field checks for the signup form. Mirrors the messages shown to users.
fn validate_signup(req: &SignupRequest) -> Result<(), (StatusCode, String)> {
    if req.email.trim().is_empty() || req.display_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Please fill in all fields.".to_string(),
        ));
    }
    validate_password(&req.password)?;
    if req.password != req.confirm_password {
        return Err((
            StatusCode::BAD_REQUEST,
            "Passwords do not match".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), (StatusCode, String)> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password should be at least {} characters", MIN_PASSWORD_CHARS),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, (StatusCode, String)> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })
}

/// Creates a 30-day auth session and returns its Set-Cookie value.
async fn issue_session(
    state: &AppState,
    user_id: Uuid,
) -> Result<String, (StatusCode, String)> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    Ok(format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    ))
}

fn default_profile(user_id: Uuid, display_name: &str, email: &str) -> UserProfile {
    UserProfile {
        user_id,
        display_name: display_name.to_string(),
        email: email.to_string(),
        photo_url: None,
        bio: None,
        website: None,
        plan: "free".to_string(),
        images_generated: 0,
        created_at: Utc::now(),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Validate the form fields
    validate_signup(&req)?;

    // 2. Hash the password
    let password_hash = hash_password(&req.password)?;

    // 3. Create user in database
    let user = state
        .db
        .create_user_with_email(&req.email, &password_hash)
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create user".to_string(),
            )
        })?;

    // 4. Create the default profile
    let profile = default_profile(user.user_id, &req.display_name, &req.email);
    state.db.create_profile(&profile).await.map_err(|e| {
        error!("Failed to create profile: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create profile".to_string(),
        )
    })?;

    // 5. Issue the session cookie
    let cookie = issue_session(&state, user.user_id).await?;

    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Unknown account and wrong password answer identically.
    let uniform = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
    };

    // 1. Get user by email
    let user_creds = state
        .db
        .get_user_by_email(&req.email)
        .await
        .map_err(|_| uniform())?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(uniform());
    }

    // 3. Issue the session cookie
    let cookie = issue_session(&state, user_creds.user_id).await?;

    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/google - Login or signup with a federated identity token
#[utoipa::path(
    post,
    path = "/auth/google",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Token rejected by the identity provider"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn google_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Delegate token verification to the identity provider
    let identity = state.identity.verify(&req.id_token).await.map_err(|e| {
        error!("Federated token verification failed: {:?}", e);
        (
            StatusCode::UNAUTHORIZED,
            "Invalid identity token".to_string(),
        )
    })?;

    // 2. Look up or create the user bound to this subject
    let (user, created) = state
        .db
        .get_or_create_federated_user(&identity.subject, &identity.email)
        .await
        .map_err(|e| {
            error!("Failed to resolve federated user: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to sign in".to_string(),
            )
        })?;

    // 3. First sight of this subject also creates the default profile
    if created {
        let display_name = identity
            .display_name
            .clone()
            .unwrap_or_else(|| identity.email.clone());
        let mut profile = default_profile(user.user_id, &display_name, &identity.email);
        profile.photo_url = identity.photo_url.clone();
        state.db.create_profile(&profile).await.map_err(|e| {
            error!("Failed to create profile: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create profile".to_string(),
            )
        })?;
    }

    // 4. Issue the session cookie
    let cookie = issue_session(&state, user.user_id).await?;

    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Extract session cookie
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    // 2. Parse session ID from cookie
    let auth_session_id = session_cookie(cookie_header)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    // 3. Delete auth session from database
    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to logout".to_string(),
            )
        })?;

    // 4. Clear cookie
    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// POST /auth/reset-password - Start the password reset flow
///
/// Always answers 200 so the endpoint cannot be used to probe which emails
/// have accounts. The token is currently delivered out of band (logged);
/// there is no mail transport.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Reset initiated if the account exists")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Ok(user) = state.db.get_user_by_email(&req.email).await {
        let token = PasswordResetToken {
            token: Uuid::new_v4().to_string(),
            user_id: user.user_id,
            expires_at: Utc::now() + Duration::hours(RESET_TOKEN_HOURS),
        };
        match state.db.create_password_reset_token(&token).await {
            Ok(()) => info!(user_id = %user.user_id, token = %token.token, "password reset token issued"),
            Err(e) => error!("Failed to store reset token: {:?}", e),
        }
    }
    Ok(StatusCode::OK)
}

/// POST /auth/reset-password/confirm - Complete the password reset flow
#[utoipa::path(
    post,
    path = "/auth/reset-password/confirm",
    request_body = ResetPasswordConfirmRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid token or password"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn reset_password_confirm_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordConfirmRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate_password(&req.new_password)?;

    // Expired, unknown, and already-used tokens all answer the same way.
    let user_id = state
        .db
        .consume_password_reset_token(&req.token)
        .await
        .map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                "Invalid or expired reset token".to_string(),
            )
        })?;

    let password_hash = hash_password(&req.new_password)?;
    state
        .db
        .update_password(user_id, &password_hash)
        .await
        .map_err(|e| {
            error!("Failed to update password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update password".to_string(),
            )
        })?;

    Ok(StatusCode::OK)
}
