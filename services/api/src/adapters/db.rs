//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image_studio_core::domain::{
    GeneratedImage, PasswordResetToken, ProfileUpdate, User, UserCredentials, UserProfile,
};
use image_studio_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    display_name: String,
    email: String,
    photo_url: Option<String>,
    bio: Option<String>,
    website: Option<String>,
    plan: String,
    images_generated: i64,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            display_name: self.display_name,
            email: self.email,
            photo_url: self.photo_url,
            bio: self.bio,
            website: self.website,
            plan: self.plan,
            images_generated: self.images_generated,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct GeneratedImageRecord {
    id: Uuid,
    user_id: Uuid,
    prompt: String,
    image_url: String,
    created_at: DateTime<Utc>,
}
impl GeneratedImageRecord {
    fn to_domain(self) -> GeneratedImage {
        GeneratedImage {
            id: self.id,
            user_id: self.user_id,
            prompt: self.prompt,
            image_url: self.image_url,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3)
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users
             WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        sqlx::query("UPDATE users SET hashed_password = $1 WHERE user_id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_or_create_federated_user(
        &self,
        subject: &str,
        email: &str,
    ) -> PortResult<(User, bool)> {
        let existing = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email FROM users WHERE federated_subject = $1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        if let Some(record) = existing {
            return Ok((record.to_domain(), false));
        }

        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, federated_subject) VALUES ($1, $2, $3)
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(subject)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok((record.to_domain(), true))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_password_reset_token(&self, token: &PasswordResetToken) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn consume_password_reset_token(&self, token: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE password_reset_tokens SET used = true
             WHERE token = $1 AND used = false AND expires_at > now()
             RETURNING user_id",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id)
            .ok_or_else(|| PortError::NotFound("Reset token is invalid or expired".to_string()))
    }

    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_profiles
                 (user_id, display_name, email, photo_url, bio, website, plan, images_generated)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(&profile.photo_url)
        .bind(&profile.bio)
        .bind(&profile.website)
        .bind(&profile.plan)
        .bind(profile.images_generated)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, display_name, email, photo_url, bio, website, plan,
                    images_generated, created_at
             FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Profile for user {} not found", user_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> PortResult<UserProfile> {
        // Merge semantics: fields omitted from the update keep their value.
        let record = sqlx::query_as::<_, ProfileRecord>(
            "UPDATE user_profiles SET
                 display_name = COALESCE($2, display_name),
                 photo_url    = COALESCE($3, photo_url),
                 bio          = COALESCE($4, bio),
                 website      = COALESCE($5, website)
             WHERE user_id = $1
             RETURNING user_id, display_name, email, photo_url, bio, website, plan,
                       images_generated, created_at",
        )
        .bind(user_id)
        .bind(&update.display_name)
        .bind(&update.photo_url)
        .bind(&update.bio)
        .bind(&update.website)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Profile for user {} not found", user_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn increment_images_generated(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE user_profiles SET images_generated = images_generated + 1
             WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn save_generated_image(&self, image: &GeneratedImage) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO generated_images (id, user_id, prompt, image_url, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(image.id)
        .bind(image.user_id)
        .bind(&image.prompt)
        .bind(&image.image_url)
        .bind(image.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_generated_images(&self, user_id: Uuid) -> PortResult<Vec<GeneratedImage>> {
        let records = sqlx::query_as::<_, GeneratedImageRecord>(
            "SELECT id, user_id, prompt, image_url, created_at
             FROM generated_images WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_generated_image(&self, user_id: Uuid, image_id: Uuid) -> PortResult<()> {
        let result =
            sqlx::query("DELETE FROM generated_images WHERE id = $1 AND user_id = $2")
                .bind(image_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Image {} not found", image_id)));
        }
        Ok(())
    }
}
