//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, google_identity::GoogleIdentityVerifier, prodia::ProdiaAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{
            google_login_handler, login_handler, logout_handler, reset_password_confirm_handler,
            reset_password_handler, signup_handler,
        },
        gallery::{delete_image_handler, list_images_handler},
        generation::{
            cancel_run_handler, generate_handler, job_status_handler, run_status_handler,
        },
        profile::{me_handler, update_profile_handler},
        require_auth,
        rest::ApiDoc,
        AppState, RunTracker,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use image_studio_core::chain::GenerationChain;
use image_studio_core::ports::ImageGenerationService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http_client = reqwest::Client::new();

    // Primary and fallback models share the same provider adapter; the chain
    // tries them in order. Without an API key the generation endpoints
    // answer with a configuration error instead of failing at startup.
    let generation = match &config.prodia_api_key {
        Some(api_key) => {
            let candidates: Vec<Arc<dyn ImageGenerationService>> = vec![
                Arc::new(ProdiaAdapter::new(
                    http_client.clone(),
                    config.prodia_base_url.clone(),
                    api_key.clone(),
                    config.primary_model.clone(),
                )),
                Arc::new(ProdiaAdapter::new(
                    http_client.clone(),
                    config.prodia_base_url.clone(),
                    api_key.clone(),
                    config.fallback_model.clone(),
                )),
            ];
            Some(Arc::new(GenerationChain::new(candidates)))
        }
        None => {
            warn!("PRODIA_API_KEY is not set; image generation is disabled");
            None
        }
    };

    let identity = Arc::new(GoogleIdentityVerifier::new(
        http_client,
        config.google_tokeninfo_url.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        generation,
        identity,
        runs: Arc::new(RunTracker::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/google", post(google_login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .route(
            "/auth/reset-password/confirm",
            post(reset_password_confirm_handler),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/profile", patch(update_profile_handler))
        .route("/images", get(list_images_handler))
        .route("/images/{id}", delete(delete_image_handler))
        .route("/images/generations", post(generate_handler))
        .route(
            "/images/generations/{run_id}",
            get(run_status_handler).delete(cancel_run_handler),
        )
        .route("/images/job-status", get(job_status_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
