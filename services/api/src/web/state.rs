//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::polling::RunTracker;
use image_studio_core::chain::GenerationChain;
use image_studio_core::ports::{DatabaseService, IdentityVerifier};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// `generation` is `None` when no provider API key is configured; the
/// generation endpoints then answer with a configuration error before any
/// upstream call.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub generation: Option<Arc<GenerationChain>>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub runs: Arc<RunTracker>,
}
