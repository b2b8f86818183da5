pub mod auth;
pub mod cooldown;
pub mod gallery;
pub mod generation;
pub mod middleware;
pub mod polling;
pub mod profile;
pub mod rest;
pub mod state;

#[cfg(test)]
pub mod test_support;

// Re-export the pieces the server binary wires together.
pub use middleware::require_auth;
pub use polling::RunTracker;
pub use state::AppState;
