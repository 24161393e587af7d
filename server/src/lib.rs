//! Storysync Server - authoritative store for story-project documents.
//!
//! Serves conditional saves over HTTP: a save is accepted only if it was
//! based on the current version, and every accepted version is kept in a
//! bounded snapshot history.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod routes;

use crate::config::Config;
use crate::repository::Repository;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use crate::error::AppError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Repository,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(repository: Repository, config: Config) -> Self {
        Self {
            repository,
            config: Arc::new(config),
        }
    }

    /// In-memory state, for tests and local tooling.
    pub fn in_memory(config: Config) -> Self {
        let repository = Repository::memory(config.snapshot_retention);
        Self::new(repository, config)
    }
}

/// Build the router with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
