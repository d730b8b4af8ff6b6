//! HTTP query surface.
//!
//! Serves the stored-log and live-tail API on top of Axum:
//!
//! - `GET /api/v1/ws` - upgrade to a filtered WebSocket subscription
//! - `GET /api/v1/logs` - list stored log streams
//! - `GET /api/v1/logs/{log}` - download one stream (bulk or chunked)
//!
//! Trailing slashes are tolerated on all routes. When authentication is
//! configured, every route goes through the auth middleware and requires
//! an admin principal; with authentication disabled the middleware is
//! omitted at router build time and access is anonymous.
//!
//! # Usage
//!
//! ```ignore
//! let state = AppState::new(hub, store, authenticator, cors_origins);
//! let router = build_router(state);
//! serve(&config, router, cancel).await?;
//! ```

pub mod auth;
mod error;
mod handlers;
mod server;
mod state;

pub use error::ApiError;
pub use server::serve;
pub use state::AppState;

use axum::routing::get;
use axum::{middleware, Router};

/// Assemble the API router. The auth middleware is only attached when the
/// state carries an authenticator.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/ws", get(handlers::ws_handler))
        .route("/api/v1/ws/", get(handlers::ws_handler))
        .route("/api/v1/logs", get(handlers::list_handler))
        .route("/api/v1/logs/", get(handlers::list_handler))
        .route("/api/v1/logs/{log}", get(handlers::download_handler))
        .route("/api/v1/logs/{log}/", get(handlers::download_handler));

    let router = if state.auth.is_some() {
        router.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
