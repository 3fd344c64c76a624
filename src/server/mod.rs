//! ==============================================================================
//! server - REST api and websocket live feed
//! ==============================================================================
//!
//! routes:
//!     GET    /health                      liveness, no auth
//!     GET    /ws                          websocket, one live session per socket
//!     POST   /api/data/fetch-and-save     primary sensor -> validate -> store
//!     POST   /api/data/fetch-temp         secondary sensor -> validate -> store
//!     GET    /api/data/latest             newest reading per device
//!     POST   /api/data/add/:id            direct submission for a device
//!     GET    /api/data/:id/:num           num most recent readings of a device
//!     DELETE /api/data/clear/fetch-save   purge the primary device
//!     DELETE /api/data/clear/fetch-temp   purge the secondary device
//!     DELETE /api/data/all                purge everything
//!     DELETE /api/data/:id                purge one device
//!
//! relationships:
//!     - uses: fetcher.rs, validate.rs, store.rs, relay.rs
//!     - used by: main.rs (serve), tests/api.rs (oneshot)
//!
//! ==============================================================================

mod error;
mod handlers;
mod websocket;

pub use error::{ApiError, ApiResult};

use crate::config::DevicesConfig;
use crate::fetcher::RemoteSensors;
use crate::relay::LiveRelay;
use crate::store::ReadingStore;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// ==============================================================================
// shared state
// ==============================================================================
// cheap to clone: everything behind Arc or already a clone-able handle

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub sensors: RemoteSensors,
    pub relay: LiveRelay,
    pub devices: DevicesConfig,
    /// bearer token callers must present; None disables the gate
    pub api_token: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/data/fetch-and-save", post(handlers::fetch_and_save_primary))
        .route("/api/data/fetch-temp", post(handlers::fetch_and_save_secondary))
        .route("/api/data/latest", get(handlers::latest))
        .route("/api/data/add/:id", post(handlers::add_reading))
        .route("/api/data/clear/fetch-save", delete(handlers::clear_primary))
        .route("/api/data/clear/fetch-temp", delete(handlers::clear_secondary))
        .route("/api/data/all", delete(handlers::clear_all))
        .route("/api/data/:id", delete(handlers::clear_device))
        .route("/api/data/:id/:num", get(handlers::recent))
        .route("/ws", get(websocket::live_feed))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("No route for {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{} is not allowed on {}", method, uri.path()),
    )
}

/// pass/fail gate in front of every data route
async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let verdict = {
        // browsers can't set headers on a websocket upgrade, so ?token= works too
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .or_else(|| {
                request
                    .uri()
                    .query()?
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("token="))
            });

        match presented {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(ApiError::unauthorized("Invalid token")),
            None => Err(ApiError::unauthorized("Missing bearer token")),
        }
    };
    verdict?;

    Ok(next.run(request).await)
}
