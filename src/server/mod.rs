//! HTTP ingress for the analysis pipeline.
//!
//! ## Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/api/analyze-and-summarize` | [`handlers::analyze_and_summarize`] |
//! | `OPTIONS` | any path | `204 No Content` |
//! | other | `/api/analyze-and-summarize` | `405` JSON envelope |
//! | `GET` | `/api/health` | [`handlers::health`] |
//! | `GET` | `/api/env-check` | [`handlers::env_check`] |
//!
//! CORS is handled by a permissive [`CorsLayer`] (`*` origin, `GET`, `POST`
//! and `OPTIONS`, `Content-Type` and `Authorization`, one-day max-age).
//! Preflight answers are rewritten to `204 No Content` by
//! [`preflight_no_content`].

pub mod error;
pub mod handlers;

use crate::analyze::Analyzer;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use error::ApiError;

/// How long browsers may cache a preflight answer.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Headroom on top of the upload limit for multipart framing and the
/// base64 expansion of JSON uploads.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
}

/// Build the application router.
pub fn router(analyzer: Arc<Analyzer>) -> Router {
    let upload_limit = analyzer.config().max_upload_bytes;
    let body_limit = upload_limit
        .saturating_add(upload_limit / 3)
        .saturating_add(BODY_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/api/analyze-and-summarize",
            post(handlers::analyze_and_summarize).fallback(handlers::method_not_allowed),
        )
        .route("/api/health", get(handlers::health))
        .route("/api/env-check", get(handlers::env_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { analyzer })
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(PREFLIGHT_MAX_AGE)
}

/// Rewrite the answer to any `OPTIONS` request as `204 No Content`,
/// keeping the CORS headers.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let response = next.run(request).await;
    if !is_options {
        return response;
    }
    let (mut parts, _) = response.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(CONTENT_TYPE);
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}

/// Serve until Ctrl-C.
pub async fn serve(analyzer: Arc<Analyzer>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "medreport listening");
    axum::serve(listener, router(analyzer))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => {
                    error!("Cannot listen for Ctrl-C ({}); serving until killed", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
}
