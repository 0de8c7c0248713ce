//! Router assembly: HTTP endpoints, static files, CORS, body limit, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::state::AppState;

pub mod account;
pub mod http;

/// Build the application router with:
/// - `GET /health`
/// - `POST /generate-mcqs` (multipart upload)
/// - `POST /register`, `POST /login`, `GET /usage` (account mode)
/// - Static frontend from the configured directory with index fallback
/// - CORS restricted to the configured origins (credentials allowed)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let static_service = ServeDir::new(&server.static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{}/index.html", server.static_dir)));

    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(target: "mcqgen_backend", origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let body_limit = server.max_upload_bytes;

    Router::new()
        .route("/health", get(http::http_health))
        .route("/generate-mcqs", post(http::http_generate_mcqs))
        .route("/register", post(account::http_register))
        .route("/login", post(account::http_login))
        .route("/usage", get(account::http_usage))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
