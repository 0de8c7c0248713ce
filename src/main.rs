//! MCQ Generator Backend
//!
//! - Axum HTTP API: upload a PDF, image, or text file and get multiple-choice questions back
//! - Optional OpenAI integration (via environment variables) with a local fallback synthesizer
//! - Optional account mode: registration, JWT sessions, per-user usage quota (SQLite)
//! - Static frontend fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT             : u16 (default 8001)
//!   OPENAI_API_KEY   : enables OpenAI integration if present
//!   OPENAI_BASE_URL  : default "https://api.openai.com/v1"
//!   OPENAI_MODEL     : default "gpt-4o-mini"
//!   DATABASE_URL     : e.g. "sqlite://mcq.db"; with JWT_SECRET enables account mode
//!   JWT_SECRET       : HS256 signing secret for session tokens
//!   MCQ_CONFIG_PATH  : path to TOML config (limits, prompts, fallback, ocr, auth, server)
//!   LOG_LEVEL        : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT       : "pretty" (default) or "json"

mod auth;
mod config;
mod domain;
mod error;
mod extract;
mod generate;
mod openai;
mod protocol;
mod routes;
mod state;
mod store;
mod synth;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

const DEFAULT_PORT: u16 = 8001;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (config, OpenAI client, account store).
  let state = Arc::new(AppState::from_env().await?);

  let app = build_router(state);

  let port = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .unwrap_or(DEFAULT_PORT);
  let addr = SocketAddr::from(([0, 0, 0, 0], port));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mcqgen_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "mcqgen_backend", "HTTP server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "mcqgen_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "mcqgen_backend", "Shutdown signal received");
}
