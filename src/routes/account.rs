//! Registration, login, and usage handlers (account mode only).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, instrument, warn};

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{ApiError, ApiJson};
use crate::protocol::*;
use crate::state::{Accounts, AppState};

const MAX_USERNAME_CHARS: usize = 64;

fn accounts(state: &AppState) -> Result<&Accounts, ApiError> {
  state.accounts.as_ref().ok_or(ApiError::AccountsDisabled)
}

#[instrument(level = "info", skip(state, body), fields(username = %body.username))]
pub async fn http_register(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<CredentialsIn>,
) -> Result<(StatusCode, Json<RegisterOut>), ApiError> {
  let accounts = accounts(&state)?;
  let username = body.username.trim().to_string();
  if username.is_empty() || username.chars().count() > MAX_USERNAME_CHARS {
    return Err(ApiError::BadRequest(format!("username must be 1-{} characters", MAX_USERNAME_CHARS)));
  }
  let min_len = state.config.auth.min_password_len;
  if body.password.chars().count() < min_len {
    return Err(ApiError::BadRequest(format!("password must be at least {} characters", min_len)));
  }

  let password = body.password;
  let hash = tokio::task::spawn_blocking(move || hash_password(&password))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
  accounts.store.create_user(&username, &hash).await?;

  info!(target: "mcqgen_backend", %username, "User registered");
  Ok((StatusCode::CREATED, Json(RegisterOut { username })))
}

#[instrument(level = "info", skip(state, body), fields(username = %body.username))]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<CredentialsIn>,
) -> Result<Json<TokenOut>, ApiError> {
  let accounts = accounts(&state)?;
  let username = body.username.trim().to_string();
  let Some(stored) = accounts.store.password_hash(&username).await? else {
    warn!(target: "mcqgen_backend", %username, "Login for unknown user");
    return Err(ApiError::InvalidCredentials);
  };

  let password = body.password;
  let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;
  if !ok {
    warn!(target: "mcqgen_backend", %username, "Login with wrong password");
    return Err(ApiError::InvalidCredentials);
  }

  let access_token = accounts.keys.issue(&username)?;
  info!(target: "mcqgen_backend", %username, "User logged in");
  Ok(Json(TokenOut { access_token, token_type: "bearer", expires_in: accounts.keys.ttl_secs() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_usage(
  State(state): State<Arc<AppState>>,
  AuthUser(username): AuthUser,
) -> Result<Json<UsageOut>, ApiError> {
  let accounts = accounts(&state)?;
  let usage = accounts.store.usage(&username, state.config.auth.usage_quota).await?;
  Ok(Json(UsageOut::new(&username, &usage)))
}
