//! Account mode: password hashing, session tokens, and the bearer-token extractor.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, get_current_timestamp, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::state::{Accounts, AppState};

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("password hashing failed: {0}")]
  Hash(String),

  #[error("invalid token: {0}")]
  Token(#[from] jsonwebtoken::errors::Error),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| AuthError::Hash(e.to_string()))
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
  match PasswordHash::new(stored_hash) {
    Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
    Err(_) => false,
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
  pub sub: String,
  pub iat: u64,
  pub exp: u64,
}

/// HS256 signing keys plus token lifetime.
#[derive(Clone)]
pub struct TokenKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
  ttl_secs: u64,
}

impl TokenKeys {
  pub fn new(secret: &[u8], ttl_minutes: u64) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      ttl_secs: ttl_minutes * 60,
    }
  }

  pub fn ttl_secs(&self) -> u64 {
    self.ttl_secs
  }

  pub fn issue(&self, username: &str) -> Result<String, AuthError> {
    let now = get_current_timestamp();
    let claims = Claims { sub: username.to_string(), iat: now, exp: now + self.ttl_secs };
    Ok(encode(&Header::default(), &claims, &self.encoding)?)
  }

  pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
    Ok(data.claims)
  }
}

/// Username taken from a valid `Authorization: Bearer <jwt>` header.
#[derive(Clone, Debug)]
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
    let accounts = state.accounts.as_ref().ok_or(ApiError::AccountsDisabled)?;
    bearer_user(accounts, &parts.headers).map(AuthUser)
  }
}

/// Validate the bearer token in `headers` and return its subject.
pub fn bearer_user(accounts: &Accounts, headers: &HeaderMap) -> Result<String, ApiError> {
  let header = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized("missing bearer token"))?;
  let token = header
    .strip_prefix("Bearer ")
    .or_else(|| header.strip_prefix("bearer "))
    .ok_or(ApiError::Unauthorized("missing bearer token"))?;
  let claims = accounts
    .keys
    .verify(token.trim())
    .map_err(|_| ApiError::Unauthorized("invalid or expired token"))?;
  Ok(claims.sub)
}
