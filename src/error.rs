//! HTTP-facing error type. Every handler returns `Result<_, ApiError>` and body
//! extractors are routed through it too (`ApiJson`, `Multipart` rejections), so the
//! response body is always `{"status": "error", "message": ..., "redirect"?: ...}`.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::extract::ExtractError;
use crate::protocol::ErrorOut;
use crate::store::StoreError;

const UPGRADE_PAGE: &str = "plan.html";

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("Free users can generate up to {max} MCQs. Upgrade to premium for more.")]
  TooManyQuestions { max: usize },

  #[error("Usage quota reached: {used} of {quota} MCQs used, {requested} requested. Upgrade to premium for more.")]
  QuotaExceeded { used: i64, quota: i64, requested: i64 },

  #[error("{0}")]
  BadRequest(String),

  #[error("Text extraction failed: {0}")]
  Extraction(#[from] ExtractError),

  #[error("Unauthorized: {0}")]
  Unauthorized(&'static str),

  #[error("Invalid username or password")]
  InvalidCredentials,

  #[error("Username already taken")]
  UsernameTaken,

  #[error("Account mode is not enabled on this server")]
  AccountsDisabled,

  /// Request body the framework could not decode; keeps the extractor's status.
  #[error("{1}")]
  Rejected(StatusCode, String),

  #[error("Internal error")]
  Internal(String),
}

/// `Json` whose rejections are reported as `ApiError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::Rejected(rejection.status(), rejection.body_text())
  }
}

impl From<MultipartRejection> for ApiError {
  fn from(rejection: MultipartRejection) -> Self {
    ApiError::Rejected(rejection.status(), rejection.body_text())
  }
}

impl ApiError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      ApiError::TooManyQuestions { .. } | ApiError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
      ApiError::BadRequest(_) | ApiError::Extraction(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
      ApiError::UsernameTaken => StatusCode::CONFLICT,
      ApiError::AccountsDisabled => StatusCode::NOT_FOUND,
      ApiError::Rejected(status, _) => *status,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn redirect(&self) -> Option<&'static str> {
    match self {
      ApiError::TooManyQuestions { .. } | ApiError::QuotaExceeded { .. } => Some(UPGRADE_PAGE),
      _ => None,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let ApiError::Internal(detail) = &self {
      // Details stay in the logs only.
      error!(target: "mcqgen_backend", %detail, "Request failed with internal error");
    }
    let body = ErrorOut { status: "error", message: self.to_string(), redirect: self.redirect() };
    (self.status_code(), Json(body)).into_response()
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::UsernameTaken => ApiError::UsernameTaken,
      StoreError::UnknownUser => ApiError::Unauthorized("unknown user"),
      StoreError::QuotaExceeded { used, quota, requested } => ApiError::QuotaExceeded { used, quota, requested },
      StoreError::Db(e) => ApiError::Internal(e.to_string()),
    }
  }
}

impl From<AuthError> for ApiError {
  fn from(e: AuthError) -> Self {
    ApiError::Internal(e.to_string())
  }
}
