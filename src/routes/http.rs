//! Health and MCQ generation handlers.

use std::sync::Arc;

use axum::{
  extract::{multipart::MultipartRejection, Multipart, State},
  http::HeaderMap,
  response::IntoResponse,
  Json,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::bearer_user;
use crate::error::ApiError;
use crate::extract::DocumentKind;
use crate::generate::generate_mcqs;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, openai: state.openai.is_some(), accounts: state.accounts.is_some() })
}

struct Upload {
  filename: Option<String>,
  content_type: Option<String>,
  bytes: Vec<u8>,
}

/// `file` (required) and `num_questions` (optional); other fields are ignored.
async fn read_form(multipart: &mut Multipart) -> Result<(Option<Upload>, Option<String>), ApiError> {
  let mut upload = None;
  let mut num_questions = None;
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
  {
    let name = field.name().unwrap_or("").to_string();
    debug!(target: "mcq", field = %name, filename = ?field.file_name(), content_type = ?field.content_type(), "Multipart field");
    match name.as_str() {
      "file" => {
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
          .bytes()
          .await
          .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;
        upload = Some(Upload { filename, content_type, bytes: bytes.to_vec() });
      }
      "num_questions" => {
        let text = field
          .text()
          .await
          .map_err(|e| ApiError::BadRequest(format!("Failed to read num_questions: {}", e)))?;
        num_questions = Some(text);
      }
      _ => {}
    }
  }
  Ok((upload, num_questions))
}

fn parse_num_questions(raw: Option<&str>, default: usize, max: usize) -> Result<usize, ApiError> {
  let n = match raw.map(str::trim).filter(|s| !s.is_empty()) {
    None => default,
    Some(s) => s
      .parse::<usize>()
      .ok()
      .filter(|n| *n >= 1)
      .ok_or_else(|| ApiError::BadRequest("num_questions must be a positive integer".into()))?,
  };
  if n > max {
    return Err(ApiError::TooManyQuestions { max });
  }
  Ok(n)
}

#[instrument(level = "info", skip(state, headers, multipart), fields(request_id = %Uuid::new_v4()))]
pub async fn http_generate_mcqs(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateOut>, ApiError> {
  // Account mode: reject anonymous callers before reading the upload.
  let username = match &state.accounts {
    Some(accounts) => Some(bearer_user(accounts, &headers)?),
    None => None,
  };

  let mut multipart = multipart?;
  let (upload, raw_n) = read_form(&mut multipart).await?;
  let limits = &state.config.limits;
  let num_questions = parse_num_questions(raw_n.as_deref(), limits.default_questions, limits.max_questions_per_request)?;
  let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;

  let kind = DocumentKind::detect(upload.filename.as_deref(), upload.content_type.as_deref());
  let text = state.extractor.extract(kind, upload.bytes).await?;

  // Reserve the full request up front; the undelivered part is given back below.
  let quota = state.config.auth.usage_quota;
  let reserved = match (&state.accounts, &username) {
    (Some(accounts), Some(user)) => Some(accounts.store.reserve_usage(user, num_questions as i64, quota).await?),
    _ => None,
  };

  let generation = generate_mcqs(&state, &text, num_questions).await;

  let usage = match (&state.accounts, &username, reserved) {
    (Some(accounts), Some(user), Some(mut usage)) => {
      let shortfall = num_questions.saturating_sub(generation.mcqs.len()) as i64;
      if shortfall > 0 {
        usage = accounts.store.release_usage(user, shortfall, quota).await?;
      }
      Some(UsageOut::new(user, &usage))
    }
    _ => None,
  };
  info!(target: "mcq", ?kind, %num_questions, returned = generation.mcqs.len(), status = ?generation.status, "HTTP generate-mcqs served");
  Ok(Json(GenerateOut {
    status: generation.status,
    source: generation.source,
    error: generation.error,
    mcqs: generation.mcqs,
    usage,
  }))
}
