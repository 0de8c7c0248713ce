//! Minimal OpenAI client for MCQ generation.
//!
//! We only call chat.completions and request a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::McqRecord;
use crate::synth::OPTION_COUNT;
use crate::util::{fill_template, trunc_for_log};

const MCQ_TEMPERATURE: f32 = 0.2;
const MCQ_MAX_TOKENS: u32 = 900;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    Self::new(api_key, base_url, model)
  }

  pub fn new(api_key: String, base_url: String, model: String) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: Option<u32>,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "mcqgen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, trunc_for_log(&msg, 300)));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    info!(content_len = text.len(), "OpenAI content received");

    serde_json::from_str::<T>(text.trim()).map_err(|e| format!("JSON parse error: {}", e))
  }

  /// Ask the model for `num_questions` MCQs about `text`.
  /// Any transport, HTTP, parse, or shape problem is returned as `Err`.
  #[instrument(level = "info", skip(self, prompts, text), fields(text_len = text.len(), %num_questions))]
  pub async fn generate_mcqs(
    &self,
    prompts: &Prompts,
    text: &str,
    num_questions: usize,
  ) -> Result<Vec<McqRecord>, String> {
    let n = num_questions.to_string();
    let user = fill_template(&prompts.mcq_user_template, &[("num_questions", &n), ("text", text)]);
    let start = Instant::now();
    let result = self
      .chat_json::<McqPayload>(&prompts.mcq_system, &user, MCQ_TEMPERATURE, Some(MCQ_MAX_TOKENS))
      .await;
    let elapsed = start.elapsed();

    let payload = match result {
      Ok(p) => p,
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during MCQ generation");
        return Err(e);
      }
    };
    let mcqs = validate_payload(payload, num_questions)?;
    info!(?elapsed, count = mcqs.len(), "MCQs generated by model");
    Ok(mcqs)
  }
}

/// Accept `{"mcqs": [...]}` (what we ask for) or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum McqPayload {
  Wrapped { mcqs: Vec<RawMcq> },
  Bare(Vec<RawMcq>),
}

#[derive(Deserialize)]
struct RawMcq {
  question: String,
  options: Vec<String>,
  answer_index: usize,
}

fn validate_payload(payload: McqPayload, num_questions: usize) -> Result<Vec<McqRecord>, String> {
  let items = match payload {
    McqPayload::Wrapped { mcqs } => mcqs,
    McqPayload::Bare(v) => v,
  };
  if items.is_empty() {
    return Err("model returned no questions".into());
  }
  items
    .into_iter()
    .take(num_questions)
    .enumerate()
    .map(|(i, raw)| {
      if raw.options.len() != OPTION_COUNT {
        return Err(format!("question {} has {} options, expected {}", i, raw.options.len(), OPTION_COUNT));
      }
      if raw.answer_index >= OPTION_COUNT {
        return Err(format!("question {} has answer_index {} out of range", i, raw.answer_index));
      }
      if raw.question.trim().is_empty() {
        return Err(format!("question {} is empty", i));
      }
      Ok(McqRecord { question: raw.question, options: raw.options, answer_index: raw.answer_index })
    })
    .collect()
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
