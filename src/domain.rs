//! Domain models: a generated question and where a batch of questions came from.

use serde::{Deserialize, Serialize};

/// One multiple-choice question.
///
/// `options` always has 4 entries and `options[answer_index]` is the correct one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqRecord {
  pub question: String,
  pub options: Vec<String>,
  pub answer_index: usize,
}

/// Who produced the questions?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum McqSource {
  Openai,   // chat-completions output accepted
  Fallback, // local synthesizer
}

/// Outcome of a generation request as reported to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
  Ok,
  /// The model was asked but its answer was unusable; fallback output returned.
  Partial,
  /// No model configured.
  FallbackNoKey,
}
