//! Question generation policy shared by the HTTP handlers.
//!
//! Ask the model when one is configured; fall back to the local synthesizer when
//! it is not, or when its answer cannot be used.

use tracing::{info, instrument, warn};

use crate::domain::{GenerationStatus, McqRecord, McqSource};
use crate::state::AppState;
use crate::util::truncate_chars;

#[derive(Debug)]
pub struct Generation {
  pub status: GenerationStatus,
  pub source: McqSource,
  pub error: Option<String>,
  pub mcqs: Vec<McqRecord>,
}

#[instrument(level = "info", skip(state, text), fields(text_len = text.len()))]
pub async fn generate_mcqs(state: &AppState, text: &str, num_questions: usize) -> Generation {
  if let Some(oa) = &state.openai {
    let for_model = truncate_chars(text, state.config.limits.max_model_chars);
    match oa.generate_mcqs(&state.config.prompts, for_model, num_questions).await {
      Ok(mcqs) => {
        info!(target: "mcq", count = mcqs.len(), source = "openai", "MCQs generated");
        return Generation { status: GenerationStatus::Ok, source: McqSource::Openai, error: None, mcqs };
      }
      Err(e) => {
        warn!(target: "mcq", error = %e, "Model output unusable; using fallback synthesizer");
        let mcqs = state.fallback_mcqs(text, num_questions);
        return Generation { status: GenerationStatus::Partial, source: McqSource::Fallback, error: Some(e), mcqs };
      }
    }
  }

  let mcqs = state.fallback_mcqs(text, num_questions);
  info!(target: "mcq", count = mcqs.len(), source = "fallback", "MCQs generated without model");
  Generation { status: GenerationStatus::FallbackNoKey, source: McqSource::Fallback, error: None, mcqs }
}
