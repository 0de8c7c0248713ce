//! Loading service configuration (limits, prompts, fallback tuning, OCR, accounts) from TOML.
//!
//! Every table and field is optional; see the `Default` impls for the values used
//! when `MCQ_CONFIG_PATH` is unset or the file cannot be read.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::synth::{Synthesizer, DEFAULT_BLANK, DEFAULT_FILLER, OPTION_COUNT};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub server: ServerCfg,
  #[serde(default)]
  pub limits: Limits,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub fallback: FallbackCfg,
  #[serde(default)]
  pub ocr: OcrCfg,
  #[serde(default)]
  pub auth: AuthCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
  /// Origins allowed by CORS. The frontend is usually served on :8000.
  pub allowed_origins: Vec<String>,
  pub static_dir: String,
  pub max_upload_bytes: usize,
}

impl Default for ServerCfg {
  fn default() -> Self {
    Self {
      allowed_origins: vec!["http://localhost:8000".into(), "http://127.0.0.1:8000".into()],
      static_dir: "./static".into(),
      max_upload_bytes: 20 * 1024 * 1024,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
  pub max_questions_per_request: usize,
  pub default_questions: usize,
  /// Extracted text is cut to this many chars before being sent to the model.
  pub max_model_chars: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self { max_questions_per_request: 15, default_questions: 5, max_model_chars: 4000 }
  }
}

/// Prompts used by the OpenAI client. `{num_questions}` and `{text}` are substituted.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub mcq_system: String,
  pub mcq_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      mcq_system: "You are a helpful assistant that creates MCQs in JSON. Respond ONLY with strict JSON.".into(),
      mcq_user_template: "You are an MCQ generator. From the following text produce {num_questions} multiple-choice questions.\n\
Return only valid JSON: an object {\"mcqs\": [...]} where each item has keys:\n\
  - question: string\n\
  - options: array of 4 strings\n\
  - answer_index: integer (0-3) indicating the correct option position\n\n\
Text:\n\"\"\"{text}\"\"\"".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FallbackCfg {
  pub filler_terms: Vec<String>,
  pub blank: String,
  /// Fixed RNG seed; makes fallback output reproducible across requests.
  pub seed: Option<u64>,
}

impl Default for FallbackCfg {
  fn default() -> Self {
    Self {
      filler_terms: DEFAULT_FILLER.iter().map(|s| s.to_string()).collect(),
      blank: DEFAULT_BLANK.into(),
      seed: None,
    }
  }
}

impl FallbackCfg {
  /// Build the synthesizer, replacing filler lists too small to complete 4 options.
  pub fn synthesizer(&self) -> Synthesizer {
    let distinct: HashSet<String> = self
      .filler_terms
      .iter()
      .map(|t| t.trim().to_lowercase())
      .filter(|t| !t.is_empty())
      .collect();
    let filler = if distinct.len() >= OPTION_COUNT {
      self.filler_terms.clone()
    } else {
      warn!(target: "mcqgen_backend", configured = distinct.len(), "fallback.filler_terms needs at least 4 distinct terms; using defaults");
      DEFAULT_FILLER.iter().map(|s| s.to_string()).collect()
    };
    let blank = if self.blank.is_empty() { DEFAULT_BLANK } else { self.blank.as_str() };
    Synthesizer::new(filler, blank)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OcrCfg {
  pub tesseract_cmd: String,
  pub language: String,
}

impl Default for OcrCfg {
  fn default() -> Self {
    Self { tesseract_cmd: "tesseract".into(), language: "eng".into() }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthCfg {
  /// Total questions a user may generate.
  pub usage_quota: i64,
  pub token_ttl_minutes: u64,
  pub min_password_len: usize,
}

impl Default for AuthCfg {
  fn default() -> Self {
    Self { usage_quota: 15, token_ttl_minutes: 60, min_password_len: 6 }
  }
}

/// Load `AppConfig` from MCQ_CONFIG_PATH. On any parsing/IO error, returns defaults.
pub fn load_config_from_env() -> AppConfig {
  let Ok(path) = std::env::var("MCQ_CONFIG_PATH") else {
    return AppConfig::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "mcqgen_backend", %path, "Loaded config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "mcqgen_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
        AppConfig::default()
      }
    },
    Err(e) => {
      error!(target: "mcqgen_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
      AppConfig::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [limits]
        max_questions_per_request = 10

        [fallback]
        seed = 99
      "#,
    )
    .expect("toml");
    assert_eq!(cfg.limits.max_questions_per_request, 10);
    assert_eq!(cfg.limits.default_questions, 5);
    assert_eq!(cfg.limits.max_model_chars, 4000);
    assert_eq!(cfg.fallback.seed, Some(99));
    assert_eq!(cfg.fallback.filler_terms.len(), DEFAULT_FILLER.len());
    assert_eq!(cfg.auth.usage_quota, 15);
    assert!(cfg.prompts.mcq_user_template.contains("{num_questions}"));
  }

  #[test]
  fn small_filler_list_is_replaced() {
    let cfg = FallbackCfg { filler_terms: vec!["a".into(), "A".into(), "b".into()], ..FallbackCfg::default() };
    assert_eq!(cfg.synthesizer().filler().len(), DEFAULT_FILLER.len());

    let cfg = FallbackCfg {
      filler_terms: vec!["cell".into(), "gene".into(), "atom".into(), "wave".into()],
      blank: "[blank]".into(),
      seed: None,
    };
    let synth = cfg.synthesizer();
    assert_eq!(synth.filler(), cfg.filler_terms.as_slice());
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    assert_eq!(synth.synthesize("ok", 1, &mut rng)[0].question, "[blank]");
  }
}
