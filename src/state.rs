//! Application state: configuration, the optional OpenAI client, the fallback
//! synthesizer, the text extractor, and (in account mode) the user store.
//!
//! Built once at startup and shared with handlers as `Arc<AppState>`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenKeys;
use crate::config::{load_config_from_env, AppConfig};
use crate::domain::McqRecord;
use crate::extract::Extractor;
use crate::openai::OpenAI;
use crate::store::{Store, StoreError};
use crate::synth::Synthesizer;

/// Store + signing keys; present only when DATABASE_URL and JWT_SECRET are both set.
#[derive(Clone)]
pub struct Accounts {
    pub store: Store,
    pub keys: TokenKeys,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub openai: Option<OpenAI>,
    pub synth: Synthesizer,
    pub extractor: Extractor,
    pub accounts: Option<Accounts>,
}

impl AppState {
    pub fn new(config: AppConfig, openai: Option<OpenAI>, accounts: Option<Accounts>) -> Self {
        let synth = config.fallback.synthesizer();
        debug!(target: "mcqgen_backend", filler_terms = synth.filler().len(), seeded = config.fallback.seed.is_some(), "Fallback synthesizer ready");
        let extractor = Extractor::new(config.ocr.clone());
        Self { config, openai, synth, extractor, accounts }
    }

    /// Build state from env: load config, init OpenAI, open the account store.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Result<Self, StoreError> {
        let config = load_config_from_env();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "mcqgen_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
        } else {
            info!(target: "mcqgen_backend", "OpenAI disabled (no OPENAI_API_KEY). Using fallback synthesizer.");
        }

        let db_url = std::env::var("DATABASE_URL").ok();
        let secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());
        let accounts = match (db_url, secret) {
            (Some(url), Some(secret)) => {
                let store = Store::connect(&url).await?;
                let keys = TokenKeys::new(secret.as_bytes(), config.auth.token_ttl_minutes);
                info!(target: "mcqgen_backend", quota = config.auth.usage_quota, "Account mode enabled.");
                Some(Accounts { store, keys })
            }
            (None, None) => None,
            _ => {
                warn!(target: "mcqgen_backend", "Account mode needs both DATABASE_URL and JWT_SECRET; running without accounts.");
                None
            }
        };

        Ok(Self::new(config, openai, accounts))
    }

    /// Run the local synthesizer with a per-call RNG (seeded when configured).
    pub fn fallback_mcqs(&self, text: &str, n: usize) -> Vec<McqRecord> {
        let mut rng = match self.config.fallback.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.synth.synthesize(text, n, &mut rng)
    }
}
