//! Public HTTP request/response structs (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{GenerationStatus, McqRecord, McqSource};
use crate::store::Usage;

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub status: GenerationStatus,
    pub source: McqSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub mcqs: Vec<McqRecord>,
    /// Present in account mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageOut>,
}

#[derive(Deserialize)]
pub struct CredentialsIn {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterOut {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenOut {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct UsageOut {
    pub username: String,
    pub used: i64,
    pub quota: i64,
    pub remaining: i64,
}

impl UsageOut {
    pub fn new(username: &str, usage: &Usage) -> Self {
        Self {
            username: username.to_string(),
            used: usage.used,
            quota: usage.quota,
            remaining: usage.remaining(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub openai: bool,
    pub accounts: bool,
}
