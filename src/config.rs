use std::env;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Runtime configuration for the completion service, read from the
/// process environment (a `.env` file is loaded by `main` before this
/// runs).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Secret credential for the upstream API. Its absence is not a
    /// startup error; it is reported per-request instead.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_key = env::var("OPENAI_API_KEY").ok().and_then(non_blank);

        let api_base = env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_ms = env::var("BABYSTEP_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Self {
            api_key,
            api_base,
            model,
            timeout_ms,
        }
    }
}

/// A variable that is set but blank counts as unset.
fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
