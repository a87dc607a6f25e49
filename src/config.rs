//! Environment configuration
//!
//! Everything is read once at startup (after `.env` is loaded). Missing
//! values fall back to defaults; a missing provider key is replaced by a
//! placeholder so upstream calls fail with client errors instead of the
//! process refusing to start.

use crate::agents::DEFAULT_MODEL;
use crate::error::AssistantError;
use crate::request::RetryPolicy;
use crate::session::ContextSource;
use crate::{catalog, gemini, Result};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::warn;

pub const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub financial_api_key: String,
    pub financial_api_base_url: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub port: u16,
    pub retry_policy: RetryPolicy,
    pub context_source: ContextSource,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars().collect())
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let financial_api_key = match get("FMP_API_KEY") {
            Some(key) => key.to_string(),
            None => {
                warn!("FMP_API_KEY not set, using placeholder; upstream calls will be rejected");
                API_KEY_PLACEHOLDER.to_string()
            }
        };

        let gemini_api_key = get("GEMINI_API_KEY").unwrap_or_default().to_string();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; every chat turn will fail");
        }

        let port = get("PORT")
            .or_else(|| get("API_PORT"))
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|e| AssistantError::Config(format!("Invalid port '{}': {}", p, e)))
            })
            .transpose()?
            .unwrap_or(8080);

        let defaults = RetryPolicy::default();
        let retry_policy = RetryPolicy {
            max_attempts: parse_number(get("REQUEST_MAX_ATTEMPTS"), "REQUEST_MAX_ATTEMPTS")?
                .map(|n: u32| n.max(1))
                .unwrap_or(defaults.max_attempts),
            retry_delay: parse_number(get("REQUEST_RETRY_DELAY_MS"), "REQUEST_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            timeout: parse_number(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        let context_source = match get("CONTEXT_SOURCE") {
            Some(value) => ContextSource::parse(value).ok_or_else(|| {
                AssistantError::Config(format!(
                    "Invalid CONTEXT_SOURCE '{}' (expected 'client' or 'session')",
                    value
                ))
            })?,
            None => ContextSource::default(),
        };

        Ok(Self {
            financial_api_key,
            financial_api_base_url: get("FINANCIAL_API_BASE_URL")
                .unwrap_or(catalog::DEFAULT_BASE_URL)
                .to_string(),
            gemini_api_key,
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or(gemini::DEFAULT_BASE_URL)
                .to_string(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(DEFAULT_MODEL).to_string(),
            port,
            retry_policy,
            context_source,
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| AssistantError::Config(format!("Invalid {} '{}': {}", key, v, e)))
        })
        .transpose()
}
