use std::{env, net::SocketAddr};

use anyhow::Context;

use crate::guardrail::RuleSpec;

pub const DEFAULT_API_KEY: &str = "super-secret-dev-key";
pub const DEFAULT_MASK_SENTINEL: &str = "***blocked***";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: SocketAddr,
    pub api_key: String,
    pub model_provider: String,
    pub openai_api_key: Option<String>,
    pub openai_api_url: String,
    pub model_name: String,
    pub model_timeout_sec: u64,
    pub frontend_origin: String,
    pub max_question_chars: usize,
    pub rate_limit_per_minute: u32,
    pub request_log_capacity: usize,
    pub mask_sentinel: String,
    pub injection_patterns: Option<Vec<RuleSpec>>,
    pub sensitive_patterns: Option<Vec<RuleSpec>>,
    pub log_format: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = lookup("PORT").unwrap_or_else(|| "8080".to_owned());
        let http_bind = lookup("HTTP_BIND").unwrap_or_else(|| format!("0.0.0.0:{port}"));
        let http_bind = http_bind
            .parse()
            .with_context(|| format!("invalid HTTP_BIND address: {http_bind}"))?;

        Ok(Self {
            http_bind,
            api_key: lookup("API_KEY").unwrap_or_else(|| DEFAULT_API_KEY.to_owned()),
            model_provider: lookup("MODEL_PROVIDER").unwrap_or_else(|| "auto".to_owned()),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
            openai_api_url: lookup("OPENAI_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_owned()),
            model_name: lookup("MODEL_NAME").unwrap_or_else(|| "gpt-4o-mini".to_owned()),
            model_timeout_sec: parse_or(&lookup, "MODEL_TIMEOUT_SEC", 20),
            frontend_origin: lookup("FRONTEND_ORIGIN")
                .unwrap_or_else(|| "http://localhost:5500".to_owned()),
            max_question_chars: parse_or(&lookup, "MAX_QUESTION_CHARS", 4000),
            rate_limit_per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 10),
            request_log_capacity: parse_or(&lookup, "REQUEST_LOG_CAPACITY", 1000),
            mask_sentinel: lookup("MASK_SENTINEL")
                .unwrap_or_else(|| DEFAULT_MASK_SENTINEL.to_owned()),
            injection_patterns: parse_rules(&lookup, "INJECTION_PATTERNS")?,
            sensitive_patterns: parse_rules(&lookup, "SENSITIVE_PATTERNS")?,
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "compact".to_owned()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    lookup(name)
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_rules(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> anyhow::Result<Option<Vec<RuleSpec>>> {
    let Some(raw) = lookup(name).filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    let rules = serde_json::from_str::<Vec<RuleSpec>>(&raw)
        .with_context(|| format!("{name} must be a JSON array of patterns"))?;
    Ok(Some(rules))
}
