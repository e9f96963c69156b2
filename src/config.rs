//! Runtime configuration from the environment.
//!
//! `main` loads `.env` first, so everything here reads plain variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::model::DEFAULT_MODEL;
use crate::engine::{FallbackOrchestrator, ModelBackedEstimator, DEFAULT_MAX_CONCURRENCY};
use crate::llm::{AnthropicProvider, LLMProvider, OllamaProvider, OpenAICompatibleProvider, RateLimiter};

/// Value shipped in the sample `.env`; treated as no credential at all.
pub const PLACEHOLDER_API_KEY: &str = "your_anthropic_api_key_here";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Anthropic,
    Ollama,
    OpenAI,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Backend::Anthropic),
            "ollama" => Ok(Backend::Ollama),
            "openai" | "openai_compatible" => Ok(Backend::OpenAI),
            other => bail!("unknown PREDICTOR_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub backend: Backend,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
    pub rate_limit_per_minute: u32,
    pub feed_seed: Option<u64>,
    pub hospitals_file: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub bind_addr: String,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Anthropic,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            max_tokens: 200,
            call_timeout: Duration::from_secs(20),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rate_limit_per_minute: 100,
            feed_seed: None,
            hospitals_file: None,
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            log_file: "er_predictor.log".to_string(),
            bind_addr: "0.0.0.0:5001".to_string(),
        }
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}='{}'", key, raw)),
        None => Ok(default),
    }
}

impl PredictorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend = match get("PREDICTOR_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };
        let api_key = get("ANTHROPIC_API_KEY").filter(|k| k.trim() != PLACEHOLDER_API_KEY);

        Ok(Self {
            backend,
            api_key,
            model: get("PREDICTOR_MODEL").unwrap_or(defaults.model),
            base_url: get("PREDICTOR_BASE_URL"),
            max_tokens: parsed(&get, "PREDICTOR_MAX_TOKENS", defaults.max_tokens)?,
            call_timeout: Duration::from_secs(parsed(&get, "PREDICTOR_TIMEOUT_SECS", defaults.call_timeout.as_secs())?),
            max_concurrency: parsed(&get, "PREDICTOR_MAX_CONCURRENCY", defaults.max_concurrency)?,
            rate_limit_per_minute: parsed(&get, "API_RATE_LIMIT", defaults.rate_limit_per_minute)?,
            feed_seed: get("FEED_SEED").map(|s| s.trim().parse()).transpose().context("invalid FEED_SEED")?,
            hospitals_file: get("HOSPITALS_FILE").map(PathBuf::from),
            log_level: get("LOG_LEVEL").map(|l| l.to_lowercase()).unwrap_or(defaults.log_level),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_file: get("LOG_FILE").unwrap_or(defaults.log_file),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    /// The configured backend, or the reason the model-backed strategy cannot run.
    pub fn provider(&self) -> std::result::Result<Arc<dyn LLMProvider>, String> {
        match self.backend {
            Backend::Anthropic => {
                let key = self.api_key.clone().ok_or("ANTHROPIC_API_KEY not configured")?;
                let mut provider = AnthropicProvider::new(key, self.max_tokens);
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url.clone());
                }
                Ok(Arc::new(provider))
            }
            Backend::Ollama => {
                let client = match &self.base_url {
                    Some(url) => {
                        let parsed =
                            reqwest::Url::parse(url).map_err(|e| format!("invalid PREDICTOR_BASE_URL: {}", e))?;
                        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                            return Err("PREDICTOR_BASE_URL must be an http(s) URL with a host".to_string());
                        }
                        let port = parsed.port_or_known_default().unwrap_or(11434);
                        ollama_rs::Ollama::builder().host(parsed).port(port).build()
                    }
                    None => ollama_rs::Ollama::default(),
                };
                Ok(Arc::new(OllamaProvider::new(client)))
            }
            Backend::OpenAI => {
                let url = self.base_url.clone().ok_or("PREDICTOR_BASE_URL not configured")?;
                Ok(Arc::new(OpenAICompatibleProvider::new(url, self.api_key.clone(), self.max_tokens)))
            }
        }
    }

    /// Latch the strategy: rule-only when unconfigured, otherwise self-test the backend.
    pub async fn build_orchestrator(&self) -> FallbackOrchestrator {
        match self.provider() {
            Ok(provider) => {
                let estimator = ModelBackedEstimator::new(provider)
                    .with_model(self.model.clone())
                    .with_timeout(self.call_timeout)
                    .with_rate_limiter(Arc::new(RateLimiter::per_minute(self.rate_limit_per_minute)));
                FallbackOrchestrator::start(estimator).await
            }
            Err(reason) => FallbackOrchestrator::rule_only(reason),
        }
    }
}
