//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on values that do not parse.
//! Every variable has a default, so an empty environment is a valid
//! configuration pointing at a local Ollama daemon.

pub mod prompt;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::engine::FailureReporting;
use crate::error::{Error, Result};

pub use prompt::PromptPolicy;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "gemma3:latest";

#[derive(Debug)]
pub struct Config {
    pub input_path: PathBuf,
    pub processed_path: PathBuf,
    pub output_path: PathBuf,
    pub cutoff_rank: u32,
    pub max_concurrency: usize,
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    pub failure_reporting: FailureReporting,
    pub prompt: PromptPolicy,
    pub ollama_url: String,
    pub model: String,
    pub ollama_api_key: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_concurrency: usize = parse_var(&var, "PHRASEGEN_CONCURRENCY", 3)?;
        if max_concurrency == 0 {
            return Err(Error::Config(
                "PHRASEGEN_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        let flush_ms: u64 = parse_var(&var, "PHRASEGEN_FLUSH_MS", 10)?;
        if flush_ms == 0 {
            return Err(Error::Config(
                "PHRASEGEN_FLUSH_MS must be at least 1".to_string(),
            ));
        }

        let prompt = match var("PHRASEGEN_PROMPT_FILE") {
            Some(path) => PromptPolicy::load(PathBuf::from(path).as_path())?,
            None => PromptPolicy::default(),
        };

        Ok(Self {
            input_path: var("PHRASEGEN_INPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/chinese_chars.csv")),
            processed_path: var("PHRASEGEN_PROCESSED")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("processed.csv")),
            output_path: var("PHRASEGEN_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("generated.csv")),
            cutoff_rank: parse_var(&var, "PHRASEGEN_CUTOFF", 3000)?,
            max_concurrency,
            flush_interval: Duration::from_millis(flush_ms),
            request_timeout: Duration::from_secs(parse_var(&var, "PHRASEGEN_TIMEOUT_SECS", 600)?),
            failure_reporting: parse_var(&var, "PHRASEGEN_FAILURES", FailureReporting::Logged)?,
            prompt,
            ollama_url: var("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ollama_api_key: var("OLLAMA_API_KEY").map(SecretString::from),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}
