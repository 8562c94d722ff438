//! Ollama `/api/generate` client.
//!
//! One non-streaming request per item with the reply shape pinned by a JSON
//! schema in `format`. Each call runs under a deadline and the run's
//! cancellation token; either one drops the in-flight request, which closes
//! its connection.

use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug};

use super::schema::{parse_phrases, phrase_schema};
use super::{GenerateError, GenerationClient};
use crate::config::{Config, PromptPolicy};
use crate::error::{Error, Result};
use crate::model::{InputItem, OutputRecord};
use crate::telemetry::{genai, metrics};

const PROVIDER: &str = "ollama";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a Value,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// Client for a local (or proxied) Ollama daemon.
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    prompt: PromptPolicy,
    schema: Value,
    api_key: Option<SecretString>,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        // A local daemon is never reached through a system proxy.
        if is_loopback(base_url) {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
            timeout,
            prompt: PromptPolicy::default(),
            schema: phrase_schema(),
            api_key: None,
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(
            &config.ollama_url,
            config.model.clone(),
            config.request_timeout,
        )?
        .prompt(config.prompt.clone());
        if let Some(ref key) = config.ollama_api_key {
            client = client.api_key(key.clone());
        }
        Ok(client)
    }

    pub fn prompt(mut self, prompt: PromptPolicy) -> Self {
        self.prompt = prompt;
        self
    }

    /// Bearer token sent with every request, for endpoints behind a proxy.
    pub fn api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(
        &self,
        item: &InputItem,
    ) -> std::result::Result<Vec<OutputRecord>, GenerateError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: self.prompt.render(&item.key),
            stream: false,
            format: &self.schema,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.map_http_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| self.map_http_error(e))?;
        let reply = collapse_reply(&text)?;

        let input = reply.prompt_eval_count.unwrap_or(0);
        let output = reply.eval_count.unwrap_or(0);
        genai::record_token_usage(&Span::current(), input, output);
        let tokens = metrics::llm_tokens();
        for (direction, count) in [("input", input), ("output", output)] {
            tokens.add(
                count,
                &[
                    KeyValue::new("model", self.model.clone()),
                    KeyValue::new("direction", direction),
                ],
            );
        }

        let records = parse_phrases(&item.key, &reply.response)
            .map_err(|e| GenerateError::Request(format!("unparseable model reply: {e}")))?;
        debug!(key = %item.key, records = records.len(), "reply parsed");
        Ok(records)
    }

    fn map_http_error(&self, error: reqwest::Error) -> GenerateError {
        if error.is_timeout() {
            GenerateError::Timeout {
                after: self.timeout,
            }
        } else {
            GenerateError::Request(error.to_string())
        }
    }
}

impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        item: &InputItem,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<OutputRecord>, GenerateError> {
        let span = genai::start_generate_span(&self.model, PROVIDER);
        async {
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(GenerateError::Cancelled),
                outcome = tokio::time::timeout(self.timeout, self.request(item)) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(GenerateError::Timeout { after: self.timeout }),
                },
            };

            let label = match &result {
                Ok(_) => "ok",
                Err(e) => e.kind(),
            };
            metrics::generate_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("outcome", label)],
            );
            result
        }
        .instrument(span)
        .await
    }
}

fn is_loopback(base_url: &str) -> bool {
    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|h| matches!(h, "localhost" | "127.0.0.1" | "[::1]" | "::1"))
        })
        .unwrap_or(false)
}

/// Fold a reply body into one logical response.
///
/// A non-streaming reply is a single JSON object. If the daemon streams
/// anyway, the body is newline-delimited fragments whose `response` text is
/// concatenated in order.
fn collapse_reply(body: &str) -> std::result::Result<GenerateResponse, GenerateError> {
    if let Ok(reply) = serde_json::from_str::<GenerateResponse>(body) {
        return Ok(reply);
    }

    let mut merged = GenerateResponse::default();
    let mut fragments = 0usize;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fragment: GenerateResponse = serde_json::from_str(line)
            .map_err(|e| GenerateError::Request(format!("bad response envelope: {e}")))?;
        merged.response.push_str(&fragment.response);
        merged.prompt_eval_count = fragment.prompt_eval_count.or(merged.prompt_eval_count);
        merged.eval_count = fragment.eval_count.or(merged.eval_count);
        fragments += 1;
    }

    if fragments == 0 {
        return Err(GenerateError::Request("empty response body".to_string()));
    }
    Ok(merged)
}
