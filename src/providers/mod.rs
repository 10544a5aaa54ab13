//! Vendor adapters behind a single [`LlmProvider`] contract.
//!
//! Each adapter owns its HTTP client and retry policy; callers only see
//! [`GenerationResult`] or a [`ProviderError`].

pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod retry;
mod transport;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    GenerationOptions, GenerationResult, Message, ProviderConfig, ResolvedProviderConfig,
};

pub use anthropic::AnthropicProvider;
pub use factory::{Provider, ProviderFactory};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable vendor name, e.g. `OpenAI`.
    fn name(&self) -> &str;

    /// The model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Model identifiers the vendor is known to serve.
    fn available_models(&self) -> Vec<String>;

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, ProviderError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{vendor}: {message}")]
    Config { vendor: String, message: String },
    #[error("{vendor} request failed: {message}")]
    Request {
        vendor: String,
        status: Option<u16>,
        message: String,
        retryable: bool,
    },
    #[error("{vendor} request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        vendor: String,
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },
    #[error("{vendor} returned an unusable response: {message}")]
    ResponseParse { vendor: String, message: String },
}

impl ProviderError {
    pub fn config(vendor: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Config {
            vendor: vendor.into(),
            message: message.into(),
        }
    }

    pub fn parse(vendor: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::ResponseParse {
            vendor: vendor.into(),
            message: message.into(),
        }
    }

    pub fn transport(vendor: impl Into<String>, err: reqwest::Error) -> Self {
        ProviderError::Request {
            vendor: vendor.into(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            retryable: true,
        }
    }

    /// Non-2xx answer from the vendor. Rate limiting and server-side
    /// failures are worth retrying, other client errors are not.
    pub fn status(vendor: impl Into<String>, status: u16, body: &str) -> Self {
        ProviderError::Request {
            vendor: vendor.into(),
            status: Some(status),
            message: format!("HTTP {}: {}", status, body.trim()),
            retryable: status == 429 || status >= 500,
        }
    }

    pub fn retry_exhausted(vendor: impl Into<String>, attempts: u32, source: ProviderError) -> Self {
        ProviderError::RetryExhausted {
            vendor: vendor.into(),
            attempts,
            source: Box::new(source),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Request { retryable: true, .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ProviderError::Config { .. })
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            ProviderError::Request { .. } | ProviderError::RetryExhausted { .. }
        )
    }

    pub fn is_response_parse(&self) -> bool {
        matches!(self, ProviderError::ResponseParse { .. })
    }
}

/// Applies vendor defaults to `config` and checks the credential and model
/// invariants. Caller-supplied values always win.
pub fn resolve_config(config: &ProviderConfig) -> Result<ResolvedProviderConfig, ProviderError> {
    let vendor = config.vendor;
    let defaults = vendor.defaults();

    let api_key = match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ if vendor.requires_credential() => {
            return Err(ProviderError::config(
                vendor.display_name(),
                "API key is required",
            ))
        }
        _ => "not-required".to_string(),
    };

    let model = match config.model.as_deref() {
        None => defaults.model.to_string(),
        Some(model) if model.trim().is_empty() => {
            return Err(ProviderError::config(
                vendor.display_name(),
                "model name is required",
            ))
        }
        Some(model) => model.trim().to_string(),
    };

    let base_url = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(defaults.base_url)
        .trim_end_matches('/')
        .to_string();

    Ok(ResolvedProviderConfig {
        vendor,
        api_key,
        model,
        base_url,
        timeout: config.timeout.unwrap_or(defaults.timeout),
        max_retries: config.max_retries.unwrap_or(defaults.max_retries),
        retry_base_delay: config
            .retry_base_delay
            .unwrap_or(crate::model::DEFAULT_RETRY_BASE_DELAY),
    })
}
