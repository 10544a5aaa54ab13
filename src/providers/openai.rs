//! OpenAI chat-completions adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::retry::RetryPolicy;
use super::transport::HttpTransport;
use super::{resolve_config, LlmProvider, ProviderError};
use crate::model::{
    GenerationOptions, GenerationResult, Message, ProviderConfig, ResolvedProviderConfig,
    TokenUsage, VendorKind,
};

const VENDOR: &str = "OpenAI";

pub const MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo-preview",
    "gpt-4-0125-preview",
    "gpt-4-1106-preview",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-3.5-turbo-0125",
];

#[derive(Debug)]
pub struct OpenAiProvider {
    config: ResolvedProviderConfig,
    transport: HttpTransport,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let config = resolve_config(&ProviderConfig {
            vendor: VendorKind::OpenAi,
            ..config
        })?;
        let transport = HttpTransport::new(VENDOR, &config)?;
        Ok(Self { config, transport })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.retry()
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a GenerationOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature_or_default(),
            max_tokens: options.max_tokens_or_default(),
            top_p: options.top_p_or_default(),
            stop: options.stop(),
            stream: false,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn available_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }

    #[instrument(skip_all, fields(vendor = VENDOR, model = %self.config.model))]
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, ProviderError> {
        let body = self.build_request(messages, options);
        let url = format!("{}/chat/completions", self.config.base_url);
        let headers = [(
            "Authorization",
            format!("Bearer {}", self.config.api_key),
        )];

        let response: ChatResponse = self.transport.post_json(&url, &headers, &[], &body).await?;
        parse_response(response)
    }
}

fn parse_response(response: ChatResponse) -> Result<GenerationResult, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::parse(VENDOR, "no completion choices returned"))?;
    let content = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| ProviderError::parse(VENDOR, "completion choice has no message content"))?;
    let usage = response
        .usage
        .ok_or_else(|| ProviderError::parse(VENDOR, "response is missing token usage"))?;

    Ok(GenerationResult {
        content,
        usage: Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)),
        finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".to_string()),
        model: response.model,
    })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
