//! Anthropic messages adapter. The system prompt travels in its own field,
//! outside the turn list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::retry::RetryPolicy;
use super::transport::HttpTransport;
use super::{resolve_config, LlmProvider, ProviderError};
use crate::model::{
    merged_system_prompt, GenerationOptions, GenerationResult, Message, ProviderConfig,
    ResolvedProviderConfig, Role, TokenUsage, VendorKind,
};

const VENDOR: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";

pub const MODELS: &[&str] = &[
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "claude-2.1",
    "claude-2.0",
    "claude-instant-1.2",
];

#[derive(Debug)]
pub struct AnthropicProvider {
    config: ResolvedProviderConfig,
    transport: HttpTransport,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let config = resolve_config(&ProviderConfig {
            vendor: VendorKind::Anthropic,
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
    ) -> MessagesRequest<'a> {
        let turns = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Turn {
                role: if m.role == Role::User { "user" } else { "assistant" },
                content: &m.content,
            })
            .collect();

        MessagesRequest {
            model: &self.config.model,
            messages: turns,
            max_tokens: options.max_tokens_or_default(),
            temperature: options.temperature_or_default(),
            top_p: options.top_p_or_default(),
            system: merged_system_prompt(messages),
            stop_sequences: options.stop(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
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
        let url = format!("{}/messages", self.config.base_url);
        let headers = [
            ("x-api-key", self.config.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ];

        let response: MessagesResponse =
            self.transport.post_json(&url, &headers, &[], &body).await?;
        parse_response(response)
    }
}

fn parse_response(response: MessagesResponse) -> Result<GenerationResult, ProviderError> {
    let text = response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| ProviderError::parse(VENDOR, "no text content returned"))?;
    let usage = response
        .usage
        .ok_or_else(|| ProviderError::parse(VENDOR, "response is missing token usage"))?;

    Ok(GenerationResult {
        content: text,
        usage: Some(TokenUsage::new(usage.input_tokens, usage.output_tokens)),
        finish_reason: response.stop_reason.unwrap_or_else(|| "unknown".to_string()),
        model: response.model,
    })
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig::new(VendorKind::Anthropic).with_api_key("ant-test"))
            .unwrap()
    }

    #[test]
    fn system_message_moves_to_dedicated_field() {
        let provider = provider();
        let messages = vec![
            Message::system("you write playbooks"),
            Message::user("install nginx"),
            Message::assistant("sure"),
        ];
        let options = GenerationOptions::default();

        let body = serde_json::to_value(provider.build_request(&messages, &options)).unwrap();
        assert_eq!(body["system"], "you write playbooks");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert!(body.get("stop_sequences").is_none());
    }

    #[test]
    fn no_system_field_without_system_message() {
        let provider = provider();
        let messages = vec![Message::user("hi")];
        let options = GenerationOptions {
            stop_sequences: Some(vec!["END".into()]),
            ..Default::default()
        };

        let body = serde_json::to_value(provider.build_request(&messages, &options)).unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["stop_sequences"], json!(["END"]));
    }

    #[test]
    fn picks_text_block_and_maps_usage() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "model": "claude-3-sonnet-20240229",
            "content": [
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "---\n- hosts: all"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }))
        .unwrap();

        let result = parse_response(response).unwrap();
        assert_eq!(result.content, "---\n- hosts: all");
        assert_eq!(result.finish_reason, "end_turn");
        let usage = result.usage.unwrap();
        assert_eq!(usage.prompt_tokens(), 10);
        assert_eq!(usage.total_tokens(), 14);
    }

    #[test]
    fn missing_text_block_is_a_parse_error() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "model": "claude-3-sonnet-20240229",
            "content": [],
            "usage": {"input_tokens": 1, "output_tokens": 0}
        }))
        .unwrap();
        assert!(parse_response(response).unwrap_err().is_response_parse());
    }
}
