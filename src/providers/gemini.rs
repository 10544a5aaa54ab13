use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::retry::RetryPolicy;
use super::transport::HttpTransport;
use super::{resolve_config, LlmProvider, ProviderError};
use crate::model::{
    merged_system_prompt, GenerationOptions, GenerationResult, Message, ProviderConfig,
    ResolvedProviderConfig, Role, TokenUsage, VendorKind,
};

const VENDOR: &str = "Gemini";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub const MODELS: &[&str] = &[
    "gemini-3-pro",
    "gemini-3-deep-think",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

#[derive(Debug)]
pub struct GeminiProvider {
    config: ResolvedProviderConfig,
    transport: HttpTransport,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let config = resolve_config(&ProviderConfig {
            vendor: VendorKind::Gemini,
            ..config
        })?;
        let transport = HttpTransport::new(VENDOR, &config)?;
        Ok(Self { config, transport })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.retry()
    }

    fn build_request<'a>(&self, messages: &'a [Message], options: &'a GenerationOptions) -> GeminiRequest<'a> {
        GeminiRequest {
            contents: convert_messages(messages),
            generation_config: GenerationConfig {
                temperature: options.temperature_or_default(),
                top_p: options.top_p_or_default(),
                max_output_tokens: options.max_tokens_or_default(),
                stop_sequences: options.stop(),
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: *category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

/// Gemini has no system slot: the system text is prepended to the first
/// conversational turn when that turn is a user turn, and dropped otherwise.
fn convert_messages(messages: &[Message]) -> Vec<Content> {
    let system = merged_system_prompt(messages);
    let mut turns = messages.iter().filter(|m| m.role != Role::System).peekable();
    let mut contents = Vec::new();

    if let Some(system) = system {
        match turns.peek() {
            Some(first) if first.role == Role::User => {
                contents.push(Content {
                    role: "user",
                    parts: vec![Part {
                        text: format!("{}\n\n{}", system, first.content),
                    }],
                });
                turns.next();
            }
            _ => warn!("dropping system prompt: no leading user turn to attach it to"),
        }
    }

    contents.extend(turns.map(|m| Content {
        role: if m.role == Role::Assistant { "model" } else { "user" },
        parts: vec![Part {
            text: m.content.clone(),
        }],
    }));
    contents
}

#[async_trait]
impl LlmProvider for GeminiProvider {
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
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let query = [("key", self.config.api_key.clone())];

        let response: GeminiResponse = self.transport.post_json(&url, &[], &query, &body).await?;
        parse_response(response, &self.config.model)
    }
}

fn parse_response(response: GeminiResponse, model: &str) -> Result<GenerationResult, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::parse(VENDOR, "no candidates returned"))?;

    let finish_reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
    match finish_reason.as_str() {
        "MAX_TOKENS" => warn!("Gemini response truncated due to max_tokens limit"),
        "SAFETY" => warn!("Gemini response blocked by safety filters"),
        _ => {}
    }

    let content = candidate
        .content
        .ok_or_else(|| ProviderError::parse(VENDOR, "candidate has no content"))?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();

    let usage = response.usage_metadata.and_then(|meta| {
        TokenUsage::from_counts(meta.prompt_token_count, meta.candidates_token_count)
    });

    Ok(GenerationResult {
        content: text,
        usage,
        finish_reason,
        model: model.to_string(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<Content>,
    generation_config: GenerationConfig<'a>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}
