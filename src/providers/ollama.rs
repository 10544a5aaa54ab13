//! Adapter for a locally hosted Ollama daemon. No credential is needed; the
//! adapter also exposes the daemon's model-inventory endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::retry::RetryPolicy;
use super::transport::HttpTransport;
use super::{resolve_config, LlmProvider, ProviderError};
use crate::model::{
    GenerationOptions, GenerationResult, Message, ProviderConfig, ResolvedProviderConfig,
    TokenUsage, VendorKind,
};

const VENDOR: &str = "Ollama";

pub const COMMON_MODELS: &[&str] = &[
    "llama2",
    "llama2:13b",
    "llama2:70b",
    "codellama",
    "codellama:13b",
    "codellama:34b",
    "mistral",
    "mixtral",
    "neural-chat",
    "starling-lm",
    "phi",
    "orca-mini",
    "vicuna",
];

#[derive(Debug)]
pub struct OllamaProvider {
    config: ResolvedProviderConfig,
    transport: HttpTransport,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let config = resolve_config(&ProviderConfig {
            vendor: VendorKind::Ollama,
            ..config
        })?;
        let transport = HttpTransport::new(VENDOR, &config)?;
        Ok(Self { config, transport })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.retry()
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Names of the models present in the local inventory.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.config.base_url);
        let tags: TagsResponse = self.transport.get_json(&url).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Asks the daemon to fetch `model` into its inventory and follows the
    /// streamed progress until the daemon reports success.
    pub async fn pull_model(&self, model: &str) -> Result<(), ProviderError> {
        let url = format!("{}/api/pull", self.config.base_url);
        let mut finished = false;
        self.transport
            .post_ndjson(&url, &PullRequest { name: model }, |progress: PullProgress| {
                if let Some(error) = progress.error {
                    return Err(ProviderError::Request {
                        vendor: VENDOR.to_string(),
                        status: None,
                        message: format!("model pull failed: {}", error),
                        retryable: false,
                    });
                }
                debug!(model, status = ?progress.status, "pull progress");
                finished = progress.status.as_deref() == Some("success");
                Ok(())
            })
            .await?;

        if !finished {
            return Err(ProviderError::parse(VENDOR, "pull stream ended before success"));
        }
        info!(model, "model pulled into local inventory");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        match self.list_models().await {
            Ok(models) => {
                debug!(count = models.len(), "Ollama is reachable");
                true
            }
            Err(err) => {
                warn!(error = %err, "Ollama is not reachable");
                false
            }
        }
    }

    fn build_request<'a>(&'a self, messages: &'a [Message], options: &'a GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                temperature: options.temperature_or_default(),
                top_p: options.top_p_or_default(),
                num_predict: options.max_tokens_or_default(),
                stop: options.stop(),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn available_models(&self) -> Vec<String> {
        COMMON_MODELS.iter().map(|m| m.to_string()).collect()
    }

    #[instrument(skip_all, fields(vendor = VENDOR, model = %self.config.model))]
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, ProviderError> {
        let body = self.build_request(messages, options);
        let url = format!("{}/api/chat", self.config.base_url);

        let response: ChatResponse = self.transport.post_json(&url, &[], &[], &body).await?;
        parse_response(response)
    }
}

fn parse_response(response: ChatResponse) -> Result<GenerationResult, ProviderError> {
    let message = response
        .message
        .ok_or_else(|| ProviderError::parse(VENDOR, "no message returned"))?;

    // Ollama reports zero counts on cached prompts; treat those as unreported.
    let nonzero = |count: Option<u32>| count.filter(|c| *c > 0);
    let usage = TokenUsage::from_counts(
        nonzero(response.prompt_eval_count),
        nonzero(response.eval_count),
    );

    Ok(GenerationResult {
        content: message.content,
        usage,
        finish_reason: if response.done { "stop" } else { "length" }.to_string(),
        model: response.model,
    })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions<'a> {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}
