//! Playbook generation: named skeletons, provider-assisted generation and
//! the deterministic fallback.

pub mod skeletons;

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{GenerationOptions, Message, TokenUsage};
use crate::providers::LlmProvider;
use crate::templates::{AdditionalContext, PromptTemplateLibrary, TemplateError};
use crate::validation::{check_structure, StructureReport};

const GENERATION_SYSTEM_PROMPT: &str = "You are an expert Ansible automation engineer. \
Generate complete, production-ready Ansible playbooks that follow best practices: \
idempotent tasks, explicit privilege escalation, tags and handlers. \
Output ONLY the YAML content, without markdown fences or explanations.";

const TEMPLATE_SYSTEM_PROMPT: &str =
    "Follow the instructions below. Output ONLY the YAML content of the playbook.";

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("valid fence pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    #[serde(default)]
    pub target_hosts: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl GenerationContext {
    pub fn hosts(&self) -> &str {
        self.target_hosts.as_deref().unwrap_or("all")
    }

    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or("production")
    }

    fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(hosts) = &self.target_hosts {
            lines.push(format!("Target hosts: {}", hosts));
        }
        if let Some(environment) = &self.environment {
            lines.push(format!("Environment: {}", environment));
        }
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationStrategy {
    BuiltIn {
        skeleton: String,
    },
    Provider {
        vendor: String,
        model: String,
        usage: Option<TokenUsage>,
    },
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedPlaybook {
    pub file_name: String,
    pub content: String,
    pub validation: StructureReport,
    pub strategy: GenerationStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_hints: Vec<String>,
}

impl GeneratedPlaybook {
    fn new(content: String, strategy: GenerationStrategy) -> Self {
        Self {
            file_name: artifact_name(&content),
            validation: check_structure(&content),
            content,
            strategy,
            template_id: None,
            context_hints: Vec::new(),
        }
    }
}

/// `playbook_<unix-ms>_<first 8 hex of blake3(content)>.yml`
pub fn artifact_name(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes()).to_hex();
    format!(
        "playbook_{}_{}.yml",
        Utc::now().timestamp_millis(),
        &hash.as_str()[..8]
    )
}

/// Extracts the first fenced block if the reply has one, else the trimmed
/// reply itself.
pub fn strip_code_fences(reply: &str) -> String {
    match FENCED_BLOCK.captures(reply).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => reply.trim().to_string(),
    }
}

pub struct PlaybookGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    templates: Arc<PromptTemplateLibrary>,
}

impl PlaybookGenerator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, templates: Arc<PromptTemplateLibrary>) -> Self {
        Self {
            provider,
            templates,
        }
    }

    /// Never fails: a named skeleton, else the provider, else the fallback.
    pub async fn generate_playbook(
        &self,
        prompt: &str,
        skeleton: Option<&str>,
        context: &GenerationContext,
    ) -> GeneratedPlaybook {
        if let Some(name) = skeleton {
            match skeletons::builtin_skeleton(name) {
                Some(text) => {
                    info!(skeleton = name, "using built-in skeleton");
                    return GeneratedPlaybook::new(
                        text.to_string(),
                        GenerationStrategy::BuiltIn {
                            skeleton: name.to_string(),
                        },
                    );
                }
                None => debug!(skeleton = name, "unknown skeleton, generating instead"),
            }
        }

        let mut user_turn = format!(
            "Generate an Ansible playbook for the following request: {}",
            prompt
        );
        let context_lines = context.describe();
        if !context_lines.is_empty() {
            user_turn.push_str("\n\n");
            user_turn.push_str(&context_lines.join("\n"));
        }
        let messages = [
            Message::system(GENERATION_SYSTEM_PROMPT),
            Message::user(user_turn),
        ];

        match self.ask_provider(&messages).await {
            Some((content, strategy)) => GeneratedPlaybook::new(content, strategy),
            None => {
                info!("using template-based generation");
                GeneratedPlaybook::new(
                    skeletons::fallback_playbook(prompt, context),
                    GenerationStrategy::Fallback,
                )
            }
        }
    }

    /// Enriches `prompt` with template `template_id` before generating.
    /// Only an unknown template fails.
    pub async fn generate_with_template(
        &self,
        prompt: &str,
        template_id: &str,
        context: &GenerationContext,
        additional: &AdditionalContext,
    ) -> Result<GeneratedPlaybook, TemplateError> {
        let enriched = self.templates.enrich(prompt, template_id, additional)?;

        let mut user_turn = enriched.enriched_prompt.clone();
        let context_lines = context.describe();
        if !context_lines.is_empty() {
            user_turn.push_str("\n\n");
            user_turn.push_str(&context_lines.join("\n"));
        }
        let messages = [Message::system(TEMPLATE_SYSTEM_PROMPT), Message::user(user_turn)];

        let mut playbook = match self.ask_provider(&messages).await {
            Some((content, strategy)) => GeneratedPlaybook::new(content, strategy),
            None => {
                let template = self
                    .templates
                    .get(template_id)
                    .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;
                info!(template = template_id, "using enriched template fallback");
                GeneratedPlaybook::new(
                    skeletons::enriched_fallback(
                        prompt,
                        &template.name,
                        &enriched.context_hints,
                        &template.context_enrichment.best_practices,
                        context,
                    ),
                    GenerationStrategy::Fallback,
                )
            }
        };
        playbook.template_id = Some(template_id.to_string());
        playbook.context_hints = enriched.context_hints;
        Ok(playbook)
    }

    async fn ask_provider(&self, messages: &[Message]) -> Option<(String, GenerationStrategy)> {
        let provider = self.provider.as_ref()?;
        info!(vendor = provider.name(), "generating playbook with AI provider");

        match provider.generate(messages, &GenerationOptions::default()).await {
            Ok(result) => {
                let content = strip_code_fences(&result.content);
                if content.is_empty() {
                    warn!(vendor = provider.name(), "AI provider returned an empty playbook, falling back");
                    return None;
                }
                Some((
                    content,
                    GenerationStrategy::Provider {
                        vendor: provider.name().to_string(),
                        model: result.model,
                        usage: result.usage,
                    },
                ))
            }
            Err(err) => {
                warn!(vendor = provider.name(), error = %err, "AI generation failed, falling back to template");
                None
            }
        }
    }
}
