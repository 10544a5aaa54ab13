use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Joins every system message into one block, the form vendors without
/// multi-system support expect. `None` when the conversation has none.
pub fn merged_system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
}

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p_or_default(&self) -> f32 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Stop sequences, with an empty list treated as absent.
    pub fn stop(&self) -> Option<&[String]> {
        self.stop_sequences
            .as_deref()
            .filter(|stops| !stops.is_empty())
    }
}

/// Token accounting. Only constructible from both counters, so `total`
/// always equals `prompt + completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// `None` unless both counters were reported.
    pub fn from_counts(prompt: Option<u32>, completion: Option<u32>) -> Option<Self> {
        match (prompt, completion) {
            (Some(prompt), Some(completion)) => Some(Self::new(prompt, completion)),
            _ => None,
        }
    }

    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

/// Per-vendor fallbacks for settings the caller left unset.
#[derive(Debug, Clone, Copy)]
pub struct VendorDefaults {
    pub model: &'static str,
    pub base_url: &'static str,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl VendorKind {
    pub const ALL: [VendorKind; 4] = [
        VendorKind::OpenAi,
        VendorKind::Anthropic,
        VendorKind::Gemini,
        VendorKind::Ollama,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            VendorKind::OpenAi => "OpenAI",
            VendorKind::Anthropic => "Anthropic",
            VendorKind::Gemini => "Gemini",
            VendorKind::Ollama => "Ollama",
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, VendorKind::Ollama)
    }

    pub fn defaults(&self) -> VendorDefaults {
        match self {
            VendorKind::OpenAi => VendorDefaults {
                model: "gpt-4",
                base_url: "https://api.openai.com/v1",
                timeout: Duration::from_secs(60),
                max_retries: 3,
            },
            VendorKind::Anthropic => VendorDefaults {
                model: "claude-3-sonnet-20240229",
                base_url: "https://api.anthropic.com/v1",
                timeout: Duration::from_secs(60),
                max_retries: 3,
            },
            VendorKind::Gemini => VendorDefaults {
                model: "gemini-2.5-flash",
                base_url: "https://generativelanguage.googleapis.com/v1beta",
                timeout: Duration::from_secs(60),
                max_retries: 3,
            },
            // Local models may be slower
            VendorKind::Ollama => VendorDefaults {
                model: "llama2",
                base_url: "http://localhost:11434",
                timeout: Duration::from_secs(120),
                max_retries: 3,
            },
        }
    }
}

impl fmt::Display for VendorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for VendorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(VendorKind::OpenAi),
            "anthropic" | "claude" => Ok(VendorKind::Anthropic),
            "gemini" | "google" => Ok(VendorKind::Gemini),
            "ollama" | "local" => Ok(VendorKind::Ollama),
            other => Err(format!("unknown AI provider `{}`", other)),
        }
    }
}

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Caller-supplied provider settings. Unset fields fall back to
/// [`VendorDefaults`] when an adapter is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub vendor: VendorKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_base_delay: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(vendor: VendorKind) -> Self {
        Self {
            vendor,
            api_key: None,
            model: None,
            base_url: None,
            timeout: None,
            max_retries: None,
            retry_base_delay: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }
}

/// A [`ProviderConfig`] after defaults and validation were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProviderConfig {
    pub vendor: VendorKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_is_sum_of_counters() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens(), 42);
    }

    #[test]
    fn usage_is_omitted_when_a_counter_is_missing() {
        assert!(TokenUsage::from_counts(Some(3), None).is_none());
        assert!(TokenUsage::from_counts(None, Some(3)).is_none());
        assert_eq!(
            TokenUsage::from_counts(Some(1), Some(2)).map(|u| u.total_tokens()),
            Some(3)
        );
    }

    #[test]
    fn merges_multiple_system_messages() {
        let messages = vec![
            Message::system("first"),
            Message::user("hi"),
            Message::system("second"),
        ];
        assert_eq!(
            merged_system_prompt(&messages).as_deref(),
            Some("first\n\nsecond")
        );
        assert!(merged_system_prompt(&[Message::user("hi")]).is_none());
    }

    #[test]
    fn parses_vendor_names() {
        assert_eq!("OpenAI".parse::<VendorKind>(), Ok(VendorKind::OpenAi));
        assert_eq!(" claude ".parse::<VendorKind>(), Ok(VendorKind::Anthropic));
        assert_eq!("ollama".parse::<VendorKind>(), Ok(VendorKind::Ollama));
        assert!("watson".parse::<VendorKind>().is_err());
    }

    #[test]
    fn only_local_vendor_is_credential_exempt() {
        let exempt: Vec<_> = VendorKind::ALL
            .iter()
            .filter(|v| !v.requires_credential())
            .collect();
        assert_eq!(exempt, vec![&VendorKind::Ollama]);
    }

    #[test]
    fn empty_stop_list_counts_as_absent() {
        let options = GenerationOptions {
            stop_sequences: Some(Vec::new()),
            ..Default::default()
        };
        assert!(options.stop().is_none());
        assert_eq!(options.max_tokens_or_default(), DEFAULT_MAX_TOKENS);
    }
}
