use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_WORK_DIR: &str = "/tmp/ansible-mcp";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// API keys per vendor, as found in the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Raw `AI_PROVIDER` value; parsed by the provider factory.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub ollama_base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_base_delay: Option<Duration>,
    pub credentials: Credentials,
    pub work_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    pub ansible_playbook_bin: String,
    pub ansible_lint_bin: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            base_url: None,
            ollama_base_url: None,
            timeout: None,
            max_retries: None,
            retry_base_delay: None,
            credentials: Credentials::default(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            template_dir: None,
            ansible_playbook_bin: "ansible-playbook".to_string(),
            ansible_lint_bin: "ansible-lint".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            provider: get("AI_PROVIDER"),
            model: get("AI_MODEL"),
            base_url: get("AI_BASE_URL"),
            ollama_base_url: get("OLLAMA_BASE_URL"),
            timeout: parse_number(&get, "AI_TIMEOUT_MS")?.map(Duration::from_millis),
            max_retries: parse_number(&get, "AI_MAX_RETRIES")?
                .map(|n| {
                    u32::try_from(n).map_err(|e| ConfigError::InvalidValue {
                        key: "AI_MAX_RETRIES",
                        value: n.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()?,
            retry_base_delay: parse_number(&get, "AI_RETRY_BASE_DELAY_MS")?
                .map(Duration::from_millis),
            credentials: Credentials {
                openai: get("OPENAI_API_KEY"),
                anthropic: get("ANTHROPIC_API_KEY"),
                gemini: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            },
            work_dir: get("PLAYBOOK_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            template_dir: get("PROMPT_TEMPLATE_DIR").map(PathBuf::from),
            ansible_playbook_bin: get("ANSIBLE_PLAYBOOK_BIN")
                .unwrap_or(defaults.ansible_playbook_bin),
            ansible_lint_bin: get("ANSIBLE_LINT_BIN").unwrap_or(defaults.ansible_lint_bin),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn parse_number<G>(get: &G, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.work_dir, PathBuf::from(DEFAULT_WORK_DIR));
    }

    #[test]
    fn reads_provider_settings() {
        let config = Config::from_lookup(lookup(&[
            ("AI_PROVIDER", "anthropic"),
            ("AI_MODEL", "claude-3-haiku-20240307"),
            ("AI_TIMEOUT_MS", "1500"),
            ("AI_MAX_RETRIES", "5"),
            ("ANTHROPIC_API_KEY", "ant-123"),
            ("GOOGLE_API_KEY", "g-456"),
        ]))
        .unwrap();

        assert_eq!(config.provider.as_deref(), Some("anthropic"));
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.credentials.anthropic.as_deref(), Some("ant-123"));
        assert_eq!(config.credentials.gemini.as_deref(), Some("g-456"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = Config::from_lookup(lookup(&[("AI_MODEL", "  "), ("OPENAI_API_KEY", "")])).unwrap();
        assert!(config.model.is_none());
        assert!(config.credentials.openai.is_none());
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[("AI_MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "AI_MAX_RETRIES", .. }));
    }

    #[test]
    fn out_of_range_retry_count_is_rejected() {
        let err = Config::from_lookup(lookup(&[("AI_MAX_RETRIES", "4294967296")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "AI_MAX_RETRIES", ref value, .. } if value == "4294967296"
        ));

        let config = Config::from_lookup(lookup(&[("AI_MAX_RETRIES", "4294967295")])).unwrap();
        assert_eq!(config.max_retries, Some(u32::MAX));
    }
}
