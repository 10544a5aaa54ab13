use async_trait::async_trait;
use tracing::info;

use super::{
    AnthropicProvider, GeminiProvider, LlmProvider, OllamaProvider, OpenAiProvider, ProviderError,
};
use crate::config::Config;
use crate::model::{GenerationOptions, GenerationResult, Message, ProviderConfig, VendorKind};

/// The configured vendor adapter. Selection happens once, here; callers
/// interact through [`LlmProvider`].
#[derive(Debug)]
pub enum Provider {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Gemini(GeminiProvider),
    Ollama(OllamaProvider),
}

impl Provider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(match config.vendor {
            VendorKind::OpenAi => Provider::OpenAi(OpenAiProvider::new(config)?),
            VendorKind::Anthropic => Provider::Anthropic(AnthropicProvider::new(config)?),
            VendorKind::Gemini => Provider::Gemini(GeminiProvider::new(config)?),
            VendorKind::Ollama => Provider::Ollama(OllamaProvider::new(config)?),
        })
    }

    pub fn vendor(&self) -> VendorKind {
        match self {
            Provider::OpenAi(_) => VendorKind::OpenAi,
            Provider::Anthropic(_) => VendorKind::Anthropic,
            Provider::Gemini(_) => VendorKind::Gemini,
            Provider::Ollama(_) => VendorKind::Ollama,
        }
    }

    /// The local adapter, for its inventory operations.
    pub fn as_local(&self) -> Option<&OllamaProvider> {
        match self {
            Provider::Ollama(p) => Some(p),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn LlmProvider {
        match self {
            Provider::OpenAi(p) => p,
            Provider::Anthropic(p) => p,
            Provider::Gemini(p) => p,
            Provider::Ollama(p) => p,
        }
    }
}

#[async_trait]
impl LlmProvider for Provider {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }

    fn available_models(&self) -> Vec<String> {
        self.inner().available_models()
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, ProviderError> {
        self.inner().generate(messages, options).await
    }
}

/// Turns process configuration into a [`Provider`].
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn from_config(config: &Config) -> Result<Provider, ProviderError> {
        let provider_config = Self::provider_config(config)?;
        let provider = Provider::from_config(provider_config)?;
        info!(
            vendor = provider.name(),
            model = provider.model(),
            "AI provider initialized"
        );
        Ok(provider)
    }

    /// Chooses the vendor (explicit `AI_PROVIDER`, else the first vendor with
    /// a credential) and maps the matching settings onto a [`ProviderConfig`].
    pub fn provider_config(config: &Config) -> Result<ProviderConfig, ProviderError> {
        let vendor = match config.provider.as_deref() {
            Some(raw) => raw
                .parse::<VendorKind>()
                .map_err(|msg| ProviderError::config("factory", msg))?,
            None => Self::infer_vendor(config).ok_or_else(|| {
                ProviderError::config(
                    "factory",
                    "no AI provider configured: set AI_PROVIDER or a vendor API key",
                )
            })?,
        };

        let credentials = &config.credentials;
        let api_key = match vendor {
            VendorKind::OpenAi => credentials.openai.clone(),
            VendorKind::Anthropic => credentials.anthropic.clone(),
            VendorKind::Gemini => credentials.gemini.clone(),
            VendorKind::Ollama => None,
        };
        let base_url = match vendor {
            VendorKind::Ollama => config.ollama_base_url.clone().or_else(|| config.base_url.clone()),
            _ => config.base_url.clone(),
        };

        Ok(ProviderConfig {
            vendor,
            api_key,
            model: config.model.clone(),
            base_url,
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    fn infer_vendor(config: &Config) -> Option<VendorKind> {
        let credentials = &config.credentials;
        if credentials.openai.is_some() {
            Some(VendorKind::OpenAi)
        } else if credentials.anthropic.is_some() {
            Some(VendorKind::Anthropic)
        } else if credentials.gemini.is_some() {
            Some(VendorKind::Gemini)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use std::time::Duration;

    fn config_with(provider: Option<&str>, credentials: Credentials) -> Config {
        Config {
            provider: provider.map(str::to_string),
            credentials,
            ..Config::default()
        }
    }

    #[test]
    fn fails_when_no_vendor_can_be_determined() {
        let err = ProviderFactory::from_config(&Config::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn fails_on_unknown_vendor() {
        let err = ProviderFactory::from_config(&config_with(Some("watson"), Credentials::default()))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn fails_when_selected_vendor_lacks_credential() {
        let credentials = Credentials {
            openai: Some("sk-present".into()),
            ..Credentials::default()
        };
        let err = ProviderFactory::from_config(&config_with(Some("gemini"), credentials)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn infers_vendor_from_first_present_credential() {
        let credentials = Credentials {
            anthropic: Some("ant".into()),
            gemini: Some("gem".into()),
            ..Credentials::default()
        };
        let provider = ProviderFactory::from_config(&config_with(None, credentials)).unwrap();
        assert_eq!(provider.vendor(), VendorKind::Anthropic);
        assert_eq!(provider.model(), "claude-3-sonnet-20240229");
        assert!(provider.as_local().is_none());
    }

    #[test]
    fn builds_local_vendor_without_credentials() {
        let config = Config {
            provider: Some("ollama".into()),
            ollama_base_url: Some("http://gpu-box:11434".into()),
            max_retries: Some(1),
            retry_base_delay: Some(Duration::from_millis(10)),
            ..Config::default()
        };
        let provider = ProviderFactory::from_config(&config).unwrap();
        let local = provider.as_local().expect("ollama adapter");
        assert_eq!(local.base_url(), "http://gpu-box:11434");
        assert_eq!(local.retry_policy().delays(), vec![Duration::from_millis(10)]);
        assert_eq!(provider.name(), "Ollama");
    }
}
