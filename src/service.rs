use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ServiceError;
use crate::generation::{GeneratedPlaybook, GenerationContext, PlaybookGenerator};
use crate::providers::{LlmProvider, Provider, ProviderError, ProviderFactory};
use crate::refinement::{RefinedPlaybook, RefinementRequest, RefinementService};
use crate::templates::{
    AdditionalContext, EnrichedPrompt, PromptTemplate, PromptTemplateLibrary, TemplateFilter,
    TemplateHistoryEntry, TemplateUpdate, TemplateVersion,
};
use crate::validation::{
    AutomationEngine, EngineOutcome, RunRequest, ValidationEngine, ValidationError,
    ValidationReport,
};

/// Everything a front end needs: one optional provider, one template
/// catalog, the validator and both orchestrators.
pub struct PlaybookService {
    provider: Option<Arc<Provider>>,
    templates: Arc<PromptTemplateLibrary>,
    validator: ValidationEngine,
    generator: PlaybookGenerator,
    refiner: RefinementService,
    work_dir: PathBuf,
}

impl PlaybookService {
    pub fn new(
        provider: Option<Arc<Provider>>,
        templates: PromptTemplateLibrary,
        validator: ValidationEngine,
        work_dir: PathBuf,
    ) -> Self {
        let templates = Arc::new(templates);
        let shared: Option<Arc<dyn LlmProvider>> =
            provider.clone().map(|p| p as Arc<dyn LlmProvider>);

        Self {
            generator: PlaybookGenerator::new(shared.clone(), Arc::clone(&templates)),
            refiner: RefinementService::new(shared),
            provider,
            templates,
            validator,
            work_dir,
        }
    }

    /// Wires the service from process configuration. A provider that cannot
    /// be built leaves the service in template-only mode.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let provider = match ProviderFactory::from_config(config) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(err) => {
                warn!(error = %err, "AI provider unavailable, using template-based generation only");
                None
            }
        };

        let mut templates = PromptTemplateLibrary::with_builtins();
        if let Some(dir) = &config.template_dir {
            let loaded = templates.load_directory(dir)?;
            info!(dir = %dir.display(), loaded, "custom prompt templates loaded");
        }

        let engine = AutomationEngine::new(&config.ansible_playbook_bin, &config.ansible_lint_bin)
            .with_work_dir(&config.work_dir);

        Ok(Self::new(
            provider,
            templates,
            ValidationEngine::new(engine),
            config.work_dir.clone(),
        ))
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_deref()
    }

    pub fn templates(&self) -> &PromptTemplateLibrary {
        &self.templates
    }

    pub fn validator(&self) -> &ValidationEngine {
        &self.validator
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub async fn generate_playbook(
        &self,
        prompt: &str,
        skeleton: Option<&str>,
        context: &GenerationContext,
    ) -> GeneratedPlaybook {
        self.generator.generate_playbook(prompt, skeleton, context).await
    }

    pub async fn generate_with_template(
        &self,
        prompt: &str,
        template_id: &str,
        context: &GenerationContext,
        additional: &AdditionalContext,
    ) -> Result<GeneratedPlaybook, ServiceError> {
        Ok(self
            .generator
            .generate_with_template(prompt, template_id, context, additional)
            .await?)
    }

    pub async fn refine_file(
        &self,
        path: &Path,
        request: &RefinementRequest,
    ) -> Result<RefinedPlaybook, ServiceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ValidationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(self.refiner.refine(path, &content, request).await?)
    }

    pub async fn validate_file(
        &self,
        path: &Path,
        strict: bool,
    ) -> Result<ValidationReport, ServiceError> {
        Ok(self.validator.validate_file(path, strict).await?)
    }

    pub async fn lint_file(&self, path: &Path) -> EngineOutcome {
        self.validator.engine().lint(path).await
    }

    pub async fn run_playbook(&self, request: &RunRequest) -> EngineOutcome {
        self.validator.engine().run(request).await
    }

    pub fn list_templates(&self, filter: &TemplateFilter) -> Vec<PromptTemplate> {
        self.templates.list(filter)
    }

    pub fn get_template(&self, id: &str) -> Option<PromptTemplate> {
        self.templates.get(id)
    }

    pub fn enrich_prompt(
        &self,
        prompt: &str,
        id: &str,
        additional: &AdditionalContext,
    ) -> Result<EnrichedPrompt, ServiceError> {
        Ok(self.templates.enrich(prompt, id, additional)?)
    }

    pub fn update_template(
        &self,
        id: &str,
        update: TemplateUpdate,
        changes: Vec<String>,
        expected: Option<TemplateVersion>,
    ) -> Result<PromptTemplate, ServiceError> {
        let updated = match expected {
            Some(version) => self.templates.update_if_version(id, version, update, changes),
            None => self.templates.update(id, update, changes),
        };
        Ok(updated?)
    }

    pub fn template_history(&self, id: &str) -> Vec<TemplateHistoryEntry> {
        self.templates.history(id)
    }

    pub fn suggest_template(&self, prompt: &str) -> Option<String> {
        self.templates.suggest(prompt)
    }

    /// Models the local daemon has installed; vendors without an inventory
    /// endpoint report their static list.
    pub async fn installed_models(&self) -> Result<Vec<String>, ServiceError> {
        let provider = self.require_provider()?;
        match provider.as_local() {
            Some(local) => Ok(local.list_models().await?),
            None => Ok(provider.available_models()),
        }
    }

    pub async fn pull_model(&self, model: &str) -> Result<(), ServiceError> {
        let provider = self.require_provider()?;
        let local = provider.as_local().ok_or_else(|| {
            ProviderError::config(provider.name(), "model pulls need the local Ollama provider")
        })?;
        Ok(local.pull_model(model).await?)
    }

    fn require_provider(&self) -> Result<&Provider, ServiceError> {
        self.provider()
            .ok_or_else(|| ProviderError::config("service", "no AI provider configured").into())
    }
}

