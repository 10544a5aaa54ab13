//! Feedback- and error-driven refinement of an existing playbook.

pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{GenerationOptions, Message};
use crate::providers::LlmProvider;
use crate::validation::{parse_playbook, ValidationError};

const REFINEMENT_SYSTEM_PROMPT: &str = "You are an expert Ansible playbook optimizer. \
Refine playbooks based on feedback while maintaining functionality and best practices.";
const REFINEMENT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementRequest {
    pub feedback: String,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefinementStrategy {
    Provider { vendor: String, model: String },
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedPlaybook {
    pub file_name: PathBuf,
    pub content: String,
    pub changes_applied: Vec<String>,
    pub strategy: RefinementStrategy,
}

/// `dir/site.yml` becomes `dir/site_refined.yml`.
pub fn refined_file_name(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "playbook".to_string());
    source.with_file_name(format!("{}_refined.yml", stem))
}

pub struct RefinementService {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl RefinementService {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    /// Refines `content` (read from `source`). The provider is asked first;
    /// the rule-based path fails only when the text does not parse.
    pub async fn refine(
        &self,
        source: &Path,
        content: &str,
        request: &RefinementRequest,
    ) -> Result<RefinedPlaybook, ValidationError> {
        let file_name = refined_file_name(source);

        if let Some(provider) = &self.provider {
            let messages = [
                Message::system(REFINEMENT_SYSTEM_PROMPT),
                Message::user(refinement_prompt(content, request)),
            ];
            let options = GenerationOptions::default().with_temperature(REFINEMENT_TEMPERATURE);

            match provider.generate(&messages, &options).await {
                Ok(result) if !result.content.trim().is_empty() => {
                    info!(vendor = provider.name(), "playbook refined by AI provider");
                    let mut changes_applied = vec![format!(
                        "AI-refined playbook based on feedback: {}",
                        request.feedback
                    )];
                    if !request.validation_errors.is_empty() {
                        changes_applied.push(format!(
                            "Fixed {} validation errors",
                            request.validation_errors.len()
                        ));
                    }
                    return Ok(RefinedPlaybook {
                        file_name,
                        content: result.content,
                        changes_applied,
                        strategy: RefinementStrategy::Provider {
                            vendor: provider.name().to_string(),
                            model: result.model,
                        },
                    });
                }
                Ok(_) => warn!(vendor = provider.name(), "AI refinement returned nothing, using rules"),
                Err(err) => {
                    warn!(vendor = provider.name(), error = %err, "AI refinement failed, falling back to rule-based refinement")
                }
            }
        }

        let (content, changes_applied) = refine_with_rules(content, request)?;
        info!(changes = changes_applied.len(), "playbook refined by rules");
        Ok(RefinedPlaybook {
            file_name,
            content,
            changes_applied,
            strategy: RefinementStrategy::RuleBased,
        })
    }
}

fn refinement_prompt(content: &str, request: &RefinementRequest) -> String {
    let mut prompt = format!(
        "Refine this Ansible playbook based on the following feedback: {}\n",
        request.feedback
    );
    if !request.validation_errors.is_empty() {
        prompt.push_str("\nValidation errors to fix:\n");
        prompt.push_str(&request.validation_errors.join("\n"));
        prompt.push('\n');
    }
    prompt.push_str("\nCurrent playbook:\n");
    prompt.push_str(content);
    prompt.push_str(
        "\n\nPlease provide an improved version of the playbook that addresses the feedback \
         and fixes any errors. Output ONLY the YAML content.",
    );
    prompt
}

/// Text fixes first (indentation, then syntax), then the parse, then the
/// structural rules. Each rule runs at most once and only when triggered.
pub fn refine_with_rules(
    content: &str,
    request: &RefinementRequest,
) -> Result<(String, Vec<String>), ValidationError> {
    let mut text = content.to_string();
    let mut changes = Vec::new();
    let errors = &request.validation_errors;

    if errors.iter().any(|e| e.contains("indentation")) {
        text = rules::fix_indentation(&text);
        changes.push("Normalized indentation to two-space steps".to_string());
    }
    if errors.iter().any(|e| e.contains("syntax")) {
        text = rules::fix_common_syntax(&text);
        changes.push("Fixed common syntax issues (tabs, spacing after colons, trailing whitespace)".to_string());
    }

    let mut document = parse_playbook(&text)?;
    let feedback = request.feedback.to_lowercase();
    let mut restructured = false;

    if feedback.contains("add error handling") {
        rules::add_error_handling(&mut document);
        changes.push("Added error handling (ignore_errors, failed_when, register) to tasks".to_string());
        restructured = true;
    }
    if feedback.contains("make idempotent") {
        rules::make_idempotent(&mut document);
        changes.push("Marked tasks idempotent (changed_when, check_mode)".to_string());
        restructured = true;
    }

    if restructured {
        let body = serde_yaml::to_string(&document)
            .map_err(|err| ValidationError::Parse(err.to_string()))?;
        text = format!("---\n{}", body);
    }
    Ok((text, changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationResult, Role};
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every call with the same reply and records each exchange.
    struct ScriptedProvider {
        reply: Result<String, ()>,
        seen: Mutex<Vec<(Vec<Message>, GenerationOptions)>>,
    }

    impl ScriptedProvider {
        fn new(reply: Result<&str, ()>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        fn available_models(&self) -> Vec<String> {
            vec!["scripted-1".into()]
        }

        async fn generate(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<GenerationResult, ProviderError> {
            self.seen
                .lock()
                .unwrap()
                .push((messages.to_vec(), options.clone()));
            match &self.reply {
                Ok(text) => Ok(GenerationResult {
                    content: text.clone(),
                    usage: None,
                    finish_reason: "stop".into(),
                    model: "scripted-1".into(),
                }),
                Err(()) => Err(ProviderError::status("Scripted", 503, "down")),
            }
        }
    }

    const ONE_TASK: &str = "---\n- name: Web\n  hosts: web\n  tasks:\n    - name: Install nginx\n      package:\n        name: nginx\n";

    fn request(feedback: &str, errors: &[&str]) -> RefinementRequest {
        RefinementRequest {
            feedback: feedback.to_string(),
            validation_errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn derived_name_keeps_directory() {
        assert_eq!(
            refined_file_name(Path::new("/tmp/ansible-mcp/site.yml")),
            PathBuf::from("/tmp/ansible-mcp/site_refined.yml")
        );
    }

    #[test]
    fn untriggered_rules_return_input_unchanged() {
        let (text, changes) = refine_with_rules(ONE_TASK, &request("looks fine", &[])).unwrap();
        assert_eq!(text, ONE_TASK);
        assert!(changes.is_empty());
    }

    #[test]
    fn text_fixes_run_before_parsing() {
        let broken = "- hosts:web\n\ttasks:\n\t\t- ping:\n";
        assert!(parse_playbook(broken).is_err());

        let (text, changes) =
            refine_with_rules(broken, &request("tidy", &["syntax error near line 2"])).unwrap();
        assert_eq!(text, "- hosts: web\n  tasks:\n    - ping:\n");
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn rules_apply_cumulatively_in_order() {
        let (text, changes) = refine_with_rules(
            ONE_TASK,
            &request("Add error handling and make idempotent", &["bad indentation"]),
        )
        .unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes[0].contains("indentation"));

        let doc = parse_playbook(&text).unwrap();
        let task = &doc[0]["tasks"][0];
        assert_eq!(task["register"], "Install_nginx_result");
        assert_eq!(task["check_mode"], true);
    }

    #[test]
    fn unparseable_input_is_a_validation_error() {
        let err = refine_with_rules("- hosts: [", &request("add error handling", &[])).unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[tokio::test]
    async fn without_provider_rules_are_used() {
        let service = RefinementService::new(None);
        let refined = service
            .refine(Path::new("site.yml"), ONE_TASK, &request("add error handling please", &[]))
            .await
            .unwrap();
        assert_eq!(refined.strategy, RefinementStrategy::RuleBased);
        assert_eq!(refined.file_name, PathBuf::from("site_refined.yml"));
        assert!(refined.content.contains("register: Install_nginx_result"));
    }

    #[tokio::test]
    async fn provider_reply_is_adopted_verbatim() {
        let reply = "---\n- hosts: web\n  tasks:\n    - name: Install nginx\n      package: {name: nginx}\n      become: true\n";
        let provider = ScriptedProvider::new(Ok(reply));
        let service = RefinementService::new(Some(provider.clone()));

        let refined = service
            .refine(
                Path::new("site.yml"),
                ONE_TASK,
                &request("use privilege escalation", &["line 3: bad indentation"]),
            )
            .await
            .unwrap();

        assert_eq!(refined.content, reply);
        assert_eq!(
            refined.strategy,
            RefinementStrategy::Provider {
                vendor: "Scripted".into(),
                model: "scripted-1".into()
            }
        );
        assert_eq!(
            refined.changes_applied,
            vec![
                "AI-refined playbook based on feedback: use privilege escalation".to_string(),
                "Fixed 1 validation errors".to_string(),
            ]
        );

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (messages, options) = &seen[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("expert Ansible playbook optimizer"));
        assert_eq!(messages[1].role, Role::User);
        let turn = &messages[1].content;
        assert!(turn.contains("feedback: use privilege escalation"));
        assert!(turn.contains("Validation errors to fix:\nline 3: bad indentation"));
        assert!(turn.contains(ONE_TASK));
        assert!(turn.find("Validation errors").unwrap() < turn.find("Current playbook:").unwrap());
        assert_eq!(options.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_rules() {
        let provider = ScriptedProvider::new(Err(()));
        let service = RefinementService::new(Some(provider.clone()));

        let refined = service
            .refine(Path::new("site.yml"), ONE_TASK, &request("Add error handling", &[]))
            .await
            .unwrap();

        assert_eq!(refined.strategy, RefinementStrategy::RuleBased);
        assert!(refined.content.contains("register: Install_nginx_result"));
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_provider_reply_falls_back_to_rules() {
        let provider = ScriptedProvider::new(Ok("  \n"));
        let service = RefinementService::new(Some(provider.clone()));

        let refined = service
            .refine(Path::new("site.yml"), ONE_TASK, &request("make idempotent", &[]))
            .await
            .unwrap();

        assert_eq!(refined.strategy, RefinementStrategy::RuleBased);
        assert!(refined.content.contains("changed_when: false"));
        assert_eq!(refined.changes_applied.len(), 1);
    }
}
