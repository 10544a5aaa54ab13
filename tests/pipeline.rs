mod common;

use std::path::PathBuf;

use common::{setup_logger, ONE_TASK_PLAYBOOK};
use playbook_forge::generation::{GenerationContext, GenerationStrategy};
use playbook_forge::refinement::{RefinementRequest, RefinementStrategy};
use playbook_forge::templates::{AdditionalContext, PromptTemplateLibrary};
use playbook_forge::validation::{AutomationEngine, ValidationEngine};
use playbook_forge::{ErrorKind, Failure, PlaybookService};

fn offline_service(engine: AutomationEngine) -> PlaybookService {
    PlaybookService::new(
        None,
        PromptTemplateLibrary::with_builtins(),
        ValidationEngine::new(engine),
        PathBuf::from("/tmp/ansible-mcp"),
    )
}

fn write_playbook(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn generation_without_provider_is_a_deterministic_fallback() {
    setup_logger("debug");
    let service = offline_service(AutomationEngine::default());
    let context = GenerationContext {
        target_hosts: Some("webservers".into()),
        ..GenerationContext::default()
    };

    let first = service.generate_playbook("install nginx", None, &context).await;
    let second = service.generate_playbook("install nginx", None, &context).await;

    assert_eq!(first.strategy, GenerationStrategy::Fallback);
    assert!(first.content.contains("install nginx"));
    assert!(first.content.contains("webservers"));
    assert!(first.validation.valid);
    assert_eq!(first.content, second.content);
    assert!(first.file_name.starts_with("playbook_"));
    assert!(first.file_name.ends_with(".yml"));
}

#[tokio::test]
async fn fallback_stays_valid_for_prompts_with_control_characters() {
    let service = offline_service(AutomationEngine::default());
    for prompt in ["install nginx\u{1}", "install\u{7f} nginx"] {
        let generated = service
            .generate_playbook(prompt, None, &GenerationContext::default())
            .await;
        assert_eq!(generated.strategy, GenerationStrategy::Fallback);
        assert!(generated.validation.valid, "{:?}", generated.validation.errors);
    }
}

#[tokio::test]
async fn named_skeleton_is_served_verbatim() {
    let service = offline_service(AutomationEngine::default());
    let generated = service
        .generate_playbook("anything", Some("kubernetes_deployment"), &GenerationContext::default())
        .await;
    assert_eq!(
        generated.strategy,
        GenerationStrategy::BuiltIn {
            skeleton: "kubernetes_deployment".into()
        }
    );
    assert!(generated.content.starts_with("---"));
}

#[tokio::test]
async fn template_generation_without_provider_carries_template_context() {
    let service = offline_service(AutomationEngine::default());
    let generated = service
        .generate_with_template(
            "deploy redis",
            "docker-setup",
            &GenerationContext::default(),
            &AdditionalContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(generated.strategy, GenerationStrategy::Fallback);
    assert_eq!(generated.template_id.as_deref(), Some("docker-setup"));
    assert!(!generated.context_hints.is_empty());
    assert!(generated.content.contains("deploy redis"));
}

#[tokio::test]
async fn unknown_template_fails_with_not_found_kind() {
    let service = offline_service(AutomationEngine::default());
    let err = service
        .generate_with_template(
            "deploy redis",
            "does-not-exist",
            &GenerationContext::default(),
            &AdditionalContext::new(),
        )
        .await
        .unwrap_err();
    let failure = Failure::from(err);
    assert_eq!(failure.kind, ErrorKind::TemplateNotFound);
    assert!(failure.message.contains("does-not-exist"));
}

#[tokio::test]
async fn rule_based_refinement_adds_error_handling() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_playbook(&dir, "site.yml", ONE_TASK_PLAYBOOK);
    let service = offline_service(AutomationEngine::default());

    let refined = service
        .refine_file(
            &path,
            &RefinementRequest {
                feedback: "add error handling please".into(),
                validation_errors: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(refined.strategy, RefinementStrategy::RuleBased);
    assert_eq!(refined.file_name, dir.path().join("site_refined.yml"));
    assert!(refined.content.starts_with("---\n"));
    assert!(refined.content.contains("register: Install_nginx_result"));
    assert!(refined.content.contains("ignore_errors: false"));
    assert_eq!(refined.changes_applied.len(), 1);
}

#[tokio::test]
async fn refinement_of_missing_file_is_a_validation_failure() {
    let service = offline_service(AutomationEngine::default());
    let err = service
        .refine_file(
            std::path::Path::new("/nonexistent/site.yml"),
            &RefinementRequest::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[cfg(unix)]
#[tokio::test]
async fn validation_combines_structure_and_syntax_check() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_playbook(
        &dir,
        "good.yml",
        "---\n- hosts: all\n  vars:\n    db_password: hunter2\n  tasks:\n    - shell: systemctl restart nginx\n",
    );
    let broken = write_playbook(&dir, "broken.yml", "- hosts: [unclosed\n");
    let service = offline_service(AutomationEngine::new("true", "true"));

    let relaxed = service.validate_file(&good, false).await.unwrap();
    assert!(relaxed.valid);
    assert!(relaxed.syntax.passed);
    assert!(relaxed.warnings.is_empty());

    let strict = service.validate_file(&good, true).await.unwrap();
    assert!(strict.valid);
    assert!(!strict.warnings.is_empty());

    let report = service.validate_file(&broken, false).await.unwrap();
    assert!(!report.valid);
    assert!(!report.structure.valid);
    assert!(!report.structure.errors.is_empty());
}

#[tokio::test]
async fn missing_engine_binary_fails_syntax_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_playbook(&dir, "site.yml", ONE_TASK_PLAYBOOK);
    let service = offline_service(AutomationEngine::new(
        "/nonexistent/ansible-playbook",
        "/nonexistent/ansible-lint",
    ));

    let report = service.validate_file(&path, false).await.unwrap();
    assert!(report.structure.valid);
    assert!(!report.syntax.passed);
    assert!(!report.valid);

    let lint = service.lint_file(&path).await;
    assert!(!lint.passed);
}

#[tokio::test]
async fn model_operations_need_a_provider() {
    let service = offline_service(AutomationEngine::default());
    let err = service.installed_models().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderConfig);
    assert!(service.provider().is_none());
}
