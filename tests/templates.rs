mod common;

use std::io::Write;

use playbook_forge::error::ErrorKind;
use playbook_forge::templates::{
    AdditionalContext, PromptTemplateLibrary, TemplateCategory, TemplateError, TemplateFilter,
    TemplateUpdate, TemplateVersion,
};
use playbook_forge::ServiceError;
use serde_json::json;

#[test]
fn update_bumps_version_and_records_history() {
    let library = PromptTemplateLibrary::with_builtins();
    let before = library.get("k8s-deploy").unwrap();

    let updated = library
        .update(
            "k8s-deploy",
            TemplateUpdate {
                description: Some("Kubernetes rollouts with probes and limits".into()),
                ..TemplateUpdate::default()
            },
            vec!["clarified wording".into()],
        )
        .unwrap();

    assert!(updated.version > before.version);
    assert!(updated.updated_at > before.updated_at);
    assert_eq!(updated.description, "Kubernetes rollouts with probes and limits");
    assert_eq!(updated.name, before.name);

    let history = library.history("k8s-deploy");
    assert_eq!(history.len(), 2);
    let last = history.last().unwrap();
    assert_eq!(last.changes, vec!["clarified wording".to_string()]);
    assert_eq!(last.version, updated.version);
}

#[test]
fn stale_expected_version_is_a_conflict() {
    let library = PromptTemplateLibrary::with_builtins();
    library
        .update("cicd-pipeline", TemplateUpdate::default(), vec!["first".into()])
        .unwrap();

    let err = library
        .update_if_version(
            "cicd-pipeline",
            TemplateVersion::INITIAL,
            TemplateUpdate::default(),
            vec!["second".into()],
        )
        .unwrap_err();
    assert!(matches!(err, TemplateError::UpdateConflict { .. }));
    assert_eq!(
        ServiceError::from(err).kind(),
        ErrorKind::TemplateUpdateConflict
    );
    assert_eq!(library.history("cicd-pipeline").len(), 2);
}

#[test]
fn enrichment_is_deterministic() {
    let library = PromptTemplateLibrary::with_builtins();
    let mut extra = AdditionalContext::new();
    extra.insert("base_image".into(), json!("alpine:3.19"));

    let first = library.enrich("deploy redis", "docker-setup", &extra).unwrap();
    let second = library.enrich("deploy redis", "docker-setup", &extra).unwrap();

    assert_eq!(first, second);
    assert!(first.enriched_prompt.contains("deploy redis"));
    assert!(first.context_hints.iter().any(|h| h == "base_image: alpine:3.19"));
}

#[test]
fn unknown_template_is_not_found() {
    let library = PromptTemplateLibrary::with_builtins();
    let err = library
        .enrich("deploy redis", "does-not-exist", &AdditionalContext::new())
        .unwrap_err();
    assert!(matches!(err, TemplateError::NotFound(ref id) if id == "does-not-exist"));
    assert_eq!(ServiceError::from(err).kind(), ErrorKind::TemplateNotFound);

    assert!(library.get("does-not-exist").is_none());
    assert!(library.history("does-not-exist").is_empty());
}

#[test]
fn filters_by_category_and_tag() {
    let library = PromptTemplateLibrary::with_builtins();

    let security = library.list(&TemplateFilter {
        category: Some(TemplateCategory::Security),
        ..TemplateFilter::default()
    });
    assert_eq!(security.len(), 1);
    assert_eq!(security[0].id, "security-hardening");

    let containers = library.list(&TemplateFilter {
        tags: vec!["CONTAINERS".into()],
        ..TemplateFilter::default()
    });
    let ids: Vec<_> = containers.iter().map(|t| t.id.as_str()).collect();
    assert!(ids.contains(&"k8s-deploy"));
    assert!(ids.contains(&"docker-setup"));
}

#[test]
fn custom_templates_load_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("nginx.yaml")).unwrap();
    writeln!(
        file,
        "id: nginx-proxy\nname: Nginx Reverse Proxy\ndescription: Front a service with nginx\nsystem_prompt: You configure nginx.\ntags: [web]\n"
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut library = PromptTemplateLibrary::with_builtins();
    let builtins = library.len();
    assert_eq!(library.load_directory(dir.path()).unwrap(), 1);
    assert_eq!(library.len(), builtins + 1);

    let template = library.get("nginx-proxy").unwrap();
    assert_eq!(template.version, TemplateVersion::INITIAL);
    assert_eq!(template.category, TemplateCategory::General);

    let enriched = library
        .enrich("proxy grafana", "nginx-proxy", &AdditionalContext::new())
        .unwrap();
    assert!(enriched.enriched_prompt.contains("proxy grafana"));
}

#[test]
fn suggestion_matches_prompt_keywords() {
    let library = PromptTemplateLibrary::with_builtins();
    assert_eq!(
        library.suggest("set up a kubernetes deployment").as_deref(),
        Some("k8s-deploy")
    );
    assert_eq!(library.suggest("bake a cake"), None);
}
