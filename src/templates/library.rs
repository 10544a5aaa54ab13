use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::builtin::builtin_templates;
use super::{
    context_value, render_placeholders, AdditionalContext, EnrichedPrompt, PromptTemplate,
    TemplateError, TemplateFilter, TemplateHistoryEntry, TemplateUpdate, TemplateVersion,
};

/// A template together with its history, swapped as one unit.
#[derive(Debug)]
struct TemplateState {
    template: PromptTemplate,
    history: Vec<TemplateHistoryEntry>,
}

#[derive(Debug)]
struct Slot {
    state: ArcSwap<TemplateState>,
    // Serializes writers; readers go through `state` only.
    update_lock: Mutex<()>,
}

impl Slot {
    fn seeded(template: PromptTemplate) -> Self {
        let history = vec![TemplateHistoryEntry {
            version: template.version,
            timestamp: template.updated_at,
            changes: vec!["Initial version".to_string()],
        }];
        Self {
            state: ArcSwap::from(Arc::new(TemplateState { template, history })),
            update_lock: Mutex::new(()),
        }
    }
}

/// Catalog of prompt templates. Built and seeded before being shared;
/// afterwards only version updates mutate it.
#[derive(Debug, Default)]
pub struct PromptTemplateLibrary {
    slots: BTreeMap<String, Slot>,
}

impl PromptTemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        for template in builtin_templates(Utc::now()) {
            library.insert(template);
        }
        library
    }

    /// Adds or replaces a template; its history restarts with one
    /// initial entry.
    pub fn insert(&mut self, template: PromptTemplate) {
        self.slots.insert(template.id.clone(), Slot::seeded(template));
    }

    /// Loads every `.yml`/`.yaml` file in `dir` (one template per file, in
    /// file-name order). A missing directory loads nothing.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "template directory absent, skipping");
            return Ok(0);
        }

        let load_err = |path: &Path, message: String| TemplateError::Load {
            path: path.to_path_buf(),
            message,
        };

        let mut files: Vec<_> = fs::read_dir(dir)
            .map_err(|e| load_err(dir, e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|ext| ext.to_str()),
                        Some("yml") | Some("yaml")
                    )
            })
            .collect();
        files.sort();

        for path in &files {
            let contents = fs::read_to_string(path).map_err(|e| load_err(path, e.to_string()))?;
            let template: PromptTemplate =
                serde_yaml::from_str(&contents).map_err(|e| load_err(path, e.to_string()))?;
            info!(id = %template.id, path = %path.display(), "loaded prompt template");
            self.insert(template);
        }
        Ok(files.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Matching templates, ordered by id.
    pub fn list(&self, filter: &TemplateFilter) -> Vec<PromptTemplate> {
        self.slots
            .values()
            .map(|slot| slot.state.load())
            .filter(|state| filter.matches(&state.template))
            .map(|state| state.template.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<PromptTemplate> {
        self.slots
            .get(id)
            .map(|slot| slot.state.load().template.clone())
    }

    pub fn history(&self, id: &str) -> Vec<TemplateHistoryEntry> {
        self.slots
            .get(id)
            .map(|slot| slot.state.load().history.clone())
            .unwrap_or_default()
    }

    /// Guesses the template best suited to a free-text request.
    pub fn suggest(&self, prompt: &str) -> Option<String> {
        const KEYWORDS: &[(&str, &[&str])] = &[
            ("k8s-deploy", &["kubernetes", "k8s", "helm", "pod"]),
            ("docker-setup", &["docker", "container", "compose"]),
            (
                "security-hardening",
                &["security", "harden", "firewall", "ssh"],
            ),
            (
                "database-setup",
                &["database", "postgres", "mysql", "mariadb", "redis", "mongo"],
            ),
            (
                "monitoring-stack",
                &["monitor", "prometheus", "grafana", "alert", "metrics"],
            ),
            (
                "cicd-pipeline",
                &["ci/cd", "cicd", "pipeline", "jenkins", "gitlab", "runner"],
            ),
        ];

        let prompt = prompt.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(id, words)| {
                self.slots.contains_key(*id) && words.iter().any(|w| prompt.contains(w))
            })
            .map(|(id, _)| id.to_string())
    }

    /// Assembles the enriched prompt for `prompt` under template `id`. Pure:
    /// identical inputs give byte-identical output.
    pub fn enrich(
        &self,
        prompt: &str,
        id: &str,
        additional: &AdditionalContext,
    ) -> Result<EnrichedPrompt, TemplateError> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        let state = slot.state.load();
        let template = &state.template;

        let best_practices = &template.context_enrichment.best_practices;
        let system_context = if best_practices.is_empty() {
            template.system_prompt.clone()
        } else {
            format!(
                "{}\n\nBest practices:\n{}",
                template.system_prompt,
                bullet_list(best_practices)
            )
        };

        let few_shot_section = if template.few_shot_examples.is_empty() {
            String::new()
        } else {
            let examples: Vec<String> = template
                .few_shot_examples
                .iter()
                .enumerate()
                .map(|(i, example)| {
                    format!(
                        "### Example {}\nRequest: {}\n```yaml\n{}\n```",
                        i + 1,
                        example.input,
                        example.output.trim_end()
                    )
                })
                .collect();
            format!("## Examples\n\n{}", examples.join("\n\n"))
        };

        let chain_of_thought_section = if template.chain_of_thought.is_empty() {
            String::new()
        } else {
            let steps: Vec<String> = template
                .chain_of_thought
                .iter()
                .enumerate()
                .map(|(i, step)| format!("{}. {}", i + 1, step))
                .collect();
            format!("## Approach\n{}", steps.join("\n"))
        };

        let mut context_hints = template.context_enrichment.context_hints.clone();
        context_hints.extend(
            additional
                .iter()
                .map(|(key, value)| format!("{}: {}", key, context_value(value))),
        );

        let task = render_placeholders(&template.user_prompt_template, |name| {
            if name == "prompt" {
                Some(prompt.to_string())
            } else {
                additional.get(name).map(context_value)
            }
        });

        let hints_section = if context_hints.is_empty() {
            String::new()
        } else {
            format!("## Context\n{}", bullet_list(&context_hints))
        };

        let task_section = format!("## Task\n{}", task.trim_end());
        let enriched_prompt = [
            system_context.as_str(),
            few_shot_section.as_str(),
            chain_of_thought_section.as_str(),
            hints_section.as_str(),
            task_section.as_str(),
        ]
        .iter()
        .filter(|section| !section.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n");

        Ok(EnrichedPrompt {
            original_prompt: prompt.to_string(),
            enriched_prompt,
            system_context,
            few_shot_section,
            chain_of_thought_section,
            context_hints,
        })
    }

    pub fn update(
        &self,
        id: &str,
        update: TemplateUpdate,
        changes: Vec<String>,
    ) -> Result<PromptTemplate, TemplateError> {
        self.apply_update(id, None, update, changes)
    }

    /// Like [`update`](Self::update), but fails with `UpdateConflict` unless
    /// the template is still at `expected`.
    pub fn update_if_version(
        &self,
        id: &str,
        expected: TemplateVersion,
        update: TemplateUpdate,
        changes: Vec<String>,
    ) -> Result<PromptTemplate, TemplateError> {
        self.apply_update(id, Some(expected), update, changes)
    }

    fn apply_update(
        &self,
        id: &str,
        expected: Option<TemplateVersion>,
        update: TemplateUpdate,
        changes: Vec<String>,
    ) -> Result<PromptTemplate, TemplateError> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        let _guard = slot
            .update_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = slot.state.load_full();
        if let Some(expected) = expected {
            if current.template.version != expected {
                return Err(TemplateError::UpdateConflict {
                    id: id.to_string(),
                    expected,
                    actual: current.template.version,
                });
            }
        }

        let mut template = current.template.clone();
        update.apply(&mut template);
        template.version = template.version.bump_minor();
        template.updated_at = advance(current.template.updated_at);

        let mut history = current.history.clone();
        history.push(TemplateHistoryEntry {
            version: template.version,
            timestamp: template.updated_at,
            changes,
        });

        slot.state.store(Arc::new(TemplateState {
            template: template.clone(),
            history,
        }));
        info!(id, version = %template.version, "prompt template updated");
        Ok(template)
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Now, or one millisecond past `previous` when the clock has not moved on.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::milliseconds(1)
    }
}
