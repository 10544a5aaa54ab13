//! Versioned prompt templates and the enrichment that turns a bare request
//! into a fully contextualized prompt.

mod builtin;
pub mod library;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use library::PromptTemplateLibrary;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("template {id} was updated concurrently: expected version {expected}, found {actual}")]
    UpdateConflict {
        id: String,
        expected: TemplateVersion,
        actual: TemplateVersion,
    },
    #[error("cannot load template file {path}: {message}")]
    Load { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Kubernetes,
    Docker,
    Security,
    Database,
    Monitoring,
    Network,
    Cicd,
    Cloud,
    General,
}

impl TemplateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateCategory::Kubernetes => "kubernetes",
            TemplateCategory::Docker => "docker",
            TemplateCategory::Security => "security",
            TemplateCategory::Database => "database",
            TemplateCategory::Monitoring => "monitoring",
            TemplateCategory::Network => "network",
            TemplateCategory::Cicd => "cicd",
            TemplateCategory::Cloud => "cloud",
            TemplateCategory::General => "general",
        }
    }
}

impl FromStr for TemplateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "kubernetes" => TemplateCategory::Kubernetes,
            "docker" => TemplateCategory::Docker,
            "security" => TemplateCategory::Security,
            "database" => TemplateCategory::Database,
            "monitoring" => TemplateCategory::Monitoring,
            "network" => TemplateCategory::Network,
            "cicd" => TemplateCategory::Cicd,
            "cloud" => TemplateCategory::Cloud,
            "general" => TemplateCategory::General,
            other => return Err(format!("unknown template category `{}`", other)),
        })
    }
}

/// `major.minor.patch`, serialized as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl TemplateVersion {
    pub const INITIAL: TemplateVersion = TemplateVersion {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Next minor release. An exhausted minor rolls over into the next major.
    pub fn bump_minor(self) -> Self {
        match self.minor.checked_add(1) {
            Some(minor) => Self {
                major: self.major,
                minor,
                patch: 0,
            },
            None => Self {
                major: self.major.saturating_add(1),
                minor: 0,
                patch: 0,
            },
        }
    }
}

impl Default for TemplateVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for TemplateVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(format!("`{}` is not a major.minor.patch version", s));
        };
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|e| format!("bad version component `{}`: {}", part, e))
        };
        Ok(Self {
            major: number(major)?,
            minor: number(minor)?,
            patch: number(patch)?,
        })
    }
}

impl TryFrom<String> for TemplateVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TemplateVersion> for String {
    fn from(version: TemplateVersion) -> Self {
        version.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextEnrichment {
    #[serde(default)]
    pub best_practices: Vec<String>,
    #[serde(default)]
    pub context_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: TemplateVersion,
    #[serde(default = "default_category")]
    pub category: TemplateCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    pub system_prompt: String,
    /// Skeleton of the user turn. `{prompt}` receives the request itself;
    /// other `{name}` slots are filled from additional context.
    #[serde(default = "default_user_prompt")]
    pub user_prompt_template: String,
    #[serde(default)]
    pub few_shot_examples: Vec<FewShotExample>,
    #[serde(default)]
    pub chain_of_thought: Vec<String>,
    #[serde(default)]
    pub context_enrichment: ContextEnrichment,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> TemplateCategory {
    TemplateCategory::General
}

fn default_user_prompt() -> String {
    "{prompt}".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateHistoryEntry {
    pub version: TemplateVersion,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt_template: Option<String>,
    #[serde(default)]
    pub best_practices: Option<Vec<String>>,
}

impl TemplateUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.system_prompt.is_none()
            && self.user_prompt_template.is_none()
            && self.best_practices.is_none()
    }

    fn apply(self, template: &mut PromptTemplate) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(description) = self.description {
            template.description = description;
        }
        if let Some(system_prompt) = self.system_prompt {
            template.system_prompt = system_prompt;
        }
        if let Some(user_prompt_template) = self.user_prompt_template {
            template.user_prompt_template = user_prompt_template;
        }
        if let Some(best_practices) = self.best_practices {
            template.context_enrichment.best_practices = best_practices;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub category: Option<TemplateCategory>,
    /// Matches templates sharing at least one tag.
    pub tags: Vec<String>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
}

impl TemplateFilter {
    pub fn matches(&self, template: &PromptTemplate) -> bool {
        if let Some(category) = self.category {
            if template.category != category {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let shares_tag = self
                .tags
                .iter()
                .any(|wanted| template.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted)));
            if !shares_tag {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let haystack = format!("{} {}", template.name, template.description).to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Extra caller-supplied context for enrichment, keyed for determinism.
pub type AdditionalContext = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPrompt {
    pub original_prompt: String,
    pub enriched_prompt: String,
    pub system_context: String,
    pub few_shot_section: String,
    pub chain_of_thought_section: String,
    pub context_hints: Vec<String>,
}

pub(crate) fn context_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fills `{name}` slots from `lookup`. Doubled braces (Jinja expressions)
/// pass through untouched; unknown slots render empty.
pub(crate) fn render_placeholders<F>(skeleton: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(skeleton.len());
    let mut rest = skeleton;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") {
            let end = tail.find("}}").map(|i| i + 2).unwrap_or(tail.len());
            output.push_str(&tail[..end]);
            rest = &tail[end..];
            continue;
        }

        let name_end = tail[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|i| i + 1)
            .unwrap_or(tail.len());
        let name = &tail[1..name_end];
        if !name.is_empty() && tail[name_end..].starts_with('}') {
            output.push_str(&lookup(name).unwrap_or_default());
            rest = &tail[name_end + 1..];
        } else {
            output.push('{');
            rest = &tail[1..];
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips_through_string() {
        let version: TemplateVersion = "2.3.4".parse().unwrap();
        assert_eq!(version.to_string(), "2.3.4");
        assert_eq!(version.bump_minor().to_string(), "2.4.0");
        assert!("2.3".parse::<TemplateVersion>().is_err());
        assert!(version.bump_minor() > version);
    }

    #[test]
    fn exhausted_minor_rolls_into_major() {
        let version: TemplateVersion = "1.4294967295.7".parse().unwrap();
        let bumped = version.bump_minor();
        assert_eq!(bumped.to_string(), "2.0.0");
        assert!(bumped > version);

        let ceiling: TemplateVersion = "4294967295.4294967295.0".parse().unwrap();
        assert_eq!(ceiling.bump_minor().to_string(), "4294967295.0.0");
    }

    #[test]
    fn placeholders_fill_and_jinja_survives() {
        let rendered = render_placeholders(
            "Task: {prompt} in {namespace}{missing} image={{ image }} {not a slot}",
            |name| match name {
                "prompt" => Some("deploy redis".into()),
                "namespace" => Some("cache".into()),
                _ => None,
            },
        );
        assert_eq!(
            rendered,
            "Task: deploy redis in cache image={{ image }} {not a slot}"
        );
    }

    #[test]
    fn filter_matches_any_shared_tag_case_insensitively() {
        let template = PromptTemplate {
            id: "t".into(),
            name: "Redis Cluster".into(),
            description: "Deploys a cache".into(),
            version: TemplateVersion::INITIAL,
            category: TemplateCategory::Database,
            tags: vec!["redis".into(), "cache".into()],
            system_prompt: String::new(),
            user_prompt_template: default_user_prompt(),
            few_shot_examples: Vec::new(),
            chain_of_thought: Vec::new(),
            context_enrichment: ContextEnrichment::default(),
            updated_at: Utc::now(),
        };

        let by_tag = TemplateFilter {
            tags: vec!["nginx".into(), "CACHE".into()],
            ..Default::default()
        };
        assert!(by_tag.matches(&template));

        let wrong_category = TemplateFilter {
            category: Some(TemplateCategory::Docker),
            ..Default::default()
        };
        assert!(!wrong_category.matches(&template));

        let by_text = TemplateFilter {
            search: Some("CLUSTER".into()),
            ..Default::default()
        };
        assert!(by_text.matches(&template));
    }
}
