//! Structural checks, best-practice lint and the external syntax check.

pub mod engine;
pub mod lint;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub use engine::{AutomationEngine, EngineOutcome, RunRequest};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid playbook YAML: {0}")]
    Parse(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxOutcome {
    pub passed: bool,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub structure: StructureReport,
    pub syntax: SyntaxOutcome,
    pub warnings: Vec<String>,
}

pub fn parse_playbook(text: &str) -> Result<serde_yaml::Value, ValidationError> {
    serde_yaml::from_str(text).map_err(|err| ValidationError::Parse(err.to_string()))
}

pub fn check_structure(text: &str) -> StructureReport {
    match parse_playbook(text) {
        Ok(_) => StructureReport {
            valid: true,
            errors: Vec::new(),
        },
        Err(ValidationError::Parse(message)) => StructureReport {
            valid: false,
            errors: vec![message],
        },
        Err(other) => StructureReport {
            valid: false,
            errors: vec![other.to_string()],
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    engine: AutomationEngine,
}

impl ValidationEngine {
    pub fn new(engine: AutomationEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &AutomationEngine {
        &self.engine
    }

    pub fn check_structure(&self, text: &str) -> StructureReport {
        check_structure(text)
    }

    pub fn lint(&self, text: &str) -> Vec<String> {
        lint::best_practice_warnings(text)
    }

    /// Structural parse plus external syntax check; lint warnings are only
    /// collected in `strict` mode.
    pub async fn validate_file(
        &self,
        path: &Path,
        strict: bool,
    ) -> Result<ValidationReport, ValidationError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ValidationError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let structure = check_structure(&text);
        let outcome = self.engine.syntax_check(path).await;
        let syntax = SyntaxOutcome {
            passed: outcome.passed,
            stderr: outcome.stderr,
        };
        let warnings = if strict {
            lint::best_practice_warnings(&text)
        } else {
            Vec::new()
        };

        let valid = structure.valid && syntax.passed;
        info!(path = %path.display(), valid, strict, "playbook validated");
        Ok(ValidationReport {
            valid,
            structure,
            syntax,
            warnings,
        })
    }
}
