use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of one external engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineOutcome {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// True iff the engine wrote nothing to stderr.
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub playbook: PathBuf,
    pub inventory: String,
    pub check_mode: bool,
    pub tags: Vec<String>,
    pub extra_vars: Option<serde_json::Value>,
}

/// Thin wrapper over the `ansible-playbook` / `ansible-lint` executables.
/// Arguments are passed as a vector, never through a shell.
#[derive(Debug, Clone)]
pub struct AutomationEngine {
    playbook_bin: String,
    lint_bin: String,
    work_dir: Option<PathBuf>,
}

impl Default for AutomationEngine {
    fn default() -> Self {
        Self::new("ansible-playbook", "ansible-lint")
    }
}

impl AutomationEngine {
    pub fn new(playbook_bin: impl Into<String>, lint_bin: impl Into<String>) -> Self {
        Self {
            playbook_bin: playbook_bin.into(),
            lint_bin: lint_bin.into(),
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub async fn syntax_check(&self, playbook: &Path) -> EngineOutcome {
        let args = vec![
            "--syntax-check".to_string(),
            playbook.display().to_string(),
        ];
        self.invoke(&self.playbook_bin, args).await
    }

    pub async fn run(&self, request: &RunRequest) -> EngineOutcome {
        self.invoke(&self.playbook_bin, Self::run_args(request)).await
    }

    pub async fn lint(&self, playbook: &Path) -> EngineOutcome {
        self.invoke(&self.lint_bin, vec![playbook.display().to_string()])
            .await
    }

    pub fn run_args(request: &RunRequest) -> Vec<String> {
        let mut args = vec![
            request.playbook.display().to_string(),
            "-i".to_string(),
            request.inventory.clone(),
        ];
        if request.check_mode {
            args.push("--check".to_string());
        }
        let tags = Self::sanitize_tags(&request.tags);
        if !tags.is_empty() {
            args.push("--tags".to_string());
            args.push(tags.join(","));
        }
        if let Some(vars) = &request.extra_vars {
            args.push("-e".to_string());
            args.push(vars.to_string());
        }
        args
    }

    /// Keeps only `[A-Za-z0-9_-]` in each tag and drops tags left empty.
    pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
        tags.iter()
            .map(|tag| {
                tag.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                    .collect::<String>()
            })
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    async fn invoke(&self, program: &str, args: Vec<String>) -> EngineOutcome {
        let command_line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %command_line, "invoking automation engine");

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = self.work_dir.as_deref().filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }

        match command.output().await {
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                EngineOutcome {
                    command: command_line,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    passed: stderr.trim().is_empty(),
                    stderr,
                    exit_code: output.status.code(),
                }
            }
            Err(err) => {
                warn!(program, error = %err, "failed to spawn automation engine");
                EngineOutcome {
                    command: command_line,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    exit_code: None,
                    passed: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_args_include_optional_flags_in_order() {
        let request = RunRequest {
            playbook: PathBuf::from("/tmp/site.yml"),
            inventory: "hosts.ini".into(),
            check_mode: true,
            tags: vec!["web".into(), "db; rm -rf /".into(), "$(x)".into()],
            extra_vars: Some(json!({"version": "1.2"})),
        };
        assert_eq!(
            AutomationEngine::run_args(&request),
            vec![
                "/tmp/site.yml",
                "-i",
                "hosts.ini",
                "--check",
                "--tags",
                "web,dbrm-rf,x",
                "-e",
                r#"{"version":"1.2"}"#,
            ]
        );
    }

    #[test]
    fn run_args_minimal() {
        let request = RunRequest {
            playbook: PathBuf::from("site.yml"),
            inventory: "localhost,".into(),
            ..Default::default()
        };
        assert_eq!(
            AutomationEngine::run_args(&request),
            vec!["site.yml", "-i", "localhost,"]
        );
    }

    #[test]
    fn tags_that_sanitize_to_nothing_are_dropped() {
        let tags = vec!["!!".to_string(), "ok_tag".to_string()];
        assert_eq!(AutomationEngine::sanitize_tags(&tags), vec!["ok_tag"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_engine_passes() {
        let engine = AutomationEngine::new("true", "true");
        let outcome = engine.syntax_check(Path::new("site.yml")).await;
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.command, "true --syntax-check site.yml");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn arguments_reach_the_engine_unchanged() {
        let engine = AutomationEngine::new("echo", "echo");
        let request = RunRequest {
            playbook: PathBuf::from("site.yml"),
            inventory: "hosts ini".into(),
            ..Default::default()
        };
        let outcome = engine.run(&request).await;
        assert_eq!(outcome.stdout.trim_end(), "site.yml -i hosts ini");
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_as_stderr() {
        let engine = AutomationEngine::new("definitely-not-an-engine-binary", "x");
        let outcome = engine.syntax_check(Path::new("site.yml")).await;
        assert!(!outcome.passed);
        assert!(!outcome.stderr.is_empty());
        assert_eq!(outcome.exit_code, None);
    }
}
