use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use playbook_forge::config::Config;
use playbook_forge::generation::GenerationContext;
use playbook_forge::logging;
use playbook_forge::providers::LlmProvider;
use playbook_forge::refinement::RefinementRequest;
use playbook_forge::templates::{
    AdditionalContext, TemplateCategory, TemplateFilter, TemplateUpdate, TemplateVersion,
};
use playbook_forge::validation::RunRequest;
use playbook_forge::{Failure, PlaybookService, ServiceError};

#[derive(Parser)]
#[command(name = "playbook-forge", version, about = "Generate, validate and refine Ansible playbooks")]
struct Cli {
    /// Overrides PLAYBOOK_WORK_DIR.
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a playbook from a request, a named skeleton or a template.
    Generate {
        #[arg(long)]
        prompt: String,
        /// kubernetes_deployment, docker_setup or system_hardening
        #[arg(long, conflicts_with = "template")]
        skeleton: Option<String>,
        /// Prompt template id to enrich the request with.
        #[arg(long)]
        template: Option<String>,
        #[command(flatten)]
        context: ContextArgs,
        /// Extra enrichment context, `key=value`.
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },
    /// Refine an existing playbook from feedback and validation errors.
    Refine {
        playbook: PathBuf,
        #[arg(long)]
        feedback: String,
        #[arg(long = "error")]
        errors: Vec<String>,
    },
    Validate {
        playbook: PathBuf,
        /// Include best-practice warnings.
        #[arg(long)]
        strict: bool,
    },
    Lint {
        playbook: PathBuf,
    },
    Run {
        playbook: PathBuf,
        #[arg(long, short = 'i')]
        inventory: String,
        #[arg(long)]
        check: bool,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// JSON object of extra variables.
        #[arg(long)]
        extra_vars: Option<String>,
    },
    #[command(subcommand)]
    Templates(TemplateCommand),
    /// List models, or pull one into the local Ollama inventory.
    Models {
        #[arg(long)]
        pull: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: String,
    },
    Enrich {
        id: String,
        #[arg(long)]
        prompt: String,
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },
    History {
        id: String,
    },
    Suggest {
        #[arg(long)]
        prompt: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
        #[arg(long)]
        user_prompt_template: Option<String>,
        #[arg(long = "best-practice")]
        best_practices: Vec<String>,
        /// Change description recorded in the template history.
        #[arg(long = "change", required = true)]
        changes: Vec<String>,
        /// Fail unless the template is still at this version.
        #[arg(long)]
        expect_version: Option<String>,
    },
}

#[derive(Args)]
struct ContextArgs {
    #[arg(long)]
    hosts: Option<String>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl From<ContextArgs> for GenerationContext {
    fn from(args: ContextArgs) -> Self {
        GenerationContext {
            target_hosts: args.hosts,
            environment: args.environment,
            tags: args.tags,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))
}

fn additional_context(vars: Vec<(String, String)>) -> AdditionalContext {
    vars.into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_artifact(dir: &Path, file_name: &Path, content: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating work directory {}", dir.display()))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            let failure = Failure::from(ServiceError::from(err));
            eprintln!("{}", serde_json::to_string_pretty(&failure).unwrap_or_default());
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);
    if let Some(dir) = cli.work_dir.clone() {
        config.work_dir = dir;
    }

    match run(cli.command, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            let failure = match err.downcast::<ServiceError>() {
                Ok(service) => Failure::from(service),
                Err(other) => json_failure(&other),
            };
            eprintln!("{}", serde_json::to_string_pretty(&failure).unwrap_or_default());
            ExitCode::FAILURE
        }
    }
}

// Non-service failures (I/O on artifacts, bad arguments) are reported as
// configuration problems.
fn json_failure(err: &anyhow::Error) -> Failure {
    Failure {
        kind: playbook_forge::ErrorKind::Config,
        message: format!("{:#}", err),
    }
}

/// Returns whether the operation succeeded.
async fn run(command: Command, config: &Config) -> Result<bool> {
    let service = PlaybookService::from_config(config)?;

    match command {
        Command::Generate {
            prompt,
            skeleton,
            template,
            context,
            vars,
        } => {
            let context = GenerationContext::from(context);
            let playbook = match template {
                Some(id) => {
                    service
                        .generate_with_template(&prompt, &id, &context, &additional_context(vars))
                        .await?
                }
                None => {
                    service
                        .generate_playbook(&prompt, skeleton.as_deref(), &context)
                        .await
                }
            };
            let path = write_artifact(
                service.work_dir(),
                Path::new(&playbook.file_name),
                &playbook.content,
            )
            .await?;
            print_json(&json!({ "playbook_path": path, "playbook": playbook }))?;
            Ok(true)
        }
        Command::Refine {
            playbook,
            feedback,
            errors,
        } => {
            let request = RefinementRequest {
                feedback,
                validation_errors: errors,
            };
            let refined = service.refine_file(&playbook, &request).await?;
            let dir = refined
                .file_name
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| service.work_dir().to_path_buf());
            let name = refined
                .file_name
                .file_name()
                .map(PathBuf::from)
                .context("refined playbook has no file name")?;
            let path = write_artifact(&dir, &name, &refined.content).await?;
            print_json(&json!({ "refined_playbook_path": path, "refinement": refined }))?;
            Ok(true)
        }
        Command::Validate { playbook, strict } => {
            let report = service.validate_file(&playbook, strict).await?;
            print_json(&report)?;
            Ok(report.valid)
        }
        Command::Lint { playbook } => {
            let outcome = service.lint_file(&playbook).await;
            print_json(&outcome)?;
            Ok(outcome.passed)
        }
        Command::Run {
            playbook,
            inventory,
            check,
            tags,
            extra_vars,
        } => {
            let extra_vars = extra_vars
                .map(|raw| serde_json::from_str(&raw).context("--extra-vars must be JSON"))
                .transpose()?;
            let request = RunRequest {
                playbook,
                inventory,
                check_mode: check,
                tags,
                extra_vars,
            };
            let outcome = service.run_playbook(&request).await;
            print_json(&outcome)?;
            Ok(outcome.exit_code == Some(0))
        }
        Command::Templates(command) => templates(command, &service),
        Command::Models { pull } => {
            if let Some(model) = pull {
                service.pull_model(&model).await?;
            }
            let models = service.installed_models().await?;
            let vendor = service.provider().map(|p| p.name().to_string());
            print_json(&json!({ "vendor": vendor, "models": models }))?;
            Ok(true)
        }
    }
}

fn templates(command: TemplateCommand, service: &PlaybookService) -> Result<bool> {
    match command {
        TemplateCommand::List {
            category,
            tags,
            search,
        } => {
            let category = category
                .map(|c| c.parse::<TemplateCategory>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let templates = service.list_templates(&TemplateFilter {
                category,
                tags,
                search,
            });
            let summaries: Vec<_> = templates
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "name": t.name,
                        "description": t.description,
                        "version": t.version,
                        "category": t.category,
                        "tags": t.tags,
                        "num_examples": t.few_shot_examples.len(),
                        "num_best_practices": t.context_enrichment.best_practices.len(),
                    })
                })
                .collect();
            print_json(&json!({ "count": summaries.len(), "templates": summaries }))?;
            Ok(true)
        }
        TemplateCommand::Show { id } => match service.get_template(&id) {
            Some(template) => {
                print_json(&template)?;
                Ok(true)
            }
            None => {
                eprintln!("Template not found: {}", id);
                Ok(false)
            }
        },
        TemplateCommand::Enrich { id, prompt, vars } => {
            let enriched = service.enrich_prompt(&prompt, &id, &additional_context(vars))?;
            print_json(&enriched)?;
            Ok(true)
        }
        TemplateCommand::History { id } => {
            let history = service.template_history(&id);
            print_json(&json!({ "template_id": id, "history": history }))?;
            Ok(!history.is_empty())
        }
        TemplateCommand::Suggest { prompt } => {
            let suggestion = service.suggest_template(&prompt);
            print_json(&json!({ "template_id": suggestion }))?;
            Ok(suggestion.is_some())
        }
        TemplateCommand::Update {
            id,
            name,
            description,
            system_prompt,
            user_prompt_template,
            best_practices,
            changes,
            expect_version,
        } => {
            let expected = expect_version
                .map(|v| v.parse::<TemplateVersion>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let update = TemplateUpdate {
                name,
                description,
                system_prompt,
                user_prompt_template,
                best_practices: (!best_practices.is_empty()).then_some(best_practices),
            };
            let updated = service.update_template(&id, update, changes.clone(), expected)?;
            print_json(&json!({
                "template_id": updated.id,
                "new_version": updated.version,
                "updated_at": updated.updated_at,
                "changes": changes,
            }))?;
            Ok(true)
        }
    }
}
