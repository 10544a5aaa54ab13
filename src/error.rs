use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::providers::ProviderError;
use crate::templates::TemplateError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderConfig,
    ProviderRequest,
    ProviderResponseParse,
    Validation,
    TemplateNotFound,
    TemplateUpdateConflict,
    Config,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Provider(ProviderError::Config { .. }) => ErrorKind::ProviderConfig,
            ServiceError::Provider(ProviderError::ResponseParse { .. }) => {
                ErrorKind::ProviderResponseParse
            }
            ServiceError::Provider(_) => ErrorKind::ProviderRequest,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Template(TemplateError::NotFound(_)) => ErrorKind::TemplateNotFound,
            ServiceError::Template(TemplateError::UpdateConflict { .. }) => {
                ErrorKind::TemplateUpdateConflict
            }
            ServiceError::Template(TemplateError::Load { .. }) | ServiceError::Config(_) => {
                ErrorKind::Config
            }
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// What a caller sees when an operation fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<ServiceError> for Failure {
    fn from(err: ServiceError) -> Self {
        err.to_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_their_kind() {
        let config: ServiceError = ProviderError::config("OpenAI", "API key is required").into();
        assert_eq!(config.kind(), ErrorKind::ProviderConfig);

        let exhausted: ServiceError = ProviderError::retry_exhausted(
            "OpenAI",
            4,
            ProviderError::status("OpenAI", 503, "busy"),
        )
        .into();
        assert_eq!(exhausted.kind(), ErrorKind::ProviderRequest);

        let parse: ServiceError = ProviderError::parse("Gemini", "no candidates").into();
        assert_eq!(parse.kind(), ErrorKind::ProviderResponseParse);
    }

    #[test]
    fn failure_serializes_snake_case_kind() {
        let failure = Failure::from(ServiceError::from(TemplateError::NotFound(
            "does-not-exist".into(),
        )));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "template_not_found");
        assert_eq!(json["message"], "template not found: does-not-exist");
    }
}
