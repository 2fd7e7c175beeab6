use std::time::Duration;

use thiserror::Error;

use crate::provider::Stage;

/// Failure reported by a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("backend returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "openai")]
impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Http(format!("request timed out: {err}"))
        } else if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else {
            BackendError::Http(err.to_string())
        }
    }
}

/// Failure of one dispatch through the provider manager.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown client: {0}")]
    UnknownClient(String),
    #[error("no {stage} backend available")]
    NoBackendAvailable { stage: Stage },
    #[error("all {stage} backends failed, last was {backend}: {source}")]
    Exhausted {
        stage: Stage,
        backend: String,
        #[source]
        source: BackendError,
    },
}

impl DispatchError {
    /// Configuration errors are fatal to the request and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DispatchError::UnknownClient(_))
    }
}

/// Failure of the recognize → translate → synthesize pipeline.
///
/// `Display` is the client-facing summary and never carries vendor text;
/// use [`PipelineError::detail`] for logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{stage} failed")]
    Stage {
        stage: Stage,
        #[source]
        source: DispatchError,
    },
    #[error("no speech recognized")]
    EmptyTranscript,
}

impl PipelineError {
    /// Wraps a dispatch failure, keeping unknown-client errors as configuration errors.
    pub fn from_dispatch(stage: Stage, err: DispatchError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration(err.to_string())
        } else {
            PipelineError::Stage { stage, source: err }
        }
    }

    /// Full error chain for logging.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::Stage { stage, source } => format!("{stage} failed: {source}"),
            other => other.to_string(),
        }
    }
}

/// Errors raised by a hybrid session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_summary_hides_backend_text() {
        let err = PipelineError::from_dispatch(
            Stage::Translation,
            DispatchError::Exhausted {
                stage: Stage::Translation,
                backend: "openai_translation".to_string(),
                source: BackendError::Status {
                    code: 401,
                    body: "invalid api key sk-123".to_string(),
                },
            },
        );
        assert_eq!(err.to_string(), "translation failed");
        assert!(err.detail().contains("401"));
    }

    #[test]
    fn unknown_client_is_configuration_error() {
        let err = PipelineError::from_dispatch(
            Stage::Recognition,
            DispatchError::UnknownClient("acme".to_string()),
        );
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
