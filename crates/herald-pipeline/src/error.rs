//! Error types for the pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::RunStep;

/// Failure reported by an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The call did not finish within the configured timeout.
    #[error("{call} timed out after {}s", .after.as_secs())]
    Timeout { call: &'static str, after: Duration },

    /// The collaborator answered with something unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The collaborator could not be reached or refused the request.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A collaborator failed at the given step.
    #[error("{step} failed: {source}")]
    Collaborator {
        step: RunStep,
        #[source]
        source: CollaboratorError,
    },

    /// The scorer returned a value outside 1-10.
    #[error("significance score out of range: {0}")]
    ScoreOutOfRange(i64),

    /// Generation produced no usable text.
    #[error("generated content is empty")]
    EmptyContent,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Wrap a collaborator failure with the step it happened in.
    pub fn at(step: RunStep) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| PipelineError::Collaborator { step, source }
    }
}
