//! Error types for Gantry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Build-fatal errors: these abort the whole build rather than being
    // collected as validation errors.
    #[error("Strategy produced {count} jobs, more than the limit of {limit}")]
    MaxJobExpansion { count: usize, limit: usize },

    #[error("A task template store is required to resolve template step '{0}'")]
    TemplateStoreNotProvided(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Task definition not found: {0}")]
    TaskDefinitionNotFound(String),

    #[error("The pipeline is not valid: {0}")]
    PipelineNotValid(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidPipeline(String),

    // Legacy protocol errors
    #[error("Not supported: {0}")]
    NotSupported(String),

    // Expression errors
    #[error("Expression error: {0}")]
    Expression(String),

    // Agent errors
    #[error("Agent queue drain failed: {0:?}")]
    QueueDrainFailed(Vec<String>),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
