/// Result type alias for operations on shared types and configuration.
pub type Result<T> = std::result::Result<T, LeadSignalError>;

#[derive(Debug, thiserror::Error)]
pub enum LeadSignalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
