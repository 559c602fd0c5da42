use leadsignal_archive::ArchiveError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("signal store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("scrape archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
