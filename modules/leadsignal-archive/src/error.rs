/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Result type for individual fetch attempts, before the retry loop.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Why a single fetch attempt failed. The kind drives retry policy:
/// transient failures are retried with backoff, terminal ones abort.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Target unreachable: {0}")]
    Unreachable(String),

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Blocked by target (HTTP {status})")]
    BlockedByTarget { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Server-side trouble (network, timeouts, 5xx) is worth retrying.
    /// A 4xx means the target made a decision about us; back off instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Unreachable(_) | FetchError::Timeout(_) => true,
            FetchError::BlockedByTarget { status } => *status >= 500,
            FetchError::Malformed(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArchiveError {
    pub fn fetch(url: &str, source: FetchError) -> Self {
        ArchiveError::Fetch {
            url: url.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        assert!(FetchError::BlockedByTarget { status: 500 }.is_retryable());
        assert!(FetchError::BlockedByTarget { status: 503 }.is_retryable());
        assert!(!FetchError::BlockedByTarget { status: 403 }.is_retryable());
        assert!(!FetchError::BlockedByTarget { status: 429 }.is_retryable());
        assert!(FetchError::Timeout(30).is_retryable());
        assert!(FetchError::Unreachable("dns".to_string()).is_retryable());
        assert!(!FetchError::Malformed("not html".to_string()).is_retryable());
    }
}
