use thiserror::Error;

/// Application-wide error types for forage.
#[derive(Error, Debug)]
pub enum AppError {
    /// A browser handle (or other expensive resource) could not be built.
    #[error("Resource construction failed: {0}")]
    ResourceCreation(String),

    /// No resource became available within the acquire timeout.
    #[error("No resource available in pool after {0} seconds")]
    PoolExhausted(u64),

    /// The pool has been shut down; no further acquisitions are possible.
    #[error("Resource pool is shut down")]
    PoolClosed,

    /// Page extraction failed (navigation, missing elements, protocol errors).
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Extraction failed in a way that retrying cannot fix.
    #[error("Extraction failed permanently: {0}")]
    Fatal(String),

    /// An operation exceeded its deadline.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid run configuration, detected before any task dispatch.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Pool exhaustion counts as a retryable task failure, not a
    /// process-level fault: the resource may simply be busy elsewhere.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::PoolExhausted(_)
                | AppError::Extraction(_)
                | AppError::Timeout(_)
                | AppError::ResourceCreation(_)
                | AppError::Generic(_)
        )
    }
}
