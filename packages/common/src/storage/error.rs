use thiserror::Error;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object was not found in its bucket.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached or did not answer in time.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// The object key is malformed.
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// The payload exceeds the bucket policy's size limit.
    #[error("object exceeds size limit ({actual} > {limit} bytes)")]
    SizeLimitExceeded { actual: u64, limit: u64 },

    /// An I/O error occurred while spooling or streaming data.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}
