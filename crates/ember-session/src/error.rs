//! Error types for session store operations.

/// Error raised by a [`SessionStore`](crate::SessionStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store rejected or failed a command.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A key was expected to exist but did not.
    #[error("No such key: {0}")]
    NoSuchKey(String),

    /// A key holds a value of the wrong type for the command.
    #[error("Wrong value type at key: {0}")]
    WrongType(String),

    /// An expiry too far in the future for the store to represent.
    #[error("Invalid expire time {seconds}s for key: {key}")]
    InvalidExpire { key: String, seconds: u64 },
}

/// Error type for session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No session configuration was available when creating a session.
    #[error("Session configuration missing: {0}")]
    Configuration(String),

    /// A timeout outside `0..=MAX_TIMEOUT_SECS`.
    #[error("Session timeout of {seconds}s exceeds the maximum of {max}s")]
    InvalidTimeout { seconds: u64, max: u64 },

    /// The id generator kept producing ids that are already live.
    #[error("Could not allocate a unique session id after {attempts} attempts")]
    IdAllocationExhausted { attempts: usize },

    /// Error from the backing store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An attribute could not be converted to or from JSON.
    #[error("Attribute serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for store client operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
