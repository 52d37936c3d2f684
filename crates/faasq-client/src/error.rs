//! Error taxonomy for the queue publisher.

/// Errors raised while connecting to or publishing through the backend.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A connect attempt failed. Fatal when it is the first one.
    #[error("failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },
    /// Every bounded reconnect attempt failed.
    #[error("gave up reconnecting to {url} after {attempts} attempts")]
    ReconnectExhausted { url: String, attempts: u32 },
    #[error("failed to encode message: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The backend rejected the message or the session was unusable.
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
