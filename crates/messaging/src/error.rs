use thiserror::Error;

/// Errors raised by producers, consumers and broker adapters.
#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    /// The broker connection or session could not be established.
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    /// A single record could not be handed to the broker.
    #[error("Failed to send record: {0}")]
    Send(String),

    /// A bulk publish was aborted part-way through.
    #[error("Publish aborted after {sent} records: {reason}")]
    Publish { sent: usize, reason: String },

    /// The producer has been shut down and cannot be reused.
    #[error("Producer has been shut down")]
    Closed,

    /// Polling the broker failed.
    #[error("Poll failed: {0}")]
    Poll(String),

    /// Committing a consumed record failed.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Messaging configuration is invalid.
    #[error("Invalid messaging configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
