use thiserror::Error;

/// Errors that can occur when creating or persisting orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Quantity must be a positive number.
    #[error("Invalid quantity: {quantity} (must be > 0)")]
    InvalidQuantity { quantity: i32 },

    /// Description must not be empty.
    #[error("Order description is required")]
    EmptyDescription,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused the write.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
