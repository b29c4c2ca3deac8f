//! Storage tier error types.

/// Errors produced by the storage tiers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Fast cache tier failure.
    #[error("Cache tier error: {0}")]
    Cache(String),

    /// Durable tier failure.
    #[error("Durable tier error: {0}")]
    Durable(String),

    /// Context document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `SQLite` error from the durable tier.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error from the durable tier.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Internal / unexpected error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
