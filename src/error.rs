//! ShopSync Error Types

use thiserror::Error;

/// Result type alias for ShopSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// ShopSync error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Catalog errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Replication errors
    #[error("Replication to {store} failed: {reason}")]
    Replication { store: String, reason: String },

    // Snapshot errors
    #[error("Snapshot error for {store}: {reason}")]
    Snapshot { store: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a missing product
    pub fn product_not_found(id: u64) -> Self {
        Error::NotFound { kind: "Product", id: id.to_string() }
    }

    /// Check if this error was caused by the caller's input rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Validation(_))
    }

    /// Check if this error came out of the replication path
    pub fn is_replication_failure(&self) -> bool {
        matches!(self, Error::Replication { .. })
    }
}
