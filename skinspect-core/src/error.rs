//! Error types for the skinspect core library
//!
//! # Error Hierarchy
//!
//! ```text
//! StoreError
//! ├── Sqlite         - statement or connection failures
//! ├── Serialization  - sticker/keychain JSON columns
//! ├── Corrupt        - a stored value could not be decoded
//! └── Poisoned       - the connection mutex was poisoned by a panic
//! ```
//!
//! Library code returns `StoreError`; the service crate maps it onto its
//! per-reference `Storage` error kind.

use thiserror::Error;

/// Errors raised by the item store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite returned an error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored column held a value outside its domain
    #[error("corrupt column {column}: {message}")]
    Corrupt { column: String, message: String },

    /// A previous holder of the connection lock panicked
    #[error("store connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Create a corrupt-column error
    pub fn corrupt(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
