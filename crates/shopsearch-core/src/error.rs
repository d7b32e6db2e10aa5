use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the product search system.
///
/// The embedding, index and API layers all report through this type so that
/// the `?` operator works across crate boundaries. Callers that render
/// user-facing messages match on the variant to pick the right wording.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShopError {
    /// No API credential could be resolved at startup. Fatal.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote embedding call failed (network, auth, quota, bad input).
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Collection '{collection}' not found at {}", location.display())]
    IndexNotFound { collection: String, location: PathBuf },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ShopError {
    /// True for errors that must stop the process instead of failing one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShopError::MissingCredential(_) | ShopError::Config(_))
    }
}

impl From<toml::de::Error> for ShopError {
    fn from(err: toml::de::Error) -> Self {
        ShopError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ShopError {
    fn from(err: toml::ser::Error) -> Self {
        ShopError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for product search operations.
pub type Result<T> = std::result::Result<T, ShopError>;
