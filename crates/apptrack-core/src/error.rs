use thiserror::Error;

/// Core error types for registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Registry service is not running")]
    ServiceStopped,

    #[error("Behavior store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RegistryError {
    /// Whether repeating the same request may succeed, e.g. once the rules file is writable again
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Io(_) | RegistryError::Store(_))
    }
}
