use thiserror::Error;
use uuid::Uuid;

/// Errors raised by discovery operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    #[error("The binding type '{0}' has not been defined")]
    NoSuchType(String),

    #[error("The binding type '{0}' is already defined")]
    DuplicateType(String),

    #[error("The parameter '{parameter}' does not exist on type '{type_name}'")]
    NoSuchParameter {
        parameter: String,
        type_name: String,
    },

    #[error("The required parameter '{parameter}' is missing for type '{type_name}'")]
    MissingParameter {
        parameter: String,
        type_name: String,
    },

    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Invalid name '{0}': names must start with a letter")]
    InvalidName(String),

    #[error("Binding failed: {0}")]
    Binding(String),

    #[error("Unsupported query language '{0}' (only \"glob\" is supported)")]
    UnsupportedLanguage(String),

    #[error("No binding with uuid {0}")]
    NoSuchBinding(Uuid),

    #[error("The binding for '{0}' has not been initialized with a repository")]
    NotInitialized(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Failed to load discovery: {0}")]
    Loading(String),

    #[error("Discovery storage is corrupt: {0}")]
    StorageCorrupt(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
