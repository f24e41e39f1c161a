//! Error types and exit codes for the note store core.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the `vaultctl` smoke-test binary.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const ALREADY_EXISTS: i32 = 3;
    pub const HASH_MISMATCH: i32 = 4;
    pub const VALIDATION_FAILED: i32 = 5;
    pub const POLICY_DENIED: i32 = 6;
}

/// Main error type for all note-store operations.
///
/// Every variant here corresponds to one member of the error taxonomy: the
/// `#[from]` conversions exist only for libraries whose errors the core has
/// no recovery strategy for (parse/IO/driver failures), never for the
/// domain-level variants below them, which callers match on directly.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("protected field: {0}")]
    ProtectedField(String),

    #[error("content hash mismatch: current={current} provided={provided}")]
    ContentHashMismatch { current: String, provided: String },

    #[error("missing content hash for mutation of {0}")]
    MissingContentHash(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("unsafe path: {0}")]
    PathUnsafe(String),

    #[error("io error during {op} on {path}: {cause}")]
    IoError {
        op: &'static str,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("index error: {0}")]
    IndexError(String),

    #[error("sql denied: {token}")]
    SqlDenied { token: String },

    #[error("operation timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        CoreError::IoError { op, path: path.into(), cause }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    /// Returns the exit code the `vaultctl` binary should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::NotFound(_) => exit_code::NOT_FOUND,
            CoreError::AlreadyExists(_) => exit_code::ALREADY_EXISTS,
            CoreError::ContentHashMismatch { .. } => exit_code::HASH_MISMATCH,
            CoreError::ValidationFailed(_) | CoreError::SchemaInvalid(_) => {
                exit_code::VALIDATION_FAILED
            }
            CoreError::PolicyDenied(_) => exit_code::POLICY_DENIED,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
