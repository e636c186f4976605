use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CityBingoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures while turning a generator result into a stored artifact.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid inline payload: {0}")]
    InvalidPayloadFormat(String),

    #[error("Fetching '{url}' timed out after {timeout_secs}s")]
    FetchTimeout { url: String, timeout_secs: u64 },

    #[error("Failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error("Artifact payload is empty")]
    EmptyPayload,

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact '{path}' failed verification: {reason}")]
    Verify { path: PathBuf, reason: String },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Not a local artifact reference: {0}")]
    InvalidReference(String),

    #[error("File task failed: {0}")]
    Task(String),
}

/// Errors raised by a durable store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(
        "Reference for '{key}' could not be verified after {attempts} attempts{}",
        last_error_suffix(.last_error)
    )]
    VerificationFailed {
        key: String,
        attempts: u32,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator returned no data")]
    EmptyResult,

    #[error("Generator failed: {0}")]
    Upstream(String),

    #[error("Storing artifact failed: {0}")]
    StorageFailure(#[source] AssetError),

    #[error("Persisting artifact reference failed: {0}")]
    PersistenceFailure(#[source] PersistError),

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    /// Short machine-readable classification used in responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::EmptyResult => "empty_result",
            GenerationError::Upstream(_) => "upstream",
            GenerationError::StorageFailure(AssetError::FetchTimeout { .. }) => "fetch_timeout",
            GenerationError::StorageFailure(AssetError::InvalidPayloadFormat(_)) => {
                "invalid_payload_format"
            }
            GenerationError::StorageFailure(_) => "storage_failure",
            GenerationError::PersistenceFailure(_) => "persistence_failure",
            GenerationError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Batch could not start: {reason}")]
    AggregateFailure { reason: String },
}

pub type Result<T> = std::result::Result<T, CityBingoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_kinds() {
        let timeout = GenerationError::StorageFailure(AssetError::FetchTimeout {
            url: "https://example.com/a.png".to_string(),
            timeout_secs: 30,
        });
        assert_eq!(timeout.kind(), "fetch_timeout");

        let invalid =
            GenerationError::StorageFailure(AssetError::InvalidPayloadFormat("bad".to_string()));
        assert_eq!(invalid.kind(), "invalid_payload_format");

        assert_eq!(GenerationError::EmptyResult.kind(), "empty_result");
        assert_eq!(
            GenerationError::StorageFailure(AssetError::EmptyPayload).kind(),
            "storage_failure"
        );
    }

    #[test]
    fn test_verification_failed_message() {
        let err = PersistError::VerificationFailed {
            key: "paris/eiffel".to_string(),
            attempts: 3,
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "Reference for 'paris/eiffel' could not be verified after 3 attempts"
        );

        let err = PersistError::VerificationFailed {
            key: "paris/eiffel".to_string(),
            attempts: 3,
            last_error: Some("disk full".to_string()),
        };
        assert!(err.to_string().ends_with("(last error: disk full)"));
    }
}
