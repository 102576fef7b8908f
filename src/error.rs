//! Agent error types

use thiserror::Error;

/// Main agent error type
#[derive(Debug, Error)]
pub enum WardenError {
    // ========== Storage Errors ==========
    /// Storage operation failed (NOT NotFound - that is surfaced separately)
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Requested row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    // ========== External Tool Errors ==========
    /// External probe binary failed or produced unusable output
    #[error("tool error: {0}")]
    Tool(String),

    /// External probe exceeded its deadline
    #[error("tool timed out after {0}s")]
    ToolTimeout(u64),

    // ========== Uplink Errors ==========
    /// Cloud endpoint returned a non-success status
    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),

    /// Network-level failure talking to the cloud or a webhook
    #[error("send failure: {0}")]
    Send(String),

    // ========== Notification Errors ==========
    /// Notification channel is not configured or unknown
    #[error("channel not configured: {0}")]
    ChannelUnavailable(String),

    /// SMTP delivery failed
    #[error("smtp error: {0}")]
    Smtp(String),

    // ========== Validation Errors ==========
    /// Invalid argument or payload
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    // ========== Lifecycle ==========
    /// Operation aborted by shutdown
    #[error("cancelled")]
    Cancelled,
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Agent result type alias
pub type WardenResult<T> = Result<T, WardenError>;

impl WardenError {
    /// Check if the error is transient (caller may retry)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WardenError::UnexpectedStatus(_)
                | WardenError::Send(_)
                | WardenError::ToolTimeout(_)
                | WardenError::Storage(StorageError::ConnectionFailed(_))
        )
    }
}

// Conversions from external errors

impl From<rusqlite::Error> for WardenError {
    fn from(e: rusqlite::Error) -> Self {
        WardenError::Storage(StorageError::Sqlite(e))
    }
}

impl From<StorageError> for WardenError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => WardenError::NotFound(msg),
            other => WardenError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::InvalidArgument(e.to_string())
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => WardenError::UnexpectedStatus(status.as_u16()),
            None => WardenError::Send(e.to_string()),
        }
    }
}

impl From<std::io::Error> for WardenError {
    fn from(e: std::io::Error) -> Self {
        WardenError::Storage(StorageError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_converts_to_not_found() {
        let storage_err = StorageError::NotFound("alert 7".into());
        let err: WardenError = storage_err.into();

        assert!(matches!(err, WardenError::NotFound(_)));
        assert_eq!(err.to_string(), "not found: alert 7");
    }

    #[test]
    fn test_storage_other_variants_convert_to_storage() {
        let variants = vec![
            StorageError::ConnectionFailed("test".into()),
            StorageError::QueryFailed("test".into()),
            StorageError::MigrationFailed("test".into()),
        ];

        for storage_err in variants {
            let err: WardenError = storage_err.into();
            assert!(matches!(err, WardenError::Storage(_)));
        }
    }

    #[test]
    fn test_is_transient() {
        assert!(WardenError::UnexpectedStatus(503).is_transient());
        assert!(WardenError::Send("connection reset".into()).is_transient());
        assert!(WardenError::ToolTimeout(20).is_transient());
        assert!(!WardenError::NotFound("x".into()).is_transient());
        assert!(!WardenError::Config("x".into()).is_transient());
        assert!(!WardenError::InvalidArgument("x".into()).is_transient());
    }

    #[test]
    fn test_rusqlite_error_conversion() {
        let sql_err = rusqlite::Error::InvalidQuery;
        let err: WardenError = sql_err.into();

        assert!(matches!(err, WardenError::Storage(StorageError::Sqlite(_))));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WardenError>();
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            WardenError::UnexpectedStatus(500).to_string(),
            "unexpected status: 500"
        );
        assert_eq!(
            WardenError::ToolTimeout(20).to_string(),
            "tool timed out after 20s"
        );
        assert_eq!(
            WardenError::Config("bad severity".into()).to_string(),
            "configuration error: bad severity"
        );
    }
}
