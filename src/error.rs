//! Error types for the reconciliation job
//!
//! Every fatal kind converts into [`SyncError`], which is what a run returns.
//! A run that returns an error has already rolled its transaction back.

use thiserror::Error;

/// Top-level error for a reconciliation run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] MalformedRecordError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures retrieving an upstream feed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered 404: the feed has not been published yet.
    #[error("Feed at {url} is not published yet")]
    NotPublished { url: String },

    #[error("Feed at {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode feed from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// True for the "feed not live yet" signal
    pub fn is_not_published(&self) -> bool {
        matches!(self, Self::NotPublished { .. })
    }
}

/// A feed entry that lacks a mandatory field or carries an unparseable value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("organisation '{code}': field '{field}' {problem}")]
pub struct MalformedRecordError {
    pub code: String,
    pub field: &'static str,
    pub problem: String,
}

impl MalformedRecordError {
    pub fn missing(code: &str, field: &'static str) -> Self {
        Self {
            code: code.to_string(),
            field,
            problem: "is missing".to_string(),
        }
    }

    pub fn invalid(code: &str, field: &'static str, detail: impl std::fmt::Display) -> Self {
        Self {
            code: code.to_string(),
            field,
            problem: format!("is invalid: {}", detail),
        }
    }
}

/// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} with key '{key}' conflicts with an existing record")]
    Conflict { entity: &'static str, key: String },

    #[error("{entity} with key '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("Transaction already committed or rolled back")]
    TransactionClosed,
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_message() {
        let err = MalformedRecordError::missing("RXX", "name");
        assert_eq!(err.to_string(), "organisation 'RXX': field 'name' is missing");
    }

    #[test]
    fn test_not_published_detection() {
        let err = FetchError::NotPublished {
            url: "https://example.org/regions.json".to_string(),
        };
        assert!(err.is_not_published());

        let err = FetchError::Status {
            url: "https://example.org/regions.json".to_string(),
            status: 500,
        };
        assert!(!err.is_not_published());
    }

    #[test]
    fn test_sync_error_from_conversions() {
        let err: SyncError = MalformedRecordError::missing("RXX", "organisation_type.code").into();
        assert!(matches!(err, SyncError::MalformedRecord(_)));

        let err: SyncError = StoreError::TransactionClosed.into();
        assert!(matches!(err, SyncError::Store(StoreError::TransactionClosed)));
    }
}
