//! Error types for searchlift.

use thiserror::Error;

/// Errors surfaced by drivers, the pipeline, and configuration loading.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration, detected before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A driver was asked to perform an operation it does not implement.
    #[error("The {driver} driver does not support {operation}")]
    Unsupported {
        /// Driver id (e.g. `elasticsearch`, `csv`).
        driver: &'static str,
        /// Human-readable operation name (e.g. `import operations`).
        operation: &'static str,
    },

    /// Transient network failure; candidate for retry.
    #[error("Transport error while {operation}: {message}")]
    Transport {
        /// Operation the request belonged to.
        operation: &'static str,
        /// Underlying client error text.
        message: String,
    },

    /// The bounded retry ceiling was reached; the run must abort.
    #[error("Maximum number of retries while {operation} reached after {attempts} failures, aborting")]
    RetryExhausted {
        /// Operation whose retries were exhausted.
        operation: &'static str,
        /// Consecutive transport failures observed.
        attempts: u32,
    },

    /// Response body did not parse as the expected schema (strict mode).
    #[error("Malformed response while {operation}: {message}")]
    MalformedResponse {
        /// Operation the response belonged to.
        operation: &'static str,
        /// Parse error text.
        message: String,
    },

    /// The backend answered with a non-success HTTP status.
    #[error("Backend error {status}: {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        message: String,
    },

    /// File I/O failure (CSV sink, config loading).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure outside of response parsing.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file parse failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Builds a [`Error::Transport`] from a client error.
    pub fn transport(operation: &'static str, err: &reqwest::Error) -> Self {
        Self::Transport {
            operation,
            message: err.to_string(),
        }
    }

    /// Whether this error is a transient transport failure worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
