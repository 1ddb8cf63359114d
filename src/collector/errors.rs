// Error types for comment collection engines

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CollectError {
    /// A capability the engine needs (browser, TLS) is missing on this machine
    #[error("Environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// API mode was selected without an API key
    #[error("YouTube Data API key is required for API mode. Obtain one from Google Cloud Console.")]
    MissingCredential,

    /// Rate limit, server-side failure or network hiccup; worth retrying
    #[error("Transient source error: {0}")]
    TransientSource(String),

    /// The source answered but refused the request (bad request, auth, disabled comments)
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    /// A single rendered element could not be read
    #[error("Extraction skipped: {0}")]
    ExtractionSkipped(String),

    /// An engine invocation produced nothing usable for a target
    #[error("Collection failed: {0}")]
    CollectionFailed(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cancelled")]
    Cancelled,
}

impl CollectError {
    /// Whether the backoff executor may try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientSource(_))
    }

    /// Whether every later target would fail the same way
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::EnvironmentUnavailable(_))
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<csv::Error> for CollectError {
    fn from(e: csv::Error) -> Self {
        Self::Io(format!("csv: {}", e))
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for CollectError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Parse(format!("Invalid JSON from API: {}", e));
        }
        if e.is_builder() {
            return Self::Rejected(format!("Malformed request: {}", e));
        }
        // Timeouts, refused connections, resets: all transport-level and retryable
        Self::TransientSource(format!("Network error: {}", e))
    }
}
