// Source failure diagnostics - classifies YouTube Data API failures
//
// Decides from status code and the API's error `reason`:
// - whether the backoff executor should retry
// - a short human description for the placeholder row

use serde::{Deserialize, Serialize};

use super::errors::CollectError;

/// Why a request to the comment source failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFailure {
    /// Daily quota used up (403 quotaExceeded)
    QuotaExceeded,

    /// Too many requests (429, 403 rateLimitExceeded)
    RateLimited,

    /// 5xx from Google's side
    ServerError,

    /// Connection refused, reset, timed out
    NetworkTimeout,

    /// Comments are turned off for the video
    CommentsDisabled,

    /// Video id unknown or video removed
    VideoNotFound,

    /// API key invalid, missing scope or forbidden
    Unauthorized,

    /// Request shape rejected (400)
    BadRequest,

    /// Anything else
    Unknown,
}

impl SourceFailure {
    /// Check if waiting and retrying might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::RateLimited | Self::ServerError | Self::NetworkTimeout
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "API quota exceeded",
            Self::RateLimited => "Rate limited by YouTube",
            Self::ServerError => "YouTube server error",
            Self::NetworkTimeout => "Network timeout",
            Self::CommentsDisabled => "Comments are disabled for this video",
            Self::VideoNotFound => "Video not found",
            Self::Unauthorized => "API key rejected",
            Self::BadRequest => "Malformed request",
            Self::Unknown => "Unknown source error",
        }
    }

    /// Wrap into the error the backoff executor understands
    pub fn into_error(self, detail: &str) -> CollectError {
        let message = if detail.is_empty() {
            self.description().to_string()
        } else {
            format!("{}: {}", self.description(), detail)
        };
        if self.is_retryable() {
            CollectError::TransientSource(message)
        } else {
            CollectError::Rejected(message)
        }
    }
}

/// First `reason` from a Google API error body, if any
pub fn error_reason(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["error"]["errors"]
        .as_array()
        .and_then(|errors| errors.first())
        .and_then(|e| e["reason"].as_str())
        .or_else(|| json["error"]["status"].as_str())
        .map(|s| s.to_string())
}

/// Error `message` from a Google API error body, falling back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Classify a non-success HTTP answer
pub fn classify_status(status: u16, body: &str) -> SourceFailure {
    let reason = error_reason(body).unwrap_or_default().to_lowercase();

    match status {
        429 => SourceFailure::RateLimited,
        500..=599 => SourceFailure::ServerError,
        403 => {
            if reason.contains("quotaexceeded") || reason.contains("dailylimitexceeded") {
                SourceFailure::QuotaExceeded
            } else if reason.contains("ratelimitexceeded") {
                SourceFailure::RateLimited
            } else if reason.contains("commentsdisabled") {
                SourceFailure::CommentsDisabled
            } else {
                SourceFailure::Unauthorized
            }
        }
        404 => SourceFailure::VideoNotFound,
        401 => SourceFailure::Unauthorized,
        400 => {
            if reason.contains("keyinvalid") {
                SourceFailure::Unauthorized
            } else {
                SourceFailure::BadRequest
            }
        }
        _ => SourceFailure::Unknown,
    }
}

/// Status + body straight to a `CollectError`
pub fn classify_http_failure(status: u16, body: &str) -> CollectError {
    let failure = classify_status(status, body);
    failure.into_error(&format!("HTTP {} - {}", status, error_message(body)))
}

/// Best-effort reading of a free-form error message
pub fn diagnose_error(error: &str) -> Option<SourceFailure> {
    let lower = error.to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower.contains("quota") {
        return Some(SourceFailure::QuotaExceeded);
    }
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(SourceFailure::RateLimited);
    }
    if lower.contains("comments are disabled") || lower.contains("commentsdisabled") {
        return Some(SourceFailure::CommentsDisabled);
    }
    if lower.contains("video not found") || lower.contains("videonotfound") {
        return Some(SourceFailure::VideoNotFound);
    }
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection refused") {
        return Some(SourceFailure::NetworkTimeout);
    }
    if lower.contains("api key") || lower.contains("forbidden") || lower.contains("401") {
        return Some(SourceFailure::Unauthorized);
    }
    if lower.contains("server error") || lower.contains("503") || lower.contains("500") {
        return Some(SourceFailure::ServerError);
    }

    Some(SourceFailure::Unknown)
}
