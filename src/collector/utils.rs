// Helper functions shared by engines and the orchestrator

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use super::errors::CollectError;

lazy_static! {
    static ref WATCH_ID_RE: Regex = Regex::new(r"[?&]v=([A-Za-z0-9_-]{11})").unwrap();
    static ref SHORT_LINK_RE: Regex = Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})").unwrap();
    static ref PATH_ID_RE: Regex =
        Regex::new(r"/(?:shorts|embed|live|v)/([A-Za-z0-9_-]{11})").unwrap();
    static ref BARE_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

pub fn is_url(reference: &str) -> bool {
    let lower = reference.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.contains("youtu")
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Resolve a video id from a URL or bare id.
///
/// Known URL shapes are matched first; anything else falls back to the last
/// non-empty path segment.
pub fn extract_video_id(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    for re in [&*WATCH_ID_RE, &*SHORT_LINK_RE, &*PATH_ID_RE] {
        if let Some(caps) = re.captures(reference) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
    }

    if BARE_ID_RE.is_match(reference) {
        return Some(reference.to_string());
    }

    let without_query = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches('/');
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(|segment| segment.to_string())
}

/// Read one video reference per line; blank lines and `#` comments are ignored
pub fn load_targets(path: &Path) -> Result<Vec<String>, CollectError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CollectError::Io(format!("Failed to read URL list {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Parse rendered like counts such as "1,234", "1.2K" or "3M"
pub fn parse_like_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().replace([',', ' '], "");
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last()? {
        'K' | 'k' => (&cleaned[..cleaned.len() - 1], 1_000f64),
        'M' | 'm' => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        'B' | 'b' => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Collapse runs of whitespace and trim
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").to_string()
}

/// Create the parent directory of `path` if it is missing
pub fn ensure_parent_dir(path: &Path) -> Result<(), CollectError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CollectError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }
    Ok(())
}
