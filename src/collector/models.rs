// Common data models for comment collection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::errors::CollectError;
use super::utils;

/// One collected comment or reply.
///
/// `id` is only known for API-sourced records. For replies, `parent_id` holds the
/// parent's comment id (API) or the parent's raw text (DOM).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: Option<String>,
    pub author: String,
    pub text: String,
    pub published_at: Option<String>,
    pub like_count: Option<u64>,
    pub parent_id: Option<String>,
    pub is_reply: bool,
}

impl CommentRecord {
    /// Top-level comment
    pub fn top_level(id: Option<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            author: author.into(),
            text: text.into(),
            published_at: None,
            like_count: None,
            parent_id: None,
            is_reply: false,
        }
    }

    /// Reply linked to `parent_id`
    pub fn reply(
        id: Option<String>,
        author: impl Into<String>,
        text: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            text: text.into(),
            published_at: None,
            like_count: None,
            parent_id: Some(parent_id.into()),
            is_reply: true,
        }
    }

    pub fn with_published_at(mut self, published_at: Option<String>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_like_count(mut self, like_count: Option<u64>) -> Self {
        self.like_count = like_count;
        self
    }
}

/// One video to collect comments for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    /// URL or id exactly as supplied
    pub reference: String,
    /// Resolved video id, when the reference could be parsed
    pub video_id: Option<String>,
}

impl CollectionTarget {
    pub fn new(reference: &str) -> Result<Self, CollectError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CollectError::InvalidTarget("empty video reference".to_string()));
        }
        Ok(Self {
            reference: reference.to_string(),
            video_id: utils::extract_video_id(reference),
        })
    }

    /// URL a browser should open for this target
    pub fn page_url(&self) -> String {
        if utils::is_url(&self.reference) {
            return self.reference.clone();
        }
        match &self.video_id {
            Some(id) => utils::watch_url(id),
            None => self.reference.clone(),
        }
    }

    pub fn require_video_id(&self) -> Result<&str, CollectError> {
        self.video_id.as_deref().ok_or_else(|| {
            CollectError::InvalidTarget(format!("cannot resolve a video id from '{}'", self.reference))
        })
    }
}

impl fmt::Display for CollectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

/// Engine selection policy per target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// YouTube Data API only
    Api,
    /// Browser scroll crawler only
    Dom,
    /// API first, browser crawler when the API fails or yields nothing
    #[default]
    Both,
}

impl EngineMode {
    pub fn uses_api(&self) -> bool {
        matches!(self, Self::Api | Self::Both)
    }

    pub fn uses_dom(&self) -> bool {
        matches!(self, Self::Dom | Self::Both)
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Dom => write!(f, "dom"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for EngineMode {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "dom" | "browser" | "selenium" => Ok(Self::Dom),
            "both" | "auto" => Ok(Self::Both),
            other => Err(CollectError::InvalidTarget(format!("unknown engine mode '{}'", other))),
        }
    }
}

/// What the orchestrator ended up with for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Comments(Vec<CommentRecord>),
    /// No engine failed, but nothing was found
    Empty,
    /// Every attempted engine failed; carries the captured error text
    Failed(String),
}

impl TargetOutcome {
    pub fn record_count(&self) -> usize {
        match self {
            Self::Comments(records) => records.len(),
            _ => 0,
        }
    }
}

/// Result of one batch run, handed back once on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub targets: usize,
    pub records_written: usize,
    pub placeholder_rows: usize,
    pub output_path: PathBuf,
    pub cancelled: bool,
}
