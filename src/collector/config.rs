// Engine configuration with builder-style overrides

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3";

/// Retry policy for remote calls
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Ceiling for a single wait
    pub max_delay: Duration,
    /// Spread each wait over 50%..100% of its nominal value
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }
}

/// Options for the YouTube Data API engine
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub include_replies: bool,
    /// Stop after this many records (checkpointed ones included)
    pub max_comments: Option<usize>,
    /// Checkpoint file name template; each video gets `<stem>.<video_id>.<ext>`
    /// next to it. Wins over `checkpoint_dir`.
    pub checkpoint_path: Option<PathBuf>,
    /// Directory holding one `<video_id>.jsonl` checkpoint per video
    pub checkpoint_dir: Option<PathBuf>,
    /// Flush cadence in records
    pub checkpoint_every: usize,
    /// `maxResults` per page (API caps at 100)
    pub page_size: u32,
    pub timeout_seconds: u32,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    pub endpoint: String,
    pub backoff: BackoffPolicy,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            include_replies: false,
            max_comments: None,
            checkpoint_path: None,
            checkpoint_dir: None,
            checkpoint_every: 50,
            page_size: 100,
            timeout_seconds: 30,
            proxy: None,
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ApiOptions {
    pub fn with_include_replies(mut self, enabled: bool) -> Self {
        self.include_replies = enabled;
        self
    }

    pub fn with_max_comments(mut self, max: Option<usize>) -> Self {
        self.max_comments = max;
        self
    }

    pub fn with_checkpoint_path(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint_path = path;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.checkpoint_dir = dir;
        self
    }

    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.clamp(1, 100);
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Checkpoint file for a video, if checkpointing is configured
    pub fn checkpoint_for(&self, video_id: &str) -> Option<PathBuf> {
        if let Some(path) = &self.checkpoint_path {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "checkpoint".to_string());
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "jsonl".to_string());
            return Some(path.with_file_name(format!("{}.{}.{}", stem, video_id, ext)));
        }
        self.checkpoint_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", video_id)))
    }
}

/// Options for the browser scroll crawler
#[derive(Debug, Clone)]
pub struct DomOptions {
    pub max_comments: usize,
    pub scroll_pause: Duration,
    pub headless: bool,
    /// Browser executable; auto-detected when absent
    pub automation_driver_path: Option<PathBuf>,
    pub expand_replies: bool,
    /// Consecutive no-growth scroll steps before giving up
    pub stagnation_threshold: u32,
    /// Wait after navigation before the first scroll
    pub page_load_wait: Duration,
    pub timeout_seconds: u32,
}

impl Default for DomOptions {
    fn default() -> Self {
        Self {
            max_comments: 500,
            scroll_pause: Duration::from_secs_f64(1.0),
            headless: true,
            automation_driver_path: None,
            expand_replies: true,
            stagnation_threshold: 3,
            page_load_wait: Duration::from_secs(3),
            timeout_seconds: 30,
        }
    }
}

impl DomOptions {
    pub fn with_max_comments(mut self, max: usize) -> Self {
        self.max_comments = max;
        self
    }

    pub fn with_scroll_pause(mut self, pause: Duration) -> Self {
        self.scroll_pause = pause;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_driver_path(mut self, path: Option<PathBuf>) -> Self {
        self.automation_driver_path = path;
        self
    }

    pub fn with_expand_replies(mut self, enabled: bool) -> Self {
        self.expand_replies = enabled;
        self
    }

    pub fn with_stagnation_threshold(mut self, threshold: u32) -> Self {
        self.stagnation_threshold = threshold.max(1);
        self
    }

    pub fn with_page_load_wait(mut self, wait: Duration) -> Self {
        self.page_load_wait = wait;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Options for both engines, as handed to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub api: ApiOptions,
    pub dom: DomOptions,
}

impl EngineOptions {
    pub fn with_api(mut self, api: ApiOptions) -> Self {
        self.api = api;
        self
    }

    pub fn with_dom(mut self, dom: DomOptions) -> Self {
        self.dom = dom;
        self
    }

    /// Defaults overlaid with `YT_COMMENTS_*` environment overrides
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(chrome) = non_empty("YT_COMMENTS_CHROME") {
            self.dom.automation_driver_path = Some(PathBuf::from(chrome));
        }
        if let Some(headless) = non_empty("YT_COMMENTS_HEADLESS") {
            self.dom.headless = !matches!(headless.to_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(proxy) = non_empty("YT_COMMENTS_PROXY") {
            self.api.proxy = Some(proxy);
        }
        if let Some(dir) = non_empty("YT_COMMENTS_CHECKPOINT_DIR") {
            self.api.checkpoint_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

/// API key from `YOUTUBE_API_KEY`, if set
pub fn credential_from_env() -> Option<String> {
    std::env::var("YOUTUBE_API_KEY")
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// `comments.csv` in the user's download directory
pub fn default_output_path() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("comments.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let options = EngineOptions::default();
        assert_eq!(options.api.backoff.max_attempts, 6);
        assert_eq!(options.api.backoff.max_delay, Duration::from_secs(60));
        assert_eq!(options.api.checkpoint_every, 50);
        assert!(options.api.max_comments.is_none());
        assert_eq!(options.dom.max_comments, 500);
        assert_eq!(options.dom.stagnation_threshold, 3);
        assert!(options.dom.expand_replies);
    }

    #[test]
    fn test_checkpoint_path_wins_over_dir() {
        let options = ApiOptions::default()
            .with_checkpoint_dir(Some(PathBuf::from("/tmp/ckpt")))
            .with_checkpoint_path(Some(PathBuf::from("/tmp/one.jsonl")));
        assert_eq!(options.checkpoint_for("abc"), Some(PathBuf::from("/tmp/one.abc.jsonl")));
        assert_eq!(options.checkpoint_for("xyz"), Some(PathBuf::from("/tmp/one.xyz.jsonl")));

        let bare = ApiOptions::default().with_checkpoint_path(Some(PathBuf::from("/tmp/progress")));
        assert_eq!(bare.checkpoint_for("abc"), Some(PathBuf::from("/tmp/progress.abc.jsonl")));

        let per_video = ApiOptions::default().with_checkpoint_dir(Some(PathBuf::from("/tmp/ckpt")));
        assert_eq!(
            per_video.checkpoint_for("abc"),
            Some(PathBuf::from("/tmp/ckpt/abc.jsonl"))
        );
        assert_eq!(ApiOptions::default().checkpoint_for("abc"), None);
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("YT_COMMENTS_CHROME", "/opt/chrome"),
            ("YT_COMMENTS_HEADLESS", "false"),
            ("YT_COMMENTS_PROXY", "socks5h://127.0.0.1:1080"),
            ("YT_COMMENTS_CHECKPOINT_DIR", "  "),
        ]
        .into_iter()
        .collect();

        let options = EngineOptions::default().overlay(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(options.dom.automation_driver_path, Some(PathBuf::from("/opt/chrome")));
        assert!(!options.dom.headless);
        assert_eq!(options.api.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert!(options.api.checkpoint_dir.is_none());
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(ApiOptions::default().with_page_size(500).page_size, 100);
        assert_eq!(ApiOptions::default().with_page_size(0).page_size, 1);
    }
}
