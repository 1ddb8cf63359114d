// Engine and capability traits

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::config::DomOptions;
use super::engines::youtube_api::{CommentListResponse, CommentThreadListResponse, PageRequest};
use super::errors::CollectError;
use super::models::{CollectionTarget, CommentRecord};

/// A self-contained comment collection strategy
#[async_trait]
pub trait CommentEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Check the engine's external capability before it is used
    fn check_available(&self) -> Result<(), CollectError>;

    /// Collect comments for one target.
    ///
    /// A cancelled token stops the engine at its next loop boundary; what was
    /// collected so far is returned.
    async fn collect(
        &self,
        target: &CollectionTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError>;
}

/// Paged access to comment threads and reply lists
#[async_trait]
pub trait CommentThreadSource: Send + Sync {
    /// One `commentThreads.list` page
    async fn fetch_threads(&self, request: &PageRequest) -> Result<CommentThreadListResponse, CollectError>;

    /// One `comments.list?parentId=` page
    async fn fetch_replies(&self, request: &PageRequest) -> Result<CommentListResponse, CollectError>;
}

/// Starts browser sessions for the DOM engine
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `EnvironmentUnavailable` when no browser can be started
    fn check_available(&self, options: &DomOptions) -> Result<(), CollectError>;

    async fn launch(&self, options: &DomOptions) -> Result<Box<dyn PageSession>, CollectError>;
}

/// One open browser page. Owned by a single DOM engine invocation and closed
/// before it returns.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), CollectError>;

    async fn scroll_to(&mut self, y: u64) -> Result<(), CollectError>;

    /// Scroll down by one viewport height
    async fn page_down(&mut self) -> Result<(), CollectError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), CollectError>;

    /// `document.documentElement.scrollHeight`
    async fn content_height(&mut self) -> Result<u64, CollectError>;

    /// Outer HTML of every comment thread currently rendered, in page order
    async fn thread_fragments(&mut self) -> Result<Vec<String>, CollectError>;

    /// Click reply and "read more" expanders inside thread `index`, then return
    /// its refreshed outer HTML (`None` if the thread is gone)
    async fn expand_thread(&mut self, index: usize) -> Result<Option<String>, CollectError>;

    async fn close(&mut self) -> Result<(), CollectError>;
}
