// API collection engine - paginated, checkpointed, resumable

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::youtube_api::{CommentThread, PageRequest, YouTubeDataClient};
use crate::collector::backoff::BackoffExecutor;
use crate::collector::checkpoint::{CheckpointStore, CheckpointedRun};
use crate::collector::config::ApiOptions;
use crate::collector::errors::CollectError;
use crate::collector::models::{CollectionTarget, CommentRecord};
use crate::collector::traits::{CommentEngine, CommentThreadSource};

pub struct ApiEngine {
    credential: Option<String>,
    options: ApiOptions,
    backoff: BackoffExecutor,
    /// Injected source; the HTTPS client is built per call otherwise
    source: Option<Arc<dyn CommentThreadSource>>,
}

impl ApiEngine {
    pub fn new(credential: Option<String>, options: ApiOptions) -> Self {
        let backoff = BackoffExecutor::new(options.backoff.clone());
        Self {
            credential,
            options,
            backoff,
            source: None,
        }
    }

    /// Use `source` instead of the YouTube Data API
    pub fn with_source(
        credential: Option<String>,
        options: ApiOptions,
        source: Arc<dyn CommentThreadSource>,
    ) -> Self {
        Self {
            source: Some(source),
            ..Self::new(credential, options)
        }
    }

    pub fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn credential(&self) -> Result<&str, CollectError> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CollectError::MissingCredential)
    }

    /// All comments for `video_id`, in source order.
    ///
    /// With a checkpoint configured, records already on disk are returned
    /// first and count toward `max_comments`; paging continues from the saved
    /// resume token. A checkpoint marked complete is returned without any
    /// request.
    pub async fn fetch_comments(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        let key = self.credential()?;
        match &self.source {
            Some(source) => self.fetch_from(source.as_ref(), video_id, cancel).await,
            None => {
                let client = YouTubeDataClient::new(key, &self.options)?;
                self.fetch_from(&client, video_id, cancel).await
            }
        }
    }

    async fn fetch_from(
        &self,
        source: &dyn CommentThreadSource,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        let store = self.options.checkpoint_for(video_id).map(CheckpointStore::new);
        let mut run = CheckpointedRun::resume(store, self.options.checkpoint_every);
        let cap = self.options.max_comments;
        let at_cap = |run: &CheckpointedRun| cap.is_some_and(|max| run.len() >= max);

        if run.state().completed {
            info!(video_id, records = run.len(), "checkpoint already complete");
            return Ok(truncate(run.into_records(), cap));
        }
        if at_cap(&run) {
            return Ok(truncate(run.into_records(), cap));
        }

        let mut page_token = run.state().resume_token.clone();
        let mut pages = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!(video_id, records = run.len(), "API collection cancelled");
                save_position(&mut run, video_id, page_token, false);
                break;
            }

            let request = PageRequest::threads(
                video_id,
                page_token.clone(),
                self.options.page_size,
                self.options.include_replies,
            );
            let request_ref = &request;
            let page = match self
                .backoff
                .execute("commentThreads", move || source.fetch_threads(request_ref))
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    if let Err(write_err) = run.flush() {
                        warn!(video_id, error = %write_err, "checkpoint write failed");
                    }
                    return Err(give_up(video_id, e));
                }
            };
            pages += 1;
            debug!(video_id, page = pages, threads = page.items.len(), "thread page received");

            let mut capped = false;
            'threads: for thread in &page.items {
                let top = thread.snippet.top_level_comment.to_top_level(&thread.id);
                let parent_id = top.id.clone();
                let replayed = !run.push(top);
                if at_cap(&run) {
                    capped = true;
                    break;
                }

                if self.options.include_replies {
                    let total = thread.snippet.total_reply_count as usize;
                    if replayed && parent_id.as_deref().is_some_and(|id| run.reply_count(id) >= total) {
                        debug!(video_id, thread = %thread.id, "replies already checkpointed");
                        continue;
                    }
                    for reply in self.thread_replies(source, thread, parent_id.as_deref(), cancel).await {
                        run.push(reply);
                        if at_cap(&run) {
                            capped = true;
                            break 'threads;
                        }
                    }
                }
            }

            if capped {
                // Resume re-reads this page; known ids are skipped
                save_position(&mut run, video_id, page_token, false);
                info!(video_id, records = run.len(), "reached max_comments");
                break;
            }

            if cancel.is_cancelled() {
                // Reply lists of this page may be partial
                save_position(&mut run, video_id, page_token, false);
                info!(video_id, records = run.len(), "API collection cancelled mid-page");
                break;
            }

            match page.next_page_token {
                Some(next) => {
                    save_position(&mut run, video_id, Some(next.clone()), false);
                    page_token = Some(next);
                }
                None => {
                    save_position(&mut run, video_id, None, true);
                    break;
                }
            }
        }

        info!(video_id, records = run.len(), pages, "API collection finished");
        Ok(truncate(run.into_records(), cap))
    }

    /// Replies of one thread. Uses the embedded replies unless the thread has
    /// more, in which case the reply list is paged. Reply paging failures and
    /// cancellation degrade to the embedded replies.
    async fn thread_replies(
        &self,
        source: &dyn CommentThreadSource,
        thread: &CommentThread,
        parent_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Vec<CommentRecord> {
        let Some(parent_id) = parent_id else {
            return Vec::new();
        };
        let embedded = || -> Vec<CommentRecord> {
            thread
                .embedded_replies()
                .iter()
                .map(|c| c.to_reply(parent_id))
                .collect()
        };
        if !thread.replies_truncated() {
            return embedded();
        }

        let mut replies = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                if replies.is_empty() {
                    return embedded();
                }
                break;
            }
            let request = PageRequest::replies(parent_id, page_token.clone(), self.options.page_size);
            let request_ref = &request;
            match self
                .backoff
                .execute("comments", move || source.fetch_replies(request_ref))
                .await
            {
                Ok(page) => {
                    replies.extend(page.items.iter().map(|c| c.to_reply(parent_id)));
                    match page.next_page_token {
                        Some(next) => page_token = Some(next),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(parent_id, error = %e, "reply paging failed");
                    if replies.is_empty() {
                        return embedded();
                    }
                    break;
                }
            }
        }
        replies
    }
}

/// Save the resume position; on failure the previous position stays on disk
fn save_position(run: &mut CheckpointedRun, video_id: &str, token: Option<String>, completed: bool) {
    if let Err(e) = run.mark_position(token, completed) {
        warn!(video_id, error = %e, "checkpoint not saved, resume position unchanged");
    }
}

fn give_up(video_id: &str, error: CollectError) -> CollectError {
    match error {
        CollectError::MaxRetriesExceeded { attempts, last_error } => {
            warn!(video_id, attempts, "giving up on comment threads");
            CollectError::CollectionFailed(format!(
                "gave up after {} attempts: {}",
                attempts, last_error
            ))
        }
        other => other,
    }
}

fn truncate(mut records: Vec<CommentRecord>, cap: Option<usize>) -> Vec<CommentRecord> {
    if let Some(max) = cap {
        records.truncate(max);
    }
    records
}

#[async_trait]
impl CommentEngine for ApiEngine {
    fn name(&self) -> &'static str {
        "API"
    }

    fn check_available(&self) -> Result<(), CollectError> {
        if self.source.is_some() {
            return Ok(());
        }
        YouTubeDataClient::new(self.credential.as_deref().unwrap_or_default(), &self.options).map(|_| ())
    }

    async fn collect(
        &self,
        target: &CollectionTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        self.credential()?;
        let video_id = target.require_video_id()?;
        self.fetch_comments(video_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::checkpoint::ResumeState;
    use crate::collector::config::BackoffPolicy;
    use crate::collector::engines::youtube_api::{Comment, CommentListResponse, CommentThreadListResponse};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<Option<String>, CommentThreadListResponse>,
        reply_pages: HashMap<(String, Option<String>), CommentListResponse>,
        transient_failures: AtomicU32,
        broken_tokens: HashSet<String>,
        thread_calls: Mutex<Vec<Option<String>>>,
        reply_calls: AtomicU32,
        /// Cancelled while the next thread page is served
        cancel_on_fetch: Mutex<Option<CancellationToken>>,
    }

    impl FakeSource {
        fn page(mut self, token: Option<&str>, threads: Vec<CommentThread>, next: Option<&str>) -> Self {
            self.pages.insert(
                token.map(String::from),
                CommentThreadListResponse {
                    items: threads,
                    next_page_token: next.map(String::from),
                },
            );
            self
        }

        fn reply_page(mut self, parent: &str, token: Option<&str>, items: Vec<Comment>, next: Option<&str>) -> Self {
            self.reply_pages.insert(
                (parent.to_string(), token.map(String::from)),
                CommentListResponse {
                    items,
                    next_page_token: next.map(String::from),
                },
            );
            self
        }

        fn calls(&self) -> Vec<Option<String>> {
            self.thread_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommentThreadSource for FakeSource {
        async fn fetch_threads(&self, request: &PageRequest) -> Result<CommentThreadListResponse, CollectError> {
            self.thread_calls.lock().unwrap().push(request.page_token.clone());
            if let Some(token) = self.cancel_on_fetch.lock().unwrap().take() {
                token.cancel();
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CollectError::TransientSource("HTTP 503".to_string()));
            }
            if let Some(token) = &request.page_token {
                if self.broken_tokens.contains(token) {
                    return Err(CollectError::TransientSource("HTTP 429".to_string()));
                }
            }
            self.pages
                .get(&request.page_token)
                .cloned()
                .ok_or_else(|| CollectError::Rejected(format!("unknown page {:?}", request.page_token)))
        }

        async fn fetch_replies(&self, request: &PageRequest) -> Result<CommentListResponse, CollectError> {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            self.reply_pages
                .get(&(request.id.clone(), request.page_token.clone()))
                .cloned()
                .ok_or_else(|| CollectError::Rejected("unknown reply page".to_string()))
        }
    }

    fn thread(id: &str, text: &str) -> CommentThread {
        CommentThread::new(Comment::new(id, "author", text), Vec::new(), 0)
    }

    fn engine(source: &Arc<FakeSource>, options: ApiOptions) -> ApiEngine {
        ApiEngine::with_source(Some("test-key".to_string()), options, source.clone())
    }

    fn ids(records: &[CommentRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.id.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_two_pages_one_record_each() {
        let source = Arc::new(
            FakeSource::default()
                .page(None, vec![thread("c1", "first")], Some("p2"))
                .page(Some("p2"), vec![thread("c2", "second")], None),
        );
        let records = engine(&source, ApiOptions::default())
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c2"]);
        assert_eq!(source.calls(), vec![None, Some("p2".to_string())]);
    }

    #[tokio::test]
    async fn test_embedded_replies_follow_their_parent() {
        let with_replies = CommentThread::new(
            Comment::new("c1", "alice", "top"),
            vec![Comment::new("c1.r1", "bob", "reply")],
            1,
        );
        let source = Arc::new(
            FakeSource::default().page(None, vec![with_replies, thread("c2", "next")], None),
        );
        let options = ApiOptions::default().with_include_replies(true);
        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c1.r1", "c2"]);
        assert!(records[1].is_reply);
        assert_eq!(records[1].parent_id.as_deref(), Some("c1"));
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_truncated_replies_are_paged() {
        let truncated = CommentThread::new(
            Comment::new("c1", "alice", "top"),
            vec![Comment::new("c1.r1", "bob", "one")],
            3,
        );
        let source = Arc::new(
            FakeSource::default()
                .page(None, vec![truncated], None)
                .reply_page(
                    "c1",
                    None,
                    vec![Comment::new("c1.r1", "bob", "one"), Comment::new("c1.r2", "eve", "two")],
                    Some("r2"),
                )
                .reply_page("c1", Some("r2"), vec![Comment::new("c1.r3", "dan", "three")], None),
        );
        let options = ApiOptions::default().with_include_replies(true);
        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c1.r1", "c1.r2", "c1.r3"]);
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_max_comments_stops_paging() {
        let source = Arc::new(
            FakeSource::default()
                .page(None, vec![thread("c1", "a"), thread("c2", "b")], Some("p2"))
                .page(Some("p2"), vec![thread("c3", "c"), thread("c4", "d")], Some("p3"))
                .page(Some("p3"), vec![thread("c5", "e")], None),
        );
        let options = ApiOptions::default().with_max_comments(Some(3));
        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c2", "c3"]);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_resumes_from_checkpoint_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vid.jsonl");
        let store = CheckpointStore::new(&path);
        store
            .append(&[CommentRecord::top_level(Some("c1".into()), "author", "first")])
            .unwrap();
        store
            .save_state(&ResumeState {
                resume_token: Some("p2".to_string()),
                completed: false,
            })
            .unwrap();

        let source = Arc::new(
            FakeSource::default()
                .page(None, vec![thread("c1", "first")], Some("p2"))
                .page(Some("p2"), vec![thread("c2", "second")], None),
        );
        let options = ApiOptions::default().with_checkpoint_dir(Some(dir.path().to_path_buf()));
        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c2"]);
        assert_eq!(source.calls(), vec![Some("p2".to_string())]);
        assert_eq!(store.load().len(), 2);
        assert!(store.load_state().completed);
    }

    #[tokio::test]
    async fn test_completed_checkpoint_makes_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vid.jsonl");
        let store = CheckpointStore::new(&path);
        store
            .append(&[CommentRecord::top_level(Some("c1".into()), "author", "first")])
            .unwrap();
        store
            .save_state(&ResumeState {
                resume_token: None,
                completed: true,
            })
            .unwrap();

        let source = Arc::new(FakeSource::default());
        let options = ApiOptions::default().with_checkpoint_dir(Some(dir.path().to_path_buf()));
        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1"]);
        assert!(source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let source = Arc::new(FakeSource {
            transient_failures: AtomicU32::new(2),
            ..FakeSource::default().page(None, vec![thread("c1", "a")], None)
        });
        let started = tokio::time::Instant::now();
        let records = engine(&source, ApiOptions::default())
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1"]);
        assert_eq!(source.calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_checkpointed_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vid.jsonl");
        let source = Arc::new(FakeSource {
            broken_tokens: ["p2".to_string()].into_iter().collect(),
            ..FakeSource::default().page(None, vec![thread("c1", "a"), thread("c2", "b")], Some("p2"))
        });
        let options = ApiOptions::default()
            .with_checkpoint_dir(Some(dir.path().to_path_buf()))
            .with_backoff(BackoffPolicy::default().with_max_attempts(2));

        let err = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::CollectionFailed(_)));
        let store = CheckpointStore::new(&path);
        assert_eq!(store.load().len(), 2);
        assert_eq!(store.load_state().resume_token.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let source = Arc::new(FakeSource::default());
        let err = engine(&source, ApiOptions::default())
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Rejected(_)));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let source = Arc::new(FakeSource::default());
        let engine = ApiEngine::with_source(Some("  ".to_string()), ApiOptions::default(), source.clone());
        let target = CollectionTarget::new("dQw4w9WgXcQ").unwrap();

        let err = engine.collect(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CollectError::MissingCredential));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let source = Arc::new(FakeSource::default().page(None, vec![thread("c1", "a")], None));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let records = engine(&source, ApiOptions::default())
            .fetch_comments("vid", &cancel)
            .await
            .unwrap();
        assert!(records.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_page_resumes_same_page() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = CommentThread::new(
            Comment::new("c1", "alice", "top"),
            vec![Comment::new("c1.r1", "bob", "one")],
            2,
        );
        let cancel = CancellationToken::new();
        let source = Arc::new(FakeSource {
            cancel_on_fetch: Mutex::new(Some(cancel.clone())),
            ..FakeSource::default()
                .page(None, vec![truncated], Some("p2"))
                .page(Some("p2"), vec![thread("c2", "next")], None)
                .reply_page(
                    "c1",
                    None,
                    vec![Comment::new("c1.r1", "bob", "one"), Comment::new("c1.r2", "eve", "two")],
                    None,
                )
        });
        let options = ApiOptions::default()
            .with_include_replies(true)
            .with_checkpoint_dir(Some(dir.path().to_path_buf()));

        let first = engine(&source, options.clone()).fetch_comments("vid", &cancel).await.unwrap();
        assert_eq!(ids(&first), vec!["c1", "c1.r1"]);
        let store = CheckpointStore::new(dir.path().join("vid.jsonl"));
        assert_eq!(store.load_state(), ResumeState::default());
        assert_eq!(store.load().len(), 2);

        let resumed = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&resumed), vec!["c1", "c1.r1", "c1.r2", "c2"]);
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 1);
        assert!(store.load_state().completed);
    }

    #[tokio::test]
    async fn test_replayed_thread_with_known_replies_is_not_repaged() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("vid.jsonl"));
        store
            .append(&[
                CommentRecord::top_level(Some("c1".into()), "alice", "top"),
                CommentRecord::reply(Some("c1.r1".into()), "bob", "one", "c1"),
                CommentRecord::reply(Some("c1.r2".into()), "eve", "two", "c1"),
            ])
            .unwrap();

        let truncated = CommentThread::new(
            Comment::new("c1", "alice", "top"),
            vec![Comment::new("c1.r1", "bob", "one")],
            2,
        );
        let source = Arc::new(FakeSource::default().page(None, vec![truncated, thread("c2", "next")], None));
        let options = ApiOptions::default()
            .with_include_replies(true)
            .with_checkpoint_dir(Some(dir.path().to_path_buf()));

        let records = engine(&source, options)
            .fetch_comments("vid", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["c1", "c1.r1", "c1.r2", "c2"]);
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 0);
    }

    /// One thread per video, named after the requested video id
    struct PerVideoSource;

    #[async_trait]
    impl CommentThreadSource for PerVideoSource {
        async fn fetch_threads(&self, request: &PageRequest) -> Result<CommentThreadListResponse, CollectError> {
            Ok(CommentThreadListResponse {
                items: vec![thread(&format!("{}-c1", request.id), "only")],
                next_page_token: None,
            })
        }

        async fn fetch_replies(&self, _request: &PageRequest) -> Result<CommentListResponse, CollectError> {
            Ok(CommentListResponse::default())
        }
    }

    #[tokio::test]
    async fn test_shared_checkpoint_path_is_split_per_video() {
        let dir = tempfile::tempdir().unwrap();
        let options = ApiOptions::default().with_checkpoint_path(Some(dir.path().join("ck.jsonl")));
        let engine = ApiEngine::with_source(Some("test-key".to_string()), options, Arc::new(PerVideoSource));
        let cancel = CancellationToken::new();

        let a = engine.fetch_comments("videoAAAAAA", &cancel).await.unwrap();
        let b = engine.fetch_comments("videoBBBBBB", &cancel).await.unwrap();

        assert_eq!(ids(&a), vec!["videoAAAAAA-c1"]);
        assert_eq!(ids(&b), vec!["videoBBBBBB-c1"]);
        assert!(dir.path().join("ck.videoAAAAAA.jsonl").exists());
        assert!(dir.path().join("ck.videoBBBBBB.jsonl").exists());
        assert!(!dir.path().join("ck.jsonl").exists());
    }
}
