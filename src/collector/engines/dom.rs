// DOM collection engine - scroll crawler over a rendered watch page

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chrome::ChromeLauncher;
use super::extract;
use crate::collector::config::DomOptions;
use crate::collector::dedup::{DedupSet, Fingerprint};
use crate::collector::errors::CollectError;
use crate::collector::models::{CollectionTarget, CommentRecord};
use crate::collector::stagnation::StagnationDetector;
use crate::collector::traits::{BrowserLauncher, CommentEngine, PageSession};

/// Scroll offset that brings the comments section into view
const PRIME_SCROLL_Y: u64 = 600;
const PRIME_PAGE_DOWNS: usize = 6;
const PRIME_STEP_PAUSE: Duration = Duration::from_millis(300);

pub struct DomEngine {
    launcher: Box<dyn BrowserLauncher>,
    options: DomOptions,
}

impl DomEngine {
    /// Engine backed by a locally installed Chrome
    pub fn new(options: DomOptions) -> Self {
        Self::with_launcher(Box::new(ChromeLauncher::new()), options)
    }

    pub fn with_launcher(launcher: Box<dyn BrowserLauncher>, options: DomOptions) -> Self {
        Self { launcher, options }
    }

    pub fn options(&self) -> &DomOptions {
        &self.options
    }

    /// Open `url`, scroll until nothing new loads or the cap is hit, and return
    /// what was rendered. The browser session is closed on every path.
    pub async fn fetch_comments(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        let mut session = self.launcher.launch(&self.options).await?;
        let result = self.crawl(session.as_mut(), url, cancel).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close browser session");
        }
        result
    }

    async fn crawl(
        &self,
        session: &mut dyn PageSession,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        let max = self.options.max_comments;

        session.navigate(url).await?;
        tokio::time::sleep(self.options.page_load_wait).await;
        prime(session).await?;

        let mut records: Vec<CommentRecord> = Vec::new();
        let mut dedup = DedupSet::new();
        let baseline = session.content_height().await?;
        let mut detector = StagnationDetector::with_baseline(baseline, self.options.stagnation_threshold);
        let mut rounds = 0u32;

        while records.len() < max {
            if cancel.is_cancelled() {
                info!(url, records = records.len(), "DOM collection cancelled");
                break;
            }
            rounds += 1;

            let fragments = match session.thread_fragments().await {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(url, error = %e, "reading comment threads failed, keeping what was collected");
                    break;
                }
            };

            for (index, fragment) in fragments.iter().enumerate() {
                if records.len() >= max {
                    break;
                }
                let comment = match extract::parse_thread(fragment) {
                    Ok(comment) => comment,
                    Err(e) => {
                        debug!(index, error = %e, "thread skipped");
                        continue;
                    }
                };
                if !dedup.add(Fingerprint::new(&comment.author, &comment.text)) {
                    continue;
                }

                let parent_text = comment.text.clone();
                records.push(comment.into_top_level());

                if self.options.expand_replies && records.len() < max {
                    let expanded = match session.expand_thread(index).await {
                        Ok(Some(html)) => html,
                        Ok(None) => fragment.clone(),
                        Err(e) => {
                            debug!(index, error = %e, "reply expansion failed");
                            fragment.clone()
                        }
                    };
                    for reply in extract::parse_replies(&expanded) {
                        if records.len() >= max {
                            break;
                        }
                        if dedup.add(Fingerprint::new(&reply.author, &reply.text)) {
                            records.push(reply.into_reply(&parent_text));
                        }
                    }
                }
            }

            if records.len() >= max {
                info!(url, max, "reached max_comments");
                break;
            }

            if let Err(e) = session.scroll_to_bottom().await {
                warn!(url, error = %e, "scroll failed, keeping what was collected");
                break;
            }
            tokio::time::sleep(self.options.scroll_pause).await;

            let height = match session.content_height().await {
                Ok(height) => height,
                Err(e) => {
                    warn!(url, error = %e, "height check failed, keeping what was collected");
                    break;
                }
            };
            let observation = detector.observe(height);
            debug!(url, rounds, height, stagnant = observation.stagnant_count, "scroll step");
            if detector.is_stagnant() {
                debug!(url, rounds, "no new content after {} scrolls", detector.threshold());
                break;
            }
        }

        info!(url, records = records.len(), rounds, "DOM collection finished");
        Ok(records)
    }
}

/// Bring the lazily loaded comments section into view
async fn prime(session: &mut dyn PageSession) -> Result<(), CollectError> {
    session.scroll_to(PRIME_SCROLL_Y).await?;
    for _ in 0..PRIME_PAGE_DOWNS {
        session.page_down().await?;
        tokio::time::sleep(PRIME_STEP_PAUSE).await;
    }
    Ok(())
}

#[async_trait]
impl CommentEngine for DomEngine {
    fn name(&self) -> &'static str {
        "DOM"
    }

    fn check_available(&self) -> Result<(), CollectError> {
        self.launcher.check_available(&self.options)
    }

    async fn collect(
        &self,
        target: &CollectionTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, CollectError> {
        self.fetch_comments(&target.page_url(), cancel).await
    }
}
