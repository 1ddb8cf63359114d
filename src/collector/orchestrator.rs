// Orchestrator with per-target engine selection and fallback

use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::EngineOptions;
use super::diagnostics::diagnose_error;
use super::engines::{ApiEngine, DomEngine};
use super::errors::CollectError;
use super::models::{BatchSummary, CollectionTarget, CommentRecord, EngineMode, TargetOutcome};
use super::sink::{error_placeholder, BatchSink, NO_COMMENTS_PLACEHOLDER};
use super::traits::CommentEngine;

/// Engines that passed the pre-flight check for this batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePlan {
    pub api: bool,
    pub dom: bool,
}

pub struct BatchOrchestrator {
    api: Box<dyn CommentEngine>,
    dom: Box<dyn CommentEngine>,
    mode: EngineMode,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// YouTube Data API engine plus a Chrome-backed DOM engine
    pub fn new(mode: EngineMode, credential: Option<String>, options: EngineOptions) -> Self {
        Self::with_engines(
            mode,
            Box::new(ApiEngine::new(credential, options.api)),
            Box::new(DomEngine::new(options.dom)),
        )
    }

    pub fn with_engines(mode: EngineMode, api: Box<dyn CommentEngine>, dom: Box<dyn CommentEngine>) -> Self {
        Self {
            api,
            dom,
            mode,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the batch at the next target or page/scroll boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Check the engines the mode needs. Fails when the batch could not
    /// collect anything for any target.
    pub fn preflight(&self) -> Result<EnginePlan, CollectError> {
        match self.mode {
            EngineMode::Api => {
                self.api.check_available()?;
                Ok(EnginePlan { api: true, dom: false })
            }
            EngineMode::Dom => {
                self.dom.check_available()?;
                Ok(EnginePlan { api: false, dom: true })
            }
            EngineMode::Both => {
                let api = self.api.check_available();
                let dom = self.dom.check_available();
                if let Err(e) = &api {
                    warn!(engine = self.api.name(), error = %e, "engine unavailable, using DOM only");
                }
                if let Err(e) = &dom {
                    warn!(engine = self.dom.name(), error = %e, "engine unavailable, fallback disabled");
                }
                match (api, dom) {
                    (Err(a), Err(d)) => Err(CollectError::EnvironmentUnavailable(format!("{} | {}", a, d))),
                    (api, dom) => Ok(EnginePlan {
                        api: api.is_ok(),
                        dom: dom.is_ok(),
                    }),
                }
            }
        }
    }

    async fn attempt(
        &self,
        engine: &dyn CommentEngine,
        target: &CollectionTarget,
    ) -> Result<Vec<CommentRecord>, String> {
        debug!(engine = engine.name(), video = %target, "trying engine");
        match engine.collect(target, &self.cancel).await {
            Ok(records) => {
                info!(engine = engine.name(), video = %target, records = records.len(), "engine finished");
                Ok(records)
            }
            Err(e) => {
                let message = e.to_string();
                let hint = diagnose_error(&message).map(|f| f.description());
                warn!(engine = engine.name(), video = %target, error = %message, hint = ?hint, "engine failed");
                Err(format!("{} engine: {}", engine.name(), message))
            }
        }
    }

    /// Run the engines the plan allows for one target. In `both` mode the DOM
    /// engine runs when the API fails or finds nothing. Errors never escape;
    /// they end up in `TargetOutcome::Failed`.
    pub async fn collect_target(&self, target: &CollectionTarget, plan: EnginePlan) -> TargetOutcome {
        let mut errors = Vec::new();

        if plan.api && self.mode.uses_api() {
            match self.attempt(self.api.as_ref(), target).await {
                Ok(records) if !records.is_empty() => return TargetOutcome::Comments(records),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }

        if plan.dom && self.mode.uses_dom() && !self.cancel.is_cancelled() {
            match self.attempt(self.dom.as_ref(), target).await {
                Ok(records) if !records.is_empty() => return TargetOutcome::Comments(records),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            TargetOutcome::Empty
        } else {
            TargetOutcome::Failed(errors.join(" | "))
        }
    }

    /// Collect every target in order, appending rows to `output_path` as each
    /// target completes.
    pub async fn run(&self, targets: &[String], output_path: &Path) -> Result<BatchSummary, CollectError> {
        if targets.is_empty() {
            return Err(CollectError::InvalidTarget("no video references provided".to_string()));
        }
        if self.cancel.is_cancelled() {
            return Err(CollectError::Cancelled);
        }
        let plan = self.preflight()?;
        let mut batch = BatchRun::start(output_path, targets.len())?;
        info!(targets = targets.len(), mode = %self.mode, output = %output_path.display(), "batch started");

        for (index, reference) in targets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(index = index + 1, total = targets.len(), reference = %reference, "collecting");

            let outcome = match CollectionTarget::new(reference) {
                Ok(target) => self.collect_target(&target, plan).await,
                Err(e) => TargetOutcome::Failed(e.to_string()),
            };
            batch.record(reference, outcome)?;
        }

        let summary = batch.finish(self.cancel.is_cancelled());
        info!(
            records = summary.records_written,
            placeholders = summary.placeholder_rows,
            cancelled = summary.cancelled,
            "batch finished"
        );
        Ok(summary)
    }

    /// Run the batch on a background task; the summary arrives once through
    /// the handle.
    pub fn spawn(self, targets: Vec<String>, output_path: PathBuf) -> JoinHandle<Result<BatchSummary, CollectError>> {
        tokio::spawn(async move { self.run(&targets, &output_path).await })
    }
}

/// Sink plus running totals for one batch
struct BatchRun {
    sink: BatchSink,
    targets: usize,
    records_written: usize,
    placeholder_rows: usize,
}

impl BatchRun {
    fn start(output_path: &Path, targets: usize) -> Result<Self, CollectError> {
        Ok(Self {
            sink: BatchSink::create(output_path)?,
            targets,
            records_written: 0,
            placeholder_rows: 0,
        })
    }

    fn record(&mut self, video_url: &str, outcome: TargetOutcome) -> Result<(), CollectError> {
        match outcome {
            TargetOutcome::Comments(records) => {
                self.records_written += self.sink.write_comments(video_url, &records)?;
            }
            TargetOutcome::Empty => {
                warn!(video_url, "no comments found");
                self.sink.write_placeholder(video_url, NO_COMMENTS_PLACEHOLDER)?;
                self.placeholder_rows += 1;
            }
            TargetOutcome::Failed(error) => {
                warn!(video_url, error = %error, "writing error placeholder");
                self.sink.write_placeholder(video_url, &error_placeholder(&error))?;
                self.placeholder_rows += 1;
            }
        }
        Ok(())
    }

    fn finish(self, cancelled: bool) -> BatchSummary {
        BatchSummary {
            targets: self.targets,
            records_written: self.records_written,
            placeholder_rows: self.placeholder_rows,
            output_path: self.sink.path().to_path_buf(),
            cancelled,
        }
    }
}

/// Collect comments for `targets` into a two-column CSV and return the number
/// of comment rows written.
pub async fn run_batch(
    targets: &[String],
    output_path: &Path,
    mode: EngineMode,
    credential: Option<String>,
    options: EngineOptions,
) -> Result<usize, CollectError> {
    let summary = BatchOrchestrator::new(mode, credential, options)
        .run(targets, output_path)
        .await?;
    Ok(summary.records_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        available: bool,
        result: Result<usize, CollectError>,
    }

    impl Stub {
        fn boxed(name: &'static str, available: bool, result: Result<usize, CollectError>) -> Box<dyn CommentEngine> {
            Box::new(Self { name, available, result })
        }
    }

    #[async_trait]
    impl CommentEngine for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn check_available(&self) -> Result<(), CollectError> {
            if self.available {
                Ok(())
            } else {
                Err(CollectError::EnvironmentUnavailable(format!("{} missing", self.name)))
            }
        }

        async fn collect(
            &self,
            _target: &CollectionTarget,
            _cancel: &CancellationToken,
        ) -> Result<Vec<CommentRecord>, CollectError> {
            self.result.clone().map(|n| {
                (0..n)
                    .map(|i| CommentRecord::top_level(None, self.name, format!("{} {}", self.name, i)))
                    .collect()
            })
        }
    }

    fn target() -> CollectionTarget {
        CollectionTarget::new("dQw4w9WgXcQ").unwrap()
    }

    const ALL: EnginePlan = EnginePlan { api: true, dom: true };

    #[tokio::test]
    async fn test_api_success_skips_dom() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Both,
            Stub::boxed("API", true, Ok(2)),
            Stub::boxed("DOM", true, Err(CollectError::CollectionFailed("must not run".into()))),
        );
        assert_eq!(orchestrator.collect_target(&target(), ALL).await.record_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_api_falls_back() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Both,
            Stub::boxed("API", true, Ok(0)),
            Stub::boxed("DOM", true, Ok(4)),
        );
        assert_eq!(orchestrator.collect_target(&target(), ALL).await.record_count(), 4);
    }

    #[tokio::test]
    async fn test_api_error_kept_when_dom_finds_nothing() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Both,
            Stub::boxed("API", true, Err(CollectError::MissingCredential)),
            Stub::boxed("DOM", true, Ok(0)),
        );
        match orchestrator.collect_target(&target(), ALL).await {
            TargetOutcome::Failed(message) => assert!(message.starts_with("API engine:")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mode_limits_engines() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Api,
            Stub::boxed("API", true, Ok(0)),
            Stub::boxed("DOM", true, Ok(3)),
        );
        assert_eq!(orchestrator.collect_target(&target(), ALL).await, TargetOutcome::Empty);
    }

    #[test]
    fn test_preflight_in_both_mode_disables_fallback() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Both,
            Stub::boxed("API", true, Ok(1)),
            Stub::boxed("DOM", false, Ok(1)),
        );
        assert_eq!(orchestrator.preflight().unwrap(), EnginePlan { api: true, dom: false });
    }

    #[test]
    fn test_preflight_fails_without_any_engine() {
        let orchestrator = BatchOrchestrator::with_engines(
            EngineMode::Both,
            Stub::boxed("API", false, Ok(1)),
            Stub::boxed("DOM", false, Ok(1)),
        );
        assert!(orchestrator.preflight().unwrap_err().is_environmental());

        let dom_only = BatchOrchestrator::with_engines(
            EngineMode::Dom,
            Stub::boxed("API", true, Ok(1)),
            Stub::boxed("DOM", false, Ok(1)),
        );
        assert!(matches!(
            dom_only.preflight(),
            Err(CollectError::EnvironmentUnavailable(_))
        ));
    }
}
