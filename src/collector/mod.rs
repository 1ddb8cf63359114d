// Comment collector - engines, primitives and batch orchestration

pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod diagnostics;
pub mod engines;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod sink;
pub mod stagnation;
pub mod traits;
pub mod utils;

pub use backoff::BackoffExecutor;
pub use checkpoint::{CheckpointStore, ResumeState};
pub use config::{credential_from_env, default_output_path, ApiOptions, BackoffPolicy, DomOptions, EngineOptions};
pub use dedup::{DedupSet, Fingerprint};
pub use engines::{ApiEngine, DomEngine};
pub use errors::CollectError;
pub use models::{BatchSummary, CollectionTarget, CommentRecord, EngineMode, TargetOutcome};
pub use orchestrator::{run_batch, BatchOrchestrator, EnginePlan};
pub use sink::BatchSink;
pub use stagnation::StagnationDetector;
pub use traits::{BrowserLauncher, CommentEngine, CommentThreadSource, PageSession};
