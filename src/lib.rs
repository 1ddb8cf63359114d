// YouTube comment collection engine

pub mod collector;
pub mod telemetry;

pub use collector::{
    credential_from_env, run_batch, BatchOrchestrator, BatchSummary, CollectError, CommentRecord, EngineMode,
    EngineOptions,
};
pub use telemetry::init_tracing;
