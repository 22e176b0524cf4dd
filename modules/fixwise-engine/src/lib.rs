//! Orchestration engine: the article pipeline and everything that drives it
//! in bulk (batch scheduler, nightly builder, content auditor, topic
//! discovery, ask). All orchestration is sequential awaited steps; pacing
//! delays and cooperative stop checks keep it polite to the provider and
//! interruptible by the operator.

pub mod ask;
pub mod audit;
pub mod dedup;
pub mod discovery;
pub mod nightly;
pub mod pacing;
pub mod pipeline;
pub mod scheduler;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use ask::{AskEngine, AskResponse};
pub use audit::{ContentAuditor, FixAllOutcome, FixOutcome};
pub use discovery::{TopicDiscovery, TopicSuggestion};
pub use nightly::NightlyBuilder;
pub use pacing::Pacing;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use scheduler::{BatchOutcome, BatchScheduler};
