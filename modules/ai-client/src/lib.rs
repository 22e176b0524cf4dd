pub mod capability;
pub mod claude;
pub mod schema;

pub use capability::{
    extract_as, run_deep_research, Capability, ModelTier, ResearchJob, ResearchStatus,
};
pub use claude::Claude;
pub use schema::StructuredOutput;
