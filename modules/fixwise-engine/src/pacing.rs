use std::time::Duration;

/// Delays between units of work. Production values keep the provider call
/// rate low; tests zero everything.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Between pipeline stages.
    pub stage_delay: Duration,
    /// Between queue items / ad-hoc topics.
    pub item_delay: Duration,
    /// Between categories in the nightly builder.
    pub category_delay: Duration,
    /// Between audit batches.
    pub audit_batch_delay: Duration,
    /// Research job poll interval.
    pub research_poll: Duration,
    /// Hard cap on one research job.
    pub research_cap: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            stage_delay: Duration::from_secs(3),
            item_delay: Duration::from_secs(5),
            category_delay: Duration::from_secs(5),
            audit_batch_delay: Duration::from_secs(2),
            research_poll: Duration::from_secs(10),
            research_cap: Duration::from_secs(600),
        }
    }
}

impl Pacing {
    /// All delays zeroed.
    pub fn instant() -> Self {
        Self {
            stage_delay: Duration::ZERO,
            item_delay: Duration::ZERO,
            category_delay: Duration::ZERO,
            audit_batch_delay: Duration::ZERO,
            research_poll: Duration::ZERO,
            research_cap: Duration::from_secs(1),
        }
    }
}
