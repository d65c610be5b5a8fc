use serde::{Deserialize, Serialize};

use crate::transition::NextTransition;

/// What happened to one incoming notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EnforcementDecision {
    /// The governing rule blocks right now; `next` is when it stops blocking.
    Suppress { next: NextTransition },
    Allow,
    /// The package has no rule attached.
    Unmanaged,
}

impl EnforcementDecision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, EnforcementDecision::Suppress { .. })
    }
}

/// Outcome counts of one reconciliation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub rearmed: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.rearmed + self.dropped + self.failed
    }
}
