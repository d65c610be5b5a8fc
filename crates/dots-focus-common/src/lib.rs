pub mod config;
pub mod decision;
pub mod error;
pub mod time_window;
pub mod transition;
pub mod types;
pub mod validation;

pub use decision::{EnforcementDecision, ReconcileSummary};
pub use error::{Error, Result};
pub use time_window::{BlockDecisionEngine, BlockVerdict};
pub use transition::{NextTransition, TransitionCalculator};
pub use types::*;
pub use validation::{NameError, RangeError, RangeValidator, RuleError, RuleValidator};
