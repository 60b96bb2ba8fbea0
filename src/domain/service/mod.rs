pub mod rule_resolver;
pub mod usage_ledger;
pub mod window_calculator;

pub use rule_resolver::{resolve_rule, ResolvedRule, RuleLevel};
pub use usage_ledger::{ConsumeOutcome, ReleaseOutcome, UsageLedger};
pub use window_calculator::{compute_window, lifetime_window};
