pub mod decision;
pub mod limitation;
pub mod usage_counter;
pub mod window;

pub use decision::{Capabilities, CapabilityItem, DenyReason, QuotaDecision, ReleaseResult};
pub use limitation::{
    ActiveSubscription, DefaultAction, LimitationSnapshot, ModuleLimitation, Rule, RuleType,
    SubscriptionStatus,
};
pub use usage_counter::{normalize_function_key, normalize_key, UsageCounter, UsageCounterKey};
pub use window::{TimeWindow, WindowSpec, WindowType, WindowUnit};
