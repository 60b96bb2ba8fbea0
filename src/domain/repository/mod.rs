pub mod subscription_lifecycle;
pub mod usage_counter_repository;

pub use subscription_lifecycle::SubscriptionLifecycle;
pub use usage_counter_repository::{InsertOutcome, UsageCounterRepository};
