pub mod build_capabilities;
pub mod check_and_consume;
pub mod release_quota;
pub mod resolve_subscription;

pub use build_capabilities::BuildCapabilitiesUseCase;
pub use check_and_consume::CheckAndConsumeUseCase;
pub use release_quota::ReleaseQuotaUseCase;
pub use resolve_subscription::ActiveSubscriptionResolver;

use chrono::{DateTime, Utc};

use crate::domain::entity::{normalize_key, ActiveSubscription, TimeWindow, UsageCounterKey};
use crate::domain::service::{compute_window, ResolvedRule};

/// EngineOptions はクォータエンジン構築時に注入する設定値。
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// 全ての制限を免除されるサブジェクト ID。
    pub root_subject_id: Option<String>,
}

impl EngineOptions {
    pub fn is_root(&self, subject_id: &str) -> bool {
        self.root_subject_id
            .as_deref()
            .is_some_and(|root| root == subject_id)
    }
}

/// ルールに対応する現在ウィンドウとカウンタキーを求める。
pub(crate) fn counter_target(
    subscription: &ActiveSubscription,
    subject_id: &str,
    module_key: &str,
    resolved: &ResolvedRule<'_>,
    now: DateTime<Utc>,
) -> (TimeWindow, UsageCounterKey) {
    let spec = resolved.rule.window_spec();
    let window = compute_window(now, spec.unit, spec.size);
    let key = UsageCounterKey {
        subscription_id: subscription.id.clone(),
        subject_id: subject_id.to_string(),
        module_key: normalize_key(module_key),
        function_key: resolved.counter_function_key(),
        window_start: window.start,
        window_end: window.end,
    };
    (window, key)
}
