use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::usage_counter::remaining_for;
use crate::domain::entity::{
    normalize_key, ActiveSubscription, Capabilities, CapabilityItem, Rule,
};
use crate::domain::repository::{SubscriptionLifecycle, UsageCounterRepository};
use crate::domain::service::{ResolvedRule, RuleLevel, UsageLedger};
use crate::usecase::resolve_subscription::{ActiveSubscriptionResolver, ResolveSubscriptionError};
use crate::usecase::{counter_target, EngineOptions};

#[derive(Debug, thiserror::Error)]
pub enum BuildCapabilitiesError {
    #[error("no subscription available for subject: {0}")]
    SubscriptionUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ResolveSubscriptionError> for BuildCapabilitiesError {
    fn from(e: ResolveSubscriptionError) -> Self {
        match e {
            ResolveSubscriptionError::Unavailable(subject) => Self::SubscriptionUnavailable(subject),
            ResolveSubscriptionError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// BuildCapabilitiesUseCase は購読中の全ルールについて現在ウィンドウの残量を集計する。
/// カウンタの参照のみで、使用量は変更しない。
pub struct BuildCapabilitiesUseCase {
    resolver: ActiveSubscriptionResolver,
    ledger: UsageLedger,
    options: EngineOptions,
}

impl BuildCapabilitiesUseCase {
    pub fn new(
        lifecycle: Arc<dyn SubscriptionLifecycle>,
        usage_repo: Arc<dyn UsageCounterRepository>,
        options: EngineOptions,
    ) -> Self {
        Self {
            resolver: ActiveSubscriptionResolver::new(lifecycle),
            ledger: UsageLedger::new(usage_repo),
            options,
        }
    }

    pub async fn execute(&self, subject_id: &str) -> Result<Capabilities, BuildCapabilitiesError> {
        self.execute_at(subject_id, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Capabilities, BuildCapabilitiesError> {
        if self.options.is_root(subject_id) {
            return Ok(Capabilities::unrestricted());
        }

        let subscription = self.resolver.resolve(subject_id, now).await?;
        let snapshot = &subscription.limitation_snapshot;

        let mut items = Vec::new();
        for module in &snapshot.modules {
            let rules = module
                .module_rule
                .iter()
                .map(|rule| ResolvedRule {
                    rule,
                    level: RuleLevel::Module,
                })
                .chain(module.function_rules.iter().map(|rule| ResolvedRule {
                    rule,
                    level: RuleLevel::Function,
                }));
            for resolved in rules {
                let item = self
                    .capability_item(&subscription, subject_id, &module.module_key, &resolved, now)
                    .await?;
                items.push(item);
            }
        }

        Ok(Capabilities {
            default_action: snapshot.default_action,
            items,
        })
    }

    async fn capability_item(
        &self,
        subscription: &ActiveSubscription,
        subject_id: &str,
        module_key: &str,
        resolved: &ResolvedRule<'_>,
        now: DateTime<Utc>,
    ) -> Result<CapabilityItem, BuildCapabilitiesError> {
        let rule = resolved.rule;
        if rule.is_unlimited() {
            return Ok(unlimited_item(module_key, resolved));
        }

        let (window, key) = counter_target(subscription, subject_id, module_key, resolved, now);
        let used = self
            .ledger
            .peek(&key)
            .await
            .map_err(|e| BuildCapabilitiesError::Internal(e.to_string()))?
            .map(|counter| counter.used.max(0) as u64)
            .unwrap_or(0);

        Ok(CapabilityItem {
            module_key: key.module_key,
            function_key: key.function_key,
            rule_type: rule.rule_type,
            quota: Some(rule.quota),
            used: Some(used),
            remaining: Some(remaining_for(rule.quota, used as i64)),
            window_type: rule.window_type,
            window_unit: rule.window_unit,
            window_size: rule.window_spec().size,
            window_start: Some(window.start),
            reset_at: Some(window.end),
            burst: rule.burst,
            concurrency: rule.concurrency,
        })
    }
}

fn unlimited_item(module_key: &str, resolved: &ResolvedRule<'_>) -> CapabilityItem {
    let rule: &Rule = resolved.rule;
    CapabilityItem {
        module_key: normalize_key(module_key),
        function_key: resolved.counter_function_key(),
        rule_type: rule.rule_type,
        quota: None,
        used: None,
        remaining: None,
        window_type: rule.window_type,
        window_unit: rule.window_unit,
        window_size: rule.window_spec().size,
        window_start: None,
        reset_at: None,
        burst: rule.burst,
        concurrency: rule.concurrency,
    }
}
