use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::usage_counter::remaining_for;
use crate::domain::entity::{normalize_key, DefaultAction, DenyReason, QuotaDecision};
use crate::domain::repository::{SubscriptionLifecycle, UsageCounterRepository};
use crate::domain::service::{resolve_rule, ConsumeOutcome, UsageLedger};
use crate::usecase::resolve_subscription::{ActiveSubscriptionResolver, ResolveSubscriptionError};
use crate::usecase::{counter_target, EngineOptions};

#[derive(Debug, Clone)]
pub struct CheckAndConsumeInput {
    pub subject_id: String,
    pub module_key: String,
    pub function_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckAndConsumeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no subscription available for subject: {0}")]
    SubscriptionUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ResolveSubscriptionError> for CheckAndConsumeError {
    fn from(e: ResolveSubscriptionError) -> Self {
        match e {
            ResolveSubscriptionError::Unavailable(subject) => Self::SubscriptionUnavailable(subject),
            ResolveSubscriptionError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// CheckAndConsumeUseCase はクォータ対象の操作を実行してよいか判定し、許可時に 1 消費する。
pub struct CheckAndConsumeUseCase {
    resolver: ActiveSubscriptionResolver,
    ledger: UsageLedger,
    options: EngineOptions,
}

impl CheckAndConsumeUseCase {
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

    pub async fn execute(
        &self,
        input: &CheckAndConsumeInput,
    ) -> Result<QuotaDecision, CheckAndConsumeError> {
        self.execute_at(input, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        input: &CheckAndConsumeInput,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, CheckAndConsumeError> {
        if normalize_key(&input.module_key).is_empty() {
            return Err(CheckAndConsumeError::Validation(
                "module_key is required".to_string(),
            ));
        }
        if self.options.is_root(&input.subject_id) {
            return Ok(QuotaDecision::unmetered());
        }

        let subscription = self.resolver.resolve(&input.subject_id, now).await?;
        let snapshot = &subscription.limitation_snapshot;

        let Some(resolved) =
            resolve_rule(snapshot, &input.module_key, input.function_key.as_deref())
        else {
            return Ok(match snapshot.default_action {
                DefaultAction::Allow => QuotaDecision::unmetered(),
                DefaultAction::Block => {
                    tracing::info!(
                        subject_id = %input.subject_id,
                        module_key = %input.module_key,
                        function_key = ?input.function_key,
                        "no limitation rule, blocked by default action"
                    );
                    QuotaDecision::denied(DenyReason::NoRule)
                }
            });
        };

        if resolved.rule.is_unlimited() {
            return Ok(QuotaDecision::unmetered());
        }

        let (window, key) =
            counter_target(&subscription, &input.subject_id, &input.module_key, &resolved, now);
        let outcome = self
            .ledger
            .consume(&key, resolved.rule.window_spec(), resolved.rule.quota)
            .await
            .map_err(|e| CheckAndConsumeError::Internal(e.to_string()))?;

        let decision = match outcome {
            ConsumeOutcome::Consumed(counter) => {
                QuotaDecision::allowed(remaining_for(resolved.rule.quota, counter.used), window.end)
            }
            ConsumeOutcome::QuotaZero => QuotaDecision::denied(DenyReason::QuotaZero),
            ConsumeOutcome::QuotaExceeded => QuotaDecision::denied(DenyReason::QuotaExceeded),
        };

        if let Some(reason) = decision.reason {
            tracing::info!(
                subject_id = %input.subject_id,
                subscription_id = %subscription.id,
                module_key = %key.module_key,
                function_key = ?key.function_key,
                reason = %reason,
                "quota consumption denied"
            );
        }
        Ok(decision)
    }
}
