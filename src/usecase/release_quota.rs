use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entity::usage_counter::remaining_for;
use crate::domain::entity::{normalize_key, ReleaseResult};
use crate::domain::repository::{SubscriptionLifecycle, UsageCounterRepository};
use crate::domain::service::{resolve_rule, ReleaseOutcome, UsageLedger};
use crate::usecase::resolve_subscription::{ActiveSubscriptionResolver, ResolveSubscriptionError};
use crate::usecase::{counter_target, EngineOptions};

#[derive(Debug, Clone)]
pub struct ReleaseQuotaInput {
    pub subject_id: String,
    pub module_key: String,
    pub function_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseQuotaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no subscription available for subject: {0}")]
    SubscriptionUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ResolveSubscriptionError> for ReleaseQuotaError {
    fn from(e: ResolveSubscriptionError) -> Self {
        match e {
            ResolveSubscriptionError::Unavailable(subject) => Self::SubscriptionUnavailable(subject),
            ResolveSubscriptionError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// ReleaseQuotaUseCase は消費済みのクォータを 1 返却する（補償処理用）。
/// 現在のウィンドウのカウンタのみが対象で、used は 0 未満にならない。
pub struct ReleaseQuotaUseCase {
    resolver: ActiveSubscriptionResolver,
    ledger: UsageLedger,
    options: EngineOptions,
}

impl ReleaseQuotaUseCase {
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

    pub async fn execute(&self, input: &ReleaseQuotaInput) -> Result<ReleaseResult, ReleaseQuotaError> {
        self.execute_at(input, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        input: &ReleaseQuotaInput,
        now: DateTime<Utc>,
    ) -> Result<ReleaseResult, ReleaseQuotaError> {
        if normalize_key(&input.module_key).is_empty() {
            return Err(ReleaseQuotaError::Validation(
                "module_key is required".to_string(),
            ));
        }
        if self.options.is_root(&input.subject_id) {
            return Ok(ReleaseResult::nothing_to_release());
        }

        let subscription = self.resolver.resolve(&input.subject_id, now).await?;
        let Some(resolved) = resolve_rule(
            &subscription.limitation_snapshot,
            &input.module_key,
            input.function_key.as_deref(),
        ) else {
            return Ok(ReleaseResult::nothing_to_release());
        };
        if resolved.rule.is_unlimited() {
            return Ok(ReleaseResult::nothing_to_release());
        }

        let (window, key) =
            counter_target(&subscription, &input.subject_id, &input.module_key, &resolved, now);
        let outcome = self
            .ledger
            .release(&key)
            .await
            .map_err(|e| ReleaseQuotaError::Internal(e.to_string()))?;

        Ok(match outcome {
            ReleaseOutcome::Released(counter) => {
                ReleaseResult::released(remaining_for(resolved.rule.quota, counter.used), window.end)
            }
            ReleaseOutcome::NotFound => {
                tracing::debug!(
                    subject_id = %input.subject_id,
                    module_key = %key.module_key,
                    function_key = ?key.function_key,
                    "no usage counter in current window, nothing to release"
                );
                ReleaseResult::nothing_to_release()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{
        ActiveSubscription, DefaultAction, LimitationSnapshot, ModuleLimitation, Rule,
        SubscriptionStatus, UsageCounter, WindowUnit,
    };
    use crate::domain::repository::subscription_lifecycle::MockSubscriptionLifecycle;
    use crate::domain::repository::usage_counter_repository::MockUsageCounterRepository;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn lifecycle() -> MockSubscriptionLifecycle {
        let mut lifecycle = MockSubscriptionLifecycle::new();
        lifecycle.expect_get_active_subscription().returning(|_| {
            Ok(Some(ActiveSubscription {
                id: "sub-1".to_string(),
                subject_id: "tenant-1".to_string(),
                limitation_snapshot: LimitationSnapshot {
                    default_action: DefaultAction::Allow,
                    modules: vec![ModuleLimitation {
                        module_key: "booking".to_string(),
                        module_rule: Some(Rule::count("booking", 3, WindowUnit::Day, 1)),
                        function_rules: vec![Rule::unlimited("export")],
                    }],
                },
                start_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                status: SubscriptionStatus::Active,
            }))
        });
        lifecycle
    }

    fn input(module_key: &str, function_key: Option<&str>) -> ReleaseQuotaInput {
        ReleaseQuotaInput {
            subject_id: "tenant-1".to_string(),
            module_key: module_key.to_string(),
            function_key: function_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_release_existing_counter() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement()
            .withf(|key| {
                key.module_key == "booking"
                    && key.window_start == Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
            })
            .returning(|key| {
                let spec = Rule::count("booking", 3, WindowUnit::Day, 1).window_spec();
                let mut c = UsageCounter::first_use(key, spec, 3);
                c.used = 1;
                Ok(Some(c))
            });

        let uc = ReleaseQuotaUseCase::new(
            Arc::new(lifecycle()),
            Arc::new(repo),
            EngineOptions::default(),
        );
        let result = uc.execute_at(&input("booking", Some("create")), now()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, Some(2));
        assert_eq!(
            result.reset_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_release_without_counter_succeeds() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().returning(|_| Ok(None));

        let uc = ReleaseQuotaUseCase::new(
            Arc::new(lifecycle()),
            Arc::new(repo),
            EngineOptions::default(),
        );
        let result = uc.execute_at(&input("booking", None), now()).await.unwrap();
        assert_eq!(result, ReleaseResult::nothing_to_release());
    }

    #[tokio::test]
    async fn test_release_unlimited_and_unknown_do_not_touch_store() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().never();

        let uc = ReleaseQuotaUseCase::new(
            Arc::new(lifecycle()),
            Arc::new(repo),
            EngineOptions::default(),
        );
        let unlimited = uc.execute_at(&input("booking", Some("export")), now()).await.unwrap();
        assert_eq!(unlimited, ReleaseResult::nothing_to_release());
        let unknown = uc.execute_at(&input("payments", None), now()).await.unwrap();
        assert_eq!(unknown, ReleaseResult::nothing_to_release());
    }

    #[tokio::test]
    async fn test_root_subject_release_is_noop() {
        let mut lifecycle = MockSubscriptionLifecycle::new();
        lifecycle.expect_get_active_subscription().never();
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().never();

        let uc = ReleaseQuotaUseCase::new(
            Arc::new(lifecycle),
            Arc::new(repo),
            EngineOptions {
                root_subject_id: Some("tenant-1".to_string()),
            },
        );
        let result = uc.execute_at(&input("booking", None), now()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_empty_module_key_is_validation_error() {
        let uc = ReleaseQuotaUseCase::new(
            Arc::new(MockSubscriptionLifecycle::new()),
            Arc::new(MockUsageCounterRepository::new()),
            EngineOptions::default(),
        );
        let err = uc.execute_at(&input("", None), now()).await.unwrap_err();
        assert!(matches!(err, ReleaseQuotaError::Validation(_)));
    }
}
