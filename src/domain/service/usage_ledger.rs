use std::sync::Arc;

use crate::domain::entity::{UsageCounter, UsageCounterKey, WindowSpec};
use crate::domain::repository::{InsertOutcome, UsageCounterRepository};

/// ConsumeOutcome はカウンタ消費の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Consumed(UsageCounter),
    QuotaZero,
    QuotaExceeded,
}

/// ReleaseOutcome はカウンタ返却の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released(UsageCounter),
    NotFound,
}

/// UsageLedger は使用量ストアのプリミティブを組み合わせて消費・返却を行う。
///
/// `used` の読み取り→書き込みは行わず、全ての更新はストアのアトミック操作を経由する。
/// ロックは使わない。新しいウィンドウの初回作成が競合した場合のみ、敗者は quota_exceeded になる。
pub struct UsageLedger {
    repo: Arc<dyn UsageCounterRepository>,
}

impl UsageLedger {
    pub fn new(repo: Arc<dyn UsageCounterRepository>) -> Self {
        Self { repo }
    }

    pub async fn consume(
        &self,
        key: &UsageCounterKey,
        spec: WindowSpec,
        quota: u64,
    ) -> anyhow::Result<ConsumeOutcome> {
        if quota == 0 {
            return Ok(ConsumeOutcome::QuotaZero);
        }
        let quota = i64::try_from(quota).unwrap_or(i64::MAX);

        if let Some(counter) = self.repo.increment_if_below(key, quota).await? {
            return Ok(ConsumeOutcome::Consumed(counter));
        }

        if self.repo.find(key).await?.is_some() {
            return Ok(ConsumeOutcome::QuotaExceeded);
        }

        let first = UsageCounter::first_use(key, spec, quota);
        match self.repo.insert_first(&first).await? {
            InsertOutcome::Created(counter) => Ok(ConsumeOutcome::Consumed(counter)),
            InsertOutcome::Conflict => {
                tracing::warn!(
                    subject_id = %key.subject_id,
                    module_key = %key.module_key,
                    function_key = ?key.function_key,
                    window_start = %key.window_start,
                    "usage counter created concurrently, denying this request"
                );
                Ok(ConsumeOutcome::QuotaExceeded)
            }
        }
    }

    pub async fn release(&self, key: &UsageCounterKey) -> anyhow::Result<ReleaseOutcome> {
        let Some(counter) = self.repo.decrement(key).await? else {
            return Ok(ReleaseOutcome::NotFound);
        };
        if counter.used >= 0 {
            return Ok(ReleaseOutcome::Released(counter));
        }

        Ok(match self.repo.clamp_to_zero(key).await? {
            Some(counter) => ReleaseOutcome::Released(counter),
            None => ReleaseOutcome::NotFound,
        })
    }

    /// カウンタを消費せずに参照する。
    pub async fn peek(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.repo.find(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{WindowType, WindowUnit};
    use crate::domain::repository::usage_counter_repository::MockUsageCounterRepository;
    use chrono::{TimeZone, Utc};

    fn key() -> UsageCounterKey {
        UsageCounterKey {
            subscription_id: "sub-1".to_string(),
            subject_id: "tenant-1".to_string(),
            module_key: "booking".to_string(),
            function_key: None,
            window_start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    fn spec() -> WindowSpec {
        WindowSpec {
            window_type: WindowType::Calendar,
            unit: WindowUnit::Month,
            size: 1,
        }
    }

    fn counter(used: i64, quota: i64) -> UsageCounter {
        let mut c = UsageCounter::first_use(&key(), spec(), quota);
        c.used = used;
        c
    }

    #[tokio::test]
    async fn test_quota_zero_never_touches_store() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below().never();
        repo.expect_find().never();
        repo.expect_insert_first().never();

        let ledger = UsageLedger::new(Arc::new(repo));
        let outcome = ledger.consume(&key(), spec(), 0).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::QuotaZero);
    }

    #[tokio::test]
    async fn test_conditional_increment_succeeds() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below()
            .withf(|_, quota| *quota == 2)
            .times(1)
            .returning(|_, _| Ok(Some(counter(2, 2))));
        repo.expect_find().never();

        let ledger = UsageLedger::new(Arc::new(repo));
        match ledger.consume(&key(), spec(), 2).await.unwrap() {
            ConsumeOutcome::Consumed(c) => assert_eq!(c.remaining(), 0),
            other => unreachable!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_existing_counter_at_quota_is_exceeded() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below().returning(|_, _| Ok(None));
        repo.expect_find().returning(|_| Ok(Some(counter(2, 2))));
        repo.expect_insert_first().never();

        let ledger = UsageLedger::new(Arc::new(repo));
        let outcome = ledger.consume(&key(), spec(), 2).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_first_use_creates_counter() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below().returning(|_, _| Ok(None));
        repo.expect_find().returning(|_| Ok(None));
        repo.expect_insert_first()
            .withf(|c| c.used == 1 && c.quota == 3 && c.function_key.is_none())
            .returning(|c| Ok(InsertOutcome::Created(c.clone())));

        let ledger = UsageLedger::new(Arc::new(repo));
        match ledger.consume(&key(), spec(), 3).await.unwrap() {
            ConsumeOutcome::Consumed(c) => assert_eq!(c.remaining(), 2),
            other => unreachable!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_conflict_is_reported_as_exceeded() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below().times(1).returning(|_, _| Ok(None));
        repo.expect_find().times(1).returning(|_| Ok(None));
        repo.expect_insert_first()
            .times(1)
            .returning(|_| Ok(InsertOutcome::Conflict));

        let ledger = UsageLedger::new(Arc::new(repo));
        let outcome = ledger.consume(&key(), spec(), 10).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_store_error_is_propagated() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_increment_if_below()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

        let ledger = UsageLedger::new(Arc::new(repo));
        let err = ledger.consume(&key(), spec(), 10).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_release_missing_counter() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().returning(|_| Ok(None));
        repo.expect_clamp_to_zero().never();

        let ledger = UsageLedger::new(Arc::new(repo));
        assert_eq!(ledger.release(&key()).await.unwrap(), ReleaseOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_release_without_clamp() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().returning(|_| Ok(Some(counter(1, 2))));
        repo.expect_clamp_to_zero().never();

        let ledger = UsageLedger::new(Arc::new(repo));
        match ledger.release(&key()).await.unwrap() {
            ReleaseOutcome::Released(c) => assert_eq!(c.used, 1),
            other => unreachable!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_below_zero_is_clamped() {
        let mut repo = MockUsageCounterRepository::new();
        repo.expect_decrement().returning(|_| Ok(Some(counter(-1, 2))));
        repo.expect_clamp_to_zero()
            .times(1)
            .returning(|_| Ok(Some(counter(0, 2))));

        let ledger = UsageLedger::new(Arc::new(repo));
        match ledger.release(&key()).await.unwrap() {
            ReleaseOutcome::Released(c) => {
                assert_eq!(c.used, 0);
                assert_eq!(c.remaining(), 2);
            }
            other => unreachable!("unexpected outcome: {:?}", other),
        }
    }
}
