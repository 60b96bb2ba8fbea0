use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::entity::{UsageCounter, UsageCounterKey};
use crate::domain::repository::{InsertOutcome, UsageCounterRepository};

/// InMemoryUsageCounterRepository は DB / Redis が無い環境向けのカウンタストア。
///
/// 各操作は書き込みロックを 1 回取得する間に完結するため、
/// Postgres / Redis 実装と同じ原子性を持つ。
pub struct InMemoryUsageCounterRepository {
    counters: RwLock<HashMap<UsageCounterKey, UsageCounter>>,
}

impl InMemoryUsageCounterRepository {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// 保持しているカウンタ件数。
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }
}

impl Default for InMemoryUsageCounterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageCounterRepository for InMemoryUsageCounterRepository {
    async fn increment_if_below(
        &self,
        key: &UsageCounterKey,
        quota: i64,
    ) -> anyhow::Result<Option<UsageCounter>> {
        let mut counters = self.counters.write().await;
        Ok(counters.get_mut(key).and_then(|counter| {
            if counter.used < quota {
                counter.used += 1;
                counter.quota = quota;
                Some(counter.clone())
            } else {
                None
            }
        }))
    }

    async fn find(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        let counters = self.counters.read().await;
        Ok(counters.get(key).cloned())
    }

    async fn insert_first(&self, counter: &UsageCounter) -> anyhow::Result<InsertOutcome> {
        let mut counters = self.counters.write().await;
        let key = counter.key();
        if counters.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }
        counters.insert(key, counter.clone());
        Ok(InsertOutcome::Created(counter.clone()))
    }

    async fn decrement(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        let mut counters = self.counters.write().await;
        Ok(counters.get_mut(key).map(|counter| {
            counter.used -= 1;
            counter.clone()
        }))
    }

    async fn clamp_to_zero(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        let mut counters = self.counters.write().await;
        Ok(counters.get_mut(key).map(|counter| {
            if counter.used < 0 {
                counter.used = 0;
            }
            counter.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{WindowSpec, WindowType, WindowUnit};
    use chrono::{TimeZone, Utc};

    fn key(function_key: Option<&str>) -> UsageCounterKey {
        UsageCounterKey {
            subscription_id: "sub-1".to_string(),
            subject_id: "tenant-1".to_string(),
            module_key: "booking".to_string(),
            function_key: function_key.map(str::to_string),
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

    #[tokio::test]
    async fn test_increment_requires_existing_counter() {
        let repo = InMemoryUsageCounterRepository::new();
        assert!(repo.increment_if_below(&key(None), 5).await.unwrap().is_none());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_increment_stops_at_quota() {
        let repo = InMemoryUsageCounterRepository::new();
        let first = UsageCounter::first_use(&key(None), spec(), 2);
        repo.insert_first(&first).await.unwrap();

        let second = repo.increment_if_below(&key(None), 2).await.unwrap().unwrap();
        assert_eq!(second.used, 2);
        assert!(repo.increment_if_below(&key(None), 2).await.unwrap().is_none());
        assert_eq!(repo.find(&key(None)).await.unwrap().unwrap().used, 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let repo = InMemoryUsageCounterRepository::new();
        let first = UsageCounter::first_use(&key(Some("export")), spec(), 2);
        assert!(matches!(
            repo.insert_first(&first).await.unwrap(),
            InsertOutcome::Created(_)
        ));
        assert_eq!(
            repo.insert_first(&first).await.unwrap(),
            InsertOutcome::Conflict
        );
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_module_and_function_counters_are_distinct() {
        let repo = InMemoryUsageCounterRepository::new();
        repo.insert_first(&UsageCounter::first_use(&key(None), spec(), 2))
            .await
            .unwrap();
        repo.insert_first(&UsageCounter::first_use(&key(Some("export")), spec(), 2))
            .await
            .unwrap();
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_decrement_and_clamp() {
        let repo = InMemoryUsageCounterRepository::new();
        assert!(repo.decrement(&key(None)).await.unwrap().is_none());

        repo.insert_first(&UsageCounter::first_use(&key(None), spec(), 2))
            .await
            .unwrap();
        assert_eq!(repo.decrement(&key(None)).await.unwrap().unwrap().used, 0);
        assert_eq!(repo.decrement(&key(None)).await.unwrap().unwrap().used, -1);
        assert_eq!(repo.clamp_to_zero(&key(None)).await.unwrap().unwrap().used, 0);
        assert_eq!(repo.clamp_to_zero(&key(None)).await.unwrap().unwrap().used, 0);
    }
}
