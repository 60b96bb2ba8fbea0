use async_trait::async_trait;

use crate::domain::entity::{UsageCounter, UsageCounterKey};

/// InsertOutcome は初回カウンタ作成の結果。
/// 一意制約により同時作成は片方が Conflict になる。
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(UsageCounter),
    Conflict,
}

/// UsageCounterRepository は使用量カウンタのストア。
/// 各メソッドはストア側で 1 回のアトミック操作として実行されること。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageCounterRepository: Send + Sync {
    /// カウンタが存在し used < quota の場合のみ used を 1 増やし、更新後のカウンタを返す。
    async fn increment_if_below(
        &self,
        key: &UsageCounterKey,
        quota: i64,
    ) -> anyhow::Result<Option<UsageCounter>>;

    /// quota 条件を無視してカウンタを取得する。
    async fn find(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>>;

    /// used = 1 のカウンタを新規作成する。
    async fn insert_first(&self, counter: &UsageCounter) -> anyhow::Result<InsertOutcome>;

    /// used を 1 減らす（下限チェックなし）。カウンタが無ければ None。
    async fn decrement(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>>;

    /// used が負の場合のみ 0 に戻す。
    async fn clamp_to_zero(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>>;
}
