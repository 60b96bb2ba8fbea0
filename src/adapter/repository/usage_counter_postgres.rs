use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entity::{UsageCounter, UsageCounterKey, WindowType, WindowUnit};
use crate::domain::repository::{InsertOutcome, UsageCounterRepository};

const COUNTER_COLUMNS: &str = "subscription_id, subject_id, module_key, function_key, \
     window_type, window_unit, window_size, window_start, window_end, used, quota";

/// function_key は NULL を含めて一致させる。
const KEY_PREDICATE: &str = "subscription_id = $1 AND subject_id = $2 AND module_key = $3 \
     AND function_key IS NOT DISTINCT FROM $4 AND window_start = $5 AND window_end = $6";

pub struct UsageCounterPostgresRepository {
    pool: Arc<PgPool>,
}

impl UsageCounterPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// キーに一致する行を 1 文で更新し、更新後の行を返す。
    async fn update_by_key(
        &self,
        set_clause: &str,
        key: &UsageCounterKey,
    ) -> anyhow::Result<Option<UsageCounter>> {
        let sql = format!(
            "UPDATE quota.usage_counters SET {set_clause}, updated_at = NOW() \
             WHERE {KEY_PREDICATE} RETURNING {COUNTER_COLUMNS}"
        );
        let row: Option<UsageCounterRow> = bind_key(sqlx::query_as(&sql), key)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(UsageCounter::try_from).transpose()
    }
}

fn bind_key<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, UsageCounterRow, sqlx::postgres::PgArguments>,
    key: &'q UsageCounterKey,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, UsageCounterRow, sqlx::postgres::PgArguments> {
    query
        .bind(&key.subscription_id)
        .bind(&key.subject_id)
        .bind(&key.module_key)
        .bind(&key.function_key)
        .bind(key.window_start)
        .bind(key.window_end)
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UsageCounterRow {
    subscription_id: String,
    subject_id: String,
    module_key: String,
    function_key: Option<String>,
    window_type: String,
    window_unit: String,
    window_size: i32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    used: i64,
    quota: i64,
}

impl TryFrom<UsageCounterRow> for UsageCounter {
    type Error = anyhow::Error;

    fn try_from(r: UsageCounterRow) -> Result<Self, Self::Error> {
        Ok(UsageCounter {
            window_type: WindowType::from_str(&r.window_type)
                .ok_or_else(|| anyhow::anyhow!("invalid window_type: {}", r.window_type))?,
            window_unit: WindowUnit::from_str(&r.window_unit)
                .ok_or_else(|| anyhow::anyhow!("invalid window_unit: {}", r.window_unit))?,
            window_size: u32::try_from(r.window_size)
                .map_err(|_| anyhow::anyhow!("invalid window_size: {}", r.window_size))?,
            subscription_id: r.subscription_id,
            subject_id: r.subject_id,
            module_key: r.module_key,
            function_key: r.function_key,
            window_start: r.window_start,
            window_end: r.window_end,
            used: r.used,
            quota: r.quota,
        })
    }
}

#[async_trait]
impl UsageCounterRepository for UsageCounterPostgresRepository {
    async fn increment_if_below(
        &self,
        key: &UsageCounterKey,
        quota: i64,
    ) -> anyhow::Result<Option<UsageCounter>> {
        let sql = format!(
            "UPDATE quota.usage_counters SET used = used + 1, quota = $7, updated_at = NOW() \
             WHERE {KEY_PREDICATE} AND used < $7 RETURNING {COUNTER_COLUMNS}"
        );
        let row: Option<UsageCounterRow> = bind_key(sqlx::query_as(&sql), key)
            .bind(quota)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(UsageCounter::try_from).transpose()
    }

    async fn find(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        let sql = format!(
            "SELECT {COUNTER_COLUMNS} FROM quota.usage_counters WHERE {KEY_PREDICATE}"
        );
        let row: Option<UsageCounterRow> = bind_key(sqlx::query_as(&sql), key)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(UsageCounter::try_from).transpose()
    }

    async fn insert_first(&self, counter: &UsageCounter) -> anyhow::Result<InsertOutcome> {
        // 一意インデックス違反は ON CONFLICT DO NOTHING で 0 行になる
        let sql = format!(
            "INSERT INTO quota.usage_counters ({COUNTER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT DO NOTHING RETURNING {COUNTER_COLUMNS}"
        );
        let row: Option<UsageCounterRow> = sqlx::query_as(&sql)
            .bind(&counter.subscription_id)
            .bind(&counter.subject_id)
            .bind(&counter.module_key)
            .bind(&counter.function_key)
            .bind(counter.window_type.as_str())
            .bind(counter.window_unit.as_str())
            .bind(i32::try_from(counter.window_size).unwrap_or(i32::MAX))
            .bind(counter.window_start)
            .bind(counter.window_end)
            .bind(counter.used)
            .bind(counter.quota)
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Created(UsageCounter::try_from(row)?)),
            None => Ok(InsertOutcome::Conflict),
        }
    }

    async fn decrement(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.update_by_key("used = used - 1", key).await
    }

    async fn clamp_to_zero(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.update_by_key("used = GREATEST(used, 0)", key).await
    }
}
