use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::domain::entity::{UsageCounter, UsageCounterKey, WindowType, WindowUnit};
use crate::domain::repository::{InsertOutcome, UsageCounterRepository};

const COUNTER_FIELDS: &str = "return redis.call('HMGET', KEYS[1], 'used', 'quota', 'window_type', 'window_unit', 'window_size')";

/// RedisUsageCounterRepository は Redis ベースの使用量カウンタストア。
///
/// カウンタ 1 件を 1 つのハッシュで表し、各操作は Lua スクリプトとして
/// サーバ側でアトミックに実行される。
/// TTL は設定しない。ウィンドウが変わると別キーになるため古いキーは参照されなくなる。
pub struct RedisUsageCounterRepository {
    conn: ConnectionManager,
    key_prefix: String,
    increment_script: Script,
    find_script: Script,
    insert_script: Script,
    decrement_script: Script,
    clamp_script: Script,
}

/// HMGET used, quota, window_type, window_unit, window_size の結果。
type CounterFields = (i64, i64, String, String, u32);

impl RedisUsageCounterRepository {
    pub fn new(conn: ConnectionManager, key_prefix: String) -> Self {
        Self {
            conn,
            key_prefix,
            increment_script: Script::new(&format!(
                r"
if redis.call('EXISTS', KEYS[1]) == 0 then return false end
local used = tonumber(redis.call('HGET', KEYS[1], 'used'))
if used >= tonumber(ARGV[1]) then return false end
redis.call('HINCRBY', KEYS[1], 'used', 1)
redis.call('HSET', KEYS[1], 'quota', ARGV[1])
{COUNTER_FIELDS}"
            )),
            find_script: Script::new(&format!(
                r"
if redis.call('EXISTS', KEYS[1]) == 0 then return false end
{COUNTER_FIELDS}"
            )),
            insert_script: Script::new(
                r"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], 'used', ARGV[1], 'quota', ARGV[2],
  'window_type', ARGV[3], 'window_unit', ARGV[4], 'window_size', ARGV[5])
return 1",
            ),
            decrement_script: Script::new(&format!(
                r"
if redis.call('EXISTS', KEYS[1]) == 0 then return false end
redis.call('HINCRBY', KEYS[1], 'used', -1)
{COUNTER_FIELDS}"
            )),
            clamp_script: Script::new(&format!(
                r"
if redis.call('EXISTS', KEYS[1]) == 0 then return false end
if tonumber(redis.call('HGET', KEYS[1], 'used')) < 0 then
  redis.call('HSET', KEYS[1], 'used', 0)
end
{COUNTER_FIELDS}"
            )),
        }
    }

    fn make_key(&self, key: &UsageCounterKey) -> String {
        build_key(&self.key_prefix, key)
    }

    async fn invoke_counter_script(
        &self,
        script: &Script,
        key: &UsageCounterKey,
        args: &[i64],
    ) -> anyhow::Result<Option<UsageCounter>> {
        let mut conn = self.conn.clone();
        let mut invocation = script.key(self.make_key(key));
        for arg in args {
            invocation.arg(*arg);
        }
        let fields: Option<CounterFields> = invocation.invoke_async(&mut conn).await?;
        fields.map(|fields| to_counter(key, fields)).transpose()
    }
}

#[async_trait]
impl UsageCounterRepository for RedisUsageCounterRepository {
    async fn increment_if_below(
        &self,
        key: &UsageCounterKey,
        quota: i64,
    ) -> anyhow::Result<Option<UsageCounter>> {
        self.invoke_counter_script(&self.increment_script, key, &[quota])
            .await
    }

    async fn find(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.invoke_counter_script(&self.find_script, key, &[]).await
    }

    async fn insert_first(&self, counter: &UsageCounter) -> anyhow::Result<InsertOutcome> {
        let mut conn = self.conn.clone();
        let created: i64 = self
            .insert_script
            .key(self.make_key(&counter.key()))
            .arg(counter.used)
            .arg(counter.quota)
            .arg(counter.window_type.as_str())
            .arg(counter.window_unit.as_str())
            .arg(counter.window_size)
            .invoke_async(&mut conn)
            .await?;
        if created == 1 {
            Ok(InsertOutcome::Created(counter.clone()))
        } else {
            Ok(InsertOutcome::Conflict)
        }
    }

    async fn decrement(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.invoke_counter_script(&self.decrement_script, key, &[])
            .await
    }

    async fn clamp_to_zero(&self, key: &UsageCounterKey) -> anyhow::Result<Option<UsageCounter>> {
        self.invoke_counter_script(&self.clamp_script, key, &[]).await
    }
}

/// カウンタの同一性を決めるフィールドから Redis キーを生成する。
/// 文字列の各要素は "長さ:値" で表し、区切り文字を含むキー同士が衝突しないようにする。
/// function_key が無いモジュール単位のカウンタは数字で始まらない "-" で表す。
fn build_key(prefix: &str, key: &UsageCounterKey) -> String {
    let function = match key.function_key.as_deref() {
        Some(function_key) => segment(function_key),
        None => "-".to_string(),
    };
    format!(
        "{}{}:{}:{}:{}:{}:{}",
        prefix,
        segment(&key.subscription_id),
        segment(&key.subject_id),
        segment(&key.module_key),
        function,
        key.window_start.timestamp_millis(),
        key.window_end.timestamp_millis(),
    )
}

fn segment(value: &str) -> String {
    format!("{}:{}", value.len(), value)
}

fn to_counter(key: &UsageCounterKey, fields: CounterFields) -> anyhow::Result<UsageCounter> {
    let (used, quota, window_type, window_unit, window_size) = fields;
    Ok(UsageCounter {
        subscription_id: key.subscription_id.clone(),
        subject_id: key.subject_id.clone(),
        module_key: key.module_key.clone(),
        function_key: key.function_key.clone(),
        window_type: WindowType::from_str(&window_type)
            .ok_or_else(|| anyhow::anyhow!("invalid window_type: {}", window_type))?,
        window_unit: WindowUnit::from_str(&window_unit)
            .ok_or_else(|| anyhow::anyhow!("invalid window_unit: {}", window_unit))?,
        window_size,
        window_start: key.window_start,
        window_end: key.window_end,
        used,
        quota,
    })
}
