use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::window::{WindowSpec, WindowType, WindowUnit};

/// モジュールキー・ファンクションキーを正規化する（前後空白除去 + 小文字化）。
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// ファンクションキーを正規化する。空文字は None として扱う。
pub fn normalize_function_key(key: Option<&str>) -> Option<String> {
    key.map(normalize_key).filter(|k| !k.is_empty())
}

/// quota から使用済み数を差し引いた残量。負の used は 0 とみなす。
pub fn remaining_for(quota: u64, used: i64) -> u64 {
    quota.saturating_sub(used.max(0) as u64)
}

/// UsageCounterKey はカウンタの同一性を決めるフィールドの組。
/// 同じキーのカウンタはストア上に高々 1 件しか存在しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageCounterKey {
    pub subscription_id: String,
    pub subject_id: String,
    pub module_key: String,
    pub function_key: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// UsageCounter はウィンドウ 1 区間分の使用量レコード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub subscription_id: String,
    pub subject_id: String,
    pub module_key: String,
    pub function_key: Option<String>,
    pub window_type: WindowType,
    pub window_unit: WindowUnit,
    pub window_size: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub used: i64,
    pub quota: i64,
}

impl UsageCounter {
    /// ウィンドウ内で最初の消費を表すカウンタ（used = 1）を作る。
    pub fn first_use(key: &UsageCounterKey, spec: WindowSpec, quota: i64) -> Self {
        Self {
            subscription_id: key.subscription_id.clone(),
            subject_id: key.subject_id.clone(),
            module_key: key.module_key.clone(),
            function_key: key.function_key.clone(),
            window_type: spec.window_type,
            window_unit: spec.unit,
            window_size: spec.size,
            window_start: key.window_start,
            window_end: key.window_end,
            used: 1,
            quota,
        }
    }

    pub fn key(&self) -> UsageCounterKey {
        UsageCounterKey {
            subscription_id: self.subscription_id.clone(),
            subject_id: self.subject_id.clone(),
            module_key: self.module_key.clone(),
            function_key: self.function_key.clone(),
            window_start: self.window_start,
            window_end: self.window_end,
        }
    }

    pub fn remaining(&self) -> u64 {
        remaining_for(self.quota.max(0) as u64, self.used)
    }
}
