use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::window::{WindowSpec, WindowType, WindowUnit};

/// DefaultAction はルールが見つからないときの扱い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    #[default]
    Allow,
    Block,
}

impl DefaultAction {
    pub fn as_str(&self) -> &str {
        match self {
            DefaultAction::Allow => "allow",
            DefaultAction::Block => "block",
        }
    }
}

/// RuleType はルールが回数制限か無制限かを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Count,
    Unlimited,
}

/// Rule はモジュールまたはファンクション単位の制限ルール。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub key: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub quota: u64,
    #[serde(default)]
    pub window_type: WindowType,
    #[serde(default)]
    pub window_unit: WindowUnit,
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u64>,
}

fn default_window_size() -> u32 {
    1
}

impl Rule {
    pub fn count(key: &str, quota: u64, window_unit: WindowUnit, window_size: u32) -> Self {
        Self {
            key: key.to_string(),
            rule_type: RuleType::Count,
            quota,
            window_type: WindowType::Calendar,
            window_unit,
            window_size,
            burst: None,
            concurrency: None,
        }
    }

    pub fn unlimited(key: &str) -> Self {
        Self {
            key: key.to_string(),
            rule_type: RuleType::Unlimited,
            quota: 0,
            window_type: WindowType::Calendar,
            window_unit: WindowUnit::Lifetime,
            window_size: 1,
            burst: None,
            concurrency: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.rule_type == RuleType::Unlimited
    }

    /// window_size が 0 のスナップショットは 1 として扱う。
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            window_type: self.window_type,
            unit: self.window_unit,
            size: self.window_size.max(1),
        }
    }
}

/// ModuleLimitation はモジュール 1 件分のルール定義。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleLimitation {
    pub module_key: String,
    #[serde(default)]
    pub module_rule: Option<Rule>,
    #[serde(default)]
    pub function_rules: Vec<Rule>,
}

/// LimitationSnapshot は購読に紐づく制限ルールの時点コピー。
/// カタログ側の変更は既存の購読に反映されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LimitationSnapshot {
    #[serde(default)]
    pub default_action: DefaultAction,
    #[serde(default)]
    pub modules: Vec<ModuleLimitation>,
}

/// SubscriptionStatus は購読の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Pending,
    Expired,
    Cancelled,
}

/// ActiveSubscription はサブジェクトに現在適用される購読。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSubscription {
    pub id: String,
    pub subject_id: String,
    pub limitation_snapshot: LimitationSnapshot,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
}

impl ActiveSubscription {
    /// status が active かつ start_at <= now < end_at のときのみ有効。
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.start_at <= now && now < self.end_at
    }

    /// start_at を問わず、status が active かつ now < end_at なら true。
    /// 要求の途中で登録された購読は start_at が要求時刻より後になる。
    pub fn is_unexpired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now < self.end_at
    }
}
