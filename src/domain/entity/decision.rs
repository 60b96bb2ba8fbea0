use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::limitation::{DefaultAction, RuleType};
use super::window::{WindowType, WindowUnit};

/// DenyReason は消費が拒否された理由。呼び出し側が HTTP ステータス等に対応付ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoRule,
    QuotaZero,
    QuotaExceeded,
}

impl DenyReason {
    pub fn as_str(&self) -> &str {
        match self {
            DenyReason::NoRule => "no_rule",
            DenyReason::QuotaZero => "quota_zero",
            DenyReason::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// QuotaDecision は checkAndConsume の結果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl QuotaDecision {
    /// カウンタを消費して許可した結果。
    pub fn allowed(remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: Some(remaining),
            reset_at: Some(reset_at),
            reason: None,
        }
    }

    /// カウンタに触れずに許可した結果（無制限ルール・ルートサブジェクト・default allow）。
    pub fn unmetered() -> Self {
        Self {
            allowed: true,
            remaining: None,
            reset_at: None,
            reason: None,
        }
    }

    pub fn denied(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            remaining: None,
            reset_at: None,
            reason: Some(reason),
        }
    }
}

/// ReleaseResult は releaseQuota の結果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl ReleaseResult {
    pub fn released(remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            remaining: Some(remaining),
            reset_at: Some(reset_at),
        }
    }

    /// 対象カウンタが存在しない場合も成功扱い。
    pub fn nothing_to_release() -> Self {
        Self {
            success: true,
            remaining: None,
            reset_at: None,
        }
    }
}

/// CapabilityItem はルール 1 件分の現在ウィンドウにおける残量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityItem {
    pub module_key: String,
    pub function_key: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub quota: Option<u64>,
    pub used: Option<u64>,
    pub remaining: Option<u64>,
    pub window_type: WindowType,
    pub window_unit: WindowUnit,
    pub window_size: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u64>,
}

/// Capabilities はクライアント表示用の集計ビュー。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub default_action: DefaultAction,
    pub items: Vec<CapabilityItem>,
}

impl Capabilities {
    /// ルートサブジェクト向け: 制限なし。
    pub fn unrestricted() -> Self {
        Self {
            default_action: DefaultAction::Allow,
            items: Vec::new(),
        }
    }
}
