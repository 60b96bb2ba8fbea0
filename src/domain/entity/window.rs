use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// WindowType はウィンドウ境界の決め方を表す。
/// rolling は現状 calendar と同じ境界で計算される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[default]
    Calendar,
    Rolling,
}

impl WindowType {
    pub fn as_str(&self) -> &str {
        match self {
            WindowType::Calendar => "calendar",
            WindowType::Rolling => "rolling",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(WindowType::Calendar),
            "rolling" => Some(WindowType::Rolling),
            _ => None,
        }
    }
}

/// WindowUnit はウィンドウの時間単位を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowUnit {
    Minute,
    Hour,
    Day,
    Week,
    #[default]
    Month,
    Lifetime,
}

impl WindowUnit {
    pub fn as_str(&self) -> &str {
        match self {
            WindowUnit::Minute => "minute",
            WindowUnit::Hour => "hour",
            WindowUnit::Day => "day",
            WindowUnit::Week => "week",
            WindowUnit::Month => "month",
            WindowUnit::Lifetime => "lifetime",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(WindowUnit::Minute),
            "hour" => Some(WindowUnit::Hour),
            "day" => Some(WindowUnit::Day),
            "week" => Some(WindowUnit::Week),
            "month" => Some(WindowUnit::Month),
            "lifetime" => Some(WindowUnit::Lifetime),
            _ => None,
        }
    }
}

impl std::fmt::Display for WindowUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// WindowSpec はルールが持つウィンドウ定義（種別・単位・幅）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub window_type: WindowType,
    pub unit: WindowUnit,
    pub size: u32,
}

/// TimeWindow は半開区間 [start, end) を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_type_roundtrip() {
        assert_eq!(WindowType::from_str("calendar"), Some(WindowType::Calendar));
        assert_eq!(WindowType::from_str("rolling"), Some(WindowType::Rolling));
        assert_eq!(WindowType::from_str("sliding"), None);
        assert_eq!(WindowType::Calendar.as_str(), "calendar");
        assert_eq!(WindowType::Rolling.as_str(), "rolling");
    }

    #[test]
    fn test_window_unit_roundtrip() {
        for unit in [
            WindowUnit::Minute,
            WindowUnit::Hour,
            WindowUnit::Day,
            WindowUnit::Week,
            WindowUnit::Month,
            WindowUnit::Lifetime,
        ] {
            assert_eq!(WindowUnit::from_str(unit.as_str()), Some(unit));
        }
        assert_eq!(WindowUnit::from_str("year"), None);
    }

    #[test]
    fn test_time_window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let window = TimeWindow { start, end };
        assert!(window.contains(start));
        assert!(!window.contains(end));
    }
}
