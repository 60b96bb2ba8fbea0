use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::domain::entity::{TimeWindow, WindowUnit};

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// 1970-01-05（月曜）00:00 UTC。週境界の基準点。
const FIRST_MONDAY_EPOCH_SECS: i64 = 4 * SECONDS_PER_DAY;

/// now を含む半開区間 [start, end) を返す。
///
/// 境界はエポック（週は最初の月曜、月は西暦 0 年 1 月）から size 単位で揃えるため、
/// 同じ区間内のどの時刻から計算しても同じ区間になる。size = 1 の場合は単純な
/// 単位境界への切り捨てと一致する。size が 0 の場合は 1 として扱う。
pub fn compute_window(now: DateTime<Utc>, unit: WindowUnit, size: u32) -> TimeWindow {
    let size = size.max(1);
    let span = i64::from(size);
    match unit {
        WindowUnit::Minute => fixed_bucket(now, SECONDS_PER_MINUTE * span, 0),
        WindowUnit::Hour => fixed_bucket(now, SECONDS_PER_HOUR * span, 0),
        WindowUnit::Day => fixed_bucket(now, SECONDS_PER_DAY * span, 0),
        WindowUnit::Week => fixed_bucket(now, SECONDS_PER_WEEK * span, FIRST_MONDAY_EPOCH_SECS),
        WindowUnit::Month => month_bucket(now, size),
        WindowUnit::Lifetime => lifetime_window(),
    }
}

/// lifetime 用の固定区間。サブジェクト・モジュール・ファンクションごとにカウンタは 1 件になる。
pub fn lifetime_window() -> TimeWindow {
    TimeWindow {
        start: DateTime::from_timestamp(0, 0).unwrap_or(DateTime::<Utc>::MIN_UTC),
        end: lifetime_end(),
    }
}

fn lifetime_end() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn fixed_bucket(now: DateTime<Utc>, bucket_secs: i64, anchor_secs: i64) -> TimeWindow {
    let offset = (now.timestamp() - anchor_secs).rem_euclid(bucket_secs);
    let start = now
        - Duration::seconds(offset)
        - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
    let end = start
        .checked_add_signed(Duration::seconds(bucket_secs))
        .unwrap_or_else(lifetime_end);
    TimeWindow { start, end }
}

fn month_bucket(now: DateTime<Utc>, size: u32) -> TimeWindow {
    let today = now.date_naive();
    let first_of_month = today - Days::new(u64::from(today.day0()));
    let month_index = i64::from(today.year()) * 12 + i64::from(today.month0());
    let offset = month_index.rem_euclid(i64::from(size)) as u32;
    let start_date = first_of_month
        .checked_sub_months(Months::new(offset))
        .unwrap_or(first_of_month);
    let start = midnight(start_date);
    let end = start
        .checked_add_months(Months::new(size))
        .unwrap_or_else(lifetime_end);
    TimeWindow { start, end }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    const ALL_UNITS: [WindowUnit; 6] = [
        WindowUnit::Minute,
        WindowUnit::Hour,
        WindowUnit::Day,
        WindowUnit::Week,
        WindowUnit::Month,
        WindowUnit::Lifetime,
    ];

    #[test]
    fn test_minute_window() {
        let w = compute_window(at(2024, 3, 15, 10, 37, 42), WindowUnit::Minute, 1);
        assert_eq!(w.start, at(2024, 3, 15, 10, 37, 0));
        assert_eq!(w.end, at(2024, 3, 15, 10, 38, 0));
    }

    #[test]
    fn test_minute_window_drops_subsecond_part() {
        let now = at(2024, 3, 15, 10, 37, 42) + Duration::milliseconds(250);
        let w = compute_window(now, WindowUnit::Minute, 1);
        assert_eq!(w.start, at(2024, 3, 15, 10, 37, 0));
    }

    #[test]
    fn test_multi_minute_window_is_aligned() {
        let w = compute_window(at(2024, 3, 15, 10, 37, 42), WindowUnit::Minute, 5);
        assert_eq!(w.start, at(2024, 3, 15, 10, 35, 0));
        assert_eq!(w.end, at(2024, 3, 15, 10, 40, 0));
    }

    #[test]
    fn test_hour_window() {
        let w = compute_window(at(2024, 3, 15, 23, 59, 59), WindowUnit::Hour, 1);
        assert_eq!(w.start, at(2024, 3, 15, 23, 0, 0));
        assert_eq!(w.end, at(2024, 3, 16, 0, 0, 0));
    }

    #[test]
    fn test_day_window() {
        let w = compute_window(at(2024, 2, 29, 12, 0, 0), WindowUnit::Day, 1);
        assert_eq!(w.start, at(2024, 2, 29, 0, 0, 0));
        assert_eq!(w.end, at(2024, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_week_window_starts_on_monday() {
        // 2024-03-15 は金曜、2024-03-17 は日曜
        let friday = compute_window(at(2024, 3, 15, 9, 0, 0), WindowUnit::Week, 1);
        assert_eq!(friday.start, at(2024, 3, 11, 0, 0, 0));
        assert_eq!(friday.end, at(2024, 3, 18, 0, 0, 0));

        let sunday = compute_window(at(2024, 3, 17, 23, 59, 59), WindowUnit::Week, 1);
        assert_eq!(sunday, friday);

        let monday = compute_window(at(2024, 3, 18, 0, 0, 0), WindowUnit::Week, 1);
        assert_eq!(monday.start, at(2024, 3, 18, 0, 0, 0));
    }

    #[test]
    fn test_month_window() {
        let w = compute_window(at(2024, 3, 15, 8, 30, 0), WindowUnit::Month, 1);
        assert_eq!(w.start, at(2024, 3, 1, 0, 0, 0));
        assert_eq!(w.end, at(2024, 4, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_window_crosses_year() {
        let w = compute_window(at(2024, 12, 31, 23, 0, 0), WindowUnit::Month, 1);
        assert_eq!(w.start, at(2024, 12, 1, 0, 0, 0));
        assert_eq!(w.end, at(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_quarter_window() {
        let w = compute_window(at(2024, 5, 20, 0, 0, 0), WindowUnit::Month, 3);
        assert_eq!(w.start, at(2024, 4, 1, 0, 0, 0));
        assert_eq!(w.end, at(2024, 7, 1, 0, 0, 0));
    }

    #[test]
    fn test_lifetime_window_is_shared_across_decades() {
        let a = compute_window(at(2014, 1, 1, 0, 0, 0), WindowUnit::Lifetime, 1);
        let b = compute_window(at(2024, 1, 1, 0, 0, 0), WindowUnit::Lifetime, 3);
        assert_eq!(a, b);
        assert_eq!(a.start.timestamp(), 0);
    }

    #[test]
    fn test_zero_size_behaves_like_one() {
        let now = at(2024, 3, 15, 10, 37, 42);
        for unit in ALL_UNITS {
            assert_eq!(compute_window(now, unit, 0), compute_window(now, unit, 1));
        }
    }

    #[test]
    fn test_window_contains_now_and_is_stable() {
        let samples = [
            at(1970, 1, 1, 0, 0, 0),
            at(1999, 12, 31, 23, 59, 59),
            at(2000, 2, 29, 12, 30, 15),
            at(2024, 3, 15, 0, 0, 0),
            at(2024, 3, 31, 23, 59, 59),
            at(2038, 1, 19, 3, 14, 8),
        ];
        for now in samples {
            for unit in ALL_UNITS {
                for size in [1, 2, 3, 7, 12] {
                    let w = compute_window(now, unit, size);
                    assert!(w.contains(now), "{unit} x{size} at {now}: {w:?}");
                    assert_eq!(compute_window(w.start, unit, size), w);
                    let last = w.end - Duration::seconds(1);
                    if unit != WindowUnit::Lifetime {
                        assert_eq!(compute_window(last, unit, size), w);
                    }
                }
            }
        }
    }
}
