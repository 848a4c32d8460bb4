//! Eastern-time clock and NYSE trading calendar.
//!
//! Pure, deterministic logic: no blocking I/O, no hidden wall-clock reads.
//! Wall-clock access is isolated behind the [`Clock`] trait so the engine can
//! run identically against a live system clock or a backtest's externally
//! stepped clock.

mod calendar;
mod clock;

pub use calendar::{is_half_day, is_trading_day, session_close, session_open, NyseCalendar};
pub use clock::{Clock, SteppingClock, SystemClock};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Convert a UTC instant to Eastern time, resolving DST via the `chrono-tz`
/// zone database (`America/New_York`) rather than a fixed offset.
pub fn to_eastern(ts: DateTime<Utc>) -> DateTime<Tz> {
    ts.with_timezone(&New_York)
}

/// The current instant, in Eastern time, as read from `clock`.
pub fn now_eastern(clock: &dyn Clock) -> DateTime<Tz> {
    to_eastern(clock.now_utc())
}

/// Advance `date` forward by `n` trading days (skipping weekends and
/// holidays). `add_trading_days(d, 0)` returns `d` unchanged if `d` is
/// itself a trading day, else the next trading day at or after `d`.
pub fn add_trading_days(date: NaiveDate, n: u32) -> NaiveDate {
    let mut cursor = date;
    let mut remaining = n;
    while remaining > 0 {
        cursor = cursor.succ_opt().expect("date overflow");
        if is_trading_day(cursor) {
            remaining -= 1;
        }
    }
    if n == 0 {
        while !is_trading_day(cursor) {
            cursor = cursor.succ_opt().expect("date overflow");
        }
    }
    cursor
}

/// Count the number of trading days strictly between `from` and `to`
/// (exclusive of `from`, inclusive of `to`). Returns 0 if `to <= from`.
pub fn count_trading_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut count = 0;
    let mut cursor = from;
    while cursor < to {
        cursor = cursor.succ_opt().expect("date overflow");
        if is_trading_day(cursor) {
            count += 1;
        }
    }
    count
}

/// Attach an Eastern time-of-day (`hour`:`minute`, 24h) to `date`, producing
/// a UTC instant. Used to resolve config keys like
/// `exit_time_of_day_eastern` and `reconciliation_time_eastern` against a
/// concrete date.
pub fn eastern_time_on(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .expect("invalid time-of-day");
    match New_York.from_local_datetime(&naive).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Spring-forward gap or fall-back ambiguity: pick the earliest valid
        // interpretation rather than fail a session-boundary computation.
        None => New_York
            .from_local_datetime(&naive)
            .earliest()
            .expect("no valid local time")
            .with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn to_eastern_resolves_standard_time_offset() {
        // 2024-01-08T15:00:00Z is 10:00 ET (EST, UTC-5) in January.
        let utc = Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap();
        let et = to_eastern(utc);
        assert_eq!(et.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn to_eastern_resolves_daylight_time_offset() {
        // 2024-07-08T14:00:00Z is 10:00 ET (EDT, UTC-4) in July — a fixed
        // UTC-5 approximation would get this wrong by an hour.
        let utc = Utc.with_ymd_and_hms(2024, 7, 8, 14, 0, 0).unwrap();
        let et = to_eastern(utc);
        assert_eq!(et.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn add_trading_days_skips_weekend() {
        // Friday 2024-01-05 + 1 trading day -> Monday 2024-01-08.
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let next = add_trading_days(friday, 1);
        assert_eq!(next, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn add_trading_days_skips_holiday() {
        // Tue 2024-12-24 + 1 trading day -> Thu 2024-12-26 (Christmas observed).
        let eve = NaiveDate::from_ymd_opt(2024, 12, 24).unwrap();
        let next = add_trading_days(eve, 1);
        assert_eq!(next, NaiveDate::from_ymd_opt(2024, 12, 26).unwrap());
    }

    #[test]
    fn count_trading_days_between_weekend_is_one_day_delta() {
        let fri = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mon = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(count_trading_days_between(fri, mon), 1);
    }

    #[test]
    fn count_trading_days_between_is_zero_when_not_after() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(count_trading_days_between(d, d), 0);
        assert_eq!(count_trading_days_between(d, d - Duration::days(1)), 0);
    }
}
