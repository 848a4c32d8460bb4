//! NYSE trading-day and session-boundary logic.
//!
//! Holiday table and weekday/session-window checks, generalized from a
//! fixed UTC-5 approximation to real `chrono-tz` `America/New_York`
//! conversion so DST
//! transitions resolve correctly, and extended with half-day early closes
//! (the day after Thanksgiving, Christmas Eve) since the engine's calendar
//! contract explicitly covers half-days.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Marker type for the NYSE equities calendar. Exists so a future second
/// calendar (e.g. a 24/7 crypto venue) can be added as a sibling type
/// without changing every call site's free-function names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NyseCalendar;

/// `true` if `date` is a regular or half-day NYSE trading session
/// (weekday, not a holiday).
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_nyse_holiday(date)
}

/// `true` if `date` is a NYSE half day (13:00 ET close).
pub fn is_half_day(date: NaiveDate) -> bool {
    is_trading_day(date) && NYSE_HALF_DAYS.contains(&ymd(date))
}

/// The session open instant (09:30 ET) on `date`, or `None` if `date` is
/// not a trading day.
pub fn session_open(date: NaiveDate) -> Option<DateTime<Tz>> {
    if !is_trading_day(date) {
        return None;
    }
    Some(eastern_local(date, 9, 30))
}

/// The session close instant on `date` — 16:00 ET on a regular day, 13:00 ET
/// on a half day — or `None` if `date` is not a trading day.
pub fn session_close(date: NaiveDate) -> Option<DateTime<Tz>> {
    if !is_trading_day(date) {
        return None;
    }
    if is_half_day(date) {
        Some(eastern_local(date, 13, 0))
    } else {
        Some(eastern_local(date, 16, 0))
    }
}

fn eastern_local(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .expect("invalid session time-of-day");
    New_York
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| {
            New_York
                .from_local_datetime(&naive)
                .earliest()
                .expect("no valid local time for session boundary")
        })
}

fn ymd(date: NaiveDate) -> (i32, u32, u32) {
    (date.year(), date.month(), date.day())
}

fn is_nyse_holiday(date: NaiveDate) -> bool {
    NYSE_HOLIDAYS.contains(&ymd(date))
}

/// Observed NYSE market holidays, 2023–2026.
static NYSE_HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2023
    (2023, 1, 2),
    (2023, 1, 16),
    (2023, 2, 20),
    (2023, 4, 7),
    (2023, 5, 29),
    (2023, 6, 19),
    (2023, 7, 4),
    (2023, 9, 4),
    (2023, 11, 23),
    (2023, 12, 25),
    // 2024
    (2024, 1, 1),
    (2024, 1, 15),
    (2024, 2, 19),
    (2024, 3, 29),
    (2024, 5, 27),
    (2024, 6, 19),
    (2024, 7, 4),
    (2024, 9, 2),
    (2024, 11, 28),
    (2024, 12, 25),
    // 2025
    (2025, 1, 1),
    (2025, 1, 20),
    (2025, 2, 17),
    (2025, 4, 18),
    (2025, 5, 26),
    (2025, 6, 19),
    (2025, 7, 4),
    (2025, 9, 1),
    (2025, 11, 27),
    (2025, 12, 25),
    // 2026
    (2026, 1, 1),
    (2026, 1, 19),
    (2026, 2, 16),
    (2026, 4, 3),
    (2026, 5, 25),
    (2026, 6, 19),
    (2026, 7, 3), // observed — July 4 falls on a Saturday
    (2026, 9, 7),
    (2026, 11, 26),
    (2026, 12, 25),
];

/// NYSE half days (13:00 ET close): day after Thanksgiving, Christmas Eve
/// when it falls on a weekday.
static NYSE_HALF_DAYS: &[(i32, u32, u32)] = &[
    (2023, 7, 3),
    (2023, 11, 24),
    (2023, 12, 24),
    (2024, 7, 3),
    (2024, 11, 29),
    (2024, 12, 24),
    (2025, 7, 3),
    (2025, 11, 28),
    (2025, 12, 24),
    (2026, 11, 27),
    (2026, 12, 24),
];
