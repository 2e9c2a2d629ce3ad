use chrono::{DateTime, NaiveDate, TimeZone};

use crate::clock;
use crate::schedule::model::DaySet;

/// true if a weekly window on `days` covers `minute` of `weekday`
pub(crate) fn weekly_contains(
    days: DaySet,
    start_minute: u16,
    duration_minutes: u16,
    weekday: u8,
    minute: u16,
) -> bool {
    let start = u32::from(start_minute);
    let end = start + u32::from(duration_minutes);
    let minute = u32::from(minute);
    days.contains(weekday) && start <= minute && minute < end
}

/// End of today's weekly window as an absolute instant
pub(crate) fn weekly_end<Tz: TimeZone>(
    now: &DateTime<Tz>,
    start_minute: u16,
    duration_minutes: u16,
) -> DateTime<Tz> {
    let end_minute = u32::from(start_minute) + u32::from(duration_minutes);
    match clock::local_instant(&now.timezone(), now.date_naive(), end_minute) {
        Some(end) => end,
        None => {
            let remaining = i64::from(end_minute) - i64::from(clock::minute_of_day(now));
            now.clone() + chrono::Duration::minutes(remaining)
        }
    }
}

/// Absolute `[start, end)` of a one-shot window
pub(crate) fn once_bounds<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    start_minute: u16,
    duration_minutes: u16,
) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let start = clock::local_instant(tz, date, u32::from(start_minute))?;
    let end = start.clone() + chrono::Duration::minutes(i64::from(duration_minutes));
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn weekly_window_is_half_open() {
        let monday = DaySet::from_iter([1]);
        assert!(!weekly_contains(monday, 480, 60, 1, 479));
        assert!(weekly_contains(monday, 480, 60, 1, 480));
        assert!(weekly_contains(monday, 480, 60, 1, 539));
        assert!(!weekly_contains(monday, 480, 60, 1, 540));
        assert!(!weekly_contains(monday, 480, 60, 2, 500));
    }

    #[test]
    fn weekly_end_is_on_the_minute() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 25).unwrap();
        assert_eq!(
            weekly_end(&now, 480, 60),
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn once_bounds_span_the_duration() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (start, end) = once_bounds(&Utc, date, 600, 30).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());
    }
}
