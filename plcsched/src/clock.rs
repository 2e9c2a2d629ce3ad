use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, TimeZone, Timelike};

/// Number of minutes in a day
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Source of wall-clock and monotonic time for the schedule engines
pub trait Clock {
    /// time zone in which schedules are evaluated
    type Tz: TimeZone;

    /// current wall-clock time
    fn now(&self) -> DateTime<Self::Tz>;

    /// current monotonic time, unaffected by wall-clock adjustments
    fn steady_now(&self) -> Instant;
}

/// The host's local time zone and monotonic clock
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn steady_now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests and simulations
///
/// Clones share the same time. [`advance`](Self::advance) moves the wall clock
/// and the monotonic clock together, [`set`](Self::set) only moves the wall clock.
#[derive(Clone, Debug)]
pub struct ManualClock<Tz: TimeZone> {
    inner: Arc<Mutex<ManualTime<Tz>>>,
}

#[derive(Debug)]
struct ManualTime<Tz: TimeZone> {
    wall: DateTime<Tz>,
    base: Instant,
    elapsed: Duration,
}

impl<Tz: TimeZone> ManualClock<Tz> {
    /// Create a clock showing `start`
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                wall: start,
                base: Instant::now(),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Jump the wall clock without touching the monotonic clock
    pub fn set(&self, wall: DateTime<Tz>) {
        if let Ok(mut time) = self.inner.lock() {
            time.wall = wall;
        }
    }

    /// Move both clocks forward
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut time) = self.inner.lock() {
            if let Ok(delta) = chrono::Duration::from_std(duration) {
                time.wall = time.wall.clone() + delta;
            }
            time.elapsed += duration;
        }
    }
}

impl<Tz: TimeZone> Clock for ManualClock<Tz> {
    type Tz = Tz;

    fn now(&self) -> DateTime<Tz> {
        match self.inner.lock() {
            Ok(time) => time.wall.clone(),
            Err(poisoned) => poisoned.into_inner().wall.clone(),
        }
    }

    fn steady_now(&self) -> Instant {
        match self.inner.lock() {
            Ok(time) => time.base + time.elapsed,
            Err(poisoned) => {
                let time = poisoned.into_inner();
                time.base + time.elapsed
            }
        }
    }
}

/// minutes since local midnight
pub fn minute_of_day<Tz: TimeZone>(time: &DateTime<Tz>) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

/// 0 = Sunday .. 6 = Saturday
pub fn weekday_index<Tz: TimeZone>(time: &DateTime<Tz>) -> u8 {
    time.weekday().num_days_from_sunday() as u8
}

/// 0-based day of the year
pub fn day_of_year<Tz: TimeZone>(time: &DateTime<Tz>) -> u32 {
    time.ordinal0()
}

/// Resolve `date` at `minute` of the local day in `tz` to an absolute instant
///
/// Ambiguous local times resolve to the earlier instant. Local times that fall
/// in a DST gap are moved forward by one hour. Minutes past the end of the day
/// roll over into the following days.
pub fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, minute: u32) -> Option<DateTime<Tz>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let local = midnight.checked_add_signed(chrono::Duration::minutes(i64::from(minute)))?;
    match tz.from_local_datetime(&local) {
        LocalResult::Single(x) => Some(x),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let shifted = local.checked_add_signed(chrono::Duration::hours(1))?;
            tz.from_local_datetime(&shifted).earliest()
        }
    }
}
