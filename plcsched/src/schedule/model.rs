use chrono::NaiveDate;

use crate::error::ConfigError;

/// Set of weekdays, bit 0 = Sunday .. bit 6 = Saturday
///
/// This is the same encoding as the days register of an emulator slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DaySet {
    mask: u8,
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

impl DaySet {
    /// Monday through Friday
    pub const WORKDAYS: DaySet = DaySet { mask: 0b0011_1110 };
    /// every day of the week
    pub const ALL: DaySet = DaySet { mask: 0b0111_1111 };

    /// Create an empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create from a bitmask, ignoring bits above Saturday
    pub fn from_mask(mask: u16) -> Self {
        Self {
            mask: (mask & 0x7F) as u8,
        }
    }

    /// underlying bitmask
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Add a day (0 = Sunday). Values above 6 are ignored.
    pub fn insert(&mut self, day: u8) {
        if day < 7 {
            self.mask |= 1 << day;
        }
    }

    /// true if `day` (0 = Sunday) is in the set
    pub fn contains(&self, day: u8) -> bool {
        day < 7 && (self.mask & (1 << day)) != 0
    }

    /// true if no day is set
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Parse a day name: `sun`, `su`, `sunday` and so on, case-insensitive
    pub fn parse_day(name: &str) -> Result<u8, ConfigError> {
        let lower = name.trim().to_ascii_lowercase();
        let day = match lower.as_str() {
            "sun" | "su" | "sunday" => 0,
            "mon" | "mo" | "monday" => 1,
            "tue" | "tu" | "tuesday" => 2,
            "wed" | "we" | "wednesday" => 3,
            "thu" | "th" | "thursday" => 4,
            "fri" | "fr" | "friday" => 5,
            "sat" | "sa" | "saturday" => 6,
            _ => return Err(ConfigError::BadDay(name.to_string())),
        };
        Ok(day)
    }

    /// Parse a list of day names
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let mut days = Self::empty();
        for name in names {
            days.insert(Self::parse_day(name.as_ref())?);
        }
        Ok(days)
    }
}

impl FromIterator<u8> for DaySet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut days = Self::empty();
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl std::fmt::Display for DaySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (day, name) in DAY_NAMES.iter().enumerate() {
            if self.contains(day as u8) {
                if !first {
                    f.write_str(",")?;
                }
                first = false;
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// Recurrence of a schedule
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    /// every selected weekday
    Weekly {
        /// days on which the window opens
        days: DaySet,
    },
    /// a single window on a calendar date
    Once {
        /// local date of the window
        date: NaiveDate,
    },
}

/// Static definition of a schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// unique within a configuration
    pub id: String,
    /// disabled schedules never assert their coil
    pub enabled: bool,
    /// coil that must read ON for the schedule to be effective
    pub remote_enable_coil: Option<u16>,
    /// logical area, resolved to a coil through the area map
    pub area: String,
    /// weekly or one-shot
    pub kind: ScheduleKind,
    /// local minute of day at which the window opens (0..1439)
    pub start_minute: u16,
    /// length of the window in minutes (> 0)
    pub duration_minutes: u16,
}

impl Schedule {
    /// Enabled weekly schedule without a remote enable coil
    pub fn weekly(
        id: impl Into<String>,
        area: impl Into<String>,
        days: DaySet,
        start_minute: u16,
        duration_minutes: u16,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            remote_enable_coil: None,
            area: area.into(),
            kind: ScheduleKind::Weekly { days },
            start_minute,
            duration_minutes,
        }
    }

    /// Enabled one-shot schedule without a remote enable coil
    pub fn once(
        id: impl Into<String>,
        area: impl Into<String>,
        date: NaiveDate,
        start_minute: u16,
        duration_minutes: u16,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            remote_enable_coil: None,
            area: area.into(),
            kind: ScheduleKind::Once { date },
            start_minute,
            duration_minutes,
        }
    }

    /// Gate the schedule on a remote enable coil
    pub fn with_remote_enable(mut self, coil: u16) -> Self {
        self.remote_enable_coil = Some(coil);
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Parse `HH:MM` into a minute of day
pub fn parse_hhmm(text: &str) -> Result<u16, ConfigError> {
    let bad = || ConfigError::BadTime(text.to_string());
    let (hours, minutes) = text.trim().split_once(':').ok_or_else(bad)?;
    let hours: u16 = hours.trim().parse().map_err(|_| bad())?;
    let minutes: u16 = minutes.trim().parse().map_err(|_| bad())?;
    if hours > 23 || minutes > 59 {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

/// Parse `YYYY-MM-DD`
pub fn parse_date(text: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| ConfigError::BadDate(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_names_accept_all_spellings() {
        for name in ["sun", "Su", "SUNDAY"] {
            assert_eq!(DaySet::parse_day(name).unwrap(), 0);
        }
        assert_eq!(DaySet::parse_day(" thu ").unwrap(), 4);
        assert_eq!(DaySet::parse_day("Saturday").unwrap(), 6);
        assert!(matches!(
            DaySet::parse_day("Funday"),
            Err(ConfigError::BadDay(_))
        ));
    }

    #[test]
    fn day_set_uses_slot_encoding() {
        let days = DaySet::parse(&["Mon", "Wed", "Sun"]).unwrap();
        assert_eq!(days.mask(), 0b0000_1011);
        assert!(days.contains(0));
        assert!(!days.contains(2));
        assert!(!days.contains(7));
        assert_eq!(days.to_string(), "Sun,Mon,Wed");
        assert_eq!(DaySet::from_mask(0xFF80), DaySet::empty());
    }

    #[test]
    fn parses_times_and_dates() {
        assert_eq!(parse_hhmm("08:00").unwrap(), 480);
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("0800").is_err());
        assert_eq!(
            parse_date("2024-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert!(parse_date("2024-13-01").is_err());
    }
}
