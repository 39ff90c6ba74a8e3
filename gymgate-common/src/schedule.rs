//! Operating-schedule evaluation
//!
//! Pure projection of a gym's operating hours and the gym-local wall clock
//! onto a `GymStatus`. The status is for display; access decisions are
//! made by the verification authority.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minutes in a day; `24:00` is accepted as an end-of-day bound
const MINUTES_PER_DAY: u16 = 24 * 60;

/// Gym-local wall-clock time of day at minute resolution (`HH:MM`)
///
/// Ordering is chronological, which matches lexical ordering of the
/// zero-padded string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// Build from hour and minute; `24:00` is the only value past `23:59`
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        let minutes = u16::from(hour) * 60 + u16::from(minute);
        if minute >= 60 || minutes > MINUTES_PER_DAY {
            return None;
        }
        Some(Self { minutes })
    }

    /// Truncates seconds, so `10:30:59` is `10:30`
    pub fn from_naive(time: NaiveTime) -> Self {
        Self {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Error parsing an `HH:MM` clock time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid clock time '{0}', expected zero-padded HH:MM")]
pub struct ClockTimeParseError(pub String);

impl FromStr for ClockTime {
    type Err = ClockTimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ClockTimeParseError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        ClockTime::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ClockTimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// Half-open `[start, end)` range of clock times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl HourRange {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    /// `start <= time < end`; a range with `start >= end` contains nothing
    pub fn contains(&self, time: ClockTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Day of week as written in gym settings (`"monday"`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// Women-only window on given weekdays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FemaleOnlySlot {
    pub days: Vec<DayOfWeek>,
    pub range: HourRange,
}

impl FemaleOnlySlot {
    fn matches(&self, day: DayOfWeek, time: ClockTime) -> bool {
        self.days.contains(&day) && self.range.contains(time)
    }
}

/// Per-gym operating-hours configuration (read-only here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingSchedule {
    pub working_hours: HourRange,
    #[serde(default)]
    pub is_mixed: bool,
    #[serde(default)]
    pub female_only_hours: Vec<FemaleOnlySlot>,
}

/// Access mode of the current slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Mixed,
    WomenOnly,
    MenOnly,
    Closed,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Mixed => write!(f, "mixed"),
            SessionKind::WomenOnly => write!(f, "womenOnly"),
            SessionKind::MenOnly => write!(f, "menOnly"),
            SessionKind::Closed => write!(f, "closed"),
        }
    }
}

/// Derived gym status; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymStatus {
    pub is_open: bool,
    pub is_women_only: bool,
    pub current_session: SessionKind,
    /// "Opens at HH:MM" / "Closes at HH:MM"
    pub next_status_change: Option<String>,
}

impl GymStatus {
    /// Status of a gym without configured working hours
    pub fn unconfigured() -> Self {
        Self {
            is_open: false,
            is_women_only: false,
            current_session: SessionKind::Closed,
            next_status_change: None,
        }
    }
}

impl Default for GymStatus {
    fn default() -> Self {
        Self::unconfigured()
    }
}

/// Evaluate `schedule` at gym-local time `now`
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use gymgate_common::schedule::{evaluate, OperatingSchedule, HourRange, SessionKind};
///
/// let schedule = OperatingSchedule {
///     working_hours: HourRange::new("08:00".parse().unwrap(), "22:00".parse().unwrap()),
///     is_mixed: true,
///     female_only_hours: vec![],
/// };
/// // 2024-01-01 is a Monday
/// let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 15, 0).unwrap();
///
/// let status = evaluate(&schedule, now);
/// assert!(status.is_open);
/// assert_eq!(status.current_session, SessionKind::Mixed);
/// assert_eq!(status.next_status_change.as_deref(), Some("Closes at 22:00"));
/// ```
pub fn evaluate(schedule: &OperatingSchedule, now: NaiveDateTime) -> GymStatus {
    let time = ClockTime::from_naive(now.time());
    let today = DayOfWeek::from(now.weekday());
    let hours = schedule.working_hours;

    let is_open = hours.contains(time);

    let current_session = if !is_open {
        SessionKind::Closed
    } else if schedule.is_mixed {
        SessionKind::Mixed
    } else if schedule
        .female_only_hours
        .iter()
        .any(|slot| slot.matches(today, time))
    {
        SessionKind::WomenOnly
    } else {
        SessionKind::MenOnly
    };

    let next_status_change = if is_open {
        format!("Closes at {}", hours.end)
    } else {
        format!("Opens at {}", hours.start)
    };

    GymStatus {
        is_open,
        is_women_only: current_session == SessionKind::WomenOnly,
        current_session,
        next_status_change: Some(next_status_change),
    }
}

/// Like [`evaluate`], but a missing schedule yields [`GymStatus::unconfigured`]
pub fn evaluate_optional(schedule: Option<&OperatingSchedule>, now: NaiveDateTime) -> GymStatus {
    match schedule {
        Some(schedule) => evaluate(schedule, now),
        None => GymStatus::unconfigured(),
    }
}
