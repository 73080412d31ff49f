//! Time primitives shared by the timetable model and the agenda projector.
//!
//! Every instant in the system is a [`Timestamp`]: a datetime carrying the
//! IANA zone of the event it belongs to. [`TimeSpan`] is the temporal shape
//! composed into both sessions and contributions, so the two classify
//! "active" and "ended" with the same code.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

/// An instant expressed in an event's timezone.
pub type Timestamp = DateTime<Tz>;

/// Layout accepted for operator-supplied local times.
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors produced while turning text into a [`Timestamp`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    /// The input matched neither the local layout nor RFC 3339.
    #[error("invalid time '{input}': expected \"YYYY-MM-DD HH:MM:SS\" or RFC 3339")]
    Format { input: String },

    /// The local time falls into a DST gap of the zone.
    #[error("local time '{input}' does not exist in {zone}")]
    Nonexistent { input: String, zone: Tz },

    /// The zone name is not a known IANA zone.
    #[error("unknown timezone '{0}'")]
    UnknownZone(String),
}

/// Parses an IANA zone name such as `Europe/Paris`.
pub fn parse_zone(name: &str) -> Result<Tz, TimeParseError> {
    name.parse::<Tz>()
        .map_err(|_| TimeParseError::UnknownZone(name.to_string()))
}

/// Resolves a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) resolve to the earliest instant; times
/// inside a DST gap yield `None`.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<Timestamp> {
    tz.from_local_datetime(&naive).earliest()
}

/// Parses `"YYYY-MM-DD HH:MM:SS"` as a local time in `tz`, or any RFC 3339
/// string, which is then converted into `tz`.
pub fn parse_local(input: &str, tz: Tz) -> Result<Timestamp, TimeParseError> {
    let trimmed = input.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, LOCAL_TIME_FORMAT) {
        return resolve_local(naive, tz).ok_or_else(|| TimeParseError::Nonexistent {
            input: trimmed.to_string(),
            zone: tz,
        });
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&tz))
        .map_err(|_| TimeParseError::Format {
            input: trimmed.to_string(),
        })
}

/// Formats an instant with hour:minute precision.
pub fn format_hm(ts: &Timestamp) -> String {
    ts.format("%H:%M").to_string()
}

/// Formats a duration for display: `20min`, `1h`, `1h30`.
pub fn format_minutes(minutes: i64) -> String {
    let (hours, rest) = (minutes / 60, minutes % 60);
    match (hours, rest) {
        (0, m) => format!("{m}min"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m:02}"),
    }
}

/// Temporal shape shared by sessions and contributions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpan {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Either supplied by the source or derived as `end - start`.
    pub duration: Duration,
}

impl TimeSpan {
    /// Creates a span whose duration is derived from its bounds.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            duration: end - start,
        }
    }

    /// Applies a duration supplied by the source.
    ///
    /// `None` or a zero duration counts as "not supplied" and keeps the
    /// derived value; any other value is kept even when it disagrees with
    /// `end - start`.
    #[must_use]
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        if let Some(duration) = duration
            && !duration.is_zero()
        {
            self.duration = duration;
        }
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Strict open-interval test: `start < now < end`.
    pub fn is_active_at(&self, now: &Timestamp) -> bool {
        self.start < *now && *now < self.end
    }

    /// True once `end` lies strictly before `now`.
    pub fn has_ended_at(&self, now: &Timestamp) -> bool {
        self.end < *now
    }

    /// Duration rounded down to whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        self.duration.num_minutes()
    }
}
