//! Normalized event timetable: days, sessions, contributions, presenters.
//!
//! A [`TimeTable`] is built once per fetch and never mutated afterwards.
//! Constructors establish the ordering invariants, so every reader observes
//! days by date, sessions by `(start, end, id)` and contributions by
//! `(start, id)`.

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::time::{TimeSpan, Timestamp};

/// A speaker attached to a contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presenter {
    pub name: String,
    pub affiliation: String,
    pub email: String,
    /// Source-specific type tag, e.g. `ContributionParticipation`.
    pub kind: String,
}

impl Presenter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = affiliation.into();
        self
    }
}

/// A talk inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub span: TimeSpan,
    pub url: String,
    pub presenters: Vec<Presenter>,
}

impl Contribution {
    pub fn new(span: TimeSpan) -> Self {
        Self {
            span,
            url: String::new(),
            presenters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_presenters(mut self, presenters: Vec<Presenter>) -> Self {
        self.presenters = presenters;
        self
    }
}

/// A block of the programme; may hold no contributions at all (breaks,
/// plenaries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    span: TimeSpan,
    room: String,
    contributions: Vec<Contribution>,
}

impl Session {
    /// Creates a session, ordering its contributions by `(start, id)`.
    pub fn new(span: TimeSpan, room: impl Into<String>, mut contributions: Vec<Contribution>) -> Self {
        contributions.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then_with(|| a.span.id.cmp(&b.span.id))
        });
        Self {
            span,
            room: room.into(),
            contributions,
        }
    }

    pub fn span(&self) -> &TimeSpan {
        &self.span
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    fn sort_key(&self) -> (Timestamp, Timestamp, &str) {
        (self.span.start, self.span.end, self.span.id.as_str())
    }
}

/// One calendar date of the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Day {
    date: NaiveDate,
    sessions: Vec<Session>,
}

impl Day {
    /// Creates a day, ordering sessions by `(start, end, id)`.
    pub fn new(date: NaiveDate, mut sessions: Vec<Session>) -> Self {
        sessions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { date, sessions }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    fn absorb(&mut self, other: Day) {
        self.sessions.extend(other.sessions);
        self.sessions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

/// The full schedule of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTable {
    event_id: u64,
    url: String,
    timezone: Tz,
    days: Vec<Day>,
}

impl TimeTable {
    /// Builds a timetable, merging days that share a date and ordering the
    /// result by date.
    pub fn new(event_id: u64, url: impl Into<String>, timezone: Tz, days: Vec<Day>) -> Self {
        let mut merged: Vec<Day> = Vec::with_capacity(days.len());
        for day in days {
            match merged.iter_mut().find(|d| d.date == day.date) {
                Some(existing) => existing.absorb(day),
                None => merged.push(day),
            }
        }
        merged.sort_by_key(|d| d.date);

        Self {
            event_id,
            url: url.into(),
            timezone,
            days: merged,
        }
    }

    /// An event with no days; what the store serves before the first fetch.
    pub fn empty(event_id: u64, timezone: Tz) -> Self {
        Self::new(event_id, "", timezone, Vec::new())
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn day(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().find(|d| d.date == date)
    }

    pub fn session_count(&self) -> usize {
        self.days.iter().map(|d| d.sessions.len()).sum()
    }

    /// Earliest session start and latest session end across all days.
    pub fn bounds(&self) -> Option<(Timestamp, Timestamp)> {
        let sessions = self.days.iter().flat_map(|d| d.sessions.iter());
        let start = sessions.clone().map(|s| s.span.start).min()?;
        let end = sessions.map(|s| s.span.end).max()?;
        Some((start, end))
    }
}
