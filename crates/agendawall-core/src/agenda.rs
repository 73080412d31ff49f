//! Agenda projection: what the kiosk shows at a given instant.
//!
//! [`project`] is a pure function of `(timetable, now)`. It picks the day
//! matching `now`, flags the sessions and contributions running at that
//! instant and bounds the output with a display window:
//!
//! - at most one session is kept before the first active one;
//! - at most [`SESSIONS_AFTER_ACTIVE`] sessions are kept after the last
//!   active one, the rest collapse into a single merged entry;
//! - inside an active session, at most [`CONTRIBUTIONS_AFTER_ACTIVE`]
//!   contributions are kept after the last active one, the rest collapse
//!   into a single merged entry whose duration is the sum of what it hides.
//!
//! When nothing is active the past window is left alone and the future
//! window is anchored on the first entry.

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::time::{Timestamp, format_hm};
use crate::timetable::{Contribution, Presenter, Session, TimeTable};

/// Sessions kept before the first active session.
pub const SESSIONS_BEFORE_ACTIVE: usize = 1;
/// Sessions kept after the last active session before merging.
pub const SESSIONS_AFTER_ACTIVE: usize = 4;
/// Contributions kept after the last active contribution before merging.
pub const CONTRIBUTIONS_AFTER_ACTIVE: usize = 3;
/// Title of a merged placeholder entry.
pub const MERGED_TITLE: &str = "...";
/// Layout of the snapshot label.
pub const LABEL_FORMAT: &str = "%Y-%m-%d -- %H:%M:%S";

/// CSS class carried by the running session.
pub const ACTIVE_SESSION_CLASS: &str = "current-session";
/// CSS class carried by the running contribution.
pub const ACTIVE_CONTRIBUTION_CLASS: &str = "current-contribution";

/// Display-ready projection of the timetable for one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaSnapshot {
    /// `now` rendered as `YYYY-MM-DD -- HH:MM:SS` in the event zone.
    pub label: String,
    pub date: NaiveDate,
    pub sessions: Vec<SessionView>,
}

impl AgendaSnapshot {
    /// True when the day has nothing to show (off-day or empty day).
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The first running session, if any.
    pub fn active_session(&self) -> Option<&SessionView> {
        self.sessions.iter().find(|s| s.active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: String,
    pub title: String,
    pub room: String,
    pub start: String,
    pub stop: String,
    pub duration_minutes: i64,
    pub active: bool,
    /// Placeholder standing in for collapsed sessions.
    pub merged: bool,
    pub contributions: Vec<ContributionView>,
}

impl SessionView {
    pub fn css_class(&self) -> &'static str {
        if self.active { ACTIVE_SESSION_CLASS } else { "" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionView {
    pub id: String,
    pub title: String,
    pub start: String,
    pub stop: String,
    pub duration_minutes: i64,
    pub active: bool,
    pub merged: bool,
    pub presenters: Vec<PresenterView>,
}

impl ContributionView {
    pub fn css_class(&self) -> &'static str {
        if self.active {
            ACTIVE_CONTRIBUTION_CLASS
        } else {
            ""
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenterView {
    pub name: String,
    pub affiliation: String,
    pub email: String,
}

impl From<&Presenter> for PresenterView {
    fn from(p: &Presenter) -> Self {
        Self {
            name: p.name.clone(),
            affiliation: p.affiliation.clone(),
            email: p.email.clone(),
        }
    }
}

/// Projects `table` at instant `now`.
///
/// `now` may be expressed in any zone; it is converted into the timetable's
/// zone before the day is selected. A date without a matching day yields an
/// empty snapshot.
pub fn project(table: &TimeTable, now: &Timestamp) -> AgendaSnapshot {
    let tz = table.timezone();
    let now = now.with_timezone(&tz);
    let label = now.format(LABEL_FORMAT).to_string();
    let date = now.date_naive();

    let Some(day) = table.day(date) else {
        return AgendaSnapshot {
            label,
            date,
            sessions: Vec::new(),
        };
    };

    let mut rows: Vec<SessionRow<'_>> = day
        .sessions()
        .iter()
        .map(|s| SessionRow::classify(s, &now))
        .collect();

    if let Some(first_active) = rows.iter().position(|r| r.active) {
        rows.drain(..first_active.saturating_sub(SESSIONS_BEFORE_ACTIVE));
    }

    let anchor = rows.iter().rposition(|r| r.active).unwrap_or(0);
    let (kept, overflow) = split_overflow(rows, anchor, SESSIONS_AFTER_ACTIVE);

    let mut sessions: Vec<SessionView> = kept.into_iter().map(|r| r.into_view(tz)).collect();
    if let Some(merged) = merged_session(&overflow, tz) {
        sessions.push(merged);
    }

    AgendaSnapshot {
        label,
        date,
        sessions,
    }
}

struct SessionRow<'a> {
    session: &'a Session,
    active: bool,
    contributions: Vec<ContributionRow<'a>>,
}

struct ContributionRow<'a> {
    contribution: &'a Contribution,
    active: bool,
}

impl<'a> SessionRow<'a> {
    fn classify(session: &'a Session, now: &Timestamp) -> Self {
        let active = session.span().is_active_at(now);
        // Detail is only shown for the running session.
        let contributions = if active {
            session
                .contributions()
                .iter()
                .filter(|c| !c.span.has_ended_at(now))
                .map(|c| ContributionRow {
                    contribution: c,
                    active: c.span.is_active_at(now),
                })
                .collect()
        } else {
            Vec::new()
        };
        Self {
            session,
            active,
            contributions,
        }
    }

    fn into_view(self, tz: Tz) -> SessionView {
        let anchor = self
            .contributions
            .iter()
            .rposition(|c| c.active)
            .unwrap_or(0);
        let (kept, overflow) = split_overflow(self.contributions, anchor, CONTRIBUTIONS_AFTER_ACTIVE);

        let mut contributions: Vec<ContributionView> = kept
            .into_iter()
            .map(|row| contribution_view(row.contribution, row.active, tz))
            .collect();
        if let Some(merged) = merged_contribution(&overflow, tz) {
            contributions.push(merged);
        }

        let span = self.session.span();
        SessionView {
            id: span.id.clone(),
            title: span.title.clone(),
            room: self.session.room().to_string(),
            start: hm(&span.start, tz),
            stop: hm(&span.end, tz),
            duration_minutes: span.duration_minutes(),
            active: self.active,
            merged: false,
            contributions,
        }
    }
}

/// Splits `items` after `anchor + keep_after`; the tail is what gets merged.
fn split_overflow<T>(mut items: Vec<T>, anchor: usize, keep_after: usize) -> (Vec<T>, Vec<T>) {
    let cut = anchor + keep_after + 1;
    if items.len() > cut {
        let overflow = items.split_off(cut);
        (items, overflow)
    } else {
        (items, Vec::new())
    }
}

fn contribution_view(c: &Contribution, active: bool, tz: Tz) -> ContributionView {
    ContributionView {
        id: c.span.id.clone(),
        title: c.span.title.clone(),
        start: hm(&c.span.start, tz),
        stop: hm(&c.span.end, tz),
        duration_minutes: c.span.duration_minutes(),
        active,
        merged: false,
        presenters: c.presenters.iter().map(PresenterView::from).collect(),
    }
}

fn merged_session(overflow: &[SessionRow<'_>], tz: Tz) -> Option<SessionView> {
    let (first, last) = (overflow.first()?, overflow.last()?);
    Some(SessionView {
        id: String::new(),
        title: MERGED_TITLE.to_string(),
        room: String::new(),
        start: hm(&first.session.span().start, tz),
        stop: hm(&last.session.span().end, tz),
        duration_minutes: 0,
        active: false,
        merged: true,
        contributions: Vec::new(),
    })
}

fn merged_contribution(overflow: &[ContributionRow<'_>], tz: Tz) -> Option<ContributionView> {
    let (first, last) = (overflow.first()?, overflow.last()?);
    let total = overflow
        .iter()
        .fold(Duration::zero(), |acc, row| acc + row.contribution.span.duration);
    Some(ContributionView {
        id: String::new(),
        title: MERGED_TITLE.to_string(),
        start: hm(&first.contribution.span.start, tz),
        stop: hm(&last.contribution.span.end, tz),
        duration_minutes: total.num_minutes(),
        active: false,
        merged: true,
        presenters: Vec::new(),
    })
}

fn hm(ts: &Timestamp, tz: Tz) -> String {
    format_hm(&ts.with_timezone(&tz))
}
