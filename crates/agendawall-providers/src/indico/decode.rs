//! Decoding an Indico export body into a normalized [`TimeTable`].

use agendawall_core::time::{LOCAL_TIME_FORMAT, parse_zone, resolve_local};
use agendawall_core::{Contribution, Day, Presenter, Session, TimeSpan, TimeTable, Timestamp};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::raw::{DayEntries, RawEntry, RawPresenter, RawTime, TimetableResponse};
use crate::error::{ProviderError, ProviderResult};

/// Parses an export body for `event_id`.
///
/// # Errors
///
/// - `InvalidResponse` when the body is not a timetable export or holds an
///   unusable date, time or zone;
/// - `NotFound` when the export has no days for `event_id`.
pub fn parse_timetable(event_id: u64, body: &str) -> ProviderResult<TimeTable> {
    let mut response: TimetableResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("could not decode timetable JSON: {e}"))
            .with_source(e)
    })?;

    let raw_days = response
        .results
        .remove(&event_id.to_string())
        .filter(|days| !days.is_empty())
        .ok_or_else(|| ProviderError::not_found(format!("no event with id={event_id}")))?;

    let days = raw_days
        .into_iter()
        .map(|(key, entries)| decode_day(&key, entries))
        .collect::<ProviderResult<Vec<_>>>()?;

    let timezone = days
        .iter()
        .flat_map(|d| d.sessions())
        .map(|s| s.span().start)
        .min()
        .map(|start| start.timezone())
        .unwrap_or(chrono_tz::UTC);

    let table = TimeTable::new(event_id, response.url, timezone, days);
    debug!(
        event_id,
        days = table.days().len(),
        sessions = table.session_count(),
        timezone = %timezone,
        "decoded timetable"
    );
    Ok(table)
}

fn decode_day(key: &str, entries: DayEntries) -> ProviderResult<Day> {
    let date = NaiveDate::parse_from_str(key, "%Y%m%d")
        .map_err(|e| ProviderError::invalid_response(format!("invalid day key '{key}': {e}")))?;
    let sessions = entries
        .into_iter()
        .map(|(entry_key, raw)| decode_session(entry_key, raw))
        .collect::<ProviderResult<Vec<_>>>()?;
    Ok(Day::new(date, sessions))
}

fn decode_session(key: String, mut raw: RawEntry) -> ProviderResult<Session> {
    let contributions = raw
        .entries
        .take()
        .unwrap_or_default()
        .into_iter()
        .map(|(child_key, child)| decode_contribution(child_key, child))
        .collect::<ProviderResult<Vec<_>>>()?;
    let room = std::mem::take(&mut raw.room);
    Ok(Session::new(decode_span(key, &mut raw)?, room, contributions))
}

fn decode_contribution(key: String, mut raw: RawEntry) -> ProviderResult<Contribution> {
    let presenters = raw
        .presenters
        .take()
        .unwrap_or_default()
        .into_iter()
        .map(decode_presenter)
        .collect();
    let url = std::mem::take(&mut raw.url);
    Ok(Contribution::new(decode_span(key, &mut raw)?)
        .with_url(url)
        .with_presenters(presenters))
}

fn decode_span(key: String, raw: &mut RawEntry) -> ProviderResult<TimeSpan> {
    let start = resolve_time(&raw.start_date)?;
    let end = resolve_time(&raw.end_date)?;
    let id = if raw.id.is_empty() {
        key
    } else {
        std::mem::take(&mut raw.id)
    };
    Ok(TimeSpan::new(id, std::mem::take(&mut raw.title), start, end)
        .with_description(std::mem::take(&mut raw.description))
        .with_location(std::mem::take(&mut raw.location))
        .with_duration(raw.duration.map(Duration::minutes)))
}

fn decode_presenter(raw: RawPresenter) -> Presenter {
    Presenter {
        name: raw.name,
        affiliation: raw.affiliation,
        email: raw.email,
        kind: raw.kind,
    }
}

fn resolve_time(raw: &RawTime) -> ProviderResult<Timestamp> {
    let tz = parse_zone(&raw.tz).map_err(|e| ProviderError::invalid_response(e.to_string()))?;
    let text = format!("{} {}", raw.date, raw.time);
    let naive = NaiveDateTime::parse_from_str(&text, LOCAL_TIME_FORMAT)
        .map_err(|e| ProviderError::invalid_response(format!("invalid time '{text}': {e}")))?;
    resolve_local(naive, tz).ok_or_else(|| {
        ProviderError::invalid_response(format!("local time '{text}' does not exist in {tz}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;

    const EXPORT: &str = r#"{
        "count": 1,
        "_type": "HTTPAPIResult",
        "url": "https://indico.in2p3.fr/export/timetable/12779.json?pretty=yes",
        "ts": 1474531200,
        "results": {
            "12779": {
                "20160927": {
                    "s2": {
                        "id": "s2",
                        "title": "Calcul",
                        "room": "Amphi",
                        "startDate": {"date": "2016-09-27", "time": "11:00:00", "tz": "Europe/Paris"},
                        "endDate": {"date": "2016-09-27", "time": "12:30:00", "tz": "Europe/Paris"},
                        "duration": 0,
                        "entries": {}
                    },
                    "s1": {
                        "id": "s1",
                        "title": "Physique",
                        "room": "Salle 1",
                        "startDate": {"date": "2016-09-27", "time": "09:00:00", "tz": "Europe/Paris"},
                        "endDate": {"date": "2016-09-27", "time": "10:30:00", "tz": "Europe/Paris"},
                        "duration": 90,
                        "entries": {
                            "c2": {
                                "id": "c2",
                                "title": "Second",
                                "startDate": {"date": "2016-09-27", "time": "09:30:00", "tz": "Europe/Paris"},
                                "endDate": {"date": "2016-09-27", "time": "09:50:00", "tz": "Europe/Paris"},
                                "duration": 25,
                                "url": "https://indico.in2p3.fr/event/12779/contributions/2",
                                "presenters": [
                                    {"_type": "ContributionParticipation", "name": "Dr Toto", "affiliation": "Navire Amiral", "email": "toto@in2p3.fr"}
                                ]
                            },
                            "c1": {
                                "id": "c1",
                                "title": "First",
                                "startDate": {"date": "2016-09-27", "time": "09:00:00", "tz": "Europe/Paris"},
                                "endDate": {"date": "2016-09-27", "time": "09:30:00", "tz": "Europe/Paris"}
                            }
                        }
                    }
                },
                "20160926": {
                    "s0": {
                        "id": "s0",
                        "title": "Accueil",
                        "startDate": {"date": "2016-09-26", "time": "14:45:00", "tz": "Europe/Paris"},
                        "endDate": {"date": "2016-09-26", "time": "15:15:00", "tz": "Europe/Paris"}
                    }
                }
            }
        }
    }"#;

    #[test]
    fn decodes_days_sessions_and_contributions() {
        let table = parse_timetable(12779, EXPORT).unwrap();
        assert_eq!(table.event_id(), 12779);
        assert_eq!(table.timezone(), Paris);
        assert!(table.url().contains("/export/timetable/12779.json"));

        let dates: Vec<_> = table.days().iter().map(|d| d.date().to_string()).collect();
        assert_eq!(dates, vec!["2016-09-26", "2016-09-27"]);

        let day = &table.days()[1];
        let ids: Vec<_> = day.sessions().iter().map(|s| s.span().id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);

        let physique = &day.sessions()[0];
        assert_eq!(physique.room(), "Salle 1");
        assert_eq!(
            physique.span().start,
            Paris.with_ymd_and_hms(2016, 9, 27, 9, 0, 0).unwrap()
        );
        let titles: Vec<_> = physique
            .contributions()
            .iter()
            .map(|c| c.span.title.as_str())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);

        let second = &physique.contributions()[1];
        assert_eq!(second.presenters[0].name, "Dr Toto");
        assert_eq!(second.presenters[0].kind, "ContributionParticipation");
        assert!(second.url.ends_with("/contributions/2"));
    }

    #[test]
    fn durations_are_kept_or_derived() {
        let table = parse_timetable(12779, EXPORT).unwrap();
        let day = &table.days()[1];
        // Explicit, disagreeing with the bounds.
        assert_eq!(day.sessions()[0].contributions()[1].span.duration, Duration::minutes(25));
        // Absent.
        assert_eq!(day.sessions()[0].contributions()[0].span.duration, Duration::minutes(30));
        // Zero.
        assert_eq!(day.sessions()[1].span().duration, Duration::minutes(90));
    }

    #[test]
    fn unknown_event_is_not_found() {
        let err = parse_timetable(1, EXPORT).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotFound);
        assert_eq!(err.message(), "no event with id=1");
    }

    #[test]
    fn event_without_days_is_not_found() {
        let err = parse_timetable(5, r#"{"results": {"5": {}}}"#).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotFound);
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_timetable(1, "<html>maintenance</html>").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::InvalidResponse);
    }

    #[test]
    fn bad_zone_is_invalid_response() {
        let body = r#"{"results": {"7": {"20160926": {"s": {
            "startDate": {"date": "2016-09-26", "time": "09:00:00", "tz": "Nowhere/Land"},
            "endDate": {"date": "2016-09-26", "time": "10:00:00", "tz": "Nowhere/Land"}
        }}}}}"#;
        let err = parse_timetable(7, body).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::InvalidResponse);
        assert!(err.message().contains("Nowhere/Land"));
    }

    #[test]
    fn missing_id_falls_back_to_entry_key() {
        let body = r#"{"results": {"7": {"20160926": {"key-1": {
            "title": "No id",
            "startDate": {"date": "2016-09-26", "time": "09:00:00", "tz": "UTC"},
            "endDate": {"date": "2016-09-26", "time": "10:00:00", "tz": "UTC"}
        }}}}}"#;
        let table = parse_timetable(7, body).unwrap();
        assert_eq!(table.days()[0].sessions()[0].span().id, "key-1");
        assert_eq!(table.timezone(), chrono_tz::UTC);
    }
}
