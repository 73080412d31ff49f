//! Wire types of the Indico timetable export.
//!
//! `GET /export/timetable/{id}.json` answers with
//!
//! ```text
//! { "url": ..., "results": { "<event id>": { "<yyyymmdd>": { "<entry id>": Entry } } } }
//! ```
//!
//! where a top-level entry is a session whose `entries` map holds its
//! contributions. Indico is loose with nulls and numeric ids, so text fields
//! go through [`lenient_string`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub(crate) type DayEntries = HashMap<String, RawEntry>;

#[derive(Debug, Deserialize)]
pub(crate) struct TimetableResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default)]
    pub results: HashMap<String, HashMap<String, DayEntries>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub room: String,
    pub start_date: RawTime,
    pub end_date: RawTime,
    /// Minutes; absent or zero means "derive from the bounds".
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub entries: Option<HashMap<String, RawEntry>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default)]
    pub presenters: Option<Vec<RawPresenter>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTime {
    pub date: String,
    pub time: String,
    pub tz: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPresenter {
    #[serde(rename = "_type", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub affiliation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
}

/// Accepts a string, a number or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_nulls_and_numeric_ids() {
        let entry: RawEntry = serde_json::from_str(
            r#"{
                "id": 42,
                "title": "Welcome",
                "description": null,
                "startDate": {"date": "2016-09-26", "time": "14:45:00", "tz": "Europe/Paris"},
                "endDate": {"date": "2016-09-26", "time": "15:00:00", "tz": "Europe/Paris"},
                "presenters": null
            }"#,
        )
        .unwrap();
        assert_eq!(entry.id, "42");
        assert_eq!(entry.description, "");
        assert_eq!(entry.room, "");
        assert!(entry.duration.is_none());
        assert!(entry.presenters.is_none());
        assert!(entry.entries.is_none());
    }

    #[test]
    fn presenter_type_tag() {
        let p: RawPresenter = serde_json::from_str(
            r#"{"_type": "ContributionParticipation", "name": "Dr Toto", "affiliation": "LAPP"}"#,
        )
        .unwrap();
        assert_eq!(p.kind, "ContributionParticipation");
        assert_eq!(p.email, "");
    }
}
