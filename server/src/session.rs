use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use url::Url;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::urls::Urls;

/// A single attendance-taking event. At most one session is active at any
/// time; creating a new session deactivates every other one.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The ID of the session.
    #[serde(rename = "sessionId")]
    pub(crate) id: Uuid,

    /// The display name.
    pub(crate) name: String,

    /// The day the session is held on.
    #[serde(rename = "date", with = "date_format")]
    pub(crate) held_on: Date,

    /// The URL attendees scan to reach the attendance page.
    pub(crate) scan_url: Url,

    /// Whether this is the currently active session.
    pub(crate) active: bool,

    /// The date and time the session was created.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) created_at: OffsetDateTime,
}

impl Session {
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn scan_url(&self) -> &Url {
        &self.scan_url
    }

    /// Builds a new active session with a fresh ID and a scan URL derived
    /// from the service's externally reachable base address. The date
    /// defaults to today (UTC) when the form omits it.
    pub fn create(form: CreationForm, urls: &Urls) -> Result<Session, BackendError> {
        let name = match form.name {
            Some(n) if !n.trim().is_empty() => n.trim().to_owned(),
            _ => return Err(BackendError::MissingField("sessionName")),
        };

        let held_on = match form.date {
            Some(raw) => Date::parse(&raw, DATE_FORMAT)
                .map_err(|_| BackendError::InvalidDate(raw))?,
            None => OffsetDateTime::now_utc().date(),
        };

        let id = Uuid::new_v4();

        Ok(Session {
            scan_url: urls.scan(&id),
            id,
            name,
            held_on,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

/// The user-submitted session fields.
#[derive(Clone, Debug, Deserialize)]
pub struct CreationForm {
    #[serde(rename = "sessionName")]
    pub name: Option<String>,

    /// Day of the session as `YYYY-MM-DD`.
    pub date: Option<String>,
}

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) mod date_format {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::Date;

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Date::parse(&raw, DATE_FORMAT).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{CreationForm, Session};
    use crate::errors::BackendError;
    use crate::urls::Urls;

    fn urls() -> Urls {
        Urls::new("http://attendance.test/")
    }

    #[test]
    fn creation_builds_active_session_with_scan_url() {
        let form = CreationForm {
            name: Some("Sunday Service".to_owned()),
            date: Some("2021-04-18".to_owned()),
        };

        let session = Session::create(form, &urls()).unwrap();

        assert!(session.active());
        assert_eq!(session.name(), "Sunday Service");
        assert_eq!(
            session.scan_url().as_str(),
            format!("http://attendance.test/scan/{}", session.id())
        );
        assert_eq!(session.held_on.format("%Y-%m-%d"), "2021-04-18");
    }

    #[test]
    fn creation_requires_a_name() {
        let form = CreationForm {
            name: Some("   ".to_owned()),
            date: None,
        };

        match Session::create(form, &urls()) {
            Err(BackendError::MissingField("sessionName")) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn creation_rejects_malformed_dates() {
        let form = CreationForm {
            name: Some("Evening Service".to_owned()),
            date: Some("18/04/2021".to_owned()),
        };

        match Session::create(form, &urls()) {
            Err(BackendError::InvalidDate(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
