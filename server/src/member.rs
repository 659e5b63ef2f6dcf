use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;

/// A single registered member.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The ID of the member.
    pub(crate) id: Uuid,

    /// The name provided at registration.
    pub(crate) name: String,

    /// The email address, normalized to lower case. Must be unique.
    pub(crate) email: String,

    /// The phone number provided, if any.
    pub(crate) phone: Option<String>,

    /// The address provided, if any.
    pub(crate) address: Option<String>,

    /// The date and time the member registered.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) created_at: OffsetDateTime,

    /// The date and time of the member's first-ever attendance record.
    /// Set once, never overwritten.
    #[serde(with = "time::serde::timestamp::option")]
    pub(crate) first_seen_at: Option<OffsetDateTime>,
}

impl Member {
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Validates a registration form and builds the member it describes,
    /// with a fresh ID and normalized email address.
    pub fn register(form: RegistrationForm) -> Result<Member, BackendError> {
        let name = required(form.name, "name")?;
        let email = normalize_email(&required(form.email, "email")?);

        if !email_is_valid(&email) {
            return Err(BackendError::InvalidEmail(email));
        }

        Ok(Member {
            id: Uuid::new_v4(),
            name,
            email,
            phone: form.phone.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()),
            address: form.address.map(|a| a.trim().to_owned()).filter(|a| !a.is_empty()),
            created_at: OffsetDateTime::now_utc(),
            first_seen_at: None,
        })
    }
}

/// The user-submitted registration fields. All fields are optional at the
/// wire level so that missing ones are rejected with a domain error rather
/// than a deserialization failure.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Normalizes an email address by trimming whitespace and lower-casing it.
pub fn normalize_email(email: impl AsRef<str>) -> String {
    email.as_ref().trim().to_lowercase()
}

/// Checks an address for the syntax this service requires: one `@`, a
/// non-empty local part, and a domain containing an inner dot.
pub fn email_is_valid(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');

    let local = match parts.next() {
        Some(l) if !l.is_empty() => l,
        _ => return false,
    };
    let domain = match parts.next() {
        Some(d) if !d.is_empty() => d,
        _ => return false,
    };

    if local.chars().any(char::is_whitespace) || domain.chars().any(char::is_whitespace) {
        return false;
    }

    domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

fn required(value: Option<String>, field: &'static str) -> Result<String, BackendError> {
    match value {
        Some(v) => {
            let v = v.trim().to_owned();
            if v.is_empty() {
                Err(BackendError::MissingField(field))
            } else {
                Ok(v)
            }
        }
        None => Err(BackendError::MissingField(field)),
    }
}
