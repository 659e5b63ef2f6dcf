use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Evidence that a member was present at a session. At most one record
/// exists per (session, member) pair; records are never updated.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// The ID of the record.
    pub(crate) id: Uuid,

    /// The session the member attended.
    pub(crate) session_id: Uuid,

    /// The member who attended. A weak reference: the member may since
    /// have been deleted, in which case reports drop this record.
    pub(crate) member_id: Uuid,

    /// When the attendance was marked.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) marked_at: OffsetDateTime,

    /// Whether this was the member's first-ever attendance record,
    /// computed from the historical count at creation time. Immutable.
    pub(crate) first_time: bool,

    /// Whether an organizer entered this record by hand rather than the
    /// member scanning the session code.
    pub(crate) manual: bool,
}

impl AttendanceRecord {
    pub fn new(session_id: Uuid, member_id: Uuid, first_time: bool, manual: bool) -> Self {
        AttendanceRecord {
            id: Uuid::new_v4(),
            session_id,
            member_id,
            marked_at: OffsetDateTime::now_utc(),
            first_time,
            manual,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn marked_at(&self) -> OffsetDateTime {
        self.marked_at
    }

    pub fn first_time(&self) -> bool {
        self.first_time
    }
}

/// The body of a self-scan marking request.
#[derive(Clone, Debug, Deserialize)]
pub struct MarkForm {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,

    #[serde(rename = "memberId")]
    pub member_id: Option<String>,
}

/// The body of a manual marking request; the session is always the
/// currently active one.
#[derive(Clone, Debug, Deserialize)]
pub struct ManualMarkForm {
    #[serde(rename = "memberId")]
    pub member_id: Option<String>,
}

/// The human-readable confirmation returned after a successful mark,
/// distinguishing a first-time welcome from a routine confirmation.
pub fn confirmation_message(name: &str, first_time: bool) -> String {
    if first_time {
        format!("Welcome, {}! Glad to have you with us for the first time.", name)
    } else {
        format!("Attendance recorded for {}.", name)
    }
}
