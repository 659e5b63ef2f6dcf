use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::member::Member;
use crate::reports::{MemberPresence, PresentMember, SessionStatistics};
use crate::session::Session;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Deleted {
        message: String,
    },
    Health {
        status: &'a str,
        database: &'a str,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Marked {
        message: String,
        #[serde(rename = "isFirstTime")]
        is_first_time: bool,
        #[serde(rename = "recordId")]
        record_id: Uuid,
        #[serde(with = "time::serde::timestamp")]
        timestamp: OffsetDateTime,
    },
    Member(Member),
    Members(Vec<Member>),
    MembershipReport(Vec<MemberPresence>),
    Report(Vec<PresentMember>),
    /// A session plus its QR code: `qrData` is the scanned URL, and
    /// `qrCodeImage` the PNG data URI rendering of it.
    Session {
        #[serde(flatten)]
        session: Session,
        #[serde(rename = "qrCodeImage")]
        qr_code_image: String,
        #[serde(rename = "qrData")]
        qr_data: String,
    },
    Statistics(SessionStatistics),
}
