use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::store::Store;

/// One row of the live attendance report: an attendance record joined
/// against the member it refers to.
#[derive(Clone, Debug, Serialize)]
pub struct PresentMember {
    /// The ID of the member.
    pub id: Uuid,

    pub name: String,

    pub email: String,

    pub phone: Option<String>,

    /// When the attendance was marked.
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,

    #[serde(rename = "isFirstTime")]
    pub is_first_time: bool,

    pub manual: bool,
}

/// Per-session tallies. Total members counts the whole membership and is
/// independent of the session.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct SessionStatistics {
    pub total_present: i64,
    pub first_time_count: i64,
    pub total_members: i64,
}

/// One row of the full membership report: present or absent against the
/// currently active session.
#[derive(Clone, Debug, Serialize)]
pub struct MemberPresence {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub present: bool,
}

/// The attendance report for the active session, ordered by mark time.
/// Records whose member has since been deleted are dropped by the join,
/// never an error. No active session yields an empty report.
pub async fn current_attendance(
    store: &(dyn Store + Send + Sync),
) -> Result<Vec<PresentMember>, BackendError> {
    match store.active_session().await? {
        Some(session) => store.session_attendance(session.id()).await,
        None => Ok(vec![]),
    }
}

pub async fn session_statistics(
    store: &(dyn Store + Send + Sync),
    session_id: &Uuid,
) -> Result<SessionStatistics, BackendError> {
    let (total_present, first_time_count) = store.session_counts(session_id).await?;
    let total_members = store.count_members().await?;

    Ok(SessionStatistics {
        total_present,
        first_time_count,
        total_members,
    })
}

/// Every member flagged present or absent against the active session. With
/// no active session every member is reported absent.
pub async fn full_membership(
    store: &(dyn Store + Send + Sync),
) -> Result<Vec<MemberPresence>, BackendError> {
    let active = store.active_session().await?;

    store
        .membership_presence(active.as_ref().map(|session| *session.id()))
        .await
}
