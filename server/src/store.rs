use std::sync::Arc;

use futures::future::BoxFuture;
use log::{info, warn, Logger};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::attendance::AttendanceRecord;
use crate::errors::BackendError;
use crate::member::Member;
use crate::reports::{MemberPresence, PresentMember};
use crate::session::Session;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which backend a store handle talks to, reported by `/health`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    Postgres,
    Fallback,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Fallback => "fallback",
        }
    }
}

/// The uniform interface over the three collections. Both implementations
/// behave identically from the caller's point of view; uniqueness on
/// `members.email` and `(session_id, member_id)` is authoritative at this
/// layer, not in any pre-check the caller makes.
pub trait Store {
    fn backend(&self) -> BackendKind;

    // members

    fn list_members(&self) -> BoxFuture<Result<Vec<Member>, BackendError>>;

    fn find_member(&self, id: &Uuid) -> BoxFuture<Result<Option<Member>, BackendError>>;

    /// Inserts a member, failing with `EmailExists` when the normalized
    /// email is already registered.
    fn insert_member(&self, member: &Member) -> BoxFuture<Result<(), BackendError>>;

    /// Deletes a member by ID, failing with `MemberNotFound` when absent.
    fn delete_member(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn count_members(&self) -> BoxFuture<Result<i64, BackendError>>;

    /// Sets the member's first-seen timestamp if and only if it is unset.
    fn mark_first_seen(
        &self,
        id: &Uuid,
        at: OffsetDateTime,
    ) -> BoxFuture<Result<(), BackendError>>;

    // sessions

    fn insert_session(&self, session: &Session) -> BoxFuture<Result<(), BackendError>>;

    fn find_session(&self, id: &Uuid) -> BoxFuture<Result<Option<Session>, BackendError>>;

    fn active_session(&self) -> BoxFuture<Result<Option<Session>, BackendError>>;

    /// Marks every session inactive, returning how many were active.
    fn deactivate_sessions(&self) -> BoxFuture<Result<u64, BackendError>>;

    // attendance records

    /// Inserts a record, failing with `AlreadyMarked` when one already
    /// exists for the same (session, member) pair.
    fn insert_record(&self, record: &AttendanceRecord) -> BoxFuture<Result<(), BackendError>>;

    fn find_record(
        &self,
        session_id: &Uuid,
        member_id: &Uuid,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>>;

    /// Counts records for the member across all sessions.
    fn count_member_records(&self, member_id: &Uuid) -> BoxFuture<Result<i64, BackendError>>;

    /// The session's records joined against the member collection, ordered
    /// by mark time. Records whose member no longer resolves are dropped.
    fn session_attendance(
        &self,
        session_id: &Uuid,
    ) -> BoxFuture<Result<Vec<PresentMember>, BackendError>>;

    /// (total records, first-time records) for the session.
    fn session_counts(&self, session_id: &Uuid) -> BoxFuture<Result<(i64, i64), BackendError>>;

    /// Every member flagged present or absent against the given session
    /// (absent everywhere when `None`).
    fn membership_presence(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<Result<Vec<MemberPresence>, BackendError>>;

    /// Releases the underlying connection, if any.
    fn close(&self) -> BoxFuture<()>;
}

/// Chooses the backend for the life of the process: Postgres when a
/// connection can be established at startup, otherwise the in-memory
/// fallback. The choice is never revisited.
pub async fn connect(
    logger: Arc<Logger>,
    connection_string: &str,
) -> Arc<dyn Store + Send + Sync> {
    match sqlx::PgPool::connect(connection_string).await {
        Ok(pool) => {
            info!(logger, "Connected to database"; "backend" => BackendKind::Postgres.name());
            Arc::new(PgStore::new(pool))
        }
        Err(e) => {
            warn!(
                logger,
                "Database unreachable, falling back to in-memory store";
                "error" => format!("{}", e)
            );
            Arc::new(MemoryStore::new())
        }
    }
}
