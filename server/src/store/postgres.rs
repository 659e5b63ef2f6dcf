use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::postgres::{PgPool, PgRow};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::attendance::AttendanceRecord;
use crate::errors::BackendError;
use crate::member::Member;
use crate::reports::{MemberPresence, PresentMember};
use crate::session::Session;

use super::{BackendKind, Store};

const MEMBERS_EMAIL_CONSTRAINT: &str = "members_email";
const RECORDS_PAIR_CONSTRAINT: &str = "attendance_records_session_member";

/// The persistent backend. Uniqueness is enforced by the declared unique
/// indexes; violations are translated by constraint name.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

// these can be simplified once async functions in traits are stabilized
impl Store for PgStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn list_members(&self) -> BoxFuture<Result<Vec<Member>, BackendError>> {
        async move {
            let query = sqlx::query(include_str!("queries/list_members.sql"));

            let members = query
                .try_map(|row: PgRow| member_from_row(&row))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(members)
        }
        .boxed()
    }

    fn find_member(&self, id: &Uuid) -> BoxFuture<Result<Option<Member>, BackendError>> {
        let id = *id;

        async move {
            let query = sqlx::query(include_str!("queries/find_member.sql"));

            let member = query
                .bind(id)
                .try_map(|row: PgRow| member_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(member)
        }
        .boxed()
    }

    fn insert_member(&self, member: &Member) -> BoxFuture<Result<(), BackendError>> {
        let member = member.clone();

        async move {
            let query = sqlx::query(include_str!("queries/create_member.sql"));

            query
                .bind(member.id)
                .bind(&member.name)
                .bind(&member.email)
                .bind(&member.phone)
                .bind(&member.address)
                .bind(member.created_at)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
        .boxed()
    }

    fn delete_member(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let query = sqlx::query(include_str!("queries/delete_member.sql"));

            let count = query
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();

            if count == 0 {
                Err(BackendError::MemberNotFound(id))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn count_members(&self) -> BoxFuture<Result<i64, BackendError>> {
        async move {
            let query = sqlx::query_as::<_, (i64,)>(include_str!("queries/count_members.sql"));

            let (count,) = query.fetch_one(&self.pool).await.map_err(map_sqlx_error)?;

            Ok(count)
        }
        .boxed()
    }

    fn mark_first_seen(
        &self,
        id: &Uuid,
        at: OffsetDateTime,
    ) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let query = sqlx::query(include_str!("queries/mark_first_seen.sql"));

            // no-op when already set; the first value wins
            query
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
        .boxed()
    }

    fn insert_session(&self, session: &Session) -> BoxFuture<Result<(), BackendError>> {
        let session = session.clone();

        async move {
            let query = sqlx::query(include_str!("queries/create_session.sql"));

            query
                .bind(session.id)
                .bind(&session.name)
                .bind(session.held_on)
                .bind(session.scan_url.as_str())
                .bind(session.active)
                .bind(session.created_at)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
        .boxed()
    }

    fn find_session(&self, id: &Uuid) -> BoxFuture<Result<Option<Session>, BackendError>> {
        let id = *id;

        async move {
            let query = sqlx::query(include_str!("queries/find_session.sql"));

            let session = query
                .bind(id)
                .try_map(|row: PgRow| session_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(session)
        }
        .boxed()
    }

    fn active_session(&self) -> BoxFuture<Result<Option<Session>, BackendError>> {
        async move {
            let query = sqlx::query(include_str!("queries/active_session.sql"));

            let session = query
                .try_map(|row: PgRow| session_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(session)
        }
        .boxed()
    }

    fn deactivate_sessions(&self) -> BoxFuture<Result<u64, BackendError>> {
        async move {
            let query = sqlx::query(include_str!("queries/deactivate_sessions.sql"));

            let count = query
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();

            Ok(count)
        }
        .boxed()
    }

    fn insert_record(&self, record: &AttendanceRecord) -> BoxFuture<Result<(), BackendError>> {
        let record = record.clone();

        async move {
            let query = sqlx::query(include_str!("queries/create_record.sql"));

            query
                .bind(record.id)
                .bind(record.session_id)
                .bind(record.member_id)
                .bind(record.marked_at)
                .bind(record.first_time)
                .bind(record.manual)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
        .boxed()
    }

    fn find_record(
        &self,
        session_id: &Uuid,
        member_id: &Uuid,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>> {
        let session_id = *session_id;
        let member_id = *member_id;

        async move {
            let query = sqlx::query(include_str!("queries/find_record.sql"));

            let record = query
                .bind(session_id)
                .bind(member_id)
                .try_map(|row: PgRow| record_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(record)
        }
        .boxed()
    }

    fn count_member_records(&self, member_id: &Uuid) -> BoxFuture<Result<i64, BackendError>> {
        let member_id = *member_id;

        async move {
            let query =
                sqlx::query_as::<_, (i64,)>(include_str!("queries/count_member_records.sql"));

            let (count,) = query
                .bind(member_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(count)
        }
        .boxed()
    }

    fn session_attendance(
        &self,
        session_id: &Uuid,
    ) -> BoxFuture<Result<Vec<PresentMember>, BackendError>> {
        let session_id = *session_id;

        async move {
            let query = sqlx::query(include_str!("queries/session_attendance.sql"));

            // the inner join drops records whose member was deleted
            let rows = query
                .bind(session_id)
                .try_map(|row: PgRow| {
                    Ok(PresentMember {
                        id: try_get(&row, "member_id")?,
                        name: try_get(&row, "name")?,
                        email: try_get(&row, "email")?,
                        phone: try_get(&row, "phone")?,
                        timestamp: try_get(&row, "marked_at")?,
                        is_first_time: try_get(&row, "first_time")?,
                        manual: try_get(&row, "manual")?,
                    })
                })
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(rows)
        }
        .boxed()
    }

    fn session_counts(&self, session_id: &Uuid) -> BoxFuture<Result<(i64, i64), BackendError>> {
        let session_id = *session_id;

        async move {
            let query =
                sqlx::query_as::<_, (i64, i64)>(include_str!("queries/session_counts.sql"));

            let counts = query
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(counts)
        }
        .boxed()
    }

    fn membership_presence(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<Result<Vec<MemberPresence>, BackendError>> {
        async move {
            let query = sqlx::query(include_str!("queries/membership_presence.sql"));

            let rows = query
                .bind(session_id)
                .try_map(|row: PgRow| {
                    Ok(MemberPresence {
                        id: try_get(&row, "id")?,
                        name: try_get(&row, "name")?,
                        email: try_get(&row, "email")?,
                        present: try_get(&row, "present")?,
                    })
                })
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(rows)
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<()> {
        async move {
            self.pool.close().await;
        }
        .boxed()
    }
}

fn member_from_row(row: &PgRow) -> Result<Member, sqlx::Error> {
    Ok(Member {
        id: try_get(row, "id")?,
        name: try_get(row, "name")?,
        email: try_get(row, "email")?,
        phone: try_get(row, "phone")?,
        address: try_get(row, "address")?,
        created_at: try_get(row, "created_at")?,
        first_seen_at: try_get(row, "first_seen_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    let scan_url: String = try_get(row, "scan_url")?;
    let scan_url = Url::parse(&scan_url).map_err(|source| {
        // we control the URLs that go into the database, but just for
        // completeness...
        sqlx::Error::Decode(Box::new(source))
    })?;

    Ok(Session {
        id: try_get(row, "id")?,
        name: try_get(row, "name")?,
        held_on: try_get(row, "held_on")?,
        scan_url,
        active: try_get(row, "active")?,
        created_at: try_get(row, "created_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<AttendanceRecord, sqlx::Error> {
    Ok(AttendanceRecord {
        id: try_get(row, "id")?,
        session_id: try_get(row, "session_id")?,
        member_id: try_get(row, "member_id")?,
        marked_at: try_get(row, "marked_at")?,
        first_time: try_get(row, "first_time")?,
        manual: try_get(row, "manual")?,
    })
}

fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
    row: &'a PgRow,
    column: &str,
) -> Result<T, sqlx::Error> {
    use sqlx::Row;

    row.try_get(column)
}

fn map_sqlx_error(error: sqlx::Error) -> BackendError {
    use sqlx::Error;

    match error {
        Error::Database(ref e) if e.constraint() == Some(MEMBERS_EMAIL_CONSTRAINT) => {
            BackendError::EmailExists
        }
        Error::Database(ref e) if e.constraint() == Some(RECORDS_PAIR_CONSTRAINT) => {
            BackendError::AlreadyMarked
        }
        _ => BackendError::Sqlx { source: error },
    }
}
