use std::collections::BTreeMap;
use std::sync::RwLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::attendance::AttendanceRecord;
use crate::errors::BackendError;
use crate::member::Member;
use crate::reports::{MemberPresence, PresentMember};
use crate::session::Session;

use super::{BackendKind, Store};

#[derive(Default)]
struct State {
    members: BTreeMap<Uuid, Member>,
    sessions: BTreeMap<Uuid, Session>,
    records: BTreeMap<Uuid, AttendanceRecord>,
}

/// The in-process fallback backend: ordered maps behind a single lock.
/// Uniqueness is checked by linear scan inside the write guard, so unlike
/// the persistent backend the check and the insert cannot interleave.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn list_members(&self) -> BoxFuture<Result<Vec<Member>, BackendError>> {
        async move {
            let state = self.state.read().unwrap();

            let mut members: Vec<Member> = state.members.values().cloned().collect();
            members.sort_by_key(|m| m.created_at);

            Ok(members)
        }
        .boxed()
    }

    fn find_member(&self, id: &Uuid) -> BoxFuture<Result<Option<Member>, BackendError>> {
        let id = *id;

        async move {
            let state = self.state.read().unwrap();

            Ok(state.members.get(&id).cloned())
        }
        .boxed()
    }

    fn insert_member(&self, member: &Member) -> BoxFuture<Result<(), BackendError>> {
        let member = member.clone();

        async move {
            let mut state = self.state.write().unwrap();

            if state.members.values().any(|m| m.email == member.email) {
                return Err(BackendError::EmailExists);
            }

            state.members.insert(member.id, member);

            Ok(())
        }
        .boxed()
    }

    fn delete_member(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let mut state = self.state.write().unwrap();

            match state.members.remove(&id) {
                Some(_) => Ok(()),
                None => Err(BackendError::MemberNotFound(id)),
            }
        }
        .boxed()
    }

    fn count_members(&self) -> BoxFuture<Result<i64, BackendError>> {
        async move {
            let state = self.state.read().unwrap();

            Ok(state.members.len() as i64)
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
            let mut state = self.state.write().unwrap();

            if let Some(member) = state.members.get_mut(&id) {
                // the first value wins
                if member.first_seen_at.is_none() {
                    member.first_seen_at = Some(at);
                }
            }

            Ok(())
        }
        .boxed()
    }

    fn insert_session(&self, session: &Session) -> BoxFuture<Result<(), BackendError>> {
        let session = session.clone();

        async move {
            let mut state = self.state.write().unwrap();

            state.sessions.insert(session.id, session);

            Ok(())
        }
        .boxed()
    }

    fn find_session(&self, id: &Uuid) -> BoxFuture<Result<Option<Session>, BackendError>> {
        let id = *id;

        async move {
            let state = self.state.read().unwrap();

            Ok(state.sessions.get(&id).cloned())
        }
        .boxed()
    }

    fn active_session(&self) -> BoxFuture<Result<Option<Session>, BackendError>> {
        async move {
            let state = self.state.read().unwrap();

            let session = state
                .sessions
                .values()
                .filter(|s| s.active)
                .max_by_key(|s| s.created_at)
                .cloned();

            Ok(session)
        }
        .boxed()
    }

    fn deactivate_sessions(&self) -> BoxFuture<Result<u64, BackendError>> {
        async move {
            let mut state = self.state.write().unwrap();

            let mut count = 0;
            for session in state.sessions.values_mut().filter(|s| s.active) {
                session.active = false;
                count += 1;
            }

            Ok(count)
        }
        .boxed()
    }

    fn insert_record(&self, record: &AttendanceRecord) -> BoxFuture<Result<(), BackendError>> {
        let record = record.clone();

        async move {
            let mut state = self.state.write().unwrap();

            let duplicate = state
                .records
                .values()
                .any(|r| r.session_id == record.session_id && r.member_id == record.member_id);
            if duplicate {
                return Err(BackendError::AlreadyMarked);
            }

            state.records.insert(record.id, record);

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
            let state = self.state.read().unwrap();

            let record = state
                .records
                .values()
                .find(|r| r.session_id == session_id && r.member_id == member_id)
                .cloned();

            Ok(record)
        }
        .boxed()
    }

    fn count_member_records(&self, member_id: &Uuid) -> BoxFuture<Result<i64, BackendError>> {
        let member_id = *member_id;

        async move {
            let state = self.state.read().unwrap();

            Ok(state
                .records
                .values()
                .filter(|r| r.member_id == member_id)
                .count() as i64)
        }
        .boxed()
    }

    fn session_attendance(
        &self,
        session_id: &Uuid,
    ) -> BoxFuture<Result<Vec<PresentMember>, BackendError>> {
        let session_id = *session_id;

        async move {
            let state = self.state.read().unwrap();

            let mut records: Vec<&AttendanceRecord> = state
                .records
                .values()
                .filter(|r| r.session_id == session_id)
                .collect();
            records.sort_by_key(|r| r.marked_at);

            // records whose member was deleted are unjoinable and dropped
            let rows = records
                .into_iter()
                .filter_map(|r| {
                    state.members.get(&r.member_id).map(|m| PresentMember {
                        id: m.id,
                        name: m.name.clone(),
                        email: m.email.clone(),
                        phone: m.phone.clone(),
                        timestamp: r.marked_at,
                        is_first_time: r.first_time,
                        manual: r.manual,
                    })
                })
                .collect();

            Ok(rows)
        }
        .boxed()
    }

    fn session_counts(&self, session_id: &Uuid) -> BoxFuture<Result<(i64, i64), BackendError>> {
        let session_id = *session_id;

        async move {
            let state = self.state.read().unwrap();

            let mut total = 0;
            let mut first_time = 0;
            for record in state.records.values().filter(|r| r.session_id == session_id) {
                total += 1;
                if record.first_time {
                    first_time += 1;
                }
            }

            Ok((total, first_time))
        }
        .boxed()
    }

    fn membership_presence(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<Result<Vec<MemberPresence>, BackendError>> {
        async move {
            let state = self.state.read().unwrap();

            let mut members: Vec<&Member> = state.members.values().collect();
            members.sort_by(|a, b| a.name.cmp(&b.name));

            let rows = members
                .into_iter()
                .map(|m| {
                    let present = session_id
                        .map(|session| {
                            state
                                .records
                                .values()
                                .any(|r| r.session_id == session && r.member_id == m.id)
                        })
                        .unwrap_or(false);

                    MemberPresence {
                        id: m.id,
                        name: m.name.clone(),
                        email: m.email.clone(),
                        present,
                    }
                })
                .collect();

            Ok(rows)
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<()> {
        async move {}.boxed()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::errors::BackendError;
    use crate::member::{Member, RegistrationForm};
    use crate::session::{CreationForm, Session};
    use crate::store::Store;
    use crate::urls::Urls;

    fn member(name: &str, email: &str) -> Member {
        Member::register(RegistrationForm {
            name: Some(name.to_owned()),
            email: Some(email.to_owned()),
            phone: None,
            address: None,
        })
        .unwrap()
    }

    fn session(name: &str) -> Session {
        Session::create(
            CreationForm {
                name: Some(name.to_owned()),
                date: None,
            },
            &Urls::new("http://attendance.test/"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let store = MemoryStore::new();

        store.insert_member(&member("Ada", "ada@x.com")).await.unwrap();

        match store.insert_member(&member("Other Ada", "ada@x.com")).await {
            Err(BackendError::EmailExists) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(store.count_members().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deactivation_clears_every_active_session() {
        let store = MemoryStore::new();

        store.insert_session(&session("First")).await.unwrap();
        store.insert_session(&session("Second")).await.unwrap();

        assert_eq!(store.deactivate_sessions().await.unwrap(), 2);
        assert!(store.active_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_marks_are_rejected() {
        use crate::attendance::AttendanceRecord;

        let store = MemoryStore::new();
        let s = Uuid::new_v4();
        let m = Uuid::new_v4();

        store
            .insert_record(&AttendanceRecord::new(s, m, true, false))
            .await
            .unwrap();

        match store
            .insert_record(&AttendanceRecord::new(s, m, false, true))
            .await
        {
            Err(BackendError::AlreadyMarked) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn attendance_drops_deleted_members_and_orders_by_time() {
        use crate::attendance::AttendanceRecord;

        let store = MemoryStore::new();
        let s = session("Sunday Service");
        store.insert_session(&s).await.unwrap();

        let ada = member("Ada", "ada@x.com");
        let grace = member("Grace", "grace@x.com");
        store.insert_member(&ada).await.unwrap();
        store.insert_member(&grace).await.unwrap();

        store
            .insert_record(&AttendanceRecord::new(*s.id(), ada.id, true, false))
            .await
            .unwrap();
        store
            .insert_record(&AttendanceRecord::new(*s.id(), grace.id, true, false))
            .await
            .unwrap();

        store.delete_member(&ada.id).await.unwrap();

        let report = store.session_attendance(s.id()).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].email, "grace@x.com");
    }

    #[tokio::test]
    async fn first_seen_is_set_only_once() {
        use time::OffsetDateTime;

        let store = MemoryStore::new();
        let ada = member("Ada", "ada@x.com");
        store.insert_member(&ada).await.unwrap();

        let first = OffsetDateTime::from_unix_timestamp(1_000_000);
        let second = OffsetDateTime::from_unix_timestamp(2_000_000);

        store.mark_first_seen(&ada.id, first).await.unwrap();
        store.mark_first_seen(&ada.id, second).await.unwrap();

        let stored = store.find_member(&ada.id).await.unwrap().unwrap();
        assert_eq!(stored.first_seen_at, Some(first));
    }
}
