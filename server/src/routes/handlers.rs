use std::time::{Duration, Instant};

use log::debug;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{html, json, with_header, with_status, Reply},
};

use crate::attendance::{confirmation_message, AttendanceRecord, ManualMarkForm, MarkForm};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::member::{Member, RegistrationForm};
use crate::pages;
use crate::qr;
use crate::reports;
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};
use crate::session::{CreationForm, Session};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn health(environment: Environment) -> RouteResult {
    timed! {
        json(&SuccessResponse::Health {
            status: "ok",
            database: environment.store.backend().name(),
        })
    }
}

pub async fn members(environment: Environment) -> RouteResult {
    timed! {
        let members = environment
            .store
            .list_members()
            .await
            .map_err(|e: BackendError| Rejection::new(Context::members(), e))?;

        json(&SuccessResponse::Members(members))
    }
}

pub async fn register(environment: Environment, form: RegistrationForm) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::register(), e);

        let member = Member::register(form).map_err(error_handler)?;

        debug!(environment.logger, "Registering member..."; "id" => format!("{}", member.id()));

        // the store's unique email index is authoritative; there is no
        // pre-check here
        environment
            .store
            .insert_member(&member)
            .await
            .map_err(error_handler)?;

        with_status(json(&SuccessResponse::Member(member)), StatusCode::CREATED)
    }
}

pub async fn delete_member(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete_member(id.clone()), e);

        let member_id = Uuid::parse_str(&id)
            .map_err(|_| BackendError::InvalidId(id.clone()))
            .map_err(error_handler)?;

        debug!(environment.logger, "Deleting member..."; "id" => &id);

        environment
            .store
            .delete_member(&member_id)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Deleted {
            message: format!("member {} deleted", member_id),
        })
    }
}

pub async fn create_session(environment: Environment, form: CreationForm) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create_session(), e);

        let session = Session::create(form, &environment.urls).map_err(error_handler)?;

        debug!(
            environment.logger,
            "Creating session...";
            "id" => format!("{}", session.id()),
            "name" => session.name()
        );

        // deactivate-then-insert is not atomic; see the notes in DESIGN.md
        // on concurrent session creation
        let deactivated = environment
            .store
            .deactivate_sessions()
            .await
            .map_err(error_handler)?;

        if deactivated > 0 {
            debug!(environment.logger, "Deactivated previous sessions"; "count" => deactivated);
        };

        environment
            .store
            .insert_session(&session)
            .await
            .map_err(error_handler)?;

        session_with_qr(session).map_err(error_handler)?
    }
}

pub async fn active_session(environment: Environment) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::active_session(), e);

        let option = environment
            .store
            .active_session()
            .await
            .map_err(error_handler)?;

        match option {
            Some(session) => {
                with_status(session_with_qr(session).map_err(error_handler)?, StatusCode::OK)
            }
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn session_stats(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::stats(id.clone()), e);

        let session_id = Uuid::parse_str(&id)
            .map_err(|_| BackendError::InvalidId(id.clone()))
            .map_err(error_handler)?;

        let statistics = reports::session_statistics(&*environment.store, &session_id)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Statistics(statistics))
    }
}

pub async fn mark(environment: Environment, form: MarkForm) -> RouteResult {
    timed! {
        let context = Context::mark(form.session_id.clone(), form.member_id.clone());
        let error_handler = move |e: BackendError| Rejection::new(context.clone(), e);

        let session_id = parse_id(form.session_id, "sessionId").map_err(&error_handler)?;
        let member_id = parse_id(form.member_id, "memberId").map_err(&error_handler)?;

        let session = environment
            .store
            .find_session(&session_id)
            .await
            .map_err(&error_handler)?
            .filter(Session::active)
            .ok_or(BackendError::SessionNotActive)
            .map_err(&error_handler)?;

        let reply = record_attendance(&environment, session, member_id, false)
            .await
            .map_err(&error_handler)?;

        json(&reply)
    }
}

pub async fn mark_manual(environment: Environment, form: ManualMarkForm) -> RouteResult {
    timed! {
        let context = Context::manual_mark(form.member_id.clone());
        let error_handler = move |e: BackendError| Rejection::new(context.clone(), e);

        let member_id = parse_id(form.member_id, "memberId").map_err(&error_handler)?;

        let session = environment
            .store
            .active_session()
            .await
            .map_err(&error_handler)?
            .ok_or(BackendError::NoActiveSession)
            .map_err(&error_handler)?;

        let reply = record_attendance(&environment, session, member_id, true)
            .await
            .map_err(&error_handler)?;

        json(&reply)
    }
}

pub async fn current_report(environment: Environment) -> RouteResult {
    timed! {
        let report = reports::current_attendance(&*environment.store)
            .await
            .map_err(|e: BackendError| Rejection::new(Context::current_report(), e))?;

        json(&SuccessResponse::Report(report))
    }
}

pub async fn membership_report(environment: Environment) -> RouteResult {
    timed! {
        let report = reports::full_membership(&*environment.store)
            .await
            .map_err(|e: BackendError| Rejection::new(Context::membership_report(), e))?;

        json(&SuccessResponse::MembershipReport(report))
    }
}

pub async fn scan(environment: Environment, id: String) -> RouteResult {
    timed! {
        let session = match Uuid::parse_str(&id) {
            Ok(session_id) => environment
                .store
                .find_session(&session_id)
                .await
                .map_err(|e: BackendError| Rejection::new(Context::active_session(), e))?
                .filter(Session::active),
            Err(_) => None,
        };

        match session {
            Some(session) => {
                debug!(environment.logger, "Serving scan page..."; "session" => &id);
                Box::new(html(pages::scan(&session))) as Box<dyn Reply>
            }
            None => Box::new(with_status(html(pages::expired()), StatusCode::NOT_FOUND)),
        }
    }
}

pub async fn dashboard(_environment: Environment) -> RouteResult {
    timed! {
        html(pages::dashboard())
    }
}

/// Steps 2–7 of marking attendance, shared by the self-scan and manual
/// paths. The existence pre-check is best-effort: under a race the store's
/// uniqueness guarantee produces the same `AlreadyMarked`.
async fn record_attendance(
    environment: &Environment,
    session: Session,
    member_id: Uuid,
    manual: bool,
) -> Result<SuccessResponse<'static>, BackendError> {
    let store = &environment.store;

    let member = store
        .find_member(&member_id)
        .await?
        .ok_or(BackendError::MemberNotFound(member_id))?;

    if store.find_record(session.id(), &member_id).await?.is_some() {
        return Err(BackendError::AlreadyMarked);
    }

    let prior = store.count_member_records(&member_id).await?;
    let first_time = prior == 0;

    let record = AttendanceRecord::new(*session.id(), member_id, first_time, manual);

    if first_time {
        store.mark_first_seen(&member_id, record.marked_at()).await?;
    }

    store.insert_record(&record).await?;

    debug!(
        environment.logger,
        "Marked attendance";
        "session" => format!("{}", session.id()),
        "member" => format!("{}", member_id),
        "first_time" => first_time,
        "manual" => manual
    );

    Ok(SuccessResponse::Marked {
        message: confirmation_message(member.name(), first_time),
        is_first_time: first_time,
        record_id: *record.id(),
        timestamp: record.marked_at(),
    })
}

fn session_with_qr(session: Session) -> Result<warp::reply::Json, BackendError> {
    let qr_data = session.scan_url().to_string();
    let qr_code_image = qr::data_uri(&qr_data)?;

    Ok(json(&SuccessResponse::Session {
        session,
        qr_code_image,
        qr_data,
    }))
}

fn parse_id(raw: Option<String>, field: &'static str) -> Result<Uuid, BackendError> {
    let raw = raw.ok_or(BackendError::MissingField(field))?;

    Uuid::parse_str(&raw).map_err(|_| BackendError::InvalidId(raw))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
