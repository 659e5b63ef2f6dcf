use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// Converts a domain rejection into the JSON error body. In production
/// mode 5xx responses carry no detail.
pub async fn format_rejection(
    logger: Arc<Logger>,
    production: bool,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        let flattened = r.flatten(production && status.is_server_error());

        return Ok(with_status(json(&flattened), status));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        AlreadyMarked | InvalidDate(..) | InvalidEmail(..) | InvalidId(..) | MissingField(..)
        | NoActiveSession | SessionNotActive => StatusCode::BAD_REQUEST,
        EmailExists => StatusCode::CONFLICT,
        MemberNotFound(..) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body, delete, get as g, path as p, path::param as par, post};

    use super::handlers;
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p("api"));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_members_route => members, rt; p("members"), end(), g());
    route!(make_register_route => register, rt; p("members"), end(), post(), body::json());
    route!(make_delete_member_route => delete_member, rt; p("members"), par::<String>(), end(), delete());
    route!(make_create_session_route => create_session, rt; p("sessions"), end(), post(), body::json());
    route!(make_active_session_route => active_session, rt; p("sessions"), p("active"), end(), g());
    route!(make_session_stats_route => session_stats, rt; p("sessions"), par::<String>(), p("stats"), end(), g());
    route!(make_mark_route => mark, rt; p("attendance"), end(), post(), body::json());
    route!(make_manual_mark_route => mark_manual, rt; p("attendance"), p("manual"), end(), post(), body::json());
    route!(make_current_report_route => current_report, rt; p("attendance"), p("current"), end(), g());
    route!(make_membership_report_route => membership_report, rt; p("reports"), p("members"), end(), g());

    pub fn make_scan_route(environment: Environment) -> Route {
        warp::any()
            .map(move || environment.clone())
            .and(p("scan"))
            .and(par::<String>())
            .and(end())
            .and(g())
            .and_then(handlers::scan)
            .boxed()
    }

    pub fn make_dashboard_route(environment: Environment) -> Route {
        warp::any()
            .map(move || environment.clone())
            .and(p("dashboard"))
            .and(end())
            .and(g())
            .and_then(handlers::dashboard)
            .boxed()
    }

    pub fn make_health_route(environment: Environment) -> Route {
        warp::any()
            .map(move || environment.clone())
            .and(p("health"))
            .and(end())
            .and(g())
            .and_then(handlers::health)
            .boxed()
    }
}
