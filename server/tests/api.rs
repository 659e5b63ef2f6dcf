use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Reply;
use warp::Filter;

use attendance::environment::{Config, Environment};
use attendance::routes;
use attendance::store::MemoryStore;
use attendance::urls::Urls;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemberResponse {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: i64,
    #[serde(rename = "firstSeenAt")]
    first_seen_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    name: String,
    date: String,
    #[serde(rename = "scanUrl")]
    scan_url: String,
    active: bool,
    #[serde(rename = "createdAt")]
    created_at: i64,
    #[serde(rename = "qrCodeImage")]
    qr_code_image: String,
    #[serde(rename = "qrData")]
    qr_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkedResponse {
    message: String,
    #[serde(rename = "isFirstTime")]
    is_first_time: bool,
    #[serde(rename = "recordId")]
    record_id: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    timestamp: i64,
    #[serde(rename = "isFirstTime")]
    is_first_time: bool,
    manual: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatisticsResponse {
    total_present: i64,
    first_time_count: i64,
    total_members: i64,
}

#[derive(Debug, Deserialize)]
struct PresenceRow {
    id: String,
    name: String,
    email: String,
    present: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    operation: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HealthResponse {
    status: String,
    database: String,
}

fn test_environment() -> Environment {
    let logger = Arc::new(slog::Logger::root(slog::Discard, slog::o!()));

    Environment::new(
        logger,
        Arc::new(MemoryStore::new()),
        Arc::new(Urls::new("http://attendance.test/")),
        Config::new(false),
    )
}

/// The full main-server filter, composed the way `main` composes it.
fn api(environment: Environment) -> BoxedFilter<(impl Reply,)> {
    let logger = environment.logger.clone();

    routes::make_members_route(environment.clone())
        .or(routes::make_register_route(environment.clone()))
        .or(routes::make_delete_member_route(environment.clone()))
        .or(routes::make_create_session_route(environment.clone()))
        .or(routes::make_active_session_route(environment.clone()))
        .or(routes::make_session_stats_route(environment.clone()))
        .or(routes::make_mark_route(environment.clone()))
        .or(routes::make_manual_mark_route(environment.clone()))
        .or(routes::make_current_report_route(environment.clone()))
        .or(routes::make_membership_report_route(environment.clone()))
        .or(routes::make_scan_route(environment.clone()))
        .or(routes::make_dashboard_route(environment.clone()))
        .or(routes::make_health_route(environment))
        .recover(move |r| routes::format_rejection(logger.clone(), false, r))
        .boxed()
}

async fn register(
    api: &BoxedFilter<(impl Reply + 'static,)>,
    name: &str,
    email: &str,
) -> MemberResponse {
    let response = warp::test::request()
        .method("POST")
        .path("/api/members")
        .json(&json!({ "name": name, "email": email }))
        .reply(api)
        .await;

    assert_eq!(response.status(), StatusCode::CREATED, "register {}", email);
    serde_json::from_slice(response.body()).expect("parse member response")
}

async fn create_session(api: &BoxedFilter<(impl Reply + 'static,)>, name: &str) -> SessionResponse {
    let response = warp::test::request()
        .method("POST")
        .path("/api/sessions")
        .json(&json!({ "sessionName": name }))
        .reply(api)
        .await;

    assert_eq!(response.status(), StatusCode::OK, "create session {}", name);
    serde_json::from_slice(response.body()).expect("parse session response")
}

async fn mark(
    api: &BoxedFilter<(impl Reply + 'static,)>,
    session_id: &str,
    member_id: &str,
) -> warp::http::Response<Bytes> {
    warp::test::request()
        .method("POST")
        .path("/api/attendance")
        .json(&json!({ "sessionId": session_id, "memberId": member_id }))
        .reply(api)
        .await
}

async fn current_report(api: &BoxedFilter<(impl Reply + 'static,)>) -> Vec<ReportRow> {
    let response = warp::test::request()
        .path("/api/attendance/current")
        .reply(api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(response.body()).expect("parse report")
}

#[tokio::test]
async fn registration_normalizes_email_and_rejects_duplicates() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ADA@X.COM").await;
    assert_eq!(member.email, "ada@x.com");
    assert_eq!(member.name, "Ada Lovelace");
    assert!(member.first_seen_at.is_none());

    // same address, different case
    let response = warp::test::request()
        .method("POST")
        .path("/api/members")
        .json(&json!({ "name": "Other Ada", "email": "ada@x.com" }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.operation, "register");
    assert!(error.message.contains("already registered"));

    let response = warp::test::request().path("/api/members").reply(&api).await;
    let members: Vec<MemberResponse> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(members.len(), 1);
}

#[tokio::test]
async fn registration_validates_its_input() {
    let api = api(test_environment());

    for (body, expected) in vec![
        (json!({ "email": "a@b.co" }), "name"),
        (json!({ "name": "A" }), "email"),
        (json!({ "name": "A", "email": "not-an-email" }), "email"),
    ] {
        let response = warp::test::request()
            .method("POST")
            .path("/api/members")
            .json(&body)
            .reply(&api)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{:?}", body);
        let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
        assert!(error.message.contains(expected), "{:?}: {}", body, error.message);
    }
}

#[tokio::test]
async fn creating_a_session_deactivates_the_previous_one() {
    let api = api(test_environment());

    let first = create_session(&api, "Sunday Service").await;
    assert!(first.active);
    assert!(first.qr_code_image.starts_with("data:image/png;base64,"));
    assert!(first.scan_url.ends_with(&first.session_id));
    assert_eq!(first.qr_data, first.scan_url);

    let second = create_session(&api, "Evening Service").await;

    let response = warp::test::request()
        .path("/api/sessions/active")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let active: SessionResponse = serde_json::from_slice(response.body()).unwrap();

    assert_eq!(active.session_id, second.session_id);
    assert_eq!(active.name, "Evening Service");
    assert_ne!(active.session_id, first.session_id);

    // NOTE: two *concurrent* createSession calls can interleave their
    // deactivate/insert pairs and leave zero or two active sessions; that
    // race is accepted and deliberately not exercised here.
}

#[tokio::test]
async fn no_active_session_is_not_an_error() {
    let api = api(test_environment());

    let response = warp::test::request()
        .path("/api/sessions/active")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(current_report(&api).await.is_empty());
}

#[tokio::test]
async fn marking_twice_yields_already_marked() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ada@x.com").await;
    let session = create_session(&api, "Sunday Service").await;

    let response = mark(&api, &session.session_id, &member.id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let marked: MarkedResponse = serde_json::from_slice(response.body()).unwrap();
    assert!(marked.is_first_time);
    assert!(marked.message.contains("Welcome"));

    let response = mark(&api, &session.session_id, &member.id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert!(error.message.contains("already"));

    // exactly one record for the pair
    let report = current_report(&api).await;
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].id, member.id);
    assert!(!report[0].manual);
}

#[tokio::test]
async fn first_time_flag_reflects_history_across_sessions() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ada@x.com").await;

    let first_session = create_session(&api, "Sunday Service").await;
    let first_mark = mark(&api, &first_session.session_id, &member.id).await;
    let first_marked: MarkedResponse = serde_json::from_slice(first_mark.body()).unwrap();
    assert!(first_marked.is_first_time);

    let second_session = create_session(&api, "Evening Service").await;
    let second_mark = mark(&api, &second_session.session_id, &member.id).await;
    let second_marked: MarkedResponse = serde_json::from_slice(second_mark.body()).unwrap();
    assert!(!second_marked.is_first_time);
    assert!(second_marked.message.contains("Attendance recorded"));

    // the first-seen timestamp was set by the first record and kept
    let response = warp::test::request().path("/api/members").reply(&api).await;
    let members: Vec<MemberResponse> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(members[0].first_seen_at, Some(first_marked.timestamp));
}

#[tokio::test]
async fn marking_an_unknown_session_is_rejected() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ada@x.com").await;
    create_session(&api, "Sunday Service").await;

    let response = mark(&api, "6e934ad6-0000-0000-0000-000000000000", &member.id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert!(error.message.contains("not exist or is no longer active"));

    // no record was created
    assert!(current_report(&api).await.is_empty());
}

#[tokio::test]
async fn marking_an_inactive_session_is_rejected() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ada@x.com").await;
    let old = create_session(&api, "Sunday Service").await;
    create_session(&api, "Evening Service").await;

    let response = mark(&api, &old.session_id, &member.id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn marking_an_unknown_member_is_rejected() {
    let api = api(test_environment());

    let session = create_session(&api, "Sunday Service").await;

    let response = mark(&api, &session.session_id, "6e934ad6-0000-0000-0000-000000000000").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_marking_uses_the_active_session() {
    let api = api(test_environment());

    let member = register(&api, "Ada Lovelace", "ada@x.com").await;

    // no active session yet
    let response = warp::test::request()
        .method("POST")
        .path("/api/attendance/manual")
        .json(&json!({ "memberId": member.id }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    create_session(&api, "Sunday Service").await;

    let response = warp::test::request()
        .method("POST")
        .path("/api/attendance/manual")
        .json(&json!({ "memberId": member.id }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = current_report(&api).await;
    assert_eq!(report.len(), 1);
    assert!(report[0].manual);
}

#[tokio::test]
async fn reports_exclude_deleted_members() {
    let api = api(test_environment());

    let ada = register(&api, "Ada Lovelace", "ada@x.com").await;
    let grace = register(&api, "Grace Hopper", "grace@x.com").await;
    let session = create_session(&api, "Sunday Service").await;

    mark(&api, &session.session_id, &ada.id).await;
    mark(&api, &session.session_id, &grace.id).await;
    assert_eq!(current_report(&api).await.len(), 2);

    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/api/members/{}", ada.id))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = current_report(&api).await;
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].email, "grace@x.com");
}

#[tokio::test]
async fn deleting_an_unknown_member_is_not_found() {
    let api = api(test_environment());

    let response = warp::test::request()
        .method("DELETE")
        .path("/api/members/6e934ad6-0000-0000-0000-000000000000")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = warp::test::request()
        .method("DELETE")
        .path("/api/members/not-a-uuid")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn statistics_count_presence_and_first_timers() {
    let api = api(test_environment());

    let ada = register(&api, "Ada Lovelace", "ada@x.com").await;
    let grace = register(&api, "Grace Hopper", "grace@x.com").await;
    let edsger = register(&api, "Edsger Dijkstra", "edsger@x.com").await;

    let first_session = create_session(&api, "Sunday Service").await;
    mark(&api, &first_session.session_id, &ada.id).await;
    mark(&api, &first_session.session_id, &grace.id).await;

    let second_session = create_session(&api, "Evening Service").await;
    mark(&api, &second_session.session_id, &ada.id).await;
    mark(&api, &second_session.session_id, &grace.id).await;
    mark(&api, &second_session.session_id, &edsger.id).await;

    let response = warp::test::request()
        .path(&format!("/api/sessions/{}/stats", second_session.session_id))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: StatisticsResponse = serde_json::from_slice(response.body()).unwrap();

    assert_eq!(stats.total_present, 3);
    assert_eq!(stats.first_time_count, 1);
    assert_eq!(stats.total_members, 3);

    // total members is independent of the session
    let response = warp::test::request()
        .path(&format!("/api/sessions/{}/stats", first_session.session_id))
        .reply(&api)
        .await;
    let stats: StatisticsResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(stats.total_present, 2);
    assert_eq!(stats.total_members, 3);
}

#[tokio::test]
async fn membership_report_flags_presence_against_the_active_session() {
    let api = api(test_environment());

    let ada = register(&api, "Ada Lovelace", "ada@x.com").await;
    register(&api, "Grace Hopper", "grace@x.com").await;

    let session = create_session(&api, "Sunday Service").await;
    mark(&api, &session.session_id, &ada.id).await;

    let response = warp::test::request()
        .path("/api/reports/members")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rows: Vec<PresenceRow> = serde_json::from_slice(response.body()).unwrap();

    assert_eq!(rows.len(), 2);
    let ada_row = rows.iter().find(|r| r.id == ada.id).unwrap();
    assert!(ada_row.present);
    let grace_row = rows.iter().find(|r| r.email == "grace@x.com").unwrap();
    assert!(!grace_row.present);
}

#[tokio::test]
async fn scan_page_is_served_for_active_sessions_only() {
    let api = api(test_environment());

    let session = create_session(&api, "Sunday Service").await;

    let response = warp::test::request()
        .path(&format!("/scan/{}", session.session_id))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = String::from_utf8_lossy(response.body()).into_owned();
    assert!(page.contains("Sunday Service"));
    assert!(page.contains(&session.session_id));

    let response = warp::test::request()
        .path("/scan/6e934ad6-0000-0000-0000-000000000000")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = warp::test::request().path("/scan/not-a-uuid").reply(&api).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_the_fallback_backend() {
    let api = api(test_environment());

    let response = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.database, "fallback");
}
