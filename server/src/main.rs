use std::error::Error;
use std::sync::Arc;

use warp::Filter;

use attendance::config::{get_variable, get_variable_or};
use attendance::environment::{Config, Environment};
use attendance::routes;
use attendance::store;
use attendance::urls::Urls;
use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port: u16 = get_variable("ATTENDANCE_PORT")
        .parse()
        .expect("parse ATTENDANCE_PORT as u16");
    let admin_port: u16 = get_variable("ATTENDANCE_ADMIN_PORT")
        .parse()
        .expect("parse ATTENDANCE_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    // the backend decision is made here, once, for the life of the process
    let connection_string = get_variable("ATTENDANCE_DB_CONNECTION_STRING");
    let store = store::connect(logger.clone(), &connection_string).await;

    let urls = Arc::new(Urls::new(get_variable("ATTENDANCE_BASE_URL")));

    let production = get_variable_or("ATTENDANCE_PRODUCTION", "0") == "1";
    let config = Config::new(production);
    let environment = Environment::new(logger.clone(), store.clone(), urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            let termination_sender = termination_sender.clone();
            termination_sender.send(()).await.unwrap();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            let terminate = terminate.clone();

            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let members_route = routes::make_members_route(environment.clone());
        let register_route = routes::make_register_route(environment.clone());
        let delete_member_route = routes::make_delete_member_route(environment.clone());
        let create_session_route = routes::make_create_session_route(environment.clone());
        let active_session_route = routes::make_active_session_route(environment.clone());
        let session_stats_route = routes::make_session_stats_route(environment.clone());
        let mark_route = routes::make_mark_route(environment.clone());
        let manual_mark_route = routes::make_manual_mark_route(environment.clone());
        let current_report_route = routes::make_current_report_route(environment.clone());
        let membership_report_route = routes::make_membership_report_route(environment.clone());
        let scan_route = routes::make_scan_route(environment.clone());
        let dashboard_route = routes::make_dashboard_route(environment.clone());
        let health_route = routes::make_health_route(environment.clone());

        let routes = members_route
            .or(register_route)
            .or(delete_member_route)
            .or(create_session_route)
            .or(active_session_route)
            .or(session_stats_route)
            .or(mark_route)
            .or(manual_mark_route)
            .or(current_report_route)
            .or(membership_report_route)
            .or(scan_route)
            .or(dashboard_route)
            .or(health_route)
            .recover(move |r| routes::format_rejection(logger2.clone(), production, r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    store.close().await;

    info!(logger, "Exiting gracefully...");

    Ok(())
}
