pub mod attendance;
pub mod config;
pub mod environment;
pub mod errors;
pub mod member;
pub mod pages;
pub mod qr;
pub mod reports;
pub mod routes;
pub mod session;
pub mod store;
pub mod urls;
