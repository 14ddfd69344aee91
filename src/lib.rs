pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod metrics;
pub mod state;
pub mod store;
pub mod tokens;
pub mod users;
