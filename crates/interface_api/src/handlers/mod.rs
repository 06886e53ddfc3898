//! Route handlers, one module per resource

pub mod auth;
pub mod health;
pub mod organisations;
pub mod quotes;
pub mod updater_jobs;
pub mod users;
