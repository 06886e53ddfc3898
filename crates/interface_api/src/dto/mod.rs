//! Request and response bodies
//!
//! Responses are the application read models serialized as-is; these
//! types cover request bodies and query strings, checked with `validator`
//! before anything is sent through the mediator.

pub mod auth;
pub mod organisations;
pub mod quotes;
pub mod updater_jobs;
pub mod users;
