//! Test Utilities Crate
//!
//! Shared test infrastructure for the uBind test suite.
//!
//! # Modules
//!
//! - `fixtures`: rating rules, form data and fake people/organisations
//! - `builders`: an in-memory mediator harness
//! - `database`: PostgreSQL test containers with the schema applied
//! - `assertions`: assertion helpers for event streams and read models
//! - `generators`: proptest strategies

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
