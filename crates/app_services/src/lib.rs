//! Application Services
//!
//! The command and query side of uBind. Every use case is a request struct
//! sent through the [`Mediator`]:
//!
//! ```text
//! HTTP handler
//!     -> Mediator::send(request, ctx)
//!         -> LoggingBehaviour        span, timing, outcome
//!         -> AggregateLockBehaviour  commands naming an aggregate
//!         -> RequestHandler          load, change, save, project
//! ```
//!
//! Command handlers load aggregates through [`core_kernel::AggregateRepository`],
//! save them with optimistic concurrency, and project the saved state into
//! read models. Query handlers only read the [`ReadModelStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mediator = build_mediator(deps);
//! let ctx = RequestContext::new(tenant_id, DeploymentEnvironment::Production)
//!     .with_user(user_id, vec!["Admin".into()]);
//! let quote = mediator.send(CreateQuote { organisation_id, product_id, form_data: None, is_test_data: false }, &ctx).await?;
//! ```

pub mod behaviours;
pub mod error;
pub mod mediator;
pub mod organisations;
pub mod quotes;
pub mod read_models;
pub mod registry;
pub mod updater_jobs;
pub mod users;

pub use behaviours::{AggregateLockBehaviour, LoggingBehaviour};
pub use error::{AppError, AppResult};
pub use mediator::{Mediator, Next, PipelineBehaviour, Request, RequestContext, RequestHandler, RequestInfo, RequestKind};
pub use quotes::QuoteSettings;
pub use read_models::{
    memory::InMemoryReadModelStore, OrganisationReadModel, QuoteFilter, QuoteReadModel, ReadModelStore,
    UserReadModel,
};
pub use registry::{build_mediator, AppDependencies, DEFAULT_LOCK_TIMEOUT};
