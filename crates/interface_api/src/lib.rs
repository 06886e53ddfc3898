//! HTTP API Layer
//!
//! REST surface of the uBind core over Axum. Every route translates its
//! body into a mediator request; no handler touches storage directly.
//!
//! # Architecture
//!
//! - **Handlers**: one module per resource (quotes, users, organisations, updater jobs)
//! - **Middleware**: bearer authentication and correlation-aware audit logging
//! - **DTOs**: request/response bodies with `validator` rules
//! - **Bootstrap**: adapter wiring for the memory or PostgreSQL backend
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{bootstrap::Services, config::ApiConfig, create_router};
//!
//! let services = Services::start(ApiConfig::load()?).await?;
//! let app = create_router(services.state.clone());
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use app_services::Mediator;
use core_kernel::HealthCheckable;

use crate::config::ApiConfig;
use crate::handlers::{auth as auth_handlers, health, organisations, quotes, updater_jobs, users};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<Mediator>,
    pub config: Arc<ApiConfig>,
    /// Adapters probed by the readiness check
    pub health: Arc<Vec<Arc<dyn HealthCheckable>>>,
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let auth_routes = Router::new()
        .route("/login", post(auth_handlers::login))
        .route("/activate", post(auth_handlers::activate))
        .route("/password-reset", post(auth_handlers::request_password_reset))
        .route("/password-reset/complete", post(auth_handlers::complete_password_reset));

    let quote_routes = Router::new()
        .route("/", post(quotes::create_quote).get(quotes::list_quotes))
        .route("/:id", get(quotes::get_quote))
        .route("/:id/form-data", put(quotes::update_form_data))
        .route("/:id/calculate", post(quotes::calculate))
        .route("/:id/actions", post(quotes::perform_action))
        .route("/:id/submit", post(quotes::submit))
        .route("/:id/bind", post(quotes::bind))
        .route("/:id/discard", post(quotes::discard))
        .route("/:id/expiry", put(quotes::set_expiry))
        .route("/:id/customer", put(quotes::assign_customer))
        .route("/:id/adjustments", post(quotes::create_adjustment))
        .route("/:id/renewals", post(quotes::create_renewal))
        .route("/:id/cancellations", post(quotes::create_cancellation))
        .route("/:id/rollback", post(quotes::rollback));

    let user_routes = Router::new()
        .route("/", post(users::create_user).get(users::list_users))
        .route("/:id", get(users::get_user))
        .route("/:id/login-email", put(users::set_login_email))
        .route("/:id/roles", post(users::assign_role))
        .route("/:id/roles/:role", delete(users::retract_role))
        .route("/:id/block", post(users::block_user))
        .route("/:id/unblock", post(users::unblock_user))
        .route("/:id/invitations", post(users::create_invitation))
        .route("/:id/password", put(users::change_password));

    let organisation_routes = Router::new()
        .route("/", post(organisations::create_organisation).get(organisations::list_organisations))
        .route("/:id", get(organisations::get_organisation).delete(organisations::delete))
        .route("/by-alias/:alias", get(organisations::get_organisation_by_alias))
        .route("/:id/name", put(organisations::rename))
        .route("/:id/alias", put(organisations::change_alias))
        .route("/:id/disable", post(organisations::disable))
        .route("/:id/activate", post(organisations::activate));

    let updater_routes = Router::new()
        .route("/", post(updater_jobs::start_job).get(updater_jobs::list_jobs))
        .route("/:id", get(updater_jobs::get_job))
        .route("/:id/abort", post(updater_jobs::abort_job));

    let api_routes = Router::new()
        .nest("/quotes", quote_routes)
        .route("/products/:product_id/numbers", post(quotes::load_numbers))
        .nest("/users", user_routes)
        .route("/people/:person_id", put(users::update_person))
        .nest("/organisations", organisation_routes)
        .nest("/updater-jobs", updater_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
