//! Request mediator
//!
//! Commands and queries are plain structs implementing [`Request`]. The
//! [`Mediator`] finds the handler registered for the request's type and
//! runs it through the pipeline:
//!
//! ```text
//! send(request)
//!   -> Request::validate
//!   -> behaviour 1 -> behaviour 2 -> ... -> RequestHandler::handle
//! ```
//!
//! Behaviours see a type-erased [`RequestInfo`] and wrap the rest of the
//! pipeline through [`Next`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use core_kernel::{CorrelationId, DeploymentEnvironment, LockKey, TenantId, UserId};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Command,
    Query,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Command => f.write_str("command"),
            RequestKind::Query => f.write_str("query"),
        }
    }
}

/// Who is asking, for which tenant, and in which environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub performing_user_id: Option<UserId>,
    pub roles: Vec<String>,
    pub correlation_id: CorrelationId,
    pub environment: DeploymentEnvironment,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, environment: DeploymentEnvironment) -> Self {
        Self {
            tenant_id,
            performing_user_id: None,
            roles: Vec::new(),
            correlation_id: CorrelationId::new(),
            environment,
        }
    }

    pub fn with_user(mut self, user_id: UserId, roles: Vec<String>) -> Self {
        self.performing_user_id = Some(user_id);
        self.roles = roles;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

pub trait Request: Send + Sync + 'static {
    type Response: Send + 'static;

    /// Name used in logs
    const NAME: &'static str;
    const KIND: RequestKind;

    /// Checks the request on its own, before any handler runs
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }

    /// Aggregate to lock while a command runs
    fn lock_key(&self, _ctx: &RequestContext) -> Option<LockKey> {
        None
    }
}

#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(&self, request: R, ctx: &RequestContext) -> AppResult<R::Response>;
}

/// What behaviours know about the request passing through
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub name: &'static str,
    pub kind: RequestKind,
    pub lock_key: Option<LockKey>,
}

/// Cross-cutting step wrapped around every handler
#[async_trait]
pub trait PipelineBehaviour: Send + Sync {
    async fn handle<'a>(
        &'a self,
        info: &'a RequestInfo,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> AppResult<()>;
}

/// The remainder of the pipeline
pub struct Next<'a> {
    behaviours: &'a [Arc<dyn PipelineBehaviour>],
    info: &'a RequestInfo,
    ctx: &'a RequestContext,
    handler: BoxFuture<'a, AppResult<()>>,
}

impl<'a> Next<'a> {
    pub async fn run(self) -> AppResult<()> {
        match self.behaviours.split_first() {
            Some((behaviour, rest)) => {
                let next = Next {
                    behaviours: rest,
                    info: self.info,
                    ctx: self.ctx,
                    handler: self.handler,
                };
                behaviour.handle(self.info, self.ctx, next).await
            }
            None => self.handler.await,
        }
    }
}

/// Type-keyed handler registry and pipeline
#[derive(Default)]
pub struct Mediator {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    behaviours: Vec<Arc<dyn PipelineBehaviour>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `R`, replacing any previous one
    pub fn register<R: Request>(&mut self, handler: Arc<dyn RequestHandler<R>>) -> &mut Self {
        self.handlers.insert(TypeId::of::<R>(), Box::new(handler));
        self
    }

    /// Appends a behaviour; the first added runs outermost
    pub fn add_behaviour(&mut self, behaviour: Arc<dyn PipelineBehaviour>) -> &mut Self {
        self.behaviours.push(behaviour);
        self
    }

    pub fn is_registered<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    pub async fn send<R: Request>(&self, request: R, ctx: &RequestContext) -> AppResult<R::Response> {
        let handler = self
            .handlers
            .get(&TypeId::of::<R>())
            .and_then(|h| h.downcast_ref::<Arc<dyn RequestHandler<R>>>())
            .cloned()
            .ok_or(AppError::HandlerNotRegistered(R::NAME))?;

        request.validate()?;

        let info = RequestInfo {
            name: R::NAME,
            kind: R::KIND,
            lock_key: request.lock_key(ctx),
        };

        let mut response: Option<R::Response> = None;
        let slot = &mut response;
        let handle: BoxFuture<'_, AppResult<()>> = Box::pin(async move {
            *slot = Some(handler.handle(request, ctx).await?);
            Ok(())
        });

        Next {
            behaviours: &self.behaviours,
            info: &info,
            ctx,
            handler: handle,
        }
        .run()
        .await?;

        response.ok_or_else(|| AppError::internal(format!("{} was not handled", R::NAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo(String);

    impl Request for Echo {
        type Response = String;
        const NAME: &'static str = "Echo";
        const KIND: RequestKind = RequestKind::Query;

        fn validate(&self) -> AppResult<()> {
            if self.0.is_empty() {
                return Err(AppError::validation("nothing to echo"));
            }
            Ok(())
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, request: Echo, _ctx: &RequestContext) -> AppResult<String> {
            Ok(request.0.to_uppercase())
        }
    }

    struct Unhandled;

    impl Request for Unhandled {
        type Response = ();
        const NAME: &'static str = "Unhandled";
        const KIND: RequestKind = RequestKind::Command;
    }

    /// Records the order behaviours run in
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PipelineBehaviour for Recorder {
        async fn handle<'a>(
            &'a self,
            info: &'a RequestInfo,
            _ctx: &'a RequestContext,
            next: Next<'a>,
        ) -> AppResult<()> {
            self.log.lock().unwrap().push(format!("{} before {}", self.label, info.name));
            let outcome = next.run().await;
            self.log.lock().unwrap().push(format!("{} after", self.label));
            outcome
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl PipelineBehaviour for ShortCircuit {
        async fn handle<'a>(
            &'a self,
            _info: &'a RequestInfo,
            _ctx: &'a RequestContext,
            _next: Next<'a>,
        ) -> AppResult<()> {
            Err(AppError::Forbidden("stopped".into()))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(TenantId::new(), DeploymentEnvironment::Development)
    }

    #[tokio::test]
    async fn test_send_dispatches_by_type() {
        let mut mediator = Mediator::new();
        mediator.register::<Echo>(Arc::new(EchoHandler));

        let reply = mediator.send(Echo("hello".into()), &ctx()).await.unwrap();
        assert_eq!(reply, "HELLO");
        assert!(mediator.is_registered::<Echo>());
    }

    #[tokio::test]
    async fn test_unregistered_request_is_rejected() {
        let mediator = Mediator::new();
        let err = mediator.send(Unhandled, &ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::HandlerNotRegistered("Unhandled")));
    }

    #[tokio::test]
    async fn test_validation_runs_before_behaviours() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator
            .register::<Echo>(Arc::new(EchoHandler))
            .add_behaviour(Arc::new(Recorder { label: "outer", log: log.clone() }));

        let err = mediator.send(Echo(String::new()), &ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_behaviours_wrap_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator
            .register::<Echo>(Arc::new(EchoHandler))
            .add_behaviour(Arc::new(Recorder { label: "outer", log: log.clone() }))
            .add_behaviour(Arc::new(Recorder { label: "inner", log: log.clone() }));

        mediator.send(Echo("x".into()), &ctx()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer before Echo", "inner before Echo", "inner after", "outer after"]
        );
    }

    #[tokio::test]
    async fn test_behaviour_can_stop_the_pipeline() {
        let mut mediator = Mediator::new();
        mediator
            .register::<Echo>(Arc::new(EchoHandler))
            .add_behaviour(Arc::new(ShortCircuit));

        let err = mediator.send(Echo("x".into()), &ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
