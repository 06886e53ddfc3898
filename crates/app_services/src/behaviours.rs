//! Pipeline behaviours

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use core_kernel::AggregateLockService;

use crate::error::AppResult;
use crate::mediator::{Next, PipelineBehaviour, RequestContext, RequestInfo, RequestKind};

/// Wraps every request in a span and logs its duration and outcome
#[derive(Debug, Default)]
pub struct LoggingBehaviour;

#[async_trait]
impl PipelineBehaviour for LoggingBehaviour {
    async fn handle<'a>(
        &'a self,
        info: &'a RequestInfo,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> AppResult<()> {
        let span = info_span!(
            "request",
            name = info.name,
            kind = %info.kind,
            tenant_id = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
        );

        async move {
            let started = Instant::now();
            debug!("Handling request");
            let outcome = next.run().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &outcome {
                Ok(()) => info!(elapsed_ms, "Request handled"),
                Err(e) if e.is_client_error() => warn!(elapsed_ms, error = %e, "Request rejected"),
                Err(e) => error!(elapsed_ms, error = %e, "Request failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Holds the aggregate lock named by a command for the rest of the pipeline
pub struct AggregateLockBehaviour {
    locks: Arc<dyn AggregateLockService>,
    timeout: Duration,
}

impl AggregateLockBehaviour {
    pub fn new(locks: Arc<dyn AggregateLockService>, timeout: Duration) -> Self {
        Self { locks, timeout }
    }
}

#[async_trait]
impl PipelineBehaviour for AggregateLockBehaviour {
    async fn handle<'a>(
        &'a self,
        info: &'a RequestInfo,
        _ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> AppResult<()> {
        let key = match (&info.kind, &info.lock_key) {
            (RequestKind::Command, Some(key)) => key.clone(),
            _ => return next.run().await,
        };

        let guard = self.locks.acquire(key, self.timeout).await?;
        debug!(lock = %guard.key(), "Acquired aggregate lock");
        let outcome = next.run().await;
        guard.release();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::mediator::{Mediator, Request, RequestHandler};
    use core_kernel::mock::InMemoryAggregateLockService;
    use core_kernel::{DeploymentEnvironment, LockKey, TenantId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Touch {
        aggregate_id: Uuid,
    }

    impl Request for Touch {
        type Response = usize;
        const NAME: &'static str = "Touch";
        const KIND: RequestKind = RequestKind::Command;

        fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
            Some(LockKey::new(ctx.tenant_id, "counter", self.aggregate_id))
        }
    }

    /// Detects overlapping executions
    #[derive(Default)]
    struct SlowHandler {
        running: AtomicUsize,
        max_seen: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler<Touch> for SlowHandler {
        async fn handle(&self, _request: Touch, _ctx: &RequestContext) -> AppResult<usize> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(now)
        }
    }

    fn mediator(handler: Arc<SlowHandler>, timeout: Duration) -> Mediator {
        let mut mediator = Mediator::new();
        mediator
            .register::<Touch>(handler)
            .add_behaviour(Arc::new(LoggingBehaviour))
            .add_behaviour(Arc::new(AggregateLockBehaviour::new(
                Arc::new(InMemoryAggregateLockService::new()),
                timeout,
            )));
        mediator
    }

    #[tokio::test]
    async fn test_commands_on_one_aggregate_are_serialised() {
        let handler = Arc::new(SlowHandler::default());
        let mediator = mediator(handler.clone(), Duration::from_secs(2));
        let ctx = RequestContext::new(TenantId::new(), DeploymentEnvironment::Development);
        let id = Uuid::new_v4();

        let (a, b) = tokio::join!(
            mediator.send(Touch { aggregate_id: id }, &ctx),
            mediator.send(Touch { aggregate_id: id }, &ctx),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(handler.max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lock_timeout_is_reported() {
        let handler = Arc::new(SlowHandler::default());
        let mediator = mediator(handler, Duration::from_millis(1));
        let ctx = RequestContext::new(TenantId::new(), DeploymentEnvironment::Development);
        let id = Uuid::new_v4();

        let (a, b) = tokio::join!(
            mediator.send(Touch { aggregate_id: id }, &ctx),
            mediator.send(Touch { aggregate_id: id }, &ctx),
        );
        let failures: Vec<AppError> = [a, b].into_iter().filter_map(Result::err).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], AppError::Unavailable(_)));
    }
}
