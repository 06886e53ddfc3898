//! Updater job commands and queries
//!
//! Reference data sets are shared by every tenant, so these requests ignore
//! the tenant in the context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::UpdaterJobId;
use infra_updater::{DataSetKind, UpdaterJob, UpdaterJobManager};

use crate::error::{AppError, AppResult};
use crate::mediator::{Request, RequestContext, RequestHandler, RequestKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartUpdaterJob {
    pub data_set: DataSetKind,
    /// Overrides the configured download location
    pub source_url: Option<String>,
}

impl Request for StartUpdaterJob {
    type Response = UpdaterJob;
    const NAME: &'static str = "StartUpdaterJob";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> AppResult<()> {
        match &self.source_url {
            Some(url) if url.chars().any(char::is_whitespace) => {
                Err(AppError::validation("source_url: must not contain whitespace"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortUpdaterJob {
    pub job_id: UpdaterJobId,
}

impl Request for AbortUpdaterJob {
    type Response = UpdaterJob;
    const NAME: &'static str = "AbortUpdaterJob";
    const KIND: RequestKind = RequestKind::Command;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUpdaterJob {
    pub job_id: UpdaterJobId,
}

impl Request for GetUpdaterJob {
    type Response = UpdaterJob;
    const NAME: &'static str = "GetUpdaterJob";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListUpdaterJobs {
    pub data_set: Option<DataSetKind>,
}

impl Request for ListUpdaterJobs {
    type Response = Vec<UpdaterJob>;
    const NAME: &'static str = "ListUpdaterJobs";
    const KIND: RequestKind = RequestKind::Query;
}

pub struct UpdaterJobHandler {
    manager: Arc<UpdaterJobManager>,
}

impl UpdaterJobHandler {
    pub fn new(manager: Arc<UpdaterJobManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl RequestHandler<StartUpdaterJob> for UpdaterJobHandler {
    async fn handle(&self, request: StartUpdaterJob, _ctx: &RequestContext) -> AppResult<UpdaterJob> {
        Ok(self.manager.start_job(request.data_set, request.source_url).await?)
    }
}

#[async_trait]
impl RequestHandler<AbortUpdaterJob> for UpdaterJobHandler {
    async fn handle(&self, request: AbortUpdaterJob, _ctx: &RequestContext) -> AppResult<UpdaterJob> {
        Ok(self.manager.abort_job(request.job_id).await?)
    }
}

#[async_trait]
impl RequestHandler<GetUpdaterJob> for UpdaterJobHandler {
    async fn handle(&self, request: GetUpdaterJob, _ctx: &RequestContext) -> AppResult<UpdaterJob> {
        Ok(self.manager.get_job(request.job_id).await?)
    }
}

#[async_trait]
impl RequestHandler<ListUpdaterJobs> for UpdaterJobHandler {
    async fn handle(&self, request: ListUpdaterJobs, _ctx: &RequestContext) -> AppResult<Vec<UpdaterJob>> {
        Ok(self.manager.list_jobs(request.data_set).await?)
    }
}
