//! Updater job handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use app_services::updater_jobs::*;
use app_services::RequestContext;
use core_kernel::UpdaterJobId;
use infra_updater::UpdaterJob;

use crate::auth::{require_role, roles};
use crate::dto::updater_jobs::*;
use crate::error::ApiResult;
use crate::AppState;

pub async fn start_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<StartUpdaterJobRequest>,
) -> ApiResult<(StatusCode, Json<UpdaterJob>)> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let job = state
        .mediator
        .send(
            StartUpdaterJob {
                data_set: request.data_set,
                source_url: request.source_url,
            },
            &ctx,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListUpdaterJobsQuery>,
) -> ApiResult<Json<Vec<UpdaterJob>>> {
    let jobs = state
        .mediator
        .send(ListUpdaterJobs { data_set: query.data_set }, &ctx)
        .await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UpdaterJob>> {
    let job = state
        .mediator
        .send(GetUpdaterJob { job_id: UpdaterJobId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(job))
}

pub async fn abort_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UpdaterJob>> {
    require_role(&ctx, roles::ADMIN)?;
    let job = state
        .mediator
        .send(AbortUpdaterJob { job_id: UpdaterJobId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(job))
}
