//! Project, phase and task endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::identity::Identity;
use crate::api::run_blocking;
use crate::models::{
    BooleanResponse, CreatePhasePayload, CreateProjectPayload, CreateTaskPayload, DeletePhaseResponse,
    DeleteProjectResponse, ListProjectsFilters, ListTasksFilters, Phase, Project, ProjectDetail,
    ReorderPhasesPayload, Task, UpdatePhasePayload, UpdateProjectPayload, UpdateTaskPayload,
};
use crate::service::DashboardCore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOrderBody {
    pub phase_ids: Vec<String>,
}

/// GET /api/projects
pub async fn list_projects(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListProjectsFilters>,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(run_blocking(core, move |core| core.list_projects(&subject, filters)).await?))
}

/// POST /api/projects
pub async fn create_project(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateProjectPayload>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    tracing::info!(subject = %subject, "Creating project: {}", payload.name);
    let project = run_blocking(core, move |core| core.create_project(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectDetail>> {
    Ok(Json(run_blocking(core, move |core| core.get_project(&subject, &id)).await?))
}

/// PATCH /api/projects/{id}
pub async fn update_project(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateProjectPayload>,
) -> ApiResult<Json<Project>> {
    Ok(Json(run_blocking(core, move |core| core.update_project(&subject, &id, patch)).await?))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteProjectResponse>> {
    tracing::info!(subject = %subject, "Deleting project {}", id);
    Ok(Json(run_blocking(core, move |core| core.delete_project(&subject, &id)).await?))
}

/// GET /api/projects/{id}/phases
pub async fn list_phases(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Phase>>> {
    Ok(Json(run_blocking(core, move |core| core.list_phases(&subject, &id)).await?))
}

/// PUT /api/projects/{id}/phases/order
pub async fn reorder_phases(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(body): Json<PhaseOrderBody>,
) -> ApiResult<Json<Vec<Phase>>> {
    let payload = ReorderPhasesPayload {
        project_id: id,
        phase_ids: body.phase_ids,
    };
    Ok(Json(run_blocking(core, move |core| core.reorder_phases(&subject, payload)).await?))
}

/// POST /api/phases
pub async fn create_phase(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreatePhasePayload>,
) -> ApiResult<(StatusCode, Json<Phase>)> {
    let phase = run_blocking(core, move |core| core.create_phase(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(phase)))
}

/// PATCH /api/phases/{id}
pub async fn update_phase(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdatePhasePayload>,
) -> ApiResult<Json<Phase>> {
    Ok(Json(run_blocking(core, move |core| core.update_phase(&subject, &id, patch)).await?))
}

/// DELETE /api/phases/{id}
pub async fn delete_phase(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletePhaseResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_phase(&subject, &id)).await?))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListTasksFilters>,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(run_blocking(core, move |core| core.list_tasks(&subject, filters)).await?))
}

/// POST /api/tasks
pub async fn create_task(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateTaskPayload>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = run_blocking(core, move |core| core.create_task(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/tasks/{id}
pub async fn update_task(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateTaskPayload>,
) -> ApiResult<Json<Task>> {
    Ok(Json(run_blocking(core, move |core| core.update_task(&subject, &id, patch)).await?))
}

/// POST /api/tasks/{id}/toggle
pub async fn toggle_task(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(run_blocking(core, move |core| core.toggle_task_completion(&subject, &id)).await?))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    let success = run_blocking(core, move |core| core.delete_task(&subject, &id)).await?;
    Ok(Json(BooleanResponse { success }))
}
