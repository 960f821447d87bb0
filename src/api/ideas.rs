//! Idea, scoring-criterion and insight endpoints.

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
    BooleanResponse, CreateCriterionPayload, CreateIdeaPayload, CreateInsightPayload, GenerateInsightsResponse,
    Idea, IdeaCriterion, IdeaDetail, Insight, ListIdeasFilters, ScoreIdeaPayload, UpdateCriterionPayload,
    UpdateIdeaPayload,
};
use crate::service::DashboardCore;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInsightsQuery {
    pub include_dismissed: Option<bool>,
}

/// GET /api/criteria
pub async fn list_criteria(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<Vec<IdeaCriterion>>> {
    Ok(Json(run_blocking(core, move |core| core.list_criteria(&subject)).await?))
}

/// POST /api/criteria
pub async fn create_criterion(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateCriterionPayload>,
) -> ApiResult<(StatusCode, Json<IdeaCriterion>)> {
    let criterion = run_blocking(core, move |core| core.create_criterion(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(criterion)))
}

/// PATCH /api/criteria/{id}
pub async fn update_criterion(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateCriterionPayload>,
) -> ApiResult<Json<IdeaCriterion>> {
    Ok(Json(run_blocking(core, move |core| core.update_criterion(&subject, &id, patch)).await?))
}

/// DELETE /api/criteria/{id}
pub async fn delete_criterion(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_criterion(&subject, &id)).await?))
}

/// GET /api/ideas
pub async fn list_ideas(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListIdeasFilters>,
) -> ApiResult<Json<Vec<Idea>>> {
    Ok(Json(run_blocking(core, move |core| core.list_ideas(&subject, filters)).await?))
}

/// POST /api/ideas
pub async fn create_idea(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateIdeaPayload>,
) -> ApiResult<(StatusCode, Json<Idea>)> {
    let idea = run_blocking(core, move |core| core.create_idea(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(idea)))
}

/// GET /api/ideas/{id}
pub async fn get_idea(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<IdeaDetail>> {
    Ok(Json(run_blocking(core, move |core| core.get_idea(&subject, &id)).await?))
}

/// PATCH /api/ideas/{id}
pub async fn update_idea(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateIdeaPayload>,
) -> ApiResult<Json<Idea>> {
    Ok(Json(run_blocking(core, move |core| core.update_idea(&subject, &id, patch)).await?))
}

/// DELETE /api/ideas/{id}
pub async fn delete_idea(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_idea(&subject, &id)).await?))
}

/// POST /api/ideas/{id}/scores
pub async fn score_idea(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(payload): Json<ScoreIdeaPayload>,
) -> ApiResult<Json<IdeaDetail>> {
    Ok(Json(run_blocking(core, move |core| core.score_idea(&subject, &id, payload)).await?))
}

/// GET /api/insights
pub async fn list_insights(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(query): Query<ListInsightsQuery>,
) -> ApiResult<Json<Vec<Insight>>> {
    let include_dismissed = query.include_dismissed.unwrap_or(false);
    Ok(Json(run_blocking(core, move |core| core.list_insights(&subject, include_dismissed)).await?))
}

/// POST /api/insights
pub async fn create_insight(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateInsightPayload>,
) -> ApiResult<(StatusCode, Json<Insight>)> {
    let insight = run_blocking(core, move |core| core.create_insight(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(insight)))
}

/// POST /api/insights/generate
pub async fn generate_insights(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<GenerateInsightsResponse>> {
    tracing::debug!(subject = %subject, "Generating insights");
    Ok(Json(run_blocking(core, move |core| core.generate_insights(&subject)).await?))
}

/// POST /api/insights/{id}/dismiss
pub async fn dismiss_insight(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Insight>> {
    Ok(Json(run_blocking(core, move |core| core.dismiss_insight(&subject, &id)).await?))
}
