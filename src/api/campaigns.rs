//! Marketing campaign endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::identity::Identity;
use crate::api::run_blocking;
use crate::models::{
    BooleanResponse, Campaign, CampaignDetail, CampaignMetric, CreateCampaignPayload, ListCampaignsFilters,
    RecordCampaignMetricPayload, UpdateCampaignPayload,
};
use crate::service::DashboardCore;

/// GET /api/campaigns
pub async fn list_campaigns(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListCampaignsFilters>,
) -> ApiResult<Json<Vec<Campaign>>> {
    Ok(Json(run_blocking(core, move |core| core.list_campaigns(&subject, filters)).await?))
}

/// POST /api/campaigns
pub async fn create_campaign(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateCampaignPayload>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = run_blocking(core, move |core| core.create_campaign(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/campaigns/{id}
pub async fn get_campaign(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<CampaignDetail>> {
    Ok(Json(run_blocking(core, move |core| core.get_campaign(&subject, &id)).await?))
}

/// PATCH /api/campaigns/{id}
pub async fn update_campaign(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateCampaignPayload>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(run_blocking(core, move |core| core.update_campaign(&subject, &id, patch)).await?))
}

/// DELETE /api/campaigns/{id}
pub async fn delete_campaign(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_campaign(&subject, &id)).await?))
}

/// GET /api/campaigns/{id}/metrics
pub async fn list_campaign_metrics(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CampaignMetric>>> {
    Ok(Json(run_blocking(core, move |core| core.list_campaign_metrics(&subject, &id)).await?))
}

/// POST /api/campaign-metrics
pub async fn record_campaign_metric(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<RecordCampaignMetricPayload>,
) -> ApiResult<(StatusCode, Json<CampaignMetric>)> {
    tracing::debug!(campaign_id = %payload.campaign_id, "Recording campaign metric");
    let metric = run_blocking(core, move |core| core.record_campaign_metric(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(metric)))
}
