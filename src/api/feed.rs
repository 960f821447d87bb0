//! Activity feed, notifications and the dashboard overview.

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
    Activity, BooleanResponse, CountResponse, CreateNotificationPayload, DashboardOverview, ListActivitiesFilters,
    ListNotificationsFilters, Notification,
};
use crate::service::DashboardCore;

/// GET /api/dashboard
pub async fn dashboard_overview(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<DashboardOverview>> {
    Ok(Json(run_blocking(core, move |core| core.dashboard_overview(&subject)).await?))
}

/// GET /api/activities
pub async fn list_activities(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListActivitiesFilters>,
) -> ApiResult<Json<Vec<Activity>>> {
    Ok(Json(run_blocking(core, move |core| core.list_activities(&subject, filters)).await?))
}

/// GET /api/notifications
pub async fn list_notifications(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListNotificationsFilters>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(run_blocking(core, move |core| core.list_notifications(&subject, filters)).await?))
}

/// POST /api/notifications
pub async fn create_notification(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateNotificationPayload>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let notification = run_blocking(core, move |core| core.create_notification(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<CountResponse>> {
    Ok(Json(run_blocking(core, move |core| core.unread_notification_count(&subject)).await?))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<CountResponse>> {
    Ok(Json(run_blocking(core, move |core| core.mark_all_notifications_read(&subject)).await?))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.mark_notification_read(&subject, &id)).await?))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_notification(&subject, &id)).await?))
}
