//! Customer, deal and sales-activity endpoints.

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
    BooleanResponse, CreateCustomerPayload, CreateDealPayload, Customer, CustomerDetail, Deal,
    DeleteCustomerResponse, ListCustomersFilters, ListDealsFilters, ListSalesActivitiesFilters,
    LogSalesActivityPayload, PipelineSummary, SalesActivity, UpdateCustomerPayload, UpdateDealPayload,
};
use crate::service::DashboardCore;

/// GET /api/customers
pub async fn list_customers(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListCustomersFilters>,
) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(run_blocking(core, move |core| core.list_customers(&subject, filters)).await?))
}

/// POST /api/customers
pub async fn create_customer(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateCustomerPayload>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let customer = run_blocking(core, move |core| core.create_customer(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /api/customers/{id}
pub async fn get_customer(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<CustomerDetail>> {
    Ok(Json(run_blocking(core, move |core| core.get_customer(&subject, &id)).await?))
}

/// PATCH /api/customers/{id}
pub async fn update_customer(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateCustomerPayload>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(run_blocking(core, move |core| core.update_customer(&subject, &id, patch)).await?))
}

/// DELETE /api/customers/{id}
pub async fn delete_customer(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteCustomerResponse>> {
    tracing::info!(subject = %subject, "Deleting customer {}", id);
    Ok(Json(run_blocking(core, move |core| core.delete_customer(&subject, &id)).await?))
}

/// GET /api/deals
pub async fn list_deals(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListDealsFilters>,
) -> ApiResult<Json<Vec<Deal>>> {
    Ok(Json(run_blocking(core, move |core| core.list_deals(&subject, filters)).await?))
}

/// POST /api/deals
pub async fn create_deal(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<CreateDealPayload>,
) -> ApiResult<(StatusCode, Json<Deal>)> {
    let deal = run_blocking(core, move |core| core.create_deal(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

/// GET /api/deals/{id}
pub async fn get_deal(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Deal>> {
    Ok(Json(run_blocking(core, move |core| core.get_deal(&subject, &id)).await?))
}

/// PATCH /api/deals/{id}
pub async fn update_deal(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
    Json(patch): Json<UpdateDealPayload>,
) -> ApiResult<Json<Deal>> {
    Ok(Json(run_blocking(core, move |core| core.update_deal(&subject, &id, patch)).await?))
}

/// DELETE /api/deals/{id}
pub async fn delete_deal(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_deal(&subject, &id)).await?))
}

/// GET /api/pipeline
pub async fn pipeline_summary(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<PipelineSummary>> {
    Ok(Json(run_blocking(core, move |core| core.pipeline_summary(&subject)).await?))
}

/// GET /api/sales-activities
pub async fn list_sales_activities(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Query(filters): Query<ListSalesActivitiesFilters>,
) -> ApiResult<Json<Vec<SalesActivity>>> {
    Ok(Json(run_blocking(core, move |core| core.list_sales_activities(&subject, filters)).await?))
}

/// POST /api/sales-activities
pub async fn log_sales_activity(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Json(payload): Json<LogSalesActivityPayload>,
) -> ApiResult<(StatusCode, Json<SalesActivity>)> {
    let activity = run_blocking(core, move |core| core.log_sales_activity(&subject, payload)).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

/// POST /api/sales-activities/{id}/complete
pub async fn complete_sales_activity(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<SalesActivity>> {
    Ok(Json(run_blocking(core, move |core| core.complete_sales_activity(&subject, &id)).await?))
}

/// DELETE /api/sales-activities/{id}
pub async fn delete_sales_activity(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<BooleanResponse>> {
    Ok(Json(run_blocking(core, move |core| core.delete_sales_activity(&subject, &id)).await?))
}
