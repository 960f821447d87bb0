//! HTTP API layer.
//!
//! Each submodule handles endpoints for one area of the dashboard. Handlers
//! read the identity subject from the request headers and delegate to
//! [`DashboardCore`].

pub mod campaigns;
pub mod crm;
pub mod error;
pub mod feed;
pub mod health;
pub mod identity;
pub mod ideas;
pub mod projects;
pub mod users;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::error::ApiResult;
use crate::errors::{AppError, AppResult};
use crate::service::DashboardCore;

/// Runs a store-backed operation on the blocking pool.
pub async fn run_blocking<T, F>(core: Arc<DashboardCore>, operation: F) -> ApiResult<T>
where
    F: FnOnce(&DashboardCore) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || operation(&core)).await {
        Ok(result) => Ok(result?),
        Err(error) => Err(AppError::Internal(format!("blocking task failed: {}", error)).into()),
    }
}

/// Create the main API router with all endpoints
pub fn create_router(core: Arc<DashboardCore>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Users
        .route("/api/users/me", get(users::current_user).post(users::store_user))
        .route("/api/dashboard", get(feed::dashboard_overview))
        // Projects, phases, tasks
        .route("/api/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/{id}/phases", get(projects::list_phases))
        .route("/api/projects/{id}/phases/order", put(projects::reorder_phases))
        .route("/api/phases", post(projects::create_phase))
        .route(
            "/api/phases/{id}",
            axum::routing::patch(projects::update_phase).delete(projects::delete_phase),
        )
        .route("/api/tasks", get(projects::list_tasks).post(projects::create_task))
        .route(
            "/api/tasks/{id}",
            axum::routing::patch(projects::update_task).delete(projects::delete_task),
        )
        .route("/api/tasks/{id}/toggle", post(projects::toggle_task))
        // Campaigns
        .route("/api/campaigns", get(campaigns::list_campaigns).post(campaigns::create_campaign))
        .route(
            "/api/campaigns/{id}",
            get(campaigns::get_campaign)
                .patch(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/api/campaigns/{id}/metrics", get(campaigns::list_campaign_metrics))
        .route("/api/campaign-metrics", post(campaigns::record_campaign_metric))
        // CRM
        .route("/api/customers", get(crm::list_customers).post(crm::create_customer))
        .route(
            "/api/customers/{id}",
            get(crm::get_customer).patch(crm::update_customer).delete(crm::delete_customer),
        )
        .route("/api/deals", get(crm::list_deals).post(crm::create_deal))
        .route(
            "/api/deals/{id}",
            get(crm::get_deal).patch(crm::update_deal).delete(crm::delete_deal),
        )
        .route("/api/pipeline", get(crm::pipeline_summary))
        .route(
            "/api/sales-activities",
            get(crm::list_sales_activities).post(crm::log_sales_activity),
        )
        .route(
            "/api/sales-activities/{id}",
            axum::routing::delete(crm::delete_sales_activity),
        )
        .route("/api/sales-activities/{id}/complete", post(crm::complete_sales_activity))
        // Ideas and insights
        .route("/api/criteria", get(ideas::list_criteria).post(ideas::create_criterion))
        .route(
            "/api/criteria/{id}",
            axum::routing::patch(ideas::update_criterion).delete(ideas::delete_criterion),
        )
        .route("/api/ideas", get(ideas::list_ideas).post(ideas::create_idea))
        .route(
            "/api/ideas/{id}",
            get(ideas::get_idea).patch(ideas::update_idea).delete(ideas::delete_idea),
        )
        .route("/api/ideas/{id}/scores", post(ideas::score_idea))
        .route("/api/insights", get(ideas::list_insights).post(ideas::create_insight))
        .route("/api/insights/generate", post(ideas::generate_insights))
        .route("/api/insights/{id}/dismiss", post(ideas::dismiss_insight))
        // Feed
        .route("/api/activities", get(feed::list_activities))
        .route(
            "/api/notifications",
            get(feed::list_notifications).post(feed::create_notification),
        )
        .route("/api/notifications/unread-count", get(feed::unread_count))
        .route("/api/notifications/read-all", post(feed::mark_all_read))
        .route("/api/notifications/{id}/read", post(feed::mark_read))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(feed::delete_notification),
        )
        .with_state(core)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::run_blocking;
    use crate::api::error::ApiError;
    use crate::errors::AppError;
    use crate::service::test_support::{core, user};

    #[tokio::test]
    async fn blocking_operations_return_their_results() {
        let core = core();
        user(&core, "ada");

        let current = run_blocking(core.clone(), |core| core.current_user("ada"))
            .await
            .expect("current user");
        assert_eq!(current.map(|user| user.email), Some("ada@example.com".to_string()));

        let err = run_blocking(core, |core| core.dashboard_overview("nobody"))
            .await
            .expect_err("unknown subject");
        assert!(matches!(err, ApiError::App(AppError::NotFound(_))));
    }
}
