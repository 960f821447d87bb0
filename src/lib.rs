//! Multi-tenant business operations dashboard: projects, campaigns, CRM,
//! idea scoring and insights behind a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod models;
pub mod policy;
pub mod scoring;
pub mod service;

use std::sync::Arc;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::service::DashboardCore;

/// Opens storage and builds the router for a loaded configuration.
pub fn build_app(config: AppConfig) -> AppResult<(Arc<DashboardCore>, axum::Router)> {
    let core = DashboardCore::new(config)?;
    let router = api::create_router(core.clone());
    Ok((core, router))
}
