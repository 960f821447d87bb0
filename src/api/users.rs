//! Current-user endpoints.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::identity::{Identity, IdentityProfile, EMAIL_HEADER, NAME_HEADER};
use crate::api::run_blocking;
use crate::errors::AppError;
use crate::models::{StoreUserPayload, User};
use crate::service::DashboardCore;

/// GET /api/users/me
pub async fn current_user(
    State(core): State<Arc<DashboardCore>>,
    Identity(subject): Identity,
) -> ApiResult<Json<User>> {
    let user = run_blocking(core, move |core| {
        core.current_user(&subject)?
            .ok_or_else(|| AppError::not_found("user", &subject))
    })
    .await?;
    Ok(Json(user))
}

/// POST /api/users/me
/// Upserts the user from the identity headers.
pub async fn store_user(
    State(core): State<Arc<DashboardCore>>,
    profile: IdentityProfile,
) -> ApiResult<Json<User>> {
    let name = profile
        .name
        .ok_or_else(|| ApiError::from(AppError::Validation(format!("missing {} header", NAME_HEADER))))?;
    let email = profile
        .email
        .ok_or_else(|| ApiError::from(AppError::Validation(format!("missing {} header", EMAIL_HEADER))))?;
    tracing::debug!(subject = %profile.subject, "storing user");

    let payload = StoreUserPayload {
        subject: profile.subject,
        name,
        email,
        image_url: profile.image_url,
    };
    let user = run_blocking(core, move |core| core.store_user(payload)).await?;
    Ok(Json(user))
}
