//! Identity headers forwarded by the upstream identity provider.
//!
//! The subject is trusted as given; verifying it is the provider's job.

use crate::api::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const SUBJECT_HEADER: &str = "x-user-subject";
pub const NAME_HEADER: &str = "x-user-name";
pub const EMAIL_HEADER: &str = "x-user-email";
pub const IMAGE_HEADER: &str = "x-user-image";

/// The acting user's identity subject.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, SUBJECT_HEADER)
            .map(Identity)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", SUBJECT_HEADER)))
    }
}

/// The full user object, used when registering or refreshing the current user.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub subject: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
}

impl<S> FromRequestParts<S> for IdentityProfile
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(subject) = Identity::from_request_parts(parts, state).await?;
        Ok(IdentityProfile {
            subject,
            name: header_value(parts, NAME_HEADER),
            email: header_value(parts, EMAIL_HEADER),
            image_url: header_value(parts, IMAGE_HEADER),
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
