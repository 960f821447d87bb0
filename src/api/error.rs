//! Maps service errors onto HTTP responses.

use crate::errors::AppError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug)]
pub enum ApiError {
    /// No identity subject on the request.
    Unauthorized(String),
    App(AppError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::App(error) => {
                let status = match error {
                    AppError::NotFound(_) => StatusCode::NOT_FOUND,
                    AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
                    AppError::Validation(_) => StatusCode::BAD_REQUEST,
                    AppError::Conflict(_) => StatusCode::CONFLICT,
                    AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            ApiError::Unauthorized(msg) => msg,
            ApiError::App(error) => {
                if status.is_server_error() {
                    tracing::error!(error = %error, "request failed");
                }
                error.to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message, "code": code }))).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
