//! Input validation and the per-mutation ownership check.

use crate::errors::{AppError, AppResult};
use crate::models::User;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 5;
pub const DEFAULT_TASK_PRIORITY: i32 = 3;
pub const MIN_CRITERION_WEIGHT: i32 = 1;
pub const MAX_CRITERION_WEIGHT: i32 = 10;
pub const MIN_SCORE_VALUE: i32 = 0;
pub const MAX_SCORE_VALUE: i32 = 10;
const MAX_NAME_LENGTH: usize = 200;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Rejects the call unless `owner_id` is the acting user.
pub fn ensure_owner(actor: &User, owner_id: &str, entity: &str, entity_id: &str) -> AppResult<()> {
    if actor.id != owner_id {
        tracing::warn!(user_id = %actor.id, entity, entity_id, "ownership check failed");
        return Err(AppError::AccessDenied(format!(
            "{} {} does not belong to the current user",
            entity, entity_id
        )));
    }
    Ok(())
}

pub fn clamp_percentage(value: i32) -> i32 {
    value.clamp(0, 100)
}

pub fn clamp_percentage_f64(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub fn require_name(raw: &str, field: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text; blank becomes `None`.
pub fn normalize_optional(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::Validation(format!("'{}' is not a valid email address", raw.trim())));
    }
    Ok(email)
}

pub fn validate_priority(priority: i32) -> AppResult<i32> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(AppError::Validation(format!(
            "priority must be between {} and {}, got {}",
            MIN_PRIORITY, MAX_PRIORITY, priority
        )));
    }
    Ok(priority)
}

pub fn validate_weight(weight: i32) -> AppResult<i32> {
    if !(MIN_CRITERION_WEIGHT..=MAX_CRITERION_WEIGHT).contains(&weight) {
        return Err(AppError::Validation(format!(
            "criterion weight must be between {} and {}, got {}",
            MIN_CRITERION_WEIGHT, MAX_CRITERION_WEIGHT, weight
        )));
    }
    Ok(weight)
}

pub fn validate_score_value(value: i32) -> AppResult<i32> {
    if !(MIN_SCORE_VALUE..=MAX_SCORE_VALUE).contains(&value) {
        return Err(AppError::Validation(format!(
            "score must be between {} and {}, got {}",
            MIN_SCORE_VALUE, MAX_SCORE_VALUE, value
        )));
    }
    Ok(value)
}

pub fn validate_amount(value: f64, field: &str) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!("{} must be a non-negative number", field)));
    }
    Ok(value)
}

pub fn validate_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>, end_field: &str) -> AppResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(format!(
                "{} ({}) cannot be before the start date ({})",
                end_field, end, start
            )));
        }
    }
    Ok(())
}

pub fn validate_funnel(impressions: i64, clicks: i64, conversions: i64) -> AppResult<()> {
    if impressions < 0 || clicks < 0 || conversions < 0 {
        return Err(AppError::Validation("metric counts must be non-negative".to_string()));
    }
    if clicks > impressions {
        return Err(AppError::Validation("clicks cannot exceed impressions".to_string()));
    }
    if conversions > clicks {
        return Err(AppError::Validation("conversions cannot exceed clicks".to_string()));
    }
    Ok(())
}
