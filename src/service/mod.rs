//! Operations exposed to callers.
//!
//! Every method resolves the acting user from the identity subject, checks
//! ownership of the target rows, performs the writes and records an audit
//! activity. Multi-step work (cascades, progress recalculation) is a sequence
//! of independent database calls; a failure part way is not rolled back.

mod campaigns;
mod crm;
mod dashboard;
mod feed;
mod ideas;
mod insights;
mod projects;

use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{StoreUserPayload, User};
use crate::policy::{normalize_email, normalize_optional, require_name};
use serde_json::Value;
use std::sync::Arc;

pub struct DashboardCore {
    db: Arc<Database>,
    config: AppConfig,
}

impl DashboardCore {
    pub fn new(config: AppConfig) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&config.database_path)?);
        tracing::info!(path = %config.database_path.display(), "database opened");
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Arc<Database>, config: AppConfig) -> Arc<Self> {
        Arc::new(Self { db, config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn health(&self) -> AppResult<()> {
        self.db.ping()
    }

    /// Upserts the identity provider's user object.
    pub fn store_user(&self, payload: StoreUserPayload) -> AppResult<User> {
        let subject = payload.subject.trim();
        if subject.is_empty() {
            return Err(AppError::Validation("identity subject cannot be empty".to_string()));
        }
        let normalized = StoreUserPayload {
            subject: subject.to_string(),
            name: require_name(&payload.name, "user name")?,
            email: normalize_email(&payload.email)?,
            image_url: normalize_optional(payload.image_url),
        };
        let user = self.db.upsert_user(&normalized)?;
        tracing::debug!(user_id = %user.id, "user stored");
        Ok(user)
    }

    pub fn current_user(&self, subject: &str) -> AppResult<Option<User>> {
        self.db.get_user_by_subject(subject)
    }

    fn actor(&self, subject: &str) -> AppResult<User> {
        self.db
            .get_user_by_subject(subject)?
            .ok_or_else(|| AppError::not_found("user", subject))
    }

    fn record(
        &self,
        actor: &User,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        description: String,
        metadata: Value,
    ) -> AppResult<()> {
        self.db
            .insert_activity(&actor.id, entity_type, entity_id, action, &description, &metadata)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::DashboardCore;
    use crate::config::AppConfig;
    use crate::db::Database;
    use crate::models::{StoreUserPayload, User};
    use std::sync::Arc;

    pub fn core() -> Arc<DashboardCore> {
        core_with(AppConfig::default())
    }

    pub fn core_with(config: AppConfig) -> Arc<DashboardCore> {
        let db = Arc::new(Database::open_in_memory().expect("db"));
        DashboardCore::with_database(db, config)
    }

    pub fn user(core: &DashboardCore, subject: &str) -> User {
        core.store_user(StoreUserPayload {
            subject: subject.to_string(),
            name: format!("User {}", subject),
            email: format!("{}@example.com", subject),
            image_url: None,
        })
        .expect("store user")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{core, user};
    use crate::errors::AppError;
    use crate::models::StoreUserPayload;

    #[test]
    fn store_user_normalizes_email() {
        let core = core();
        let stored = core
            .store_user(StoreUserPayload {
                subject: " sub-1 ".to_string(),
                name: " Grace ".to_string(),
                email: " Grace@Example.COM ".to_string(),
                image_url: Some("  ".to_string()),
            })
            .expect("store");
        assert_eq!(stored.subject, "sub-1");
        assert_eq!(stored.name, "Grace");
        assert_eq!(stored.email, "grace@example.com");
        assert!(stored.image_url.is_none());
    }

    #[test]
    fn invalid_identity_is_rejected() {
        let core = core();
        let error = core
            .store_user(StoreUserPayload {
                subject: "sub-1".to_string(),
                name: "Grace".to_string(),
                email: "not-an-email".to_string(),
                image_url: None,
            })
            .expect_err("bad email");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn unknown_subject_is_not_found() {
        let core = core();
        user(&core, "known");
        assert!(core.current_user("known").expect("lookup").is_some());
        assert!(core.current_user("unknown").expect("lookup").is_none());
        let error = core.list_notifications("unknown", Default::default()).expect_err("no actor");
        assert!(matches!(error, AppError::NotFound(_)));
    }
}
