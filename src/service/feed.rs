use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Activity, BooleanResponse, CountResponse, CreateNotificationPayload, ListActivitiesFilters,
    ListNotificationsFilters, Notification, NotificationKind, User,
};
use crate::policy::{ensure_owner, normalize_optional, require_name};

impl DashboardCore {
    pub fn list_activities(&self, subject: &str, filters: ListActivitiesFilters) -> AppResult<Vec<Activity>> {
        let actor = self.actor(subject)?;
        let limit = self.config.page_size(filters.limit);
        self.db.list_activities(&actor.id, &filters, limit)
    }

    pub fn create_notification(&self, subject: &str, payload: CreateNotificationPayload) -> AppResult<Notification> {
        let actor = self.actor(subject)?;
        let title = require_name(&payload.title, "notification title")?;
        let message = payload.message.trim().to_string();
        if message.is_empty() {
            return Err(AppError::Validation("notification message cannot be empty".to_string()));
        }
        let link = normalize_optional(payload.link);
        self.db.insert_notification(
            &actor.id,
            payload.kind.unwrap_or(NotificationKind::Info),
            &title,
            &message,
            link.as_deref(),
        )
    }

    pub fn list_notifications(&self, subject: &str, filters: ListNotificationsFilters) -> AppResult<Vec<Notification>> {
        let actor = self.actor(subject)?;
        self.db.list_notifications(
            &actor.id,
            filters.unread_only.unwrap_or(false),
            self.config.max_page_size,
        )
    }

    pub fn unread_notification_count(&self, subject: &str) -> AppResult<CountResponse> {
        let actor = self.actor(subject)?;
        Ok(CountResponse {
            count: self.db.count_unread_notifications(&actor.id)?,
        })
    }

    pub fn mark_notification_read(&self, subject: &str, notification_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        self.owned_notification(&actor, notification_id)?;
        Ok(BooleanResponse {
            success: self.db.mark_notification_read(notification_id)?,
        })
    }

    pub fn mark_all_notifications_read(&self, subject: &str) -> AppResult<CountResponse> {
        let actor = self.actor(subject)?;
        let count = self.db.mark_all_notifications_read(&actor.id)?;
        tracing::debug!(user_id = %actor.id, count, "notifications marked read");
        Ok(CountResponse { count })
    }

    pub fn delete_notification(&self, subject: &str, notification_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        self.owned_notification(&actor, notification_id)?;
        Ok(BooleanResponse {
            success: self.db.delete_notification(notification_id)?,
        })
    }

    fn owned_notification(&self, actor: &User, notification_id: &str) -> AppResult<Notification> {
        let notification = self
            .db
            .get_notification(notification_id)?
            .ok_or_else(|| AppError::not_found("notification", notification_id))?;
        ensure_owner(actor, &notification.user_id, "notification", notification_id)?;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::models::{CreateNotificationPayload, CreateProjectPayload, ListActivitiesFilters, ListNotificationsFilters};
    use crate::service::test_support::{core, user};

    fn note(title: &str) -> CreateNotificationPayload {
        CreateNotificationPayload {
            kind: None,
            title: title.to_string(),
            message: "Something happened".to_string(),
            link: None,
        }
    }

    #[test]
    fn notifications_are_scoped_to_their_owner() {
        let core = core();
        user(&core, "ada");
        user(&core, "eve");
        let first = core.create_notification("ada", note("First")).expect("first");
        core.create_notification("ada", note("Second")).expect("second");
        assert_eq!(core.unread_notification_count("ada").expect("count").count, 2);
        assert_eq!(core.unread_notification_count("eve").expect("count").count, 0);

        let error = core.mark_notification_read("eve", &first.id).expect_err("denied");
        assert!(matches!(error, AppError::AccessDenied(_)));
        let error = core.delete_notification("eve", &first.id).expect_err("denied");
        assert!(matches!(error, AppError::AccessDenied(_)));

        assert!(core.mark_notification_read("ada", &first.id).expect("read").success);
        let unread = core
            .list_notifications(
                "ada",
                ListNotificationsFilters {
                    unread_only: Some(true),
                },
            )
            .expect("unread");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "Second");

        assert_eq!(core.mark_all_notifications_read("ada").expect("all").count, 1);
        assert_eq!(core.mark_all_notifications_read("ada").expect("again").count, 0);
        assert!(core.delete_notification("ada", &first.id).expect("delete").success);
        assert_eq!(core.list_notifications("ada", Default::default()).expect("list").len(), 1);
    }

    #[test]
    fn activity_feed_respects_limit_and_newest_first() {
        let core = core();
        user(&core, "ada");
        for name in ["One", "Two", "Three"] {
            core.create_project(
                "ada",
                CreateProjectPayload {
                    name: name.to_string(),
                    description: None,
                    status: None,
                    priority: None,
                    start_date: None,
                    due_date: None,
                    budget: None,
                },
            )
            .expect("project");
        }
        let feed = core
            .list_activities(
                "ada",
                ListActivitiesFilters {
                    limit: Some(2),
                    ..ListActivitiesFilters::default()
                },
            )
            .expect("feed");
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].description, "Created project Three");
        assert_eq!(feed[0].action, "project.created");
    }
}
