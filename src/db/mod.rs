mod campaigns;
mod crm;
mod ideas;
mod projects;

use crate::errors::{AppError, AppResult};
use crate::models::{
    Activity, ListActivitiesFilters, Notification, NotificationKind, StoreUserPayload, User,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::from_connection(conn, path)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::from_connection(conn, Path::new(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: &Path) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        tracing::debug!(path = %db_path.display(), "database schema applied");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn ping(&self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Inserts or refreshes the user keyed by identity subject.
    ///
    /// `payload.email` is expected to be normalized already.
    pub fn upsert_user(&self, payload: &StoreUserPayload) -> AppResult<User> {
        let now = Utc::now();
        let conn = self.conn()?;

        let email_owner: Option<String> = conn
            .query_row(
                "SELECT subject FROM users WHERE email = ?1",
                [&payload.email],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner) = email_owner {
            if owner != payload.subject {
                return Err(AppError::Conflict(format!(
                    "email {} is already registered to another user",
                    payload.email
                )));
            }
        }

        let existing = conn
            .query_row(
                "SELECT id, subject, name, email, image_url, created_at, updated_at FROM users WHERE subject = ?1",
                [&payload.subject],
                parse_user_row,
            )
            .optional()?;

        match existing {
            Some(mut user) => {
                if user.name != payload.name || user.email != payload.email || user.image_url != payload.image_url {
                    conn.execute(
                        "UPDATE users SET name = ?1, email = ?2, image_url = ?3, updated_at = ?4 WHERE id = ?5",
                        params![payload.name, payload.email, payload.image_url, timestamp(now), user.id],
                    )?;
                    user.name = payload.name.clone();
                    user.email = payload.email.clone();
                    user.image_url = payload.image_url.clone();
                    user.updated_at = now;
                }
                Ok(user)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO users (id, subject, name, email, image_url, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![id, payload.subject, payload.name, payload.email, payload.image_url, timestamp(now)],
                )?;
                Ok(User {
                    id,
                    subject: payload.subject.clone(),
                    name: payload.name.clone(),
                    email: payload.email.clone(),
                    image_url: payload.image_url.clone(),
                    created_at: now,
                    updated_at: now,
                })
            }
        }
    }

    pub fn get_user_by_subject(&self, subject: &str) -> AppResult<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, subject, name, email, image_url, created_at, updated_at FROM users WHERE subject = ?1",
            [subject],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_activity(
        &self,
        user_id: &str,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        description: &str,
        metadata: &serde_json::Value,
    ) -> AppResult<Activity> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activities (id, user_id, entity_type, entity_id, action, description, metadata_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                user_id,
                entity_type,
                entity_id,
                action,
                description,
                serde_json::to_string(metadata)?,
                timestamp(created_at)
            ],
        )?;
        Ok(Activity {
            id,
            user_id: user_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            description: description.to_string(),
            metadata: metadata.clone(),
            created_at,
        })
    }

    pub fn list_activities(&self, user_id: &str, filters: &ListActivitiesFilters, limit: u32) -> AppResult<Vec<Activity>> {
        let conn = self.conn()?;
        let mut query = String::from(
            "SELECT id, user_id, entity_type, entity_id, action, description, metadata_json, created_at
             FROM activities WHERE user_id = ?",
        );
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(entity_type) = &filters.entity_type {
            query.push_str(" AND entity_type = ?");
            params_vec.push(entity_type.clone());
        }
        if let Some(entity_id) = &filters.entity_id {
            query.push_str(" AND entity_id = ?");
            params_vec.push(entity_id.clone());
        }
        query.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");

        let mut statement = conn.prepare(&query)?;
        let mut dyn_params = query_params(&params_vec);
        dyn_params.push(&limit);

        let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), |row| {
            Ok(Activity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                entity_type: row.get(2)?,
                entity_id: row.get(3)?,
                action: row.get(4)?,
                description: row.get(5)?,
                metadata: serde_json::from_str::<serde_json::Value>(&row.get::<_, String>(6)?)
                    .unwrap_or(serde_json::json!({})),
                created_at: parse_time(&row.get::<_, String>(7)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn insert_notification(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        link: Option<&str>,
    ) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, title, message, link, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![id, user_id, kind.as_str(), title, message, link, timestamp(created_at)],
        )?;
        Ok(Notification {
            id,
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            link: link.map(ToString::to_string),
            read: false,
            created_at,
        })
    }

    pub fn get_notification(&self, notification_id: &str) -> AppResult<Option<Notification>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_id, kind, title, message, link, read, created_at FROM notifications WHERE id = ?1",
            [notification_id],
            parse_notification_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_notifications(&self, user_id: &str, unread_only: bool, limit: u32) -> AppResult<Vec<Notification>> {
        let conn = self.conn()?;
        let query = if unread_only {
            "SELECT id, user_id, kind, title, message, link, read, created_at FROM notifications
             WHERE user_id = ?1 AND read = 0 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        } else {
            "SELECT id, user_id, kind, title, message, link, read, created_at FROM notifications
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        };
        let mut statement = conn.prepare(query)?;
        let rows = statement.query_map(params![user_id, limit], parse_notification_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(1) FROM notifications WHERE user_id = ?1 AND read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn mark_notification_read(&self, notification_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [notification_id])?;
        Ok(changed > 0)
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            [user_id],
        )?;
        Ok(changed as u32)
    }

    pub fn delete_notification(&self, notification_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM notifications WHERE id = ?1", [notification_id])?;
        Ok(changed > 0)
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        subject: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        image_url: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
        updated_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_label(&row.get::<_, String>(2)?, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        link: row.get(5)?,
        read: row.get::<_, i64>(6)? != 0,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

pub(crate) fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

pub(crate) fn parse_label<T>(raw: &str, column: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error)),
        )
    })
}

/// Collects `?`-style parameters built up alongside a dynamic query string.
pub(crate) fn query_params(values: &[String]) -> Vec<&dyn rusqlite::ToSql> {
    values.iter().map(|param| param as &dyn rusqlite::ToSql).collect()
}

/// `%term%` for `LIKE ? ESCAPE '\'`, with the term's own wildcards escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::{like_pattern, Database};
    use crate::errors::AppError;
    use crate::models::{ListActivitiesFilters, NotificationKind, StoreUserPayload};

    fn identity(subject: &str, email: &str) -> StoreUserPayload {
        StoreUserPayload {
            subject: subject.to_string(),
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            image_url: None,
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("acme"), "%acme%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn database_file_is_created_with_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("test.db");
        let db = Database::new(&db_path).expect("db");
        db.ping().expect("ping");
        assert!(db_path.exists());
    }

    #[test]
    fn upsert_user_is_keyed_by_subject() {
        let db = Database::open_in_memory().expect("db");
        let first = db.upsert_user(&identity("sub-1", "ada@example.com")).expect("insert user");
        let mut renamed = identity("sub-1", "ada@example.com");
        renamed.name = "Ada King".to_string();
        let second = db.upsert_user(&renamed).expect("update user");
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ada King");

        let loaded = db.get_user_by_subject("sub-1").expect("get").expect("exists");
        assert_eq!(loaded.name, "Ada King");
    }

    #[test]
    fn email_is_unique_across_users() {
        let db = Database::open_in_memory().expect("db");
        db.upsert_user(&identity("sub-1", "ada@example.com")).expect("insert user");
        let error = db
            .upsert_user(&identity("sub-2", "ada@example.com"))
            .expect_err("duplicate email must conflict");
        assert!(matches!(error, AppError::Conflict(_)));
    }

    #[test]
    fn activities_are_listed_newest_first_and_filtered() {
        let db = Database::open_in_memory().expect("db");
        let user = db.upsert_user(&identity("sub-1", "ada@example.com")).expect("user");
        db.insert_activity(&user.id, "project", "p-1", "project.created", "Created", &serde_json::json!({}))
            .expect("first");
        db.insert_activity(&user.id, "deal", "d-1", "deal.created", "Created deal", &serde_json::json!({"value": 10}))
            .expect("second");

        let all = db
            .list_activities(&user.id, &ListActivitiesFilters::default(), 10)
            .expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entity_type, "deal");
        assert_eq!(all[0].metadata["value"], 10);

        let projects_only = db
            .list_activities(
                &user.id,
                &ListActivitiesFilters {
                    entity_type: Some("project".to_string()),
                    ..ListActivitiesFilters::default()
                },
                10,
            )
            .expect("filtered");
        assert_eq!(projects_only.len(), 1);
    }

    #[test]
    fn notifications_track_read_state() {
        let db = Database::open_in_memory().expect("db");
        let user = db.upsert_user(&identity("sub-1", "ada@example.com")).expect("user");
        let first = db
            .insert_notification(&user.id, NotificationKind::Info, "Hello", "World", None)
            .expect("notify");
        db.insert_notification(&user.id, NotificationKind::Success, "Won", "Deal closed", Some("/deals/1"))
            .expect("notify");
        assert_eq!(db.count_unread_notifications(&user.id).expect("count"), 2);

        assert!(db.mark_notification_read(&first.id).expect("mark"));
        assert_eq!(db.list_notifications(&user.id, true, 50).expect("unread").len(), 1);
        assert_eq!(db.mark_all_notifications_read(&user.id).expect("mark all"), 1);
        assert_eq!(db.count_unread_notifications(&user.id).expect("count"), 0);
        assert!(db.delete_notification(&first.id).expect("delete"));
        assert!(db.get_notification(&first.id).expect("get").is_none());
    }
}
