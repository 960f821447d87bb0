use super::{parse_label, parse_time, query_params, timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Idea, IdeaCriterion, IdeaScore, IdeaStatus, Insight, InsightCategory, ListIdeasFilters};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

const IDEA_COLUMNS: &str = "id, user_id, title, description, category, status, total_score, created_at, updated_at";
const CRITERION_COLUMNS: &str = "id, user_id, name, description, weight, created_at";
const SCORE_COLUMNS: &str = "id, idea_id, criterion_id, user_id, value, updated_at";
const INSIGHT_COLUMNS: &str =
    "id, user_id, category, priority, title, description, entity_type, entity_id, generated, dismissed, created_at";

impl Database {
    pub fn insert_idea(&self, idea: &Idea) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ideas (id, user_id, title, description, category, status, total_score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                idea.id,
                idea.user_id,
                idea.title,
                idea.description,
                idea.category.as_str(),
                idea.status.as_str(),
                idea.total_score,
                timestamp(idea.created_at),
                timestamp(idea.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_idea(&self, idea_id: &str) -> AppResult<Option<Idea>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM ideas WHERE id = ?1", IDEA_COLUMNS),
            [idea_id],
            parse_idea_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_ideas(&self, user_id: &str, filters: &ListIdeasFilters) -> AppResult<Vec<Idea>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM ideas WHERE user_id = ?", IDEA_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(status) = filters.status {
            query.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        if let Some(category) = filters.category {
            query.push_str(" AND category = ?");
            params_vec.push(category.as_str().to_string());
        }
        query.push_str(" ORDER BY total_score DESC, created_at ASC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(query_params(&params_vec)), parse_idea_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_idea(&self, idea: &Idea) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ideas SET title = ?1, description = ?2, category = ?3, status = ?4, total_score = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                idea.title,
                idea.description,
                idea.category.as_str(),
                idea.status.as_str(),
                idea.total_score,
                timestamp(idea.updated_at),
                idea.id,
            ],
        )?;
        Ok(())
    }

    pub fn set_idea_score(&self, idea_id: &str, total_score: i32, status: IdeaStatus) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ideas SET total_score = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
            params![total_score, status.as_str(), timestamp(Utc::now()), idea_id],
        )?;
        Ok(())
    }

    pub fn delete_idea(&self, idea_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM ideas WHERE id = ?1", [idea_id])?;
        Ok(changed > 0)
    }

    pub fn insert_criterion(&self, criterion: &IdeaCriterion) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO idea_criteria (id, user_id, name, description, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                criterion.id,
                criterion.user_id,
                criterion.name,
                criterion.description,
                criterion.weight,
                timestamp(criterion.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_criterion(&self, criterion_id: &str) -> AppResult<Option<IdeaCriterion>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM idea_criteria WHERE id = ?1", CRITERION_COLUMNS),
            [criterion_id],
            parse_criterion_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_criteria(&self, user_id: &str) -> AppResult<Vec<IdeaCriterion>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM idea_criteria WHERE user_id = ?1 ORDER BY weight DESC, created_at ASC",
            CRITERION_COLUMNS
        ))?;
        let rows = statement.query_map([user_id], parse_criterion_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_criterion(&self, criterion: &IdeaCriterion) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE idea_criteria SET name = ?1, description = ?2, weight = ?3 WHERE id = ?4",
            params![criterion.name, criterion.description, criterion.weight, criterion.id],
        )?;
        Ok(())
    }

    pub fn delete_criterion(&self, criterion_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM idea_criteria WHERE id = ?1", [criterion_id])?;
        Ok(changed > 0)
    }

    pub fn upsert_idea_score(&self, idea_id: &str, criterion_id: &str, user_id: &str, value: i32) -> AppResult<IdeaScore> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO idea_scores (id, idea_id, criterion_id, user_id, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(idea_id, criterion_id) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![Uuid::new_v4().to_string(), idea_id, criterion_id, user_id, value, timestamp(now)],
        )?;
        conn.query_row(
            &format!(
                "SELECT {} FROM idea_scores WHERE idea_id = ?1 AND criterion_id = ?2",
                SCORE_COLUMNS
            ),
            params![idea_id, criterion_id],
            parse_score_row,
        )
        .map_err(AppError::from)
    }

    pub fn list_idea_scores(&self, idea_id: &str) -> AppResult<Vec<IdeaScore>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM idea_scores WHERE idea_id = ?1 ORDER BY updated_at ASC",
            SCORE_COLUMNS
        ))?;
        let rows = statement.query_map([idea_id], parse_score_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// `(value, weight)` pairs for every score whose criterion still exists.
    pub fn idea_score_inputs(&self, idea_id: &str) -> AppResult<Vec<(i32, i32)>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT s.value, c.weight FROM idea_scores s
             JOIN idea_criteria c ON c.id = s.criterion_id
             WHERE s.idea_id = ?1",
        )?;
        let rows = statement.query_map([idea_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn delete_idea_scores(&self, idea_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM idea_scores WHERE idea_id = ?1", [idea_id])?;
        Ok(changed as u32)
    }

    pub fn delete_criterion_scores(&self, criterion_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM idea_scores WHERE criterion_id = ?1", [criterion_id])?;
        Ok(changed as u32)
    }

    pub fn insert_insight(&self, insight: &Insight) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO insights (id, user_id, category, priority, title, description, entity_type, entity_id, generated, dismissed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                insight.id,
                insight.user_id,
                insight.category.as_str(),
                insight.priority,
                insight.title,
                insight.description,
                insight.entity_type,
                insight.entity_id,
                insight.generated,
                insight.dismissed,
                timestamp(insight.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_insight(&self, insight_id: &str) -> AppResult<Option<Insight>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM insights WHERE id = ?1", INSIGHT_COLUMNS),
            [insight_id],
            parse_insight_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_insights(&self, user_id: &str, include_dismissed: bool) -> AppResult<Vec<Insight>> {
        let conn = self.conn()?;
        let filter = if include_dismissed { "" } else { " AND dismissed = 0" };
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM insights WHERE user_id = ?1{} ORDER BY priority DESC, created_at DESC",
            INSIGHT_COLUMNS, filter
        ))?;
        let rows = statement.query_map([user_id], parse_insight_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn dismiss_insight(&self, insight_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE insights SET dismissed = 1 WHERE id = ?1", [insight_id])?;
        Ok(changed > 0)
    }

    /// Drops generated insights the user has not dismissed yet.
    pub fn clear_generated_insights(&self, user_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM insights WHERE user_id = ?1 AND generated = 1 AND dismissed = 0",
            [user_id],
        )?;
        Ok(changed as u32)
    }

    /// `(category, entity_id)` keys of dismissed insights tied to an entity.
    pub fn dismissed_insight_keys(&self, user_id: &str) -> AppResult<HashSet<(InsightCategory, String)>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT category, entity_id FROM insights WHERE user_id = ?1 AND dismissed = 1 AND entity_id IS NOT NULL",
        )?;
        let rows = statement.query_map([user_id], |row| {
            Ok((parse_label::<InsightCategory>(&row.get::<_, String>(0)?, 0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<HashSet<_>, _>>().map_err(AppError::from)
    }
}

fn parse_idea_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Idea> {
    Ok(Idea {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: parse_label(&row.get::<_, String>(4)?, 4)?,
        status: parse_label(&row.get::<_, String>(5)?, 5)?,
        total_score: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
        updated_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

fn parse_criterion_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdeaCriterion> {
    Ok(IdeaCriterion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        weight: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_score_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdeaScore> {
    Ok(IdeaScore {
        id: row.get(0)?,
        idea_id: row.get(1)?,
        criterion_id: row.get(2)?,
        user_id: row.get(3)?,
        value: row.get(4)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_insight_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Insight> {
    Ok(Insight {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: parse_label(&row.get::<_, String>(2)?, 2)?,
        priority: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        entity_type: row.get(6)?,
        entity_id: row.get(7)?,
        generated: row.get::<_, i64>(8)? != 0,
        dismissed: row.get::<_, i64>(9)? != 0,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
    })
}
