use super::{like_pattern, parse_label, parse_optional_time, parse_time, query_params, timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ListProjectsFilters, ListTasksFilters, Phase, PhaseStatus, Project, ProjectStatus, Task, TaskStatus,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

const PROJECT_COLUMNS: &str =
    "id, user_id, name, description, status, priority, progress, start_date, due_date, budget, created_at, updated_at";
const PHASE_COLUMNS: &str =
    "id, project_id, user_id, name, description, position, status, progress, start_date, end_date, created_at, updated_at";
const TASK_COLUMNS: &str = "id, project_id, phase_id, user_id, title, description, status, priority, assignee, due_date, completed_at, position, created_at, updated_at";

impl Database {
    pub fn insert_project(&self, project: &Project) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (id, user_id, name, description, status, priority, progress, start_date, due_date, budget, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                project.id,
                project.user_id,
                project.name,
                project.description,
                project.status.as_str(),
                project.priority.as_str(),
                project.progress,
                project.start_date,
                project.due_date,
                project.budget,
                timestamp(project.created_at),
                timestamp(project.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, project_id: &str) -> AppResult<Option<Project>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            [project_id],
            parse_project_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_projects(&self, user_id: &str, filters: &ListProjectsFilters, limit: u32, offset: u32) -> AppResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM projects WHERE user_id = ?", PROJECT_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];

        if let Some(status) = filters.status {
            query.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        if let Some(search) = &filters.search {
            query.push_str(" AND (name LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')");
            params_vec.push(like_pattern(search));
            params_vec.push(like_pattern(search));
        }
        query.push_str(" ORDER BY updated_at DESC LIMIT ? OFFSET ?");

        let mut statement = conn.prepare(&query)?;
        let mut dyn_params = query_params(&params_vec);
        dyn_params.push(&limit);
        dyn_params.push(&offset);
        let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), parse_project_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Per-status project count and progress sum across all of the user's projects.
    pub fn project_status_totals(&self, user_id: &str) -> AppResult<Vec<(ProjectStatus, u32, i64)>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT status, COUNT(1), COALESCE(SUM(progress), 0) FROM projects WHERE user_id = ?1 GROUP BY status",
        )?;
        let rows = statement.query_map([user_id], |row| {
            Ok((
                parse_label::<ProjectStatus>(&row.get::<_, String>(0)?, 0)?,
                row.get::<_, i64>(1)?.max(0) as u32,
                row.get::<_, i64>(2)?,
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Open projects below 100% whose due date is before `today`.
    pub fn list_late_projects(&self, user_id: &str, today: NaiveDate) -> AppResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM projects
             WHERE user_id = ?1 AND status NOT IN (?2, ?3) AND progress < 100
               AND due_date IS NOT NULL AND due_date < ?4
             ORDER BY due_date ASC",
            PROJECT_COLUMNS
        ))?;
        let rows = statement.query_map(
            params![
                user_id,
                ProjectStatus::Completed.as_str(),
                ProjectStatus::Cancelled.as_str(),
                today
            ],
            parse_project_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_project(&self, project: &Project) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE projects SET name = ?1, description = ?2, status = ?3, priority = ?4, progress = ?5,
               start_date = ?6, due_date = ?7, budget = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                project.name,
                project.description,
                project.status.as_str(),
                project.priority.as_str(),
                project.progress,
                project.start_date,
                project.due_date,
                project.budget,
                timestamp(project.updated_at),
                project.id,
            ],
        )?;
        Ok(())
    }

    pub fn set_project_progress(&self, project_id: &str, progress: i32) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE projects SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress, timestamp(Utc::now()), project_id],
        )?;
        Ok(())
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
        Ok(changed > 0)
    }

    pub fn insert_phase(&self, phase: &Phase) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO phases (id, project_id, user_id, name, description, position, status, progress, start_date, end_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                phase.id,
                phase.project_id,
                phase.user_id,
                phase.name,
                phase.description,
                phase.position,
                phase.status.as_str(),
                phase.progress,
                phase.start_date,
                phase.end_date,
                timestamp(phase.created_at),
                timestamp(phase.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_phase(&self, phase_id: &str) -> AppResult<Option<Phase>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM phases WHERE id = ?1", PHASE_COLUMNS),
            [phase_id],
            parse_phase_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_phases(&self, project_id: &str) -> AppResult<Vec<Phase>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM phases WHERE project_id = ?1 ORDER BY position ASC, created_at ASC",
            PHASE_COLUMNS
        ))?;
        let rows = statement.query_map([project_id], parse_phase_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn next_phase_position(&self, project_id: &str) -> AppResult<i32> {
        let conn = self.conn()?;
        let next: i32 = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM phases WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    pub fn update_phase(&self, phase: &Phase) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE phases SET name = ?1, description = ?2, position = ?3, status = ?4, progress = ?5,
               start_date = ?6, end_date = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                phase.name,
                phase.description,
                phase.position,
                phase.status.as_str(),
                phase.progress,
                phase.start_date,
                phase.end_date,
                timestamp(phase.updated_at),
                phase.id,
            ],
        )?;
        Ok(())
    }

    pub fn set_phase_progress(&self, phase_id: &str, progress: i32, status: PhaseStatus) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE phases SET progress = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
            params![progress, status.as_str(), timestamp(Utc::now()), phase_id],
        )?;
        Ok(())
    }

    pub fn set_phase_position(&self, phase_id: &str, position: i32) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE phases SET position = ?1, updated_at = ?2 WHERE id = ?3",
            params![position, timestamp(Utc::now()), phase_id],
        )?;
        Ok(())
    }

    pub fn delete_phase(&self, phase_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM phases WHERE id = ?1", [phase_id])?;
        Ok(changed > 0)
    }

    pub fn insert_task(&self, task: &Task) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, project_id, phase_id, user_id, title, description, status, priority, assignee, due_date, completed_at, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id,
                task.project_id,
                task.phase_id,
                task.user_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.assignee,
                task.due_date,
                task.completed_at.map(timestamp),
                task.position,
                timestamp(task.created_at),
                timestamp(task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> AppResult<Option<Task>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            [task_id],
            parse_task_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_project_tasks(&self, project_id: &str) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY position ASC, created_at ASC",
            TASK_COLUMNS
        ))?;
        let rows = statement.query_map([project_id], parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn list_phase_tasks(&self, phase_id: &str) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE phase_id = ?1 ORDER BY position ASC, created_at ASC",
            TASK_COLUMNS
        ))?;
        let rows = statement.query_map([phase_id], parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn list_tasks(&self, user_id: &str, filters: &ListTasksFilters) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM tasks WHERE user_id = ?", TASK_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];

        if let Some(project_id) = &filters.project_id {
            query.push_str(" AND project_id = ?");
            params_vec.push(project_id.clone());
        }
        if let Some(phase_id) = &filters.phase_id {
            query.push_str(" AND phase_id = ?");
            params_vec.push(phase_id.clone());
        }
        if let Some(status) = filters.status {
            query.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        if filters.overdue_only.unwrap_or(false) {
            query.push_str(" AND status != ? AND due_date IS NOT NULL AND due_date < ?");
            params_vec.push(TaskStatus::Done.as_str().to_string());
            params_vec.push(Utc::now().date_naive().to_string());
        }
        query.push_str(" ORDER BY due_date IS NULL, due_date ASC, priority DESC, created_at ASC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(query_params(&params_vec)), parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Returns `(completed, total)` over tasks attached directly to the phase.
    pub fn count_phase_tasks(&self, phase_id: &str) -> AppResult<(usize, usize)> {
        let conn = self.conn()?;
        let (completed, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0), COUNT(1) FROM tasks WHERE phase_id = ?2",
            params![TaskStatus::Done.as_str(), phase_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((completed.max(0) as usize, total.max(0) as usize))
    }

    pub fn count_phase_tasks_in_flight(&self, phase_id: &str) -> AppResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM tasks WHERE phase_id = ?1 AND status IN (?2, ?3)",
            params![phase_id, TaskStatus::InProgress.as_str(), TaskStatus::Review.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    pub fn next_task_position(&self, project_id: &str, phase_id: Option<&str>) -> AppResult<i32> {
        let conn = self.conn()?;
        let next: i32 = match phase_id {
            Some(phase_id) => conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE phase_id = ?1",
                [phase_id],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE project_id = ?1 AND phase_id IS NULL",
                [project_id],
                |row| row.get(0),
            )?,
        };
        Ok(next)
    }

    pub fn update_task(&self, task: &Task) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE tasks SET phase_id = ?1, title = ?2, description = ?3, status = ?4, priority = ?5, assignee = ?6,
               due_date = ?7, completed_at = ?8, position = ?9, updated_at = ?10
             WHERE id = ?11",
            params![
                task.phase_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.assignee,
                task.due_date,
                task.completed_at.map(timestamp),
                task.position,
                timestamp(task.updated_at),
                task.id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        Ok(changed > 0)
    }
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: parse_label(&row.get::<_, String>(4)?, 4)?,
        priority: parse_label(&row.get::<_, String>(5)?, 5)?,
        progress: row.get(6)?,
        start_date: row.get(7)?,
        due_date: row.get(8)?,
        budget: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        updated_at: parse_time(&row.get::<_, String>(11)?)?,
    })
}

fn parse_phase_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Phase> {
    Ok(Phase {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        position: row.get(5)?,
        status: parse_label(&row.get::<_, String>(6)?, 6)?,
        progress: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        updated_at: parse_time(&row.get::<_, String>(11)?)?,
    })
}

fn parse_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        phase_id: row.get(2)?,
        user_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        status: parse_label(&row.get::<_, String>(6)?, 6)?,
        priority: row.get(7)?,
        assignee: row.get(8)?,
        due_date: row.get(9)?,
        completed_at: parse_optional_time(row.get(10)?)?,
        position: row.get(11)?,
        created_at: parse_time(&row.get::<_, String>(12)?)?,
        updated_at: parse_time(&row.get::<_, String>(13)?)?,
    })
}
