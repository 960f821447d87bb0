use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CreatePhasePayload, CreateProjectPayload, CreateTaskPayload, DeletePhaseResponse, DeleteProjectResponse,
    ListProjectsFilters, ListTasksFilters, NotificationKind, Phase, PhaseStatus, Project, ProjectDetail,
    ProjectPriority, ProjectStatus, ReorderPhasesPayload, Task, TaskStatus, UpdatePhasePayload,
    UpdateProjectPayload, UpdateTaskPayload, User,
};
use crate::policy::{
    clamp_percentage, ensure_owner, normalize_optional, require_name, validate_amount, validate_date_range,
    validate_priority, DEFAULT_TASK_PRIORITY,
};
use crate::scoring::{phase_progress, project_progress};
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

impl DashboardCore {
    pub fn create_project(&self, subject: &str, payload: CreateProjectPayload) -> AppResult<Project> {
        let actor = self.actor(subject)?;
        let name = require_name(&payload.name, "project name")?;
        validate_date_range(payload.start_date, payload.due_date, "due date")?;
        if let Some(budget) = payload.budget {
            validate_amount(budget, "budget")?;
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            name,
            description: normalize_optional(payload.description),
            status: payload.status.unwrap_or(ProjectStatus::Planning),
            priority: payload.priority.unwrap_or(ProjectPriority::Medium),
            progress: 0,
            start_date: payload.start_date,
            due_date: payload.due_date,
            budget: payload.budget,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_project(&project)?;
        self.record(
            &actor,
            "project",
            &project.id,
            "project.created",
            format!("Created project {}", project.name),
            json!({ "status": project.status, "priority": project.priority }),
        )?;
        tracing::info!(project_id = %project.id, user_id = %actor.id, "project created");
        Ok(project)
    }

    pub fn list_projects(&self, subject: &str, filters: ListProjectsFilters) -> AppResult<Vec<Project>> {
        let actor = self.actor(subject)?;
        let limit = self.config.page_size(filters.limit);
        let offset = filters.offset.unwrap_or(0);
        self.db.list_projects(&actor.id, &filters, limit, offset)
    }

    pub fn get_project(&self, subject: &str, project_id: &str) -> AppResult<ProjectDetail> {
        let actor = self.actor(subject)?;
        let project = self.owned_project(&actor, project_id)?;
        let phases = self.db.list_phases(project_id)?;
        let tasks = self.db.list_project_tasks(project_id)?;
        Ok(ProjectDetail { project, phases, tasks })
    }

    pub fn update_project(&self, subject: &str, project_id: &str, patch: UpdateProjectPayload) -> AppResult<Project> {
        let actor = self.actor(subject)?;
        let mut project = self.owned_project(&actor, project_id)?;

        if let Some(name) = patch.name {
            project.name = require_name(&name, "project name")?;
        }
        if patch.description.is_some() {
            project.description = normalize_optional(patch.description);
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(priority) = patch.priority {
            project.priority = priority;
        }
        if let Some(progress) = patch.progress {
            project.progress = clamp_percentage(progress);
        }
        if patch.start_date.is_some() {
            project.start_date = patch.start_date;
        }
        if patch.due_date.is_some() {
            project.due_date = patch.due_date;
        }
        if let Some(budget) = patch.budget {
            project.budget = Some(validate_amount(budget, "budget")?);
        }
        validate_date_range(project.start_date, project.due_date, "due date")?;
        project.updated_at = Utc::now();

        self.db.update_project(&project)?;
        self.record(
            &actor,
            "project",
            &project.id,
            "project.updated",
            format!("Updated project {}", project.name),
            json!({ "status": project.status, "progress": project.progress }),
        )?;
        Ok(project)
    }

    /// Deletes the project, its phases and every task under it, one row at a time.
    pub fn delete_project(&self, subject: &str, project_id: &str) -> AppResult<DeleteProjectResponse> {
        let actor = self.actor(subject)?;
        let project = self.owned_project(&actor, project_id)?;

        let mut phases_deleted = 0u32;
        let mut tasks_deleted = 0u32;
        for phase in self.db.list_phases(project_id)? {
            for task in self.db.list_phase_tasks(&phase.id)? {
                if self.db.delete_task(&task.id)? {
                    tasks_deleted += 1;
                }
            }
            if self.db.delete_phase(&phase.id)? {
                phases_deleted += 1;
            }
        }
        // Anything left is attached to the project without a phase.
        for task in self.db.list_project_tasks(project_id)? {
            if self.db.delete_task(&task.id)? {
                tasks_deleted += 1;
            }
        }
        self.db.delete_project(project_id)?;

        self.record(
            &actor,
            "project",
            project_id,
            "project.deleted",
            format!("Deleted project {}", project.name),
            json!({ "phasesDeleted": phases_deleted, "tasksDeleted": tasks_deleted }),
        )?;
        tracing::info!(project_id, phases_deleted, tasks_deleted, "project deleted");
        Ok(DeleteProjectResponse {
            project_id: project_id.to_string(),
            phases_deleted,
            tasks_deleted,
        })
    }

    /// Sets project progress to the rounded mean of its phases.
    ///
    /// A project without phases keeps its current progress.
    pub fn recalculate_project_progress(&self, project_id: &str) -> AppResult<Project> {
        let mut project = self
            .db
            .get_project(project_id)?
            .ok_or_else(|| AppError::not_found("project", project_id))?;
        let phases = self.db.list_phases(project_id)?;
        let values = phases.iter().map(|phase| phase.progress).collect::<Vec<_>>();
        let Some(progress) = project_progress(&values) else {
            return Ok(project);
        };
        if progress == project.progress {
            return Ok(project);
        }

        let previous = project.progress;
        self.db.set_project_progress(project_id, progress)?;
        project.progress = progress;
        project.updated_at = Utc::now();
        tracing::debug!(project_id, previous, progress, "project progress recalculated");

        if progress == 100 && previous < 100 {
            self.db.insert_notification(
                &project.user_id,
                NotificationKind::Success,
                "Project completed",
                &format!("All phases of {} are complete", project.name),
                Some(&format!("/projects/{}", project.id)),
            )?;
            self.db.insert_activity(
                &project.user_id,
                "project",
                project_id,
                "project.completed",
                &format!("Project {} reached 100%", project.name),
                &json!({ "previousProgress": previous }),
            )?;
        }
        Ok(project)
    }

    fn owned_project(&self, actor: &User, project_id: &str) -> AppResult<Project> {
        let project = self
            .db
            .get_project(project_id)?
            .ok_or_else(|| AppError::not_found("project", project_id))?;
        ensure_owner(actor, &project.user_id, "project", project_id)?;
        Ok(project)
    }

    pub fn create_phase(&self, subject: &str, payload: CreatePhasePayload) -> AppResult<Phase> {
        let actor = self.actor(subject)?;
        let project = self.owned_project(&actor, &payload.project_id)?;
        let name = require_name(&payload.name, "phase name")?;
        validate_date_range(payload.start_date, payload.end_date, "end date")?;
        let position = match payload.position {
            Some(position) => position.max(0),
            None => self.db.next_phase_position(&project.id)?,
        };

        let now = Utc::now();
        let phase = Phase {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            user_id: actor.id.clone(),
            name,
            description: normalize_optional(payload.description),
            position,
            status: PhaseStatus::NotStarted,
            progress: 0,
            start_date: payload.start_date,
            end_date: payload.end_date,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_phase(&phase)?;
        self.record(
            &actor,
            "phase",
            &phase.id,
            "phase.created",
            format!("Added phase {} to {}", phase.name, project.name),
            json!({ "projectId": project.id, "position": phase.position }),
        )?;
        self.recalculate_project_progress(&project.id)?;
        Ok(phase)
    }

    pub fn list_phases(&self, subject: &str, project_id: &str) -> AppResult<Vec<Phase>> {
        let actor = self.actor(subject)?;
        self.owned_project(&actor, project_id)?;
        self.db.list_phases(project_id)
    }

    pub fn update_phase(&self, subject: &str, phase_id: &str, patch: UpdatePhasePayload) -> AppResult<Phase> {
        let actor = self.actor(subject)?;
        let mut phase = self.owned_phase(&actor, phase_id)?;
        let previous_progress = phase.progress;

        if let Some(name) = patch.name {
            phase.name = require_name(&name, "phase name")?;
        }
        if patch.description.is_some() {
            phase.description = normalize_optional(patch.description);
        }
        if let Some(status) = patch.status {
            phase.status = status;
        }
        if let Some(progress) = patch.progress {
            phase.progress = clamp_percentage(progress);
        }
        if patch.start_date.is_some() {
            phase.start_date = patch.start_date;
        }
        if patch.end_date.is_some() {
            phase.end_date = patch.end_date;
        }
        validate_date_range(phase.start_date, phase.end_date, "end date")?;
        phase.updated_at = Utc::now();

        self.db.update_phase(&phase)?;
        self.record(
            &actor,
            "phase",
            &phase.id,
            "phase.updated",
            format!("Updated phase {}", phase.name),
            json!({ "status": phase.status, "progress": phase.progress }),
        )?;
        if phase.progress != previous_progress {
            self.recalculate_project_progress(&phase.project_id)?;
        }
        Ok(phase)
    }

    /// Rewrites positions to follow `phase_ids`, which must name every phase exactly once.
    pub fn reorder_phases(&self, subject: &str, payload: ReorderPhasesPayload) -> AppResult<Vec<Phase>> {
        let actor = self.actor(subject)?;
        let project = self.owned_project(&actor, &payload.project_id)?;
        let existing = self
            .db
            .list_phases(&project.id)?
            .into_iter()
            .map(|phase| phase.id)
            .collect::<HashSet<_>>();
        let requested = payload.phase_ids.iter().cloned().collect::<HashSet<_>>();
        if requested.len() != payload.phase_ids.len() || requested != existing {
            return Err(AppError::Validation(format!(
                "phase order must list each of the {} phases of project {} exactly once",
                existing.len(),
                project.id
            )));
        }

        for (index, phase_id) in payload.phase_ids.iter().enumerate() {
            self.db.set_phase_position(phase_id, index as i32)?;
        }
        self.record(
            &actor,
            "project",
            &project.id,
            "phase.reordered",
            format!("Reordered phases of {}", project.name),
            json!({ "phaseIds": payload.phase_ids }),
        )?;
        self.db.list_phases(&project.id)
    }

    pub fn delete_phase(&self, subject: &str, phase_id: &str) -> AppResult<DeletePhaseResponse> {
        let actor = self.actor(subject)?;
        let phase = self.owned_phase(&actor, phase_id)?;

        let mut tasks_deleted = 0u32;
        for task in self.db.list_phase_tasks(phase_id)? {
            if self.db.delete_task(&task.id)? {
                tasks_deleted += 1;
            }
        }
        self.db.delete_phase(phase_id)?;
        self.record(
            &actor,
            "phase",
            phase_id,
            "phase.deleted",
            format!("Deleted phase {}", phase.name),
            json!({ "projectId": phase.project_id, "tasksDeleted": tasks_deleted }),
        )?;
        self.recalculate_project_progress(&phase.project_id)?;
        Ok(DeletePhaseResponse {
            phase_id: phase_id.to_string(),
            tasks_deleted,
        })
    }

    /// Derives phase progress and status from its direct tasks, then rolls up to the project.
    pub fn recalculate_phase_progress(&self, phase_id: &str) -> AppResult<Phase> {
        let mut phase = self
            .db
            .get_phase(phase_id)?
            .ok_or_else(|| AppError::not_found("phase", phase_id))?;
        let (completed, total) = self.db.count_phase_tasks(phase_id)?;
        let progress = phase_progress(completed, total);
        let status = match progress {
            100 => PhaseStatus::Completed,
            0 if self.db.count_phase_tasks_in_flight(phase_id)? == 0 => PhaseStatus::NotStarted,
            _ => PhaseStatus::InProgress,
        };

        if progress != phase.progress || status != phase.status {
            self.db.set_phase_progress(phase_id, progress, status)?;
            phase.progress = progress;
            phase.status = status;
            phase.updated_at = Utc::now();
        }
        self.recalculate_project_progress(&phase.project_id)?;
        Ok(phase)
    }

    fn owned_phase(&self, actor: &User, phase_id: &str) -> AppResult<Phase> {
        let phase = self
            .db
            .get_phase(phase_id)?
            .ok_or_else(|| AppError::not_found("phase", phase_id))?;
        ensure_owner(actor, &phase.user_id, "phase", phase_id)?;
        Ok(phase)
    }

    pub fn create_task(&self, subject: &str, payload: CreateTaskPayload) -> AppResult<Task> {
        let actor = self.actor(subject)?;
        let project = self.owned_project(&actor, &payload.project_id)?;
        let phase_id = normalize_optional(payload.phase_id);
        if let Some(phase_id) = &phase_id {
            self.phase_in_project(&actor, phase_id, &project.id)?;
        }
        let title = require_name(&payload.title, "task title")?;
        let priority = validate_priority(payload.priority.unwrap_or(DEFAULT_TASK_PRIORITY))?;
        let status = payload.status.unwrap_or(TaskStatus::Todo);

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            position: self.db.next_task_position(&project.id, phase_id.as_deref())?,
            phase_id,
            user_id: actor.id.clone(),
            title,
            description: normalize_optional(payload.description),
            status,
            priority,
            assignee: normalize_optional(payload.assignee),
            due_date: payload.due_date,
            completed_at: (status == TaskStatus::Done).then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_task(&task)?;
        self.record(
            &actor,
            "task",
            &task.id,
            "task.created",
            format!("Created task {}", task.title),
            json!({ "projectId": task.project_id, "phaseId": task.phase_id, "priority": task.priority }),
        )?;
        if let Some(phase_id) = &task.phase_id {
            self.recalculate_phase_progress(phase_id)?;
        }
        Ok(task)
    }

    pub fn list_tasks(&self, subject: &str, filters: ListTasksFilters) -> AppResult<Vec<Task>> {
        let actor = self.actor(subject)?;
        self.db.list_tasks(&actor.id, &filters)
    }

    pub fn update_task(&self, subject: &str, task_id: &str, patch: UpdateTaskPayload) -> AppResult<Task> {
        let actor = self.actor(subject)?;
        let mut task = self.owned_task(&actor, task_id)?;
        let previous_phase = task.phase_id.clone();
        let previous_status = task.status;

        if let Some(title) = patch.title {
            task.title = require_name(&title, "task title")?;
        }
        if patch.description.is_some() {
            task.description = normalize_optional(patch.description);
        }
        if let Some(priority) = patch.priority {
            task.priority = validate_priority(priority)?;
        }
        if patch.assignee.is_some() {
            task.assignee = normalize_optional(patch.assignee);
        }
        if patch.due_date.is_some() {
            task.due_date = patch.due_date;
        }
        if let Some(phase_id) = patch.phase_id {
            // An empty id detaches the task from its phase.
            task.phase_id = normalize_optional(Some(phase_id));
            if let Some(phase_id) = &task.phase_id {
                self.phase_in_project(&actor, phase_id, &task.project_id)?;
            }
            if task.phase_id != previous_phase {
                task.position = self.db.next_task_position(&task.project_id, task.phase_id.as_deref())?;
            }
        }
        let now = Utc::now();
        if let Some(status) = patch.status {
            task.status = status;
            match (previous_status == TaskStatus::Done, status == TaskStatus::Done) {
                (false, true) => task.completed_at = Some(now),
                (true, false) => task.completed_at = None,
                _ => {}
            }
        }
        task.updated_at = now;

        self.db.update_task(&task)?;
        self.record(
            &actor,
            "task",
            &task.id,
            "task.updated",
            format!("Updated task {}", task.title),
            json!({ "status": task.status, "phaseId": task.phase_id }),
        )?;

        if task.status != previous_status || task.phase_id != previous_phase {
            self.recalculate_task_parents(&task.project_id, previous_phase.as_deref(), task.phase_id.as_deref())?;
        }
        Ok(task)
    }

    /// Flips a task between done and todo.
    pub fn toggle_task_completion(&self, subject: &str, task_id: &str) -> AppResult<Task> {
        let actor = self.actor(subject)?;
        let mut task = self.owned_task(&actor, task_id)?;
        let now = Utc::now();
        let action = if task.is_completed() {
            task.status = TaskStatus::Todo;
            task.completed_at = None;
            "task.reopened"
        } else {
            task.status = TaskStatus::Done;
            task.completed_at = Some(now);
            "task.completed"
        };
        task.updated_at = now;

        self.db.update_task(&task)?;
        let verb = if task.is_completed() { "Completed" } else { "Reopened" };
        self.record(
            &actor,
            "task",
            &task.id,
            action,
            format!("{} task {}", verb, task.title),
            json!({ "projectId": task.project_id, "phaseId": task.phase_id }),
        )?;
        self.recalculate_task_parents(&task.project_id, None, task.phase_id.as_deref())?;
        Ok(task)
    }

    pub fn delete_task(&self, subject: &str, task_id: &str) -> AppResult<bool> {
        let actor = self.actor(subject)?;
        let task = self.owned_task(&actor, task_id)?;
        let deleted = self.db.delete_task(task_id)?;
        self.record(
            &actor,
            "task",
            task_id,
            "task.deleted",
            format!("Deleted task {}", task.title),
            json!({ "projectId": task.project_id, "phaseId": task.phase_id }),
        )?;
        self.recalculate_task_parents(&task.project_id, None, task.phase_id.as_deref())?;
        Ok(deleted)
    }

    fn recalculate_task_parents(&self, project_id: &str, previous_phase: Option<&str>, phase: Option<&str>) -> AppResult<()> {
        if let Some(previous) = previous_phase.filter(|previous| Some(*previous) != phase) {
            self.recalculate_phase_progress(previous)?;
        }
        match phase {
            Some(phase_id) => {
                self.recalculate_phase_progress(phase_id)?;
            }
            None => {
                self.recalculate_project_progress(project_id)?;
            }
        }
        Ok(())
    }

    fn phase_in_project(&self, actor: &User, phase_id: &str, project_id: &str) -> AppResult<Phase> {
        let phase = self.owned_phase(actor, phase_id)?;
        if phase.project_id != project_id {
            return Err(AppError::Validation(format!(
                "phase {} does not belong to project {}",
                phase_id, project_id
            )));
        }
        Ok(phase)
    }

    fn owned_task(&self, actor: &User, task_id: &str) -> AppResult<Task> {
        let task = self
            .db
            .get_task(task_id)?
            .ok_or_else(|| AppError::not_found("task", task_id))?;
        ensure_owner(actor, &task.user_id, "task", task_id)?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::models::{
        CreatePhasePayload, CreateProjectPayload, CreateTaskPayload, ListTasksFilters, PhaseStatus,
        ReorderPhasesPayload, TaskStatus, UpdateProjectPayload, UpdateTaskPayload,
    };
    use crate::service::test_support::{core, user};
    use crate::service::DashboardCore;
    use chrono::NaiveDate;

    fn project(core: &DashboardCore, subject: &str, name: &str) -> String {
        core.create_project(
            subject,
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
        .expect("create project")
        .id
    }

    fn phase(core: &DashboardCore, subject: &str, project_id: &str, name: &str) -> String {
        core.create_phase(
            subject,
            CreatePhasePayload {
                project_id: project_id.to_string(),
                name: name.to_string(),
                description: None,
                position: None,
                start_date: None,
                end_date: None,
            },
        )
        .expect("create phase")
        .id
    }

    fn task(core: &DashboardCore, subject: &str, project_id: &str, phase_id: Option<&str>, title: &str) -> String {
        core.create_task(
            subject,
            CreateTaskPayload {
                project_id: project_id.to_string(),
                phase_id: phase_id.map(ToString::to_string),
                title: title.to_string(),
                description: None,
                status: None,
                priority: None,
                assignee: None,
                due_date: None,
            },
        )
        .expect("create task")
        .id
    }

    #[test]
    fn toggling_tasks_rolls_progress_up_to_the_project() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Launch");
        let design = phase(&core, "ada", &project_id, "Design");
        let build = phase(&core, "ada", &project_id, "Build");
        let first = task(&core, "ada", &project_id, Some(&design), "Wireframes");
        task(&core, "ada", &project_id, Some(&design), "Mockups");
        task(&core, "ada", &project_id, Some(&design), "Review");
        let build_task = task(&core, "ada", &project_id, Some(&build), "Backend");

        core.toggle_task_completion("ada", &first).expect("toggle");
        let detail = core.get_project("ada", &project_id).expect("detail");
        let design_phase = detail.phases.iter().find(|phase| phase.id == design).expect("design");
        assert_eq!(design_phase.progress, 33);
        assert_eq!(design_phase.status, PhaseStatus::InProgress);
        // mean(33, 0) = 16.5 rounds away from zero
        assert_eq!(detail.project.progress, 17);

        core.toggle_task_completion("ada", &build_task).expect("toggle");
        let detail = core.get_project("ada", &project_id).expect("detail");
        assert_eq!(detail.project.progress, 67);

        let reopened = core.toggle_task_completion("ada", &first).expect("toggle back");
        assert_eq!(reopened.status, TaskStatus::Todo);
        assert!(reopened.completed_at.is_none());
        let detail = core.get_project("ada", &project_id).expect("detail");
        let design_phase = detail.phases.iter().find(|phase| phase.id == design).expect("design");
        assert_eq!(design_phase.progress, 0);
        assert_eq!(design_phase.status, PhaseStatus::NotStarted);
    }

    #[test]
    fn reaching_full_progress_notifies_on_each_transition() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Launch");
        let only = phase(&core, "ada", &project_id, "Everything");
        let task_id = task(&core, "ada", &project_id, Some(&only), "Ship it");

        core.toggle_task_completion("ada", &task_id).expect("complete");
        let detail = core.get_project("ada", &project_id).expect("detail");
        assert_eq!(detail.project.progress, 100);
        assert_eq!(detail.phases[0].status, PhaseStatus::Completed);
        assert_eq!(core.unread_notification_count("ada").expect("count").count, 1);

        core.toggle_task_completion("ada", &task_id).expect("reopen");
        core.toggle_task_completion("ada", &task_id).expect("complete again");
        assert_eq!(core.unread_notification_count("ada").expect("count").count, 2);
    }

    #[test]
    fn project_without_phases_keeps_manual_progress() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Solo");
        core.update_project(
            "ada",
            &project_id,
            UpdateProjectPayload {
                progress: Some(40),
                ..UpdateProjectPayload::default()
            },
        )
        .expect("update");
        let loose = task(&core, "ada", &project_id, None, "Loose end");
        core.toggle_task_completion("ada", &loose).expect("toggle");
        let detail = core.get_project("ada", &project_id).expect("detail");
        assert_eq!(detail.project.progress, 40);
    }

    #[test]
    fn delete_project_cascades_through_phases_and_tasks() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Cleanup");
        let first = phase(&core, "ada", &project_id, "One");
        let second = phase(&core, "ada", &project_id, "Two");
        task(&core, "ada", &project_id, Some(&first), "a");
        task(&core, "ada", &project_id, Some(&first), "b");
        task(&core, "ada", &project_id, Some(&second), "c");
        task(&core, "ada", &project_id, None, "d");

        let response = core.delete_project("ada", &project_id).expect("delete");
        assert_eq!(response.phases_deleted, 2);
        assert_eq!(response.tasks_deleted, 4);
        assert!(core.list_tasks("ada", ListTasksFilters::default()).expect("tasks").is_empty());
        let error = core.get_project("ada", &project_id).expect_err("gone");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[test]
    fn delete_phase_removes_tasks_and_recalculates() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Recalc");
        let done = phase(&core, "ada", &project_id, "Done");
        let pending = phase(&core, "ada", &project_id, "Pending");
        let finished = task(&core, "ada", &project_id, Some(&done), "finished");
        task(&core, "ada", &project_id, Some(&pending), "todo");
        core.toggle_task_completion("ada", &finished).expect("toggle");
        assert_eq!(core.get_project("ada", &project_id).expect("detail").project.progress, 50);

        let response = core.delete_phase("ada", &pending).expect("delete phase");
        assert_eq!(response.tasks_deleted, 1);
        assert_eq!(core.get_project("ada", &project_id).expect("detail").project.progress, 100);
    }

    #[test]
    fn other_users_cannot_touch_a_project() {
        let core = core();
        user(&core, "ada");
        user(&core, "eve");
        let project_id = project(&core, "ada", "Private");

        let error = core
            .update_project("eve", &project_id, UpdateProjectPayload::default())
            .expect_err("not owner");
        assert!(matches!(error, AppError::AccessDenied(_)));
        let error = core.delete_project("eve", &project_id).expect_err("not owner");
        assert!(matches!(error, AppError::AccessDenied(_)));
        assert!(core.list_projects("eve", Default::default()).expect("list").is_empty());
    }

    #[test]
    fn task_priority_and_dates_are_validated() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Checks");
        let error = core
            .create_task(
                "ada",
                CreateTaskPayload {
                    project_id: project_id.clone(),
                    phase_id: None,
                    title: "Too urgent".to_string(),
                    description: None,
                    status: None,
                    priority: Some(6),
                    assignee: None,
                    due_date: None,
                },
            )
            .expect_err("priority");
        assert!(matches!(error, AppError::Validation(_)));

        let error = core
            .update_project(
                "ada",
                &project_id,
                UpdateProjectPayload {
                    start_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                    due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
                    ..UpdateProjectPayload::default()
                },
            )
            .expect_err("dates");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn moving_a_task_recalculates_both_phases() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Move");
        let from = phase(&core, "ada", &project_id, "From");
        let to = phase(&core, "ada", &project_id, "To");
        let moving = task(&core, "ada", &project_id, Some(&from), "moving");
        task(&core, "ada", &project_id, Some(&to), "staying");
        core.update_task(
            "ada",
            &moving,
            UpdateTaskPayload {
                status: Some(TaskStatus::Done),
                ..UpdateTaskPayload::default()
            },
        )
        .expect("complete");

        let moved = core
            .update_task(
                "ada",
                &moving,
                UpdateTaskPayload {
                    phase_id: Some(to.clone()),
                    ..UpdateTaskPayload::default()
                },
            )
            .expect("move");
        assert!(moved.completed_at.is_some());

        let phases = core.list_phases("ada", &project_id).expect("phases");
        let from_phase = phases.iter().find(|phase| phase.id == from).expect("from");
        let to_phase = phases.iter().find(|phase| phase.id == to).expect("to");
        assert_eq!(from_phase.progress, 0);
        assert_eq!(to_phase.progress, 50);
    }

    #[test]
    fn reorder_requires_the_exact_phase_set() {
        let core = core();
        user(&core, "ada");
        let project_id = project(&core, "ada", "Order");
        let first = phase(&core, "ada", &project_id, "First");
        let second = phase(&core, "ada", &project_id, "Second");

        let error = core
            .reorder_phases(
                "ada",
                ReorderPhasesPayload {
                    project_id: project_id.clone(),
                    phase_ids: vec![second.clone()],
                },
            )
            .expect_err("missing phase");
        assert!(matches!(error, AppError::Validation(_)));

        let ordered = core
            .reorder_phases(
                "ada",
                ReorderPhasesPayload {
                    project_id,
                    phase_ids: vec![second.clone(), first.clone()],
                },
            )
            .expect("reorder");
        assert_eq!(ordered[0].id, second);
        assert_eq!(ordered[1].id, first);
        assert_eq!(ordered[1].position, 1);
    }
}
