use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Campaign, CampaignStatus, CreateInsightPayload, Deal, DealStage, GenerateInsightsResponse, Idea, IdeaStatus,
    Insight, InsightCategory, ListCampaignsFilters, ListDealsFilters, ListIdeasFilters, ListTasksFilters, Project,
    ProjectStatus, Task, User,
};
use crate::policy::{ensure_owner, normalize_optional, require_name, validate_priority};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

const BUDGET_WARNING_PERCENT: f64 = 90.0;

/// A rule hit before it is persisted.
#[derive(Debug, Clone, PartialEq)]
struct Finding {
    category: InsightCategory,
    priority: i32,
    title: String,
    description: String,
    entity_type: &'static str,
    entity_id: String,
}

#[derive(Default)]
struct Snapshot {
    tasks: Vec<Task>,
    projects: Vec<Project>,
    deals: Vec<Deal>,
    campaigns: Vec<Campaign>,
    unscored_ideas: Vec<Idea>,
}

fn evaluate_rules(today: NaiveDate, snapshot: &Snapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for task in snapshot.tasks.iter().filter(|task| task.is_overdue(today)) {
        let due = task.due_date.map(|date| date.to_string()).unwrap_or_default();
        findings.push(Finding {
            category: InsightCategory::Tasks,
            priority: if task.priority >= 4 { 5 } else { 4 },
            title: format!("Task overdue: {}", task.title),
            description: format!("\"{}\" was due on {} and is still {}.", task.title, due, task.status),
            entity_type: "task",
            entity_id: task.id.clone(),
        });
    }

    for project in &snapshot.projects {
        let open = !matches!(project.status, ProjectStatus::Completed | ProjectStatus::Cancelled);
        let late = project.due_date.map(|due| due < today).unwrap_or(false);
        if open && late && project.progress < 100 {
            findings.push(Finding {
                category: InsightCategory::Projects,
                priority: 5,
                title: format!("Project behind schedule: {}", project.name),
                description: format!(
                    "{} passed its due date at {}% progress.",
                    project.name, project.progress
                ),
                entity_type: "project",
                entity_id: project.id.clone(),
            });
        }
    }

    for deal in &snapshot.deals {
        let stalled = deal.stage == DealStage::Negotiation
            && deal.expected_close_date.map(|close| close < today).unwrap_or(false);
        if stalled {
            findings.push(Finding {
                category: InsightCategory::Sales,
                priority: 4,
                title: format!("Deal stalled in negotiation: {}", deal.title),
                description: format!(
                    "Expected to close by {} but is still negotiating ({:.2} at stake).",
                    deal.expected_close_date.map(|date| date.to_string()).unwrap_or_default(),
                    deal.value
                ),
                entity_type: "deal",
                entity_id: deal.id.clone(),
            });
        }
    }

    for campaign in &snapshot.campaigns {
        if campaign.status != CampaignStatus::Active || campaign.budget <= 0.0 {
            continue;
        }
        let utilization = campaign.spent / campaign.budget * 100.0;
        if utilization >= BUDGET_WARNING_PERCENT {
            findings.push(Finding {
                category: InsightCategory::Marketing,
                priority: if utilization >= 100.0 { 5 } else { 3 },
                title: format!("Campaign budget nearly spent: {}", campaign.name),
                description: format!(
                    "{} has used {:.0}% of its {:.2} budget.",
                    campaign.name, utilization, campaign.budget
                ),
                entity_type: "campaign",
                entity_id: campaign.id.clone(),
            });
        }
    }

    for idea in &snapshot.unscored_ideas {
        findings.push(Finding {
            category: InsightCategory::Ideas,
            priority: 2,
            title: format!("Idea awaiting evaluation: {}", idea.title),
            description: format!("\"{}\" has not been scored against any criteria yet.", idea.title),
            entity_type: "idea",
            entity_id: idea.id.clone(),
        });
    }

    findings
}

impl DashboardCore {
    /// Replaces the actor's open generated insights with a fresh rule pass.
    ///
    /// Entities with a dismissed insight in the same category are skipped.
    pub fn generate_insights(&self, subject: &str) -> AppResult<GenerateInsightsResponse> {
        let actor = self.actor(subject)?;
        let today = Utc::now().date_naive();
        let snapshot = self.insight_snapshot(&actor, today)?;
        let findings = evaluate_rules(today, &snapshot);

        let cleared = self.db.clear_generated_insights(&actor.id)?;
        let dismissed = self.db.dismissed_insight_keys(&actor.id)?;
        let mut created = 0u32;
        let mut suppressed = 0u32;
        for finding in findings {
            if dismissed.contains(&(finding.category, finding.entity_id.clone())) {
                suppressed += 1;
                continue;
            }
            let insight = Insight {
                id: Uuid::new_v4().to_string(),
                user_id: actor.id.clone(),
                category: finding.category,
                priority: finding.priority,
                title: finding.title,
                description: finding.description,
                entity_type: Some(finding.entity_type.to_string()),
                entity_id: Some(finding.entity_id),
                generated: true,
                dismissed: false,
                created_at: Utc::now(),
            };
            self.db.insert_insight(&insight)?;
            created += 1;
        }

        tracing::info!(user_id = %actor.id, created, suppressed, cleared, "insights generated");
        Ok(GenerateInsightsResponse {
            created,
            suppressed,
            insights: self.db.list_insights(&actor.id, false)?,
        })
    }

    pub fn create_insight(&self, subject: &str, payload: CreateInsightPayload) -> AppResult<Insight> {
        let actor = self.actor(subject)?;
        let priority = validate_priority(payload.priority)?;
        let title = require_name(&payload.title, "insight title")?;
        let description = payload.description.trim().to_string();
        if description.is_empty() {
            return Err(AppError::Validation("insight description cannot be empty".to_string()));
        }

        let insight = Insight {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            category: payload.category,
            priority,
            title,
            description,
            entity_type: normalize_optional(payload.entity_type),
            entity_id: normalize_optional(payload.entity_id),
            generated: false,
            dismissed: false,
            created_at: Utc::now(),
        };
        self.db.insert_insight(&insight)?;
        self.record(
            &actor,
            "insight",
            &insight.id,
            "insight.created",
            format!("Added insight {}", insight.title),
            json!({ "category": insight.category, "priority": insight.priority }),
        )?;
        Ok(insight)
    }

    pub fn list_insights(&self, subject: &str, include_dismissed: bool) -> AppResult<Vec<Insight>> {
        let actor = self.actor(subject)?;
        self.db.list_insights(&actor.id, include_dismissed)
    }

    pub fn dismiss_insight(&self, subject: &str, insight_id: &str) -> AppResult<Insight> {
        let actor = self.actor(subject)?;
        let mut insight = self
            .db
            .get_insight(insight_id)?
            .ok_or_else(|| AppError::not_found("insight", insight_id))?;
        ensure_owner(&actor, &insight.user_id, "insight", insight_id)?;
        if !insight.dismissed {
            self.db.dismiss_insight(insight_id)?;
            insight.dismissed = true;
            self.record(
                &actor,
                "insight",
                insight_id,
                "insight.dismissed",
                format!("Dismissed insight {}", insight.title),
                json!({ "category": insight.category }),
            )?;
        }
        Ok(insight)
    }

    fn insight_snapshot(&self, actor: &User, today: NaiveDate) -> AppResult<Snapshot> {
        let tasks = self.db.list_tasks(
            &actor.id,
            &ListTasksFilters {
                overdue_only: Some(true),
                ..ListTasksFilters::default()
            },
        )?;
        let projects = self.db.list_late_projects(&actor.id, today)?;
        let deals = self.db.list_deals(
            &actor.id,
            &ListDealsFilters {
                stage: Some(DealStage::Negotiation),
                ..ListDealsFilters::default()
            },
        )?;
        let campaigns = self.db.list_campaigns(
            &actor.id,
            &ListCampaignsFilters {
                status: Some(CampaignStatus::Active),
                ..ListCampaignsFilters::default()
            },
        )?;
        let mut unscored_ideas = Vec::new();
        let new_ideas = self.db.list_ideas(
            &actor.id,
            &ListIdeasFilters {
                status: Some(IdeaStatus::New),
                ..ListIdeasFilters::default()
            },
        )?;
        for idea in new_ideas {
            if self.db.list_idea_scores(&idea.id)?.is_empty() {
                unscored_ideas.push(idea);
            }
        }
        Ok(Snapshot {
            tasks,
            projects,
            deals,
            campaigns,
            unscored_ideas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate_rules, Snapshot};
    use crate::errors::AppError;
    use crate::models::{
        Campaign, CampaignChannel, CampaignStatus, CreateInsightPayload, CreateProjectPayload, CreateTaskPayload,
        Deal, DealStage, Idea, IdeaCategory, IdeaStatus, InsightCategory, Task, TaskStatus,
    };
    use crate::service::test_support::{core, user};
    use chrono::{Duration, NaiveDate, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).expect("date")
    }

    fn task(id: &str, due: Option<NaiveDate>, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            project_id: "p".to_string(),
            phase_id: None,
            user_id: "u".to_string(),
            title: id.to_string(),
            description: None,
            status,
            priority: 3,
            assignee: None,
            due_date: due,
            completed_at: None,
            position: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn campaign(id: &str, budget: f64, spent: f64, status: CampaignStatus) -> Campaign {
        Campaign {
            id: id.to_string(),
            user_id: "u".to_string(),
            name: id.to_string(),
            description: None,
            channel: CampaignChannel::Social,
            status,
            budget,
            spent,
            start_date: None,
            end_date: None,
            target_audience: None,
            goals: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rules_flag_overdue_tasks_and_hot_budgets() {
        let snapshot = Snapshot {
            tasks: vec![
                task("late", Some(day(1)), TaskStatus::InProgress),
                task("done", Some(day(1)), TaskStatus::Done),
                task("future", Some(day(30)), TaskStatus::Todo),
            ],
            campaigns: vec![
                campaign("hot", 100.0, 95.0, CampaignStatus::Active),
                campaign("cool", 100.0, 10.0, CampaignStatus::Active),
                campaign("paused", 100.0, 99.0, CampaignStatus::Paused),
                campaign("free", 0.0, 10.0, CampaignStatus::Active),
            ],
            ..Snapshot::default()
        };
        let findings = evaluate_rules(day(10), &snapshot);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].entity_id, "late");
        assert_eq!(findings[0].category, InsightCategory::Tasks);
        assert_eq!(findings[1].entity_id, "hot");
        assert_eq!(findings[1].priority, 3);
    }

    fn deal(id: &str, stage: DealStage, close: Option<NaiveDate>) -> Deal {
        Deal {
            id: id.to_string(),
            user_id: "u".to_string(),
            customer_id: "c".to_string(),
            title: id.to_string(),
            value: 2_500.0,
            stage,
            probability: stage.default_probability(),
            expected_close_date: close,
            closed_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rules_flag_stalled_negotiations_only() {
        let snapshot = Snapshot {
            deals: vec![
                deal("stalled", DealStage::Negotiation, Some(day(5))),
                deal("on-track", DealStage::Negotiation, Some(day(20))),
                deal("undated", DealStage::Negotiation, None),
                deal("proposal", DealStage::Proposal, Some(day(5))),
            ],
            ..Snapshot::default()
        };
        let findings = evaluate_rules(day(10), &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].entity_id, "stalled");
        assert_eq!(findings[0].entity_type, "deal");
        assert_eq!(findings[0].category, InsightCategory::Sales);
        assert_eq!(findings[0].priority, 4);
    }

    #[test]
    fn rules_flag_unscored_ideas() {
        let snapshot = Snapshot {
            unscored_ideas: vec![Idea {
                id: "referrals".to_string(),
                user_id: "u".to_string(),
                title: "Referral program".to_string(),
                description: None,
                category: IdeaCategory::Marketing,
                status: IdeaStatus::New,
                total_score: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }],
            ..Snapshot::default()
        };
        let findings = evaluate_rules(day(10), &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, InsightCategory::Ideas);
        assert_eq!(findings[0].entity_type, "idea");
        assert_eq!(findings[0].priority, 2);
        assert!(findings[0].title.contains("Referral program"));
    }

    #[test]
    fn dismissed_insights_suppress_regeneration() {
        let core = core();
        user(&core, "ada");
        let project = core
            .create_project(
                "ada",
                CreateProjectPayload {
                    name: "Late project".to_string(),
                    description: None,
                    status: None,
                    priority: None,
                    start_date: None,
                    due_date: Some(Utc::now().date_naive() - Duration::days(3)),
                    budget: None,
                },
            )
            .expect("project");
        core.create_task(
            "ada",
            CreateTaskPayload {
                project_id: project.id.clone(),
                phase_id: None,
                title: "Late task".to_string(),
                description: None,
                status: None,
                priority: None,
                assignee: None,
                due_date: Some(Utc::now().date_naive() - Duration::days(1)),
            },
        )
        .expect("task");

        let first = core.generate_insights("ada").expect("generate");
        assert_eq!(first.created, 2);
        assert_eq!(first.suppressed, 0);
        // Project findings outrank task findings.
        assert_eq!(first.insights[0].category, InsightCategory::Projects);

        let regenerated = core.generate_insights("ada").expect("regenerate");
        assert_eq!(regenerated.created, 2);
        assert_eq!(core.list_insights("ada", true).expect("all").len(), 2);

        let project_insight = regenerated
            .insights
            .iter()
            .find(|insight| insight.category == InsightCategory::Projects)
            .expect("project insight");
        core.dismiss_insight("ada", &project_insight.id).expect("dismiss");

        let after = core.generate_insights("ada").expect("after dismiss");
        assert_eq!(after.created, 1);
        assert_eq!(after.suppressed, 1);
        assert_eq!(after.insights.len(), 1);
        assert_eq!(core.list_insights("ada", true).expect("all").len(), 2);
    }

    #[test]
    fn manual_insights_require_valid_priority() {
        let core = core();
        user(&core, "ada");
        let payload = |priority| CreateInsightPayload {
            category: InsightCategory::Sales,
            priority,
            title: "Follow up with churned accounts".to_string(),
            description: "Three customers churned last month.".to_string(),
            entity_type: None,
            entity_id: None,
        };
        let error = core.create_insight("ada", payload(0)).expect_err("priority");
        assert!(matches!(error, AppError::Validation(_)));
        let created = core.create_insight("ada", payload(5)).expect("create");
        assert!(!created.generated);

        // Manual insights survive a regeneration pass.
        core.generate_insights("ada").expect("generate");
        let listed = core.list_insights("ada", false).expect("list");
        assert!(listed.iter().any(|insight| insight.id == created.id));
    }
}
