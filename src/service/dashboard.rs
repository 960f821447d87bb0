use super::DashboardCore;
use crate::errors::AppResult;
use crate::models::{
    CampaignStatus, DashboardOverview, ListActivitiesFilters, ListCampaignsFilters, ListDealsFilters,
    ListIdeasFilters, ListTasksFilters, ProjectStatus,
};
use crate::scoring::{pipeline_summary, round2};
use chrono::Utc;
use std::collections::BTreeMap;

const TOP_IDEAS: usize = 3;
const RECENT_ACTIVITIES: u32 = 10;

impl DashboardCore {
    pub fn dashboard_overview(&self, subject: &str) -> AppResult<DashboardOverview> {
        let actor = self.actor(subject)?;
        let today = Utc::now().date_naive();

        let mut projects_by_status = ProjectStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0u32))
            .collect::<BTreeMap<_, _>>();
        let mut project_count = 0i64;
        let mut progress_sum = 0i64;
        for (status, count, progress) in self.db.project_status_totals(&actor.id)? {
            *projects_by_status.entry(status.as_str().to_string()).or_default() += count;
            project_count += i64::from(count);
            progress_sum += progress;
        }
        let average_project_progress = if project_count == 0 {
            0
        } else {
            (progress_sum as f64 / project_count as f64).round() as i32
        };

        let tasks = self.db.list_tasks(&actor.id, &ListTasksFilters::default())?;
        let open_tasks = tasks.iter().filter(|task| !task.is_completed()).count() as u32;
        let overdue_tasks = tasks.iter().filter(|task| task.is_overdue(today)).count() as u32;

        let deals = self.db.list_deals(&actor.id, &ListDealsFilters::default())?;
        let campaigns = self.db.list_campaigns(
            &actor.id,
            &ListCampaignsFilters {
                status: Some(CampaignStatus::Active),
                ..ListCampaignsFilters::default()
            },
        )?;
        let mut campaign_revenue = 0.0;
        for campaign in &campaigns {
            campaign_revenue += self
                .db
                .list_campaign_metrics(&campaign.id)?
                .iter()
                .map(|metric| metric.revenue)
                .sum::<f64>();
        }
        let campaign_spend = campaigns.iter().map(|campaign| campaign.spent).sum::<f64>();

        let mut top_ideas = self.db.list_ideas(&actor.id, &ListIdeasFilters::default())?;
        top_ideas.truncate(TOP_IDEAS);

        Ok(DashboardOverview {
            projects_by_status,
            average_project_progress,
            open_tasks,
            overdue_tasks,
            pipeline: pipeline_summary(&deals),
            active_campaigns: campaigns.len() as u32,
            campaign_spend: round2(campaign_spend),
            campaign_revenue: round2(campaign_revenue),
            top_ideas,
            unread_notifications: self.db.count_unread_notifications(&actor.id)?,
            recent_activities: self.db.list_activities(
                &actor.id,
                &ListActivitiesFilters::default(),
                RECENT_ACTIVITIES,
            )?,
        })
    }
}
