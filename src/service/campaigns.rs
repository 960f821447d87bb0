use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BooleanResponse, Campaign, CampaignDetail, CampaignMetric, CampaignStatus, CreateCampaignPayload,
    ListCampaignsFilters, RecordCampaignMetricPayload, UpdateCampaignPayload, User,
};
use crate::policy::{ensure_owner, normalize_optional, require_name, validate_amount, validate_date_range, validate_funnel};
use crate::scoring::campaign_summary;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

impl DashboardCore {
    pub fn create_campaign(&self, subject: &str, payload: CreateCampaignPayload) -> AppResult<Campaign> {
        let actor = self.actor(subject)?;
        let name = require_name(&payload.name, "campaign name")?;
        let budget = validate_amount(payload.budget.unwrap_or(0.0), "budget")?;
        validate_date_range(payload.start_date, payload.end_date, "end date")?;

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            name,
            description: normalize_optional(payload.description),
            channel: payload.channel,
            status: payload.status.unwrap_or(CampaignStatus::Draft),
            budget,
            spent: 0.0,
            start_date: payload.start_date,
            end_date: payload.end_date,
            target_audience: normalize_optional(payload.target_audience),
            goals: normalize_optional(payload.goals),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_campaign(&campaign)?;
        self.record(
            &actor,
            "campaign",
            &campaign.id,
            "campaign.created",
            format!("Created campaign {}", campaign.name),
            json!({ "channel": campaign.channel, "budget": campaign.budget }),
        )?;
        tracing::info!(campaign_id = %campaign.id, channel = %campaign.channel, "campaign created");
        Ok(campaign)
    }

    pub fn list_campaigns(&self, subject: &str, filters: ListCampaignsFilters) -> AppResult<Vec<Campaign>> {
        let actor = self.actor(subject)?;
        self.db.list_campaigns(&actor.id, &filters)
    }

    pub fn get_campaign(&self, subject: &str, campaign_id: &str) -> AppResult<CampaignDetail> {
        let actor = self.actor(subject)?;
        let campaign = self.owned_campaign(&actor, campaign_id)?;
        let metrics = self.db.list_campaign_metrics(campaign_id)?;
        let summary = campaign_summary(campaign.budget, &metrics);
        Ok(CampaignDetail {
            campaign,
            metrics,
            summary,
        })
    }

    pub fn update_campaign(&self, subject: &str, campaign_id: &str, patch: UpdateCampaignPayload) -> AppResult<Campaign> {
        let actor = self.actor(subject)?;
        let mut campaign = self.owned_campaign(&actor, campaign_id)?;
        let previous_status = campaign.status;

        if let Some(name) = patch.name {
            campaign.name = require_name(&name, "campaign name")?;
        }
        if patch.description.is_some() {
            campaign.description = normalize_optional(patch.description);
        }
        if let Some(channel) = patch.channel {
            campaign.channel = channel;
        }
        if let Some(status) = patch.status {
            campaign.status = status;
        }
        if let Some(budget) = patch.budget {
            campaign.budget = validate_amount(budget, "budget")?;
        }
        if patch.start_date.is_some() {
            campaign.start_date = patch.start_date;
        }
        if patch.end_date.is_some() {
            campaign.end_date = patch.end_date;
        }
        if patch.target_audience.is_some() {
            campaign.target_audience = normalize_optional(patch.target_audience);
        }
        if patch.goals.is_some() {
            campaign.goals = normalize_optional(patch.goals);
        }
        validate_date_range(campaign.start_date, campaign.end_date, "end date")?;
        campaign.updated_at = Utc::now();

        self.db.update_campaign(&campaign)?;
        self.record(
            &actor,
            "campaign",
            &campaign.id,
            "campaign.updated",
            format!("Updated campaign {}", campaign.name),
            json!({ "previousStatus": previous_status, "status": campaign.status }),
        )?;
        Ok(campaign)
    }

    /// Deletes metrics one by one, then the campaign.
    pub fn delete_campaign(&self, subject: &str, campaign_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        let campaign = self.owned_campaign(&actor, campaign_id)?;
        let mut metrics_deleted = 0u32;
        for metric in self.db.list_campaign_metrics(campaign_id)? {
            if self.db.delete_campaign_metric(&metric.id)? {
                metrics_deleted += 1;
            }
        }
        let success = self.db.delete_campaign(campaign_id)?;
        self.record(
            &actor,
            "campaign",
            campaign_id,
            "campaign.deleted",
            format!("Deleted campaign {}", campaign.name),
            json!({ "metricsDeleted": metrics_deleted }),
        )?;
        Ok(BooleanResponse { success })
    }

    pub fn record_campaign_metric(&self, subject: &str, payload: RecordCampaignMetricPayload) -> AppResult<CampaignMetric> {
        let actor = self.actor(subject)?;
        let campaign = self.owned_campaign(&actor, &payload.campaign_id)?;
        validate_funnel(payload.impressions, payload.clicks, payload.conversions)?;
        let spend = validate_amount(payload.spend, "spend")?;
        let revenue = validate_amount(payload.revenue, "revenue")?;

        let metric = CampaignMetric {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign.id.clone(),
            user_id: actor.id.clone(),
            recorded_on: payload.recorded_on,
            impressions: payload.impressions,
            clicks: payload.clicks,
            conversions: payload.conversions,
            spend,
            revenue,
            created_at: Utc::now(),
        };
        self.db.insert_campaign_metric(&metric)?;
        if spend > 0.0 {
            self.db.add_campaign_spend(&campaign.id, spend)?;
        }
        self.record(
            &actor,
            "campaign",
            &campaign.id,
            "campaign.metric_recorded",
            format!("Recorded metrics for {} on {}", campaign.name, metric.recorded_on),
            json!({ "metricId": metric.id, "spend": spend, "revenue": revenue }),
        )?;
        Ok(metric)
    }

    pub fn list_campaign_metrics(&self, subject: &str, campaign_id: &str) -> AppResult<Vec<CampaignMetric>> {
        let actor = self.actor(subject)?;
        self.owned_campaign(&actor, campaign_id)?;
        self.db.list_campaign_metrics(campaign_id)
    }

    fn owned_campaign(&self, actor: &User, campaign_id: &str) -> AppResult<Campaign> {
        let campaign = self
            .db
            .get_campaign(campaign_id)?
            .ok_or_else(|| AppError::not_found("campaign", campaign_id))?;
        ensure_owner(actor, &campaign.user_id, "campaign", campaign_id)?;
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::models::{CampaignChannel, CreateCampaignPayload, RecordCampaignMetricPayload};
    use crate::service::test_support::{core, user};
    use chrono::NaiveDate;

    fn payload(name: &str, budget: f64) -> CreateCampaignPayload {
        CreateCampaignPayload {
            name: name.to_string(),
            description: None,
            channel: CampaignChannel::Search,
            status: None,
            budget: Some(budget),
            start_date: None,
            end_date: None,
            target_audience: None,
            goals: None,
        }
    }

    fn metric(campaign_id: &str, day: u32, spend: f64) -> RecordCampaignMetricPayload {
        RecordCampaignMetricPayload {
            campaign_id: campaign_id.to_string(),
            recorded_on: NaiveDate::from_ymd_opt(2026, 4, day).expect("date"),
            impressions: 1_000,
            clicks: 50,
            conversions: 5,
            spend,
            revenue: spend * 3.0,
        }
    }

    #[test]
    fn metrics_accumulate_spend_and_summary() {
        let core = core();
        user(&core, "ada");
        let campaign = core.create_campaign("ada", payload("Spring search", 1_000.0)).expect("create");
        core.record_campaign_metric("ada", metric(&campaign.id, 1, 200.0)).expect("day one");
        core.record_campaign_metric("ada", metric(&campaign.id, 2, 300.0)).expect("day two");

        let detail = core.get_campaign("ada", &campaign.id).expect("detail");
        assert_eq!(detail.campaign.spent, 500.0);
        assert_eq!(detail.metrics.len(), 2);
        assert_eq!(detail.summary.impressions, 2_000);
        assert_eq!(detail.summary.click_through_rate, 5.0);
        assert_eq!(detail.summary.conversion_rate, 10.0);
        assert_eq!(detail.summary.cost_per_acquisition, 50.0);
        assert_eq!(detail.summary.return_on_ad_spend, 3.0);
        assert_eq!(detail.summary.budget_utilization, 50.0);
    }

    #[test]
    fn impossible_funnels_and_negative_budgets_are_rejected() {
        let core = core();
        user(&core, "ada");
        let error = core.create_campaign("ada", payload("Broken", -1.0)).expect_err("budget");
        assert!(matches!(error, AppError::Validation(_)));

        let campaign = core.create_campaign("ada", payload("Funnel", 10.0)).expect("create");
        let mut bad = metric(&campaign.id, 1, 1.0);
        bad.clicks = 2_000;
        let error = core.record_campaign_metric("ada", bad).expect_err("funnel");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn delete_removes_metrics_and_checks_owner() {
        let core = core();
        user(&core, "ada");
        user(&core, "eve");
        let campaign = core.create_campaign("ada", payload("Owned", 100.0)).expect("create");
        core.record_campaign_metric("ada", metric(&campaign.id, 3, 10.0)).expect("metric");

        let error = core.delete_campaign("eve", &campaign.id).expect_err("not owner");
        assert!(matches!(error, AppError::AccessDenied(_)));
        let error = core.list_campaign_metrics("eve", &campaign.id).expect_err("not owner");
        assert!(matches!(error, AppError::AccessDenied(_)));

        assert!(core.delete_campaign("ada", &campaign.id).expect("delete").success);
        let error = core.get_campaign("ada", &campaign.id).expect_err("gone");
        assert!(matches!(error, AppError::NotFound(_)));
    }
}
