use super::{parse_label, parse_time, query_params, timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Campaign, CampaignMetric, ListCampaignsFilters};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

const CAMPAIGN_COLUMNS: &str = "id, user_id, name, description, channel, status, budget, spent, start_date, end_date, target_audience, goals, created_at, updated_at";
const METRIC_COLUMNS: &str =
    "id, campaign_id, user_id, recorded_on, impressions, clicks, conversions, spend, revenue, created_at";

impl Database {
    pub fn insert_campaign(&self, campaign: &Campaign) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO campaigns (id, user_id, name, description, channel, status, budget, spent, start_date, end_date, target_audience, goals, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                campaign.id,
                campaign.user_id,
                campaign.name,
                campaign.description,
                campaign.channel.as_str(),
                campaign.status.as_str(),
                campaign.budget,
                campaign.spent,
                campaign.start_date,
                campaign.end_date,
                campaign.target_audience,
                campaign.goals,
                timestamp(campaign.created_at),
                timestamp(campaign.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_campaign(&self, campaign_id: &str) -> AppResult<Option<Campaign>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS),
            [campaign_id],
            parse_campaign_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_campaigns(&self, user_id: &str, filters: &ListCampaignsFilters) -> AppResult<Vec<Campaign>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM campaigns WHERE user_id = ?", CAMPAIGN_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(status) = filters.status {
            query.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        if let Some(channel) = filters.channel {
            query.push_str(" AND channel = ?");
            params_vec.push(channel.as_str().to_string());
        }
        query.push_str(" ORDER BY updated_at DESC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(query_params(&params_vec)), parse_campaign_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_campaign(&self, campaign: &Campaign) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE campaigns SET name = ?1, description = ?2, channel = ?3, status = ?4, budget = ?5, spent = ?6,
               start_date = ?7, end_date = ?8, target_audience = ?9, goals = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                campaign.name,
                campaign.description,
                campaign.channel.as_str(),
                campaign.status.as_str(),
                campaign.budget,
                campaign.spent,
                campaign.start_date,
                campaign.end_date,
                campaign.target_audience,
                campaign.goals,
                timestamp(campaign.updated_at),
                campaign.id,
            ],
        )?;
        Ok(())
    }

    pub fn add_campaign_spend(&self, campaign_id: &str, amount: f64) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE campaigns SET spent = spent + ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, timestamp(Utc::now()), campaign_id],
        )?;
        Ok(())
    }

    pub fn delete_campaign(&self, campaign_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM campaigns WHERE id = ?1", [campaign_id])?;
        Ok(changed > 0)
    }

    pub fn insert_campaign_metric(&self, metric: &CampaignMetric) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO campaign_metrics (id, campaign_id, user_id, recorded_on, impressions, clicks, conversions, spend, revenue, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                metric.id,
                metric.campaign_id,
                metric.user_id,
                metric.recorded_on,
                metric.impressions,
                metric.clicks,
                metric.conversions,
                metric.spend,
                metric.revenue,
                timestamp(metric.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_campaign_metrics(&self, campaign_id: &str) -> AppResult<Vec<CampaignMetric>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM campaign_metrics WHERE campaign_id = ?1 ORDER BY recorded_on ASC, created_at ASC",
            METRIC_COLUMNS
        ))?;
        let rows = statement.query_map([campaign_id], parse_metric_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn delete_campaign_metric(&self, metric_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM campaign_metrics WHERE id = ?1", [metric_id])?;
        Ok(changed > 0)
    }
}

fn parse_campaign_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        channel: parse_label(&row.get::<_, String>(4)?, 4)?,
        status: parse_label(&row.get::<_, String>(5)?, 5)?,
        budget: row.get(6)?,
        spent: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        target_audience: row.get(10)?,
        goals: row.get(11)?,
        created_at: parse_time(&row.get::<_, String>(12)?)?,
        updated_at: parse_time(&row.get::<_, String>(13)?)?,
    })
}

fn parse_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignMetric> {
    Ok(CampaignMetric {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        user_id: row.get(2)?,
        recorded_on: row.get(3)?,
        impressions: row.get(4)?,
        clicks: row.get(5)?,
        conversions: row.get(6)?,
        spend: row.get(7)?,
        revenue: row.get(8)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
    })
}
