//! Pure aggregation rules: task → phase → project progress, idea scores,
//! campaign and pipeline summaries.

use crate::models::{CampaignMetric, CampaignSummary, Deal, DealStage, PipelineStageSummary, PipelineSummary};
use crate::policy::{clamp_percentage, clamp_percentage_f64, MAX_SCORE_VALUE, MIN_SCORE_VALUE};

/// `round(100 × completed / total)`, 0 for an empty phase.
pub fn phase_progress(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    clamp_percentage((ratio * 100.0).round() as i32)
}

/// Rounded mean of phase progress values. `None` when there are no phases.
pub fn project_progress(phase_progress: &[i32]) -> Option<i32> {
    if phase_progress.is_empty() {
        return None;
    }
    let sum: f64 = phase_progress.iter().map(|value| f64::from(clamp_percentage(*value))).sum();
    Some(clamp_percentage((sum / phase_progress.len() as f64).round() as i32))
}

/// `round(100 × Σ(value/10 × weight) / Σ(weight))` over `(value, weight)` pairs.
pub fn idea_total_score(entries: &[(i32, i32)]) -> i32 {
    let weight_sum: f64 = entries.iter().map(|(_, weight)| f64::from((*weight).max(0))).sum();
    if weight_sum <= 0.0 {
        return 0;
    }
    let weighted: f64 = entries
        .iter()
        .map(|(value, weight)| {
            let value = (*value).clamp(MIN_SCORE_VALUE, MAX_SCORE_VALUE);
            f64::from(value) / 10.0 * f64::from((*weight).max(0))
        })
        .sum();
    (100.0 * weighted / weight_sum).round() as i32
}

fn ratio_percent(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return 0.0;
    }
    round2(numerator / denominator * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn campaign_summary(budget: f64, metrics: &[CampaignMetric]) -> CampaignSummary {
    let impressions: i64 = metrics.iter().map(|metric| metric.impressions).sum();
    let clicks: i64 = metrics.iter().map(|metric| metric.clicks).sum();
    let conversions: i64 = metrics.iter().map(|metric| metric.conversions).sum();
    let spend: f64 = metrics.iter().map(|metric| metric.spend).sum();
    let revenue: f64 = metrics.iter().map(|metric| metric.revenue).sum();

    CampaignSummary {
        impressions,
        clicks,
        conversions,
        spend: round2(spend),
        revenue: round2(revenue),
        click_through_rate: ratio_percent(clicks as f64, impressions as f64),
        conversion_rate: ratio_percent(conversions as f64, clicks as f64),
        cost_per_acquisition: if conversions > 0 { round2(spend / conversions as f64) } else { 0.0 },
        return_on_ad_spend: if spend > 0.0 { round2(revenue / spend) } else { 0.0 },
        budget_utilization: clamp_percentage_f64(ratio_percent(spend, budget)),
    }
}

pub fn pipeline_summary(deals: &[Deal]) -> PipelineSummary {
    let stages = DealStage::ALL
        .iter()
        .map(|stage| {
            let in_stage = deals.iter().filter(|deal| deal.stage == *stage);
            let (count, value) = in_stage.fold((0u32, 0.0f64), |(count, value), deal| (count + 1, value + deal.value));
            PipelineStageSummary {
                stage: *stage,
                count,
                value: round2(value),
            }
        })
        .collect::<Vec<_>>();

    let open = deals.iter().filter(|deal| !deal.stage.is_closed());
    let open_deal_count = open.clone().count() as u32;
    let open_value: f64 = open.clone().map(|deal| deal.value).sum();
    let weighted_value: f64 = open
        .map(|deal| deal.value * f64::from(clamp_percentage(deal.probability)) / 100.0)
        .sum();

    let won = deals.iter().filter(|deal| deal.stage == DealStage::ClosedWon);
    let won_count = won.clone().count();
    let won_value: f64 = won.map(|deal| deal.value).sum();
    let closed_count = deals.iter().filter(|deal| deal.stage.is_closed()).count();

    PipelineSummary {
        stages,
        open_deal_count,
        open_value: round2(open_value),
        weighted_value: round2(weighted_value),
        won_value: round2(won_value),
        win_rate: ratio_percent(won_count as f64, closed_count as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn metric(impressions: i64, clicks: i64, conversions: i64, spend: f64, revenue: f64) -> CampaignMetric {
        CampaignMetric {
            id: "m".to_string(),
            campaign_id: "c".to_string(),
            user_id: "u".to_string(),
            recorded_on: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            impressions,
            clicks,
            conversions,
            spend,
            revenue,
            created_at: Utc::now(),
        }
    }

    fn deal(stage: DealStage, value: f64, probability: i32) -> Deal {
        Deal {
            id: "d".to_string(),
            user_id: "u".to_string(),
            customer_id: "c".to_string(),
            title: "Deal".to_string(),
            value,
            stage,
            probability,
            expected_close_date: None,
            closed_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn phase_progress_rounds_and_handles_empty() {
        assert_eq!(phase_progress(0, 0), 0);
        assert_eq!(phase_progress(1, 3), 33);
        assert_eq!(phase_progress(2, 3), 67);
        assert_eq!(phase_progress(4, 4), 100);
    }

    #[test]
    fn project_progress_is_rounded_mean() {
        assert_eq!(project_progress(&[]), None);
        assert_eq!(project_progress(&[100, 50, 0]), Some(50));
        assert_eq!(project_progress(&[33, 34]), Some(34));
    }

    #[test]
    fn idea_score_matches_weighted_formula() {
        // (0.7×5 + 0.6×4 + 0.8×3) / 12 = 8.3 / 12
        let expected = (100.0_f64 * (3.5 + 2.4 + 2.4) / 12.0).round() as i32;
        assert_eq!(idea_total_score(&[(7, 5), (6, 4), (8, 3)]), expected);
        assert_eq!(expected, 69);
    }

    #[test]
    fn idea_score_guards_zero_weight() {
        assert_eq!(idea_total_score(&[]), 0);
        assert_eq!(idea_total_score(&[(9, 0)]), 0);
        assert_eq!(idea_total_score(&[(10, 2), (10, 8)]), 100);
    }

    #[test]
    fn campaign_summary_computes_rates() {
        let summary = campaign_summary(1000.0, &[metric(1000, 50, 5, 200.0, 600.0), metric(1000, 50, 5, 300.0, 400.0)]);
        assert_eq!(summary.impressions, 2000);
        assert_eq!(summary.click_through_rate, 5.0);
        assert_eq!(summary.conversion_rate, 10.0);
        assert_eq!(summary.cost_per_acquisition, 50.0);
        assert_eq!(summary.return_on_ad_spend, 2.0);
        assert_eq!(summary.budget_utilization, 50.0);
    }

    #[test]
    fn campaign_summary_without_data_is_zero() {
        assert_eq!(campaign_summary(0.0, &[]), CampaignSummary::default());
    }

    #[test]
    fn pipeline_weights_open_deals_only() {
        let summary = pipeline_summary(&[
            deal(DealStage::Proposal, 1000.0, 50),
            deal(DealStage::Negotiation, 2000.0, 75),
            deal(DealStage::ClosedWon, 500.0, 100),
            deal(DealStage::ClosedLost, 700.0, 0),
        ]);
        assert_eq!(summary.open_deal_count, 2);
        assert_eq!(summary.open_value, 3000.0);
        assert_eq!(summary.weighted_value, 2000.0);
        assert_eq!(summary.won_value, 500.0);
        assert_eq!(summary.win_rate, 50.0);
        assert_eq!(summary.stages.len(), DealStage::ALL.len());
    }
}
