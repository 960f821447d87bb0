use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BooleanResponse, CreateCriterionPayload, CreateIdeaPayload, Idea, IdeaCategory, IdeaCriterion, IdeaDetail,
    IdeaStatus, ListIdeasFilters, ScoreIdeaPayload, UpdateCriterionPayload, UpdateIdeaPayload, User,
};
use crate::policy::{ensure_owner, normalize_optional, require_name, validate_score_value, validate_weight};
use crate::scoring::idea_total_score;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

impl DashboardCore {
    pub fn create_criterion(&self, subject: &str, payload: CreateCriterionPayload) -> AppResult<IdeaCriterion> {
        let actor = self.actor(subject)?;
        let criterion = IdeaCriterion {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            name: require_name(&payload.name, "criterion name")?,
            description: normalize_optional(payload.description),
            weight: validate_weight(payload.weight)?,
            created_at: Utc::now(),
        };
        self.db.insert_criterion(&criterion)?;
        self.record(
            &actor,
            "criterion",
            &criterion.id,
            "criterion.created",
            format!("Added scoring criterion {}", criterion.name),
            json!({ "weight": criterion.weight }),
        )?;
        Ok(criterion)
    }

    pub fn list_criteria(&self, subject: &str) -> AppResult<Vec<IdeaCriterion>> {
        let actor = self.actor(subject)?;
        self.db.list_criteria(&actor.id)
    }

    /// Updates a criterion; a weight change re-scores every idea of the owner.
    pub fn update_criterion(&self, subject: &str, criterion_id: &str, patch: UpdateCriterionPayload) -> AppResult<IdeaCriterion> {
        let actor = self.actor(subject)?;
        let mut criterion = self.owned_criterion(&actor, criterion_id)?;
        let previous_weight = criterion.weight;

        if let Some(name) = patch.name {
            criterion.name = require_name(&name, "criterion name")?;
        }
        if patch.description.is_some() {
            criterion.description = normalize_optional(patch.description);
        }
        if let Some(weight) = patch.weight {
            criterion.weight = validate_weight(weight)?;
        }
        self.db.update_criterion(&criterion)?;
        self.record(
            &actor,
            "criterion",
            &criterion.id,
            "criterion.updated",
            format!("Updated scoring criterion {}", criterion.name),
            json!({ "previousWeight": previous_weight, "weight": criterion.weight }),
        )?;
        if criterion.weight != previous_weight {
            self.rescore_all_ideas(&actor)?;
        }
        Ok(criterion)
    }

    pub fn delete_criterion(&self, subject: &str, criterion_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        let criterion = self.owned_criterion(&actor, criterion_id)?;
        let scores_deleted = self.db.delete_criterion_scores(criterion_id)?;
        let success = self.db.delete_criterion(criterion_id)?;
        self.record(
            &actor,
            "criterion",
            criterion_id,
            "criterion.deleted",
            format!("Deleted scoring criterion {}", criterion.name),
            json!({ "scoresDeleted": scores_deleted }),
        )?;
        self.rescore_all_ideas(&actor)?;
        Ok(BooleanResponse { success })
    }

    fn owned_criterion(&self, actor: &User, criterion_id: &str) -> AppResult<IdeaCriterion> {
        let criterion = self
            .db
            .get_criterion(criterion_id)?
            .ok_or_else(|| AppError::not_found("criterion", criterion_id))?;
        ensure_owner(actor, &criterion.user_id, "criterion", criterion_id)?;
        Ok(criterion)
    }

    pub fn create_idea(&self, subject: &str, payload: CreateIdeaPayload) -> AppResult<Idea> {
        let actor = self.actor(subject)?;
        let now = Utc::now();
        let idea = Idea {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            title: require_name(&payload.title, "idea title")?,
            description: normalize_optional(payload.description),
            category: payload.category.unwrap_or(IdeaCategory::Other),
            status: IdeaStatus::New,
            total_score: 0,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_idea(&idea)?;
        self.record(
            &actor,
            "idea",
            &idea.id,
            "idea.created",
            format!("Captured idea {}", idea.title),
            json!({ "category": idea.category }),
        )?;
        Ok(idea)
    }

    pub fn list_ideas(&self, subject: &str, filters: ListIdeasFilters) -> AppResult<Vec<Idea>> {
        let actor = self.actor(subject)?;
        self.db.list_ideas(&actor.id, &filters)
    }

    pub fn get_idea(&self, subject: &str, idea_id: &str) -> AppResult<IdeaDetail> {
        let actor = self.actor(subject)?;
        let idea = self.owned_idea(&actor, idea_id)?;
        let scores = self.db.list_idea_scores(idea_id)?;
        Ok(IdeaDetail { idea, scores })
    }

    pub fn update_idea(&self, subject: &str, idea_id: &str, patch: UpdateIdeaPayload) -> AppResult<Idea> {
        let actor = self.actor(subject)?;
        let mut idea = self.owned_idea(&actor, idea_id)?;
        let previous_status = idea.status;

        if let Some(title) = patch.title {
            idea.title = require_name(&title, "idea title")?;
        }
        if patch.description.is_some() {
            idea.description = normalize_optional(patch.description);
        }
        if let Some(category) = patch.category {
            idea.category = category;
        }
        if let Some(status) = patch.status {
            idea.status = status;
        }
        idea.updated_at = Utc::now();

        self.db.update_idea(&idea)?;
        self.record(
            &actor,
            "idea",
            &idea.id,
            "idea.updated",
            format!("Updated idea {}", idea.title),
            json!({ "previousStatus": previous_status, "status": idea.status }),
        )?;
        Ok(idea)
    }

    pub fn delete_idea(&self, subject: &str, idea_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        let idea = self.owned_idea(&actor, idea_id)?;
        let scores_deleted = self.db.delete_idea_scores(idea_id)?;
        let success = self.db.delete_idea(idea_id)?;
        self.record(
            &actor,
            "idea",
            idea_id,
            "idea.deleted",
            format!("Deleted idea {}", idea.title),
            json!({ "scoresDeleted": scores_deleted }),
        )?;
        Ok(BooleanResponse { success })
    }

    /// Upserts per-criterion scores and recomputes the idea's total.
    pub fn score_idea(&self, subject: &str, idea_id: &str, payload: ScoreIdeaPayload) -> AppResult<IdeaDetail> {
        let actor = self.actor(subject)?;
        let idea = self.owned_idea(&actor, idea_id)?;
        if payload.entries.is_empty() {
            return Err(AppError::Validation("at least one score is required".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &payload.entries {
            if !seen.insert(entry.criterion_id.as_str()) {
                return Err(AppError::Validation(format!(
                    "criterion {} is scored more than once",
                    entry.criterion_id
                )));
            }
            validate_score_value(entry.value)?;
            self.owned_criterion(&actor, &entry.criterion_id)?;
        }

        for entry in &payload.entries {
            self.db
                .upsert_idea_score(&idea.id, &entry.criterion_id, &actor.id, entry.value)?;
        }
        let status = if idea.status == IdeaStatus::New {
            IdeaStatus::Evaluating
        } else {
            idea.status
        };
        let total = self.recompute_idea_score(&idea.id, status)?;
        self.record(
            &actor,
            "idea",
            &idea.id,
            "idea.scored",
            format!("Scored idea {} at {}", idea.title, total),
            json!({ "totalScore": total, "entries": payload.entries.len() }),
        )?;
        self.get_idea(subject, idea_id)
    }

    fn recompute_idea_score(&self, idea_id: &str, status: IdeaStatus) -> AppResult<i32> {
        let inputs = self.db.idea_score_inputs(idea_id)?;
        let total = idea_total_score(&inputs);
        self.db.set_idea_score(idea_id, total, status)?;
        Ok(total)
    }

    fn rescore_all_ideas(&self, actor: &User) -> AppResult<()> {
        let ideas = self.db.list_ideas(&actor.id, &ListIdeasFilters::default())?;
        for idea in &ideas {
            self.recompute_idea_score(&idea.id, idea.status)?;
        }
        tracing::debug!(user_id = %actor.id, count = ideas.len(), "ideas re-scored");
        Ok(())
    }

    fn owned_idea(&self, actor: &User, idea_id: &str) -> AppResult<Idea> {
        let idea = self
            .db
            .get_idea(idea_id)?
            .ok_or_else(|| AppError::not_found("idea", idea_id))?;
        ensure_owner(actor, &idea.user_id, "idea", idea_id)?;
        Ok(idea)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::models::{
        CreateCriterionPayload, CreateIdeaPayload, IdeaCategory, IdeaStatus, ListIdeasFilters, ScoreEntry,
        ScoreIdeaPayload, UpdateCriterionPayload,
    };
    use crate::service::test_support::{core, user};
    use crate::service::DashboardCore;

    fn criterion(core: &DashboardCore, name: &str, weight: i32) -> String {
        core.create_criterion(
            "ada",
            CreateCriterionPayload {
                name: name.to_string(),
                description: None,
                weight,
            },
        )
        .expect("criterion")
        .id
    }

    fn idea(core: &DashboardCore, title: &str) -> String {
        core.create_idea(
            "ada",
            CreateIdeaPayload {
                title: title.to_string(),
                description: None,
                category: Some(IdeaCategory::Product),
            },
        )
        .expect("idea")
        .id
    }

    fn entries(values: &[(&str, i32)]) -> ScoreIdeaPayload {
        ScoreIdeaPayload {
            entries: values
                .iter()
                .map(|(criterion_id, value)| ScoreEntry {
                    criterion_id: criterion_id.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn scoring_computes_weighted_total_and_moves_to_evaluating() {
        let core = core();
        user(&core, "ada");
        let impact = criterion(&core, "Impact", 5);
        let effort = criterion(&core, "Effort", 4);
        let fit = criterion(&core, "Fit", 3);
        let idea_id = idea(&core, "Self-serve onboarding");

        let detail = core
            .score_idea("ada", &idea_id, entries(&[(&impact, 7), (&effort, 6), (&fit, 8)]))
            .expect("score");
        assert_eq!(detail.idea.total_score, 69);
        assert_eq!(detail.idea.status, IdeaStatus::Evaluating);
        assert_eq!(detail.scores.len(), 3);

        // Rescoring one criterion replaces the earlier value.
        let detail = core.score_idea("ada", &idea_id, entries(&[(&impact, 10)])).expect("rescore");
        assert_eq!(detail.scores.len(), 3);
        assert_eq!(detail.idea.total_score, 82);
    }

    #[test]
    fn criterion_changes_rescore_ideas() {
        let core = core();
        user(&core, "ada");
        let high = criterion(&core, "Impact", 10);
        let low = criterion(&core, "Cost", 1);
        let idea_id = idea(&core, "Referral program");
        core.score_idea("ada", &idea_id, entries(&[(&high, 10), (&low, 0)])).expect("score");
        assert_eq!(core.get_idea("ada", &idea_id).expect("idea").idea.total_score, 91);

        core.update_criterion(
            "ada",
            &low,
            UpdateCriterionPayload {
                weight: Some(10),
                ..UpdateCriterionPayload::default()
            },
        )
        .expect("reweight");
        assert_eq!(core.get_idea("ada", &idea_id).expect("idea").idea.total_score, 50);

        core.delete_criterion("ada", &low).expect("delete");
        let detail = core.get_idea("ada", &idea_id).expect("idea");
        assert_eq!(detail.idea.total_score, 100);
        assert_eq!(detail.scores.len(), 1);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let core = core();
        user(&core, "ada");
        let error = core
            .create_criterion(
                "ada",
                CreateCriterionPayload {
                    name: "Heavy".to_string(),
                    description: None,
                    weight: 11,
                },
            )
            .expect_err("weight");
        assert!(matches!(error, AppError::Validation(_)));

        let impact = criterion(&core, "Impact", 5);
        let idea_id = idea(&core, "Dark mode");
        let error = core
            .score_idea("ada", &idea_id, entries(&[(&impact, 11)]))
            .expect_err("value");
        assert!(matches!(error, AppError::Validation(_)));
        let error = core
            .score_idea("ada", &idea_id, entries(&[(&impact, 5), (&impact, 6)]))
            .expect_err("duplicate");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn ideas_are_listed_by_score() {
        let core = core();
        user(&core, "ada");
        let impact = criterion(&core, "Impact", 5);
        let low = idea(&core, "Low");
        let high = idea(&core, "High");
        core.score_idea("ada", &low, entries(&[(&impact, 2)])).expect("low");
        core.score_idea("ada", &high, entries(&[(&impact, 9)])).expect("high");

        let listed = core.list_ideas("ada", ListIdeasFilters::default()).expect("list");
        assert_eq!(listed[0].id, high);
        assert_eq!(listed[1].id, low);

        assert!(core.delete_idea("ada", &low).expect("delete").success);
        assert_eq!(core.list_ideas("ada", ListIdeasFilters::default()).expect("list").len(), 1);
    }
}
