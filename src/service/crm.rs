use super::DashboardCore;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BooleanResponse, CreateCustomerPayload, CreateDealPayload, Customer, CustomerDetail, CustomerStatus, Deal,
    DealStage, DeleteCustomerResponse, ListCustomersFilters, ListDealsFilters, ListSalesActivitiesFilters,
    LogSalesActivityPayload, NotificationKind, PipelineSummary, SalesActivity, UpdateCustomerPayload,
    UpdateDealPayload, User,
};
use crate::policy::{clamp_percentage, ensure_owner, normalize_email, normalize_optional, require_name, validate_amount};
use crate::scoring::pipeline_summary;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

impl DashboardCore {
    pub fn create_customer(&self, subject: &str, payload: CreateCustomerPayload) -> AppResult<Customer> {
        let actor = self.actor(subject)?;
        let name = require_name(&payload.name, "customer name")?;
        let email = normalize_email(&payload.email)?;
        if self.db.customer_email_taken(&actor.id, &email, None)? {
            return Err(AppError::Conflict(format!("a customer with email {} already exists", email)));
        }

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            name,
            email,
            phone: normalize_optional(payload.phone),
            company: normalize_optional(payload.company),
            status: payload.status.unwrap_or(CustomerStatus::Lead),
            source: normalize_optional(payload.source),
            notes: normalize_optional(payload.notes),
            lifetime_value: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_customer(&customer)?;
        self.record(
            &actor,
            "customer",
            &customer.id,
            "customer.created",
            format!("Added customer {}", customer.name),
            json!({ "status": customer.status, "company": customer.company }),
        )?;
        Ok(customer)
    }

    pub fn list_customers(&self, subject: &str, filters: ListCustomersFilters) -> AppResult<Vec<Customer>> {
        let actor = self.actor(subject)?;
        self.db.list_customers(&actor.id, &filters)
    }

    pub fn get_customer(&self, subject: &str, customer_id: &str) -> AppResult<CustomerDetail> {
        let actor = self.actor(subject)?;
        let customer = self.owned_customer(&actor, customer_id)?;
        let deals = self.db.list_deals(
            &actor.id,
            &ListDealsFilters {
                customer_id: Some(customer_id.to_string()),
                stage: None,
            },
        )?;
        let activities = self.db.list_sales_activities(
            &actor.id,
            &ListSalesActivitiesFilters {
                customer_id: Some(customer_id.to_string()),
                ..ListSalesActivitiesFilters::default()
            },
        )?;
        Ok(CustomerDetail {
            customer,
            deals,
            activities,
        })
    }

    pub fn update_customer(&self, subject: &str, customer_id: &str, patch: UpdateCustomerPayload) -> AppResult<Customer> {
        let actor = self.actor(subject)?;
        let mut customer = self.owned_customer(&actor, customer_id)?;

        if let Some(name) = patch.name {
            customer.name = require_name(&name, "customer name")?;
        }
        if let Some(email) = patch.email {
            let email = normalize_email(&email)?;
            if self.db.customer_email_taken(&actor.id, &email, Some(customer_id))? {
                return Err(AppError::Conflict(format!("a customer with email {} already exists", email)));
            }
            customer.email = email;
        }
        if patch.phone.is_some() {
            customer.phone = normalize_optional(patch.phone);
        }
        if patch.company.is_some() {
            customer.company = normalize_optional(patch.company);
        }
        if let Some(status) = patch.status {
            customer.status = status;
        }
        if patch.source.is_some() {
            customer.source = normalize_optional(patch.source);
        }
        if patch.notes.is_some() {
            customer.notes = normalize_optional(patch.notes);
        }
        customer.updated_at = Utc::now();

        self.db.update_customer(&customer)?;
        self.record(
            &actor,
            "customer",
            &customer.id,
            "customer.updated",
            format!("Updated customer {}", customer.name),
            json!({ "status": customer.status }),
        )?;
        Ok(customer)
    }

    /// Deletes sales activities, then deals, then the customer.
    pub fn delete_customer(&self, subject: &str, customer_id: &str) -> AppResult<DeleteCustomerResponse> {
        let actor = self.actor(subject)?;
        let customer = self.owned_customer(&actor, customer_id)?;

        let mut activities_deleted = 0u32;
        let activities = self.db.list_sales_activities(
            &actor.id,
            &ListSalesActivitiesFilters {
                customer_id: Some(customer_id.to_string()),
                ..ListSalesActivitiesFilters::default()
            },
        )?;
        for activity in activities {
            if self.db.delete_sales_activity(&activity.id)? {
                activities_deleted += 1;
            }
        }

        let mut deals_deleted = 0u32;
        let deals = self.db.list_deals(
            &actor.id,
            &ListDealsFilters {
                customer_id: Some(customer_id.to_string()),
                stage: None,
            },
        )?;
        for deal in deals {
            if self.db.delete_deal(&deal.id)? {
                deals_deleted += 1;
            }
        }
        self.db.delete_customer(customer_id)?;

        self.record(
            &actor,
            "customer",
            customer_id,
            "customer.deleted",
            format!("Deleted customer {}", customer.name),
            json!({ "dealsDeleted": deals_deleted, "activitiesDeleted": activities_deleted }),
        )?;
        tracing::info!(customer_id, deals_deleted, activities_deleted, "customer deleted");
        Ok(DeleteCustomerResponse {
            customer_id: customer_id.to_string(),
            deals_deleted,
            activities_deleted,
        })
    }

    fn owned_customer(&self, actor: &User, customer_id: &str) -> AppResult<Customer> {
        let customer = self
            .db
            .get_customer(customer_id)?
            .ok_or_else(|| AppError::not_found("customer", customer_id))?;
        ensure_owner(actor, &customer.user_id, "customer", customer_id)?;
        Ok(customer)
    }

    pub fn create_deal(&self, subject: &str, payload: CreateDealPayload) -> AppResult<Deal> {
        let actor = self.actor(subject)?;
        let customer = self.owned_customer(&actor, &payload.customer_id)?;
        let title = require_name(&payload.title, "deal title")?;
        let value = validate_amount(payload.value, "deal value")?;
        let stage = payload.stage.unwrap_or(DealStage::Lead);

        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            customer_id: customer.id.clone(),
            title,
            value,
            stage,
            probability: clamp_percentage(payload.probability.unwrap_or_else(|| stage.default_probability())),
            expected_close_date: payload.expected_close_date,
            closed_at: stage.is_closed().then_some(now),
            notes: normalize_optional(payload.notes),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_deal(&deal)?;
        self.record(
            &actor,
            "deal",
            &deal.id,
            "deal.created",
            format!("Opened deal {} with {}", deal.title, customer.name),
            json!({ "customerId": customer.id, "stage": deal.stage, "value": deal.value }),
        )?;
        if deal.stage == DealStage::ClosedWon {
            self.apply_won_deal(&actor, &deal, customer)?;
        }
        Ok(deal)
    }

    pub fn list_deals(&self, subject: &str, filters: ListDealsFilters) -> AppResult<Vec<Deal>> {
        let actor = self.actor(subject)?;
        self.db.list_deals(&actor.id, &filters)
    }

    pub fn get_deal(&self, subject: &str, deal_id: &str) -> AppResult<Deal> {
        let actor = self.actor(subject)?;
        self.owned_deal(&actor, deal_id)
    }

    /// Applies a patch; a stage change resets probability and handles closing.
    pub fn update_deal(&self, subject: &str, deal_id: &str, patch: UpdateDealPayload) -> AppResult<Deal> {
        let actor = self.actor(subject)?;
        let mut deal = self.owned_deal(&actor, deal_id)?;
        let previous_stage = deal.stage;
        let now = Utc::now();

        if let Some(title) = patch.title {
            deal.title = require_name(&title, "deal title")?;
        }
        if let Some(value) = patch.value {
            deal.value = validate_amount(value, "deal value")?;
        }
        if patch.expected_close_date.is_some() {
            deal.expected_close_date = patch.expected_close_date;
        }
        if patch.notes.is_some() {
            deal.notes = normalize_optional(patch.notes);
        }
        if let Some(stage) = patch.stage {
            deal.stage = stage;
            if stage != previous_stage {
                deal.probability = stage.default_probability();
                deal.closed_at = stage.is_closed().then_some(now);
            }
        }
        if let Some(probability) = patch.probability {
            deal.probability = clamp_percentage(probability);
        }
        deal.updated_at = now;

        self.db.update_deal(&deal)?;
        self.record(
            &actor,
            "deal",
            &deal.id,
            "deal.updated",
            format!("Updated deal {}", deal.title),
            json!({ "previousStage": previous_stage, "stage": deal.stage, "probability": deal.probability }),
        )?;

        if deal.stage == DealStage::ClosedWon && previous_stage != DealStage::ClosedWon {
            let customer = self
                .db
                .get_customer(&deal.customer_id)?
                .ok_or_else(|| AppError::not_found("customer", &deal.customer_id))?;
            self.apply_won_deal(&actor, &deal, customer)?;
        } else if deal.stage == DealStage::ClosedWon || previous_stage == DealStage::ClosedWon {
            self.refresh_lifetime_value(&deal.customer_id)?;
        }
        Ok(deal)
    }

    /// Deletes the deal; its sales activities stay with the customer.
    pub fn delete_deal(&self, subject: &str, deal_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        let deal = self.owned_deal(&actor, deal_id)?;
        let detached = self.db.detach_sales_activities_from_deal(deal_id)?;
        let success = self.db.delete_deal(deal_id)?;
        if deal.stage == DealStage::ClosedWon {
            self.refresh_lifetime_value(&deal.customer_id)?;
        }
        self.record(
            &actor,
            "deal",
            deal_id,
            "deal.deleted",
            format!("Deleted deal {}", deal.title),
            json!({ "customerId": deal.customer_id, "activitiesDetached": detached }),
        )?;
        Ok(BooleanResponse { success })
    }

    pub fn pipeline_summary(&self, subject: &str) -> AppResult<PipelineSummary> {
        let actor = self.actor(subject)?;
        let deals = self.db.list_deals(&actor.id, &ListDealsFilters::default())?;
        Ok(pipeline_summary(&deals))
    }

    fn apply_won_deal(&self, actor: &User, deal: &Deal, mut customer: Customer) -> AppResult<()> {
        customer.lifetime_value = self.db.won_deal_total(&customer.id)?;
        if matches!(customer.status, CustomerStatus::Lead | CustomerStatus::Prospect) {
            customer.status = CustomerStatus::Customer;
        }
        customer.updated_at = Utc::now();
        self.db.update_customer(&customer)?;
        self.db.insert_notification(
            &actor.id,
            NotificationKind::Success,
            "Deal won",
            &format!("{} closed with {} for {:.2}", deal.title, customer.name, deal.value),
            Some(&format!("/deals/{}", deal.id)),
        )?;
        tracing::info!(deal_id = %deal.id, customer_id = %customer.id, value = deal.value, "deal won");
        Ok(())
    }

    /// Lifetime value is the sum of the customer's won deals.
    fn refresh_lifetime_value(&self, customer_id: &str) -> AppResult<()> {
        let Some(mut customer) = self.db.get_customer(customer_id)? else {
            return Ok(());
        };
        customer.lifetime_value = self.db.won_deal_total(customer_id)?;
        customer.updated_at = Utc::now();
        self.db.update_customer(&customer)
    }

    fn owned_deal(&self, actor: &User, deal_id: &str) -> AppResult<Deal> {
        let deal = self
            .db
            .get_deal(deal_id)?
            .ok_or_else(|| AppError::not_found("deal", deal_id))?;
        ensure_owner(actor, &deal.user_id, "deal", deal_id)?;
        Ok(deal)
    }

    pub fn log_sales_activity(&self, subject: &str, payload: LogSalesActivityPayload) -> AppResult<SalesActivity> {
        let actor = self.actor(subject)?;
        let customer = self.owned_customer(&actor, &payload.customer_id)?;
        let deal_id = normalize_optional(payload.deal_id);
        if let Some(deal_id) = &deal_id {
            let deal = self.owned_deal(&actor, deal_id)?;
            if deal.customer_id != customer.id {
                return Err(AppError::Validation(format!(
                    "deal {} does not belong to customer {}",
                    deal_id, customer.id
                )));
            }
        }

        let activity = SalesActivity {
            id: Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            customer_id: customer.id.clone(),
            deal_id,
            kind: payload.kind,
            subject: require_name(&payload.subject, "activity subject")?,
            notes: normalize_optional(payload.notes),
            due_at: payload.due_at,
            completed: payload.completed.unwrap_or(false),
            created_at: Utc::now(),
        };
        self.db.insert_sales_activity(&activity)?;
        self.record(
            &actor,
            "customer",
            &customer.id,
            "sales_activity.logged",
            format!("Logged {} with {}: {}", activity.kind, customer.name, activity.subject),
            json!({ "activityId": activity.id, "dealId": activity.deal_id }),
        )?;
        Ok(activity)
    }

    pub fn list_sales_activities(&self, subject: &str, filters: ListSalesActivitiesFilters) -> AppResult<Vec<SalesActivity>> {
        let actor = self.actor(subject)?;
        self.db.list_sales_activities(&actor.id, &filters)
    }

    pub fn complete_sales_activity(&self, subject: &str, activity_id: &str) -> AppResult<SalesActivity> {
        let actor = self.actor(subject)?;
        let mut activity = self.owned_sales_activity(&actor, activity_id)?;
        if !activity.completed {
            self.db.set_sales_activity_completed(activity_id, true)?;
            activity.completed = true;
            self.record(
                &actor,
                "customer",
                &activity.customer_id,
                "sales_activity.completed",
                format!("Completed {}: {}", activity.kind, activity.subject),
                json!({ "activityId": activity.id }),
            )?;
        }
        Ok(activity)
    }

    pub fn delete_sales_activity(&self, subject: &str, activity_id: &str) -> AppResult<BooleanResponse> {
        let actor = self.actor(subject)?;
        let activity = self.owned_sales_activity(&actor, activity_id)?;
        let success = self.db.delete_sales_activity(activity_id)?;
        self.record(
            &actor,
            "customer",
            &activity.customer_id,
            "sales_activity.deleted",
            format!("Deleted {}: {}", activity.kind, activity.subject),
            json!({ "activityId": activity.id }),
        )?;
        Ok(BooleanResponse { success })
    }

    fn owned_sales_activity(&self, actor: &User, activity_id: &str) -> AppResult<SalesActivity> {
        let activity = self
            .db
            .get_sales_activity(activity_id)?
            .ok_or_else(|| AppError::not_found("sales activity", activity_id))?;
        ensure_owner(actor, &activity.user_id, "sales activity", activity_id)?;
        Ok(activity)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::models::{
        CreateCustomerPayload, CreateDealPayload, CustomerStatus, DealStage, ListCustomersFilters, ListNotificationsFilters,
        ListSalesActivitiesFilters, LogSalesActivityPayload, SalesActivityKind, UpdateCustomerPayload,
        UpdateDealPayload,
    };
    use crate::service::test_support::{core, user};
    use crate::service::DashboardCore;

    fn customer(core: &DashboardCore, subject: &str, email: &str) -> String {
        core.create_customer(
            subject,
            CreateCustomerPayload {
                name: "Acme".to_string(),
                email: email.to_string(),
                phone: None,
                company: Some("Acme Corp".to_string()),
                status: None,
                source: None,
                notes: None,
            },
        )
        .expect("create customer")
        .id
    }

    fn deal(core: &DashboardCore, subject: &str, customer_id: &str, value: f64) -> String {
        core.create_deal(
            subject,
            CreateDealPayload {
                customer_id: customer_id.to_string(),
                title: "Annual plan".to_string(),
                value,
                stage: None,
                probability: None,
                expected_close_date: None,
                notes: None,
            },
        )
        .expect("create deal")
        .id
    }

    fn log(core: &DashboardCore, subject: &str, customer_id: &str, deal_id: Option<&str>) -> String {
        core.log_sales_activity(
            subject,
            LogSalesActivityPayload {
                customer_id: customer_id.to_string(),
                deal_id: deal_id.map(ToString::to_string),
                kind: SalesActivityKind::Call,
                subject: "Intro call".to_string(),
                notes: None,
                due_at: None,
                completed: None,
            },
        )
        .expect("log activity")
        .id
    }

    #[test]
    fn customer_email_is_unique_per_owner() {
        let core = core();
        user(&core, "ada");
        user(&core, "eve");
        customer(&core, "ada", "buyer@acme.test");

        let error = core
            .create_customer(
                "ada",
                CreateCustomerPayload {
                    name: "Acme again".to_string(),
                    email: "BUYER@acme.test".to_string(),
                    phone: None,
                    company: None,
                    status: None,
                    source: None,
                    notes: None,
                },
            )
            .expect_err("duplicate");
        assert!(matches!(error, AppError::Conflict(_)));

        // A different owner may reuse the address.
        customer(&core, "eve", "buyer@acme.test");
    }

    #[test]
    fn updating_someone_elses_customer_is_denied() {
        let core = core();
        user(&core, "ada");
        user(&core, "eve");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let error = core
            .update_customer("eve", &customer_id, UpdateCustomerPayload::default())
            .expect_err("denied");
        assert!(matches!(error, AppError::AccessDenied(_)));
    }

    #[test]
    fn stage_changes_reset_probability_and_winning_updates_customer() {
        let core = core();
        user(&core, "ada");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let deal_id = deal(&core, "ada", &customer_id, 1_200.0);

        let proposal = core
            .update_deal(
                "ada",
                &deal_id,
                UpdateDealPayload {
                    stage: Some(DealStage::Proposal),
                    ..UpdateDealPayload::default()
                },
            )
            .expect("proposal");
        assert_eq!(proposal.probability, 50);
        assert!(proposal.closed_at.is_none());

        let explicit = core
            .update_deal(
                "ada",
                &deal_id,
                UpdateDealPayload {
                    stage: Some(DealStage::Negotiation),
                    probability: Some(90),
                    ..UpdateDealPayload::default()
                },
            )
            .expect("negotiation");
        assert_eq!(explicit.probability, 90);

        let won = core
            .update_deal(
                "ada",
                &deal_id,
                UpdateDealPayload {
                    stage: Some(DealStage::ClosedWon),
                    ..UpdateDealPayload::default()
                },
            )
            .expect("won");
        assert_eq!(won.probability, 100);
        assert!(won.closed_at.is_some());

        let detail = core.get_customer("ada", &customer_id).expect("customer");
        assert_eq!(detail.customer.lifetime_value, 1_200.0);
        assert_eq!(detail.customer.status, CustomerStatus::Customer);
        let notifications = core
            .list_notifications("ada", ListNotificationsFilters::default())
            .expect("notifications");
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Deal won");

        let summary = core.pipeline_summary("ada").expect("pipeline");
        assert_eq!(summary.won_value, 1_200.0);
        assert_eq!(summary.win_rate, 100.0);
        assert_eq!(summary.open_deal_count, 0);
    }

    #[test]
    fn lifetime_value_tracks_won_deals_across_reopening() {
        let core = core();
        user(&core, "ada");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let deal_id = deal(&core, "ada", &customer_id, 100.0);
        let stage = |stage| UpdateDealPayload {
            stage: Some(stage),
            ..UpdateDealPayload::default()
        };
        let lifetime_value = || {
            core.get_customer("ada", &customer_id)
                .expect("customer")
                .customer
                .lifetime_value
        };

        core.update_deal("ada", &deal_id, stage(DealStage::ClosedWon)).expect("won");
        assert_eq!(lifetime_value(), 100.0);

        core.update_deal("ada", &deal_id, stage(DealStage::Negotiation)).expect("reopened");
        assert_eq!(lifetime_value(), 0.0);

        core.update_deal("ada", &deal_id, stage(DealStage::ClosedWon)).expect("won again");
        assert_eq!(lifetime_value(), 100.0);

        core.update_deal(
            "ada",
            &deal_id,
            UpdateDealPayload {
                value: Some(250.0),
                ..UpdateDealPayload::default()
            },
        )
        .expect("revalued");
        assert_eq!(lifetime_value(), 250.0);

        core.delete_deal("ada", &deal_id).expect("delete");
        assert_eq!(lifetime_value(), 0.0);
    }

    #[test]
    fn customer_search_treats_wildcards_literally() {
        let core = core();
        user(&core, "ada");
        customer(&core, "ada", "buyer@acme.test");
        core.create_customer(
            "ada",
            CreateCustomerPayload {
                name: "100% Organic".to_string(),
                email: "hello@organic.test".to_string(),
                phone: None,
                company: None,
                status: None,
                source: None,
                notes: None,
            },
        )
        .expect("create customer");

        let search = |term: &str| {
            core.list_customers(
                "ada",
                ListCustomersFilters {
                    search: Some(term.to_string()),
                    ..ListCustomersFilters::default()
                },
            )
            .expect("search")
        };
        let percent = search("%");
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].name, "100% Organic");
        assert!(search("_").is_empty());
        assert_eq!(search("acme").len(), 1);
    }

    #[test]
    fn deleting_a_deal_detaches_its_activities() {
        let core = core();
        user(&core, "ada");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let deal_id = deal(&core, "ada", &customer_id, 500.0);
        let activity_id = log(&core, "ada", &customer_id, Some(&deal_id));

        assert!(core.delete_deal("ada", &deal_id).expect("delete").success);
        let activities = core
            .list_sales_activities(
                "ada",
                ListSalesActivitiesFilters {
                    customer_id: Some(customer_id),
                    ..ListSalesActivitiesFilters::default()
                },
            )
            .expect("activities");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].id, activity_id);
        assert!(activities[0].deal_id.is_none());
    }

    #[test]
    fn deleting_a_customer_removes_deals_and_activities() {
        let core = core();
        user(&core, "ada");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let deal_id = deal(&core, "ada", &customer_id, 500.0);
        deal(&core, "ada", &customer_id, 700.0);
        log(&core, "ada", &customer_id, Some(&deal_id));
        log(&core, "ada", &customer_id, None);

        let response = core.delete_customer("ada", &customer_id).expect("delete");
        assert_eq!(response.deals_deleted, 2);
        assert_eq!(response.activities_deleted, 2);
        assert!(core.list_deals("ada", Default::default()).expect("deals").is_empty());
        assert!(core.list_sales_activities("ada", Default::default()).expect("activities").is_empty());
    }

    #[test]
    fn completing_an_activity_is_idempotent() {
        let core = core();
        user(&core, "ada");
        let customer_id = customer(&core, "ada", "buyer@acme.test");
        let activity_id = log(&core, "ada", &customer_id, None);
        assert!(core.complete_sales_activity("ada", &activity_id).expect("complete").completed);
        assert!(core.complete_sales_activity("ada", &activity_id).expect("again").completed);
        let pending = core
            .list_sales_activities(
                "ada",
                ListSalesActivitiesFilters {
                    pending_only: Some(true),
                    ..ListSalesActivitiesFilters::default()
                },
            )
            .expect("pending");
        assert!(pending.is_empty());
    }
}
