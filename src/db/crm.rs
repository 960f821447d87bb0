use super::{like_pattern, parse_label, parse_optional_time, parse_time, query_params, timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Customer, Deal, DealStage, ListCustomersFilters, ListDealsFilters, ListSalesActivitiesFilters, SalesActivity,
};
use rusqlite::{params, OptionalExtension};

const CUSTOMER_COLUMNS: &str =
    "id, user_id, name, email, phone, company, status, source, notes, lifetime_value, created_at, updated_at";
const DEAL_COLUMNS: &str = "id, user_id, customer_id, title, value, stage, probability, expected_close_date, closed_at, notes, created_at, updated_at";
const SALES_ACTIVITY_COLUMNS: &str =
    "id, user_id, customer_id, deal_id, kind, subject, notes, due_at, completed, created_at";

impl Database {
    pub fn insert_customer(&self, customer: &Customer) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO customers (id, user_id, name, email, phone, company, status, source, notes, lifetime_value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                customer.id,
                customer.user_id,
                customer.name,
                customer.email,
                customer.phone,
                customer.company,
                customer.status.as_str(),
                customer.source,
                customer.notes,
                customer.lifetime_value,
                timestamp(customer.created_at),
                timestamp(customer.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_customer(&self, customer_id: &str) -> AppResult<Option<Customer>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS),
            [customer_id],
            parse_customer_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// True when another customer of the same owner already uses `email`.
    pub fn customer_email_taken(&self, user_id: &str, email: &str, exclude_id: Option<&str>) -> AppResult<bool> {
        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM customers WHERE user_id = ?1 AND email = ?2",
                params![user_id, email],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match existing {
            Some(id) => Some(id.as_str()) != exclude_id,
            None => false,
        })
    }

    pub fn list_customers(&self, user_id: &str, filters: &ListCustomersFilters) -> AppResult<Vec<Customer>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM customers WHERE user_id = ?", CUSTOMER_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(status) = filters.status {
            query.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        if let Some(search) = &filters.search {
            query.push_str(" AND (name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\' OR company LIKE ? ESCAPE '\\')");
            for _ in 0..3 {
                params_vec.push(like_pattern(search));
            }
        }
        query.push_str(" ORDER BY name COLLATE NOCASE ASC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(query_params(&params_vec)), parse_customer_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_customer(&self, customer: &Customer) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE customers SET name = ?1, email = ?2, phone = ?3, company = ?4, status = ?5, source = ?6,
               notes = ?7, lifetime_value = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                customer.name,
                customer.email,
                customer.phone,
                customer.company,
                customer.status.as_str(),
                customer.source,
                customer.notes,
                customer.lifetime_value,
                timestamp(customer.updated_at),
                customer.id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_customer(&self, customer_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM customers WHERE id = ?1", [customer_id])?;
        Ok(changed > 0)
    }

    pub fn insert_deal(&self, deal: &Deal) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO deals (id, user_id, customer_id, title, value, stage, probability, expected_close_date, closed_at, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                deal.id,
                deal.user_id,
                deal.customer_id,
                deal.title,
                deal.value,
                deal.stage.as_str(),
                deal.probability,
                deal.expected_close_date,
                deal.closed_at.map(timestamp),
                deal.notes,
                timestamp(deal.created_at),
                timestamp(deal.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_deal(&self, deal_id: &str) -> AppResult<Option<Deal>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM deals WHERE id = ?1", DEAL_COLUMNS),
            [deal_id],
            parse_deal_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Sum of the customer's closed-won deal values.
    pub fn won_deal_total(&self, customer_id: &str) -> AppResult<f64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COALESCE(SUM(value), 0) FROM deals WHERE customer_id = ?1 AND stage = ?2",
            params![customer_id, DealStage::ClosedWon.as_str()],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    pub fn list_deals(&self, user_id: &str, filters: &ListDealsFilters) -> AppResult<Vec<Deal>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM deals WHERE user_id = ?", DEAL_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(customer_id) = &filters.customer_id {
            query.push_str(" AND customer_id = ?");
            params_vec.push(customer_id.clone());
        }
        if let Some(stage) = filters.stage {
            query.push_str(" AND stage = ?");
            params_vec.push(stage.as_str().to_string());
        }
        query.push_str(" ORDER BY updated_at DESC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(query_params(&params_vec)), parse_deal_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn update_deal(&self, deal: &Deal) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE deals SET title = ?1, value = ?2, stage = ?3, probability = ?4, expected_close_date = ?5,
               closed_at = ?6, notes = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                deal.title,
                deal.value,
                deal.stage.as_str(),
                deal.probability,
                deal.expected_close_date,
                deal.closed_at.map(timestamp),
                deal.notes,
                timestamp(deal.updated_at),
                deal.id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_deal(&self, deal_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM deals WHERE id = ?1", [deal_id])?;
        Ok(changed > 0)
    }

    pub fn insert_sales_activity(&self, activity: &SalesActivity) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sales_activities (id, user_id, customer_id, deal_id, kind, subject, notes, due_at, completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                activity.id,
                activity.user_id,
                activity.customer_id,
                activity.deal_id,
                activity.kind.as_str(),
                activity.subject,
                activity.notes,
                activity.due_at.map(timestamp),
                activity.completed,
                timestamp(activity.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_sales_activity(&self, activity_id: &str) -> AppResult<Option<SalesActivity>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM sales_activities WHERE id = ?1", SALES_ACTIVITY_COLUMNS),
            [activity_id],
            parse_sales_activity_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_sales_activities(&self, user_id: &str, filters: &ListSalesActivitiesFilters) -> AppResult<Vec<SalesActivity>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {} FROM sales_activities WHERE user_id = ?", SALES_ACTIVITY_COLUMNS);
        let mut params_vec: Vec<String> = vec![user_id.to_string()];
        if let Some(customer_id) = &filters.customer_id {
            query.push_str(" AND customer_id = ?");
            params_vec.push(customer_id.clone());
        }
        if let Some(deal_id) = &filters.deal_id {
            query.push_str(" AND deal_id = ?");
            params_vec.push(deal_id.clone());
        }
        if filters.pending_only.unwrap_or(false) {
            query.push_str(" AND completed = 0");
        }
        query.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(
            rusqlite::params_from_iter(query_params(&params_vec)),
            parse_sales_activity_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn set_sales_activity_completed(&self, activity_id: &str, completed: bool) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sales_activities SET completed = ?1 WHERE id = ?2",
            params![completed, activity_id],
        )?;
        Ok(())
    }

    pub fn detach_sales_activities_from_deal(&self, deal_id: &str) -> AppResult<u32> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE sales_activities SET deal_id = NULL WHERE deal_id = ?1", [deal_id])?;
        Ok(changed as u32)
    }

    pub fn delete_sales_activity(&self, activity_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM sales_activities WHERE id = ?1", [activity_id])?;
        Ok(changed > 0)
    }
}

fn parse_customer_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        company: row.get(5)?,
        status: parse_label(&row.get::<_, String>(6)?, 6)?,
        source: row.get(7)?,
        notes: row.get(8)?,
        lifetime_value: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        updated_at: parse_time(&row.get::<_, String>(11)?)?,
    })
}

fn parse_deal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deal> {
    Ok(Deal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        customer_id: row.get(2)?,
        title: row.get(3)?,
        value: row.get(4)?,
        stage: parse_label(&row.get::<_, String>(5)?, 5)?,
        probability: row.get(6)?,
        expected_close_date: row.get(7)?,
        closed_at: parse_optional_time(row.get(8)?)?,
        notes: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        updated_at: parse_time(&row.get::<_, String>(11)?)?,
    })
}

fn parse_sales_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SalesActivity> {
    Ok(SalesActivity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        customer_id: row.get(2)?,
        deal_id: row.get(3)?,
        kind: parse_label(&row.get::<_, String>(4)?, 4)?,
        subject: row.get(5)?,
        notes: row.get(6)?,
        due_at: parse_optional_time(row.get(7)?)?,
        completed: row.get::<_, i64>(8)? != 0,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
    })
}
