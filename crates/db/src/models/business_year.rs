use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Business profile referenced by Section G reporting
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Business {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub ein: Option<String>,
    pub naics_code: Option<String>,
    pub industry: Option<String>,
    pub focus: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fiscal-year scope for all activity selections and allocations.
///
/// Once `qre_locked` is set the cached `employee_qre` / `contractor_qre` /
/// `supply_qre` columns are the authoritative totals and downstream consumers
/// must not recompute over them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct BusinessYear {
    pub id: Uuid,
    pub business_id: Uuid,
    pub year: i32,
    pub qre_locked: bool,
    pub research_design_completed: bool,
    pub employee_qre: i64,
    pub contractor_qre: i64,
    pub supply_qre: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-category QRE totals cached in the `*_year_data` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct CachedQreTotals {
    pub employee_qre: i64,
    pub contractor_qre: i64,
    pub supply_qre: i64,
}

impl CachedQreTotals {
    pub fn total(&self) -> i64 {
        self.employee_qre + self.contractor_qre + self.supply_qre
    }
}

impl Business {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Business>(
            r#"
            INSERT INTO businesses (id, client_id, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(client_id)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

impl BusinessYear {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_id: Uuid,
        year: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BusinessYear>(
            r#"
            INSERT INTO business_years (id, business_id, year)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(year)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BusinessYear>("SELECT * FROM business_years WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Freeze the year's QRE totals. After this the cached columns are the
    /// single source of truth.
    pub async fn lock_totals(
        pool: &SqlitePool,
        id: Uuid,
        totals: &CachedQreTotals,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE business_years
            SET qre_locked = 1,
                employee_qre = $2,
                contractor_qre = $3,
                supply_qre = $4,
                updated_at = datetime('now', 'subsec')
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(totals.employee_qre)
        .bind(totals.contractor_qre)
        .bind(totals.supply_qre)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub fn locked_totals(&self) -> Option<CachedQreTotals> {
        self.qre_locked.then(|| CachedQreTotals {
            employee_qre: self.employee_qre,
            contractor_qre: self.contractor_qre,
            supply_qre: self.supply_qre,
        })
    }

    /// Sum the per-resource `calculated_qre` columns cached by the Expense
    /// Management step. This is the second of the two code paths the
    /// consistency audit compares.
    pub async fn cached_year_totals(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<CachedQreTotals, sqlx::Error> {
        let employee_qre: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(calculated_qre), 0) FROM employee_year_data WHERE business_year_id = $1",
        )
        .bind(business_year_id)
        .fetch_one(pool)
        .await?;

        let contractor_qre: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(calculated_qre), 0) FROM contractor_year_data WHERE business_year_id = $1",
        )
        .bind(business_year_id)
        .fetch_one(pool)
        .await?;

        let supply_qre: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(calculated_qre), 0) FROM supply_year_data WHERE business_year_id = $1",
        )
        .bind(business_year_id)
        .fetch_one(pool)
        .await?;

        Ok(CachedQreTotals {
            employee_qre,
            contractor_qre,
            supply_qre,
        })
    }

    /// Business profile for the year, used by the Section G formatter.
    pub async fn business(&self, pool: &SqlitePool) -> Result<Option<Business>, sqlx::Error> {
        Business::find_by_id(pool, self.business_id).await
    }
}
