use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Contractor {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contractor allocation joined with the contract amount. The stored
/// percentage columns stay table-only; the engine recomputes from the
/// design percentages.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ContractorAllocation {
    pub contractor_id: Uuid,
    pub name: String,
    pub amount: f64,
    pub subcomponent_id: Uuid,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ContractorYearData {
    pub contractor_id: Uuid,
    pub business_year_id: Uuid,
    pub applied_percent: f64,
    pub calculated_qre: i64,
    pub updated_at: DateTime<Utc>,
}

impl Contractor {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_id: Uuid,
        name: &str,
        amount: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Contractor>(
            r#"
            INSERT INTO contractors (id, business_id, name, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(name)
        .bind(amount)
        .fetch_one(pool)
        .await
    }
}

pub struct ContractorSubcomponent;

impl ContractorSubcomponent {
    pub async fn upsert(
        pool: &SqlitePool,
        id: Uuid,
        contractor_id: Uuid,
        subcomponent_id: Uuid,
        business_year_id: Uuid,
        applied_percentage: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO contractor_subcomponents
                (id, contractor_id, subcomponent_id, business_year_id, applied_percentage, baseline_applied_percent)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (contractor_id, subcomponent_id, business_year_id) DO UPDATE SET
                applied_percentage = excluded.applied_percentage,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(id)
        .bind(contractor_id)
        .bind(subcomponent_id)
        .bind(business_year_id)
        .bind(applied_percentage)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<ContractorAllocation>, sqlx::Error> {
        sqlx::query_as::<_, ContractorAllocation>(
            r#"
            SELECT
                cs.contractor_id,
                c.name,
                c.amount,
                cs.subcomponent_id
            FROM contractor_subcomponents cs
            JOIN contractors c ON c.id = cs.contractor_id
            WHERE cs.business_year_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}

impl ContractorYearData {
    pub async fn upsert(
        pool: &SqlitePool,
        contractor_id: Uuid,
        business_year_id: Uuid,
        applied_percent: f64,
        calculated_qre: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO contractor_year_data (contractor_id, business_year_id, applied_percent, calculated_qre)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contractor_id, business_year_id) DO UPDATE SET
                applied_percent = excluded.applied_percent,
                calculated_qre = excluded.calculated_qre,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(contractor_id)
        .bind(business_year_id)
        .bind(applied_percent)
        .bind(calculated_qre)
        .execute(pool)
        .await?;
        Ok(())
    }
}
