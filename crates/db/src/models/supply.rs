use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Supply {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub annual_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supply allocation: an absolute dollar figure already scoped to the
/// subcomponent, not a percentage of annual cost.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SupplyAllocation {
    pub supply_id: Uuid,
    pub name: String,
    pub subcomponent_id: Uuid,
    pub amount_applied: f64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SupplyYearData {
    pub supply_id: Uuid,
    pub business_year_id: Uuid,
    pub applied_percent: f64,
    pub calculated_qre: i64,
    pub updated_at: DateTime<Utc>,
}

impl Supply {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_id: Uuid,
        name: &str,
        annual_cost: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Supply>(
            r#"
            INSERT INTO supplies (id, business_id, name, annual_cost)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(name)
        .bind(annual_cost)
        .fetch_one(pool)
        .await
    }
}

pub struct SupplySubcomponent;

impl SupplySubcomponent {
    pub async fn upsert(
        pool: &SqlitePool,
        id: Uuid,
        supply_id: Uuid,
        subcomponent_id: Uuid,
        business_year_id: Uuid,
        amount_applied: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO supply_subcomponents
                (id, supply_id, subcomponent_id, business_year_id, amount_applied)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (supply_id, subcomponent_id, business_year_id) DO UPDATE SET
                amount_applied = excluded.amount_applied,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(id)
        .bind(supply_id)
        .bind(subcomponent_id)
        .bind(business_year_id)
        .bind(amount_applied)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<SupplyAllocation>, sqlx::Error> {
        sqlx::query_as::<_, SupplyAllocation>(
            r#"
            SELECT
                ss.supply_id,
                s.name,
                ss.subcomponent_id,
                ss.amount_applied
            FROM supply_subcomponents ss
            JOIN supplies s ON s.id = ss.supply_id
            WHERE ss.business_year_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}

impl SupplyYearData {
    pub async fn upsert(
        pool: &SqlitePool,
        supply_id: Uuid,
        business_year_id: Uuid,
        applied_percent: f64,
        calculated_qre: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO supply_year_data (supply_id, business_year_id, applied_percent, calculated_qre)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (supply_id, business_year_id) DO UPDATE SET
                applied_percent = excluded.applied_percent,
                calculated_qre = excluded.calculated_qre,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(supply_id)
        .bind(business_year_id)
        .bind(applied_percent)
        .bind(calculated_qre)
        .execute(pool)
        .await?;
        Ok(())
    }
}
