use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Persisted Section G / Form 6765 summary row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct FederalCreditRow {
    pub id: Uuid,
    pub business_year_id: Uuid,
    pub client_id: Uuid,
    pub research_activity_id: Option<Uuid>,
    pub research_activity_name: String,
    pub direct_research_wages: i64,
    pub supervision_wages: i64,
    pub support_wages: i64,
    pub supplies_expenses: i64,
    pub contractor_expenses: i64,
    pub total_qre: i64,
    pub subcomponent_count: i64,
    pub subcomponent_groups: Option<String>,
    pub applied_percent: f64,
    pub line_49f_description: Option<String>,
    pub ai_generation_timestamp: Option<DateTime<Utc>>,
    pub ai_prompt_used: Option<String>,
    pub industry_type: Option<String>,
    pub focus_area: Option<String>,
    pub general_description: Option<String>,
    pub data_snapshot: Option<String>, // JSON-serialized QRE breakdown
    pub is_latest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for the keyed Section G upsert
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpsertFederalCredit {
    pub business_year_id: Uuid,
    pub client_id: Uuid,
    pub research_activity_id: Option<Uuid>,
    pub research_activity_name: String,
    pub direct_research_wages: i64,
    pub supervision_wages: i64,
    pub support_wages: i64,
    pub supplies_expenses: i64,
    pub contractor_expenses: i64,
    pub total_qre: i64,
    pub subcomponent_count: i64,
    pub subcomponent_groups: Option<String>,
    pub applied_percent: f64,
    pub line_49f_description: Option<String>,
    pub ai_generation_timestamp: Option<DateTime<Utc>>,
    pub ai_prompt_used: Option<String>,
    pub industry_type: Option<String>,
    pub focus_area: Option<String>,
    pub general_description: Option<String>,
    pub data_snapshot: Option<String>,
}

impl FederalCreditRow {
    /// Idempotent upsert keyed on
    /// (business_year_id, client_id, research_activity_name).
    ///
    /// A second call with the same key updates the existing row in place;
    /// conflict resolution between concurrent writers is delegated to the
    /// store (last write wins at the row level).
    pub async fn upsert(pool: &SqlitePool, data: &UpsertFederalCredit) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, FederalCreditRow>(
            r#"
            INSERT INTO federal_credit (
                id, business_year_id, client_id, research_activity_id, research_activity_name,
                direct_research_wages, supervision_wages, support_wages,
                supplies_expenses, contractor_expenses, total_qre,
                subcomponent_count, subcomponent_groups, applied_percent,
                line_49f_description, ai_generation_timestamp, ai_prompt_used,
                industry_type, focus_area, general_description, data_snapshot, is_latest
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, 1)
            ON CONFLICT (business_year_id, client_id, research_activity_name) DO UPDATE SET
                research_activity_id = excluded.research_activity_id,
                direct_research_wages = excluded.direct_research_wages,
                supervision_wages = excluded.supervision_wages,
                support_wages = excluded.support_wages,
                supplies_expenses = excluded.supplies_expenses,
                contractor_expenses = excluded.contractor_expenses,
                total_qre = excluded.total_qre,
                subcomponent_count = excluded.subcomponent_count,
                subcomponent_groups = excluded.subcomponent_groups,
                applied_percent = excluded.applied_percent,
                line_49f_description = excluded.line_49f_description,
                ai_generation_timestamp = excluded.ai_generation_timestamp,
                ai_prompt_used = excluded.ai_prompt_used,
                industry_type = excluded.industry_type,
                focus_area = excluded.focus_area,
                general_description = excluded.general_description,
                data_snapshot = excluded.data_snapshot,
                is_latest = 1,
                updated_at = datetime('now', 'subsec')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.business_year_id)
        .bind(data.client_id)
        .bind(data.research_activity_id)
        .bind(&data.research_activity_name)
        .bind(data.direct_research_wages)
        .bind(data.supervision_wages)
        .bind(data.support_wages)
        .bind(data.supplies_expenses)
        .bind(data.contractor_expenses)
        .bind(data.total_qre)
        .bind(data.subcomponent_count)
        .bind(&data.subcomponent_groups)
        .bind(data.applied_percent)
        .bind(&data.line_49f_description)
        .bind(data.ai_generation_timestamp)
        .bind(&data.ai_prompt_used)
        .bind(&data.industry_type)
        .bind(&data.focus_area)
        .bind(&data.general_description)
        .bind(&data.data_snapshot)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FederalCreditRow>(
            r#"
            SELECT * FROM federal_credit
            WHERE business_year_id = $1 AND is_latest = 1
            ORDER BY research_activity_name
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}
