use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Root of the allocation hierarchy
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ResearchActivity {
    pub id: Uuid,
    pub title: String,
    pub focus_area: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// (activity, business year) selection carrying the share of overall
/// business practice devoted to the activity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SelectedActivity {
    pub id: Uuid,
    pub business_year_id: Uuid,
    pub activity_id: Uuid,
    pub practice_percent: f64,
    pub general_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SelectedStep {
    pub id: Uuid,
    pub business_year_id: Uuid,
    pub selected_activity_id: Uuid,
    pub name: String,
    pub time_percentage: f64,
    pub non_rd_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SelectedSubcomponent {
    pub id: Uuid,
    pub business_year_id: Uuid,
    pub selected_step_id: Uuid,
    pub name: String,
    pub frequency_percentage: f64,
    pub year_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The four independently-set percentages (plus the non-R&D reduction) that
/// compose into a subcomponent's applied percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow, Serialize, Deserialize, TS)]
pub struct DesignPercents {
    pub practice_percent: f64,
    pub time_percentage: f64,
    pub non_rd_percentage: f64,
    pub frequency_percentage: f64,
    pub year_percentage: f64,
}

/// Selected activity joined with its research activity title
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SelectedActivitySummary {
    pub selected_activity_id: Uuid,
    pub activity_id: Uuid,
    pub activity_title: String,
    pub practice_percent: f64,
    pub general_description: Option<String>,
}

/// Subcomponent joined up the hierarchy to its step and activity, with the
/// design percentages needed by the rollup calculator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SubcomponentContext {
    pub subcomponent_id: Uuid,
    pub subcomponent_name: String,
    pub step_id: Uuid,
    pub step_name: String,
    pub activity_id: Uuid,
    pub activity_title: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub design: DesignPercents,
}

impl SelectedActivity {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_year_id: Uuid,
        activity_id: Uuid,
        practice_percent: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SelectedActivity>(
            r#"
            INSERT INTO selected_activities (id, business_year_id, activity_id, practice_percent)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_year_id)
        .bind(activity_id)
        .bind(practice_percent)
        .fetch_one(pool)
        .await
    }

    /// Selected activities for a year with their research-activity titles
    pub async fn list_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<SelectedActivitySummary>, sqlx::Error> {
        sqlx::query_as::<_, SelectedActivitySummary>(
            r#"
            SELECT
                sa.id AS selected_activity_id,
                sa.activity_id,
                ra.title AS activity_title,
                sa.practice_percent,
                sa.general_description
            FROM selected_activities sa
            JOIN research_activities ra ON ra.id = sa.activity_id
            WHERE sa.business_year_id = $1
            ORDER BY ra.title
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}

impl ResearchActivity {
    pub async fn create(pool: &SqlitePool, id: Uuid, title: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ResearchActivity>(
            "INSERT INTO research_activities (id, title) VALUES ($1, $2) RETURNING *",
        )
        .bind(id)
        .bind(title)
        .fetch_one(pool)
        .await
    }
}

impl SelectedStep {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_year_id: Uuid,
        selected_activity_id: Uuid,
        name: &str,
        time_percentage: f64,
        non_rd_percentage: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SelectedStep>(
            r#"
            INSERT INTO selected_steps
                (id, business_year_id, selected_activity_id, name, time_percentage, non_rd_percentage)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_year_id)
        .bind(selected_activity_id)
        .bind(name)
        .bind(time_percentage)
        .bind(non_rd_percentage)
        .fetch_one(pool)
        .await
    }
}

impl SelectedSubcomponent {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_year_id: Uuid,
        selected_step_id: Uuid,
        name: &str,
        frequency_percentage: f64,
        year_percentage: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SelectedSubcomponent>(
            r#"
            INSERT INTO selected_subcomponents
                (id, business_year_id, selected_step_id, name, frequency_percentage, year_percentage)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_year_id)
        .bind(selected_step_id)
        .bind(name)
        .bind(frequency_percentage)
        .bind(year_percentage)
        .fetch_one(pool)
        .await
    }

    /// Every selected subcomponent for the year joined up to its step and
    /// activity, carrying the design percentages.
    pub async fn list_contexts_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<SubcomponentContext>, sqlx::Error> {
        sqlx::query_as::<_, SubcomponentContext>(
            r#"
            SELECT
                sub.id AS subcomponent_id,
                sub.name AS subcomponent_name,
                st.id AS step_id,
                st.name AS step_name,
                sa.activity_id AS activity_id,
                ra.title AS activity_title,
                sa.practice_percent,
                st.time_percentage,
                st.non_rd_percentage,
                sub.frequency_percentage,
                sub.year_percentage
            FROM selected_subcomponents sub
            JOIN selected_steps st ON st.id = sub.selected_step_id
            JOIN selected_activities sa ON sa.id = st.selected_activity_id
            JOIN research_activities ra ON ra.id = sa.activity_id
            WHERE sub.business_year_id = $1
            ORDER BY ra.title, st.name, sub.name
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}
