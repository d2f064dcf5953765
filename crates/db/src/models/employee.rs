use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Closed role taxonomy assigned at data entry.
///
/// Replaces the free-text role names the wage classification used to
/// substring-match against.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "role_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoleKind {
    ResearchLeader,
    Supervisor,
    Admin,
    #[default]
    Other,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Employee {
    pub id: Uuid,
    pub business_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub annual_wage: f64,
    pub is_owner: bool,
    pub role: RoleKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Employee allocation joined with the employee's wage and role.
///
/// The stored `applied_percentage`/`baseline_applied_percent` columns stay
/// table-only; the engine recomputes the applied percentage from the design
/// percentages.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EmployeeAllocation {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub annual_wage: f64,
    pub is_owner: bool,
    pub role: RoleKind,
    pub subcomponent_id: Uuid,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EmployeeYearData {
    pub employee_id: Uuid,
    pub business_year_id: Uuid,
    pub applied_percent: f64,
    pub calculated_qre: i64,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        business_id: Uuid,
        first_name: &str,
        last_name: &str,
        annual_wage: f64,
        is_owner: bool,
        role: RoleKind,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Employee>(
            r#"
            INSERT INTO employees (id, business_id, first_name, last_name, annual_wage, is_owner, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(first_name)
        .bind(last_name)
        .bind(annual_wage)
        .bind(is_owner)
        .bind(role)
        .fetch_one(pool)
        .await
    }
}

pub struct EmployeeSubcomponent;

impl EmployeeSubcomponent {
    pub async fn upsert(
        pool: &SqlitePool,
        id: Uuid,
        employee_id: Uuid,
        subcomponent_id: Uuid,
        business_year_id: Uuid,
        applied_percentage: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO employee_subcomponents
                (id, employee_id, subcomponent_id, business_year_id, applied_percentage, baseline_applied_percent)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (employee_id, subcomponent_id, business_year_id) DO UPDATE SET
                applied_percentage = excluded.applied_percentage,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(id)
        .bind(employee_id)
        .bind(subcomponent_id)
        .bind(business_year_id)
        .bind(applied_percentage)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All employee allocation rows for the year, joined with employee data
    pub async fn list_for_year(
        pool: &SqlitePool,
        business_year_id: Uuid,
    ) -> Result<Vec<EmployeeAllocation>, sqlx::Error> {
        sqlx::query_as::<_, EmployeeAllocation>(
            r#"
            SELECT
                es.employee_id,
                e.first_name,
                e.last_name,
                e.annual_wage,
                e.is_owner,
                e.role,
                es.subcomponent_id
            FROM employee_subcomponents es
            JOIN employees e ON e.id = es.employee_id
            WHERE es.business_year_id = $1
            ORDER BY e.last_name, e.first_name
            "#,
        )
        .bind(business_year_id)
        .fetch_all(pool)
        .await
    }
}

impl EmployeeYearData {
    /// Write the cached per-year totals the Expense Management step maintains.
    pub async fn upsert(
        pool: &SqlitePool,
        employee_id: Uuid,
        business_year_id: Uuid,
        applied_percent: f64,
        calculated_qre: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO employee_year_data (employee_id, business_year_id, applied_percent, calculated_qre)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (employee_id, business_year_id) DO UPDATE SET
                applied_percent = excluded.applied_percent,
                calculated_qre = excluded.calculated_qre,
                updated_at = datetime('now', 'subsec')
            "#,
        )
        .bind(employee_id)
        .bind(business_year_id)
        .bind(applied_percent)
        .bind(calculated_qre)
        .execute(pool)
        .await?;
        Ok(())
    }
}
