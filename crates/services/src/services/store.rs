//! Narrow typed repository boundary between the QRE engine and the
//! allocation record store.
//!
//! The engine only ever needs a handful of reads plus the Section G upsert,
//! so the trait exposes exactly those and nothing else. The SQLite
//! implementation delegates to the `db` models.

use async_trait::async_trait;
use db::models::{
    activity::{SelectedActivity, SelectedActivitySummary, SelectedSubcomponent, SubcomponentContext},
    business_year::{Business, BusinessYear, CachedQreTotals},
    contractor::{ContractorAllocation, ContractorSubcomponent},
    employee::{EmployeeAllocation, EmployeeSubcomponent},
    federal_credit::{FederalCreditRow, UpsertFederalCredit},
    supply::{SupplyAllocation, SupplySubcomponent},
};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything the aggregator needs for one business year, fetched as a
/// single snapshot. Computation over a snapshot never touches the store
/// again, so concurrent report renders cannot interact.
#[derive(Debug, Clone, Default)]
pub struct YearSnapshot {
    pub activities: Vec<SelectedActivitySummary>,
    pub subcomponents: Vec<SubcomponentContext>,
    pub employees: Vec<EmployeeAllocation>,
    pub contractors: Vec<ContractorAllocation>,
    pub supplies: Vec<SupplyAllocation>,
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    async fn fetch_business_year(&self, business_year_id: Uuid)
    -> Result<Option<BusinessYear>, StoreError>;

    async fn fetch_business_profile(
        &self,
        business_year_id: Uuid,
    ) -> Result<Option<Business>, StoreError>;

    async fn fetch_selected_activities(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SelectedActivitySummary>, StoreError>;

    async fn fetch_subcomponent_contexts(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SubcomponentContext>, StoreError>;

    async fn fetch_employee_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<EmployeeAllocation>, StoreError>;

    async fn fetch_contractor_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<ContractorAllocation>, StoreError>;

    async fn fetch_supply_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SupplyAllocation>, StoreError>;

    /// Per-category totals cached by the Expense Management step
    async fn fetch_cached_year_totals(
        &self,
        business_year_id: Uuid,
    ) -> Result<CachedQreTotals, StoreError>;

    async fn fetch_federal_credit_rows(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<FederalCreditRow>, StoreError>;

    async fn upsert_federal_credit(
        &self,
        data: &UpsertFederalCredit,
    ) -> Result<FederalCreditRow, StoreError>;

    /// Fetch the full allocation snapshot for a business year.
    async fn fetch_year_snapshot(&self, business_year_id: Uuid) -> Result<YearSnapshot, StoreError> {
        Ok(YearSnapshot {
            activities: self.fetch_selected_activities(business_year_id).await?,
            subcomponents: self.fetch_subcomponent_contexts(business_year_id).await?,
            employees: self.fetch_employee_allocations(business_year_id).await?,
            contractors: self.fetch_contractor_allocations(business_year_id).await?,
            supplies: self.fetch_supply_allocations(business_year_id).await?,
        })
    }
}

/// SQLite-backed store used by the server and audit binaries
#[derive(Clone)]
pub struct SqliteAllocationStore {
    pool: SqlitePool,
}

impl SqliteAllocationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AllocationStore for SqliteAllocationStore {
    async fn fetch_business_year(
        &self,
        business_year_id: Uuid,
    ) -> Result<Option<BusinessYear>, StoreError> {
        Ok(BusinessYear::find_by_id(&self.pool, business_year_id).await?)
    }

    async fn fetch_business_profile(
        &self,
        business_year_id: Uuid,
    ) -> Result<Option<Business>, StoreError> {
        match BusinessYear::find_by_id(&self.pool, business_year_id).await? {
            Some(year) => Ok(year.business(&self.pool).await?),
            None => Ok(None),
        }
    }

    async fn fetch_selected_activities(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SelectedActivitySummary>, StoreError> {
        Ok(SelectedActivity::list_for_year(&self.pool, business_year_id).await?)
    }

    async fn fetch_subcomponent_contexts(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SubcomponentContext>, StoreError> {
        Ok(SelectedSubcomponent::list_contexts_for_year(&self.pool, business_year_id).await?)
    }

    async fn fetch_employee_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<EmployeeAllocation>, StoreError> {
        Ok(EmployeeSubcomponent::list_for_year(&self.pool, business_year_id).await?)
    }

    async fn fetch_contractor_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<ContractorAllocation>, StoreError> {
        Ok(ContractorSubcomponent::list_for_year(&self.pool, business_year_id).await?)
    }

    async fn fetch_supply_allocations(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<SupplyAllocation>, StoreError> {
        Ok(SupplySubcomponent::list_for_year(&self.pool, business_year_id).await?)
    }

    async fn fetch_cached_year_totals(
        &self,
        business_year_id: Uuid,
    ) -> Result<CachedQreTotals, StoreError> {
        Ok(BusinessYear::cached_year_totals(&self.pool, business_year_id).await?)
    }

    async fn fetch_federal_credit_rows(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<FederalCreditRow>, StoreError> {
        Ok(FederalCreditRow::list_for_year(&self.pool, business_year_id).await?)
    }

    async fn upsert_federal_credit(
        &self,
        data: &UpsertFederalCredit,
    ) -> Result<FederalCreditRow, StoreError> {
        Ok(FederalCreditRow::upsert(&self.pool, data).await?)
    }
}
