//! In-memory fake store and snapshot fixtures shared by the service tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use db::models::{
    activity::{DesignPercents, SelectedActivitySummary, SubcomponentContext},
    business_year::{Business, BusinessYear, CachedQreTotals},
    contractor::ContractorAllocation,
    employee::{EmployeeAllocation, RoleKind},
    federal_credit::{FederalCreditRow, UpsertFederalCredit},
    supply::SupplyAllocation,
};
use uuid::Uuid;

use super::{
    aggregator::QreTotals,
    store::{AllocationStore, StoreError, YearSnapshot},
};

#[derive(Debug, Clone)]
pub struct EmployeeSpec {
    pub wage: f64,
    pub role: RoleKind,
    pub is_owner: bool,
}

impl EmployeeSpec {
    pub fn wage(wage: f64) -> Self {
        Self {
            wage,
            role: RoleKind::Other,
            is_owner: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureSpec {
    pub design: DesignPercents,
    pub employees: Vec<EmployeeSpec>,
    pub contractor_amounts: Vec<f64>,
    pub supply_amounts: Vec<f64>,
}

impl Default for FixtureSpec {
    fn default() -> Self {
        // Scenario fixture: practice=50, time=40, freq=80, year=100 -> 16%
        Self {
            design: DesignPercents {
                practice_percent: 50.0,
                time_percentage: 40.0,
                non_rd_percentage: 0.0,
                frequency_percentage: 80.0,
                year_percentage: 100.0,
            },
            employees: vec![EmployeeSpec::wage(100_000.0)],
            contractor_amounts: vec![50_000.0],
            supply_amounts: vec![3_250.0],
        }
    }
}

/// One activity / one step / one subcomponent snapshot with the given
/// resources allocated to it.
pub fn snapshot_fixture(spec: FixtureSpec) -> YearSnapshot {
    let activity_id = Uuid::new_v4();
    let step_id = Uuid::new_v4();
    let subcomponent_id = Uuid::new_v4();

    let activities = vec![SelectedActivitySummary {
        selected_activity_id: Uuid::new_v4(),
        activity_id,
        activity_title: "Clinical Protocol Development".to_string(),
        practice_percent: spec.design.practice_percent,
        general_description: None,
    }];

    let subcomponents = vec![SubcomponentContext {
        subcomponent_id,
        subcomponent_name: "Protocol Refinement".to_string(),
        step_id,
        step_name: "Experimental Design".to_string(),
        activity_id,
        activity_title: "Clinical Protocol Development".to_string(),
        design: spec.design,
    }];

    let employees = spec
        .employees
        .iter()
        .enumerate()
        .map(|(i, e)| EmployeeAllocation {
            employee_id: Uuid::new_v4(),
            first_name: format!("Employee{i}"),
            last_name: "Fixture".to_string(),
            annual_wage: e.wage,
            is_owner: e.is_owner,
            role: e.role,
            subcomponent_id,
        })
        .collect();

    let contractors = spec
        .contractor_amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| ContractorAllocation {
            contractor_id: Uuid::new_v4(),
            name: format!("Contractor{i}"),
            amount: *amount,
            subcomponent_id,
        })
        .collect();

    let supplies = spec
        .supply_amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| SupplyAllocation {
            supply_id: Uuid::new_v4(),
            name: format!("Supply{i}"),
            subcomponent_id,
            amount_applied: *amount,
        })
        .collect();

    YearSnapshot {
        activities,
        subcomponents,
        employees,
        contractors,
        supplies,
    }
}

type UpsertKey = (Uuid, Uuid, String);

/// In-memory `AllocationStore` with keyed upsert semantics
#[derive(Clone)]
pub struct FakeStore {
    pub business_year_id: Uuid,
    pub client_id: Uuid,
    pub year: BusinessYear,
    pub business: Business,
    pub snapshot: YearSnapshot,
    pub cached: CachedQreTotals,
    pub upserts: Arc<Mutex<HashMap<UpsertKey, UpsertFederalCredit>>>,
}

impl FakeStore {
    pub fn with_snapshot(snapshot: YearSnapshot) -> Self {
        let business_year_id = Uuid::new_v4();
        let business_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let now = Utc::now();

        Self {
            business_year_id,
            client_id,
            year: BusinessYear {
                id: business_year_id,
                business_id,
                year: 2024,
                qre_locked: false,
                research_design_completed: true,
                employee_qre: 0,
                contractor_qre: 0,
                supply_qre: 0,
                created_at: now,
                updated_at: now,
            },
            business: Business {
                id: business_id,
                client_id,
                name: "Fixture Dental Group".to_string(),
                ein: Some("12-3456789".to_string()),
                naics_code: Some("621210".to_string()),
                industry: Some("Healthcare".to_string()),
                focus: Some("Dentistry".to_string()),
                created_at: now,
                updated_at: now,
            },
            snapshot,
            cached: CachedQreTotals::default(),
            upserts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn lock_totals(&mut self, totals: QreTotals) {
        self.year.qre_locked = true;
        self.year.employee_qre = totals.employee_qre;
        self.year.contractor_qre = totals.contractor_qre;
        self.year.supply_qre = totals.supply_qre;
    }

    pub fn set_cached(&mut self, cached: CachedQreTotals) {
        self.cached = cached;
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }
}

#[async_trait]
impl AllocationStore for FakeStore {
    async fn fetch_business_year(
        &self,
        business_year_id: Uuid,
    ) -> Result<Option<BusinessYear>, StoreError> {
        Ok((business_year_id == self.business_year_id).then(|| self.year.clone()))
    }

    async fn fetch_business_profile(
        &self,
        business_year_id: Uuid,
    ) -> Result<Option<Business>, StoreError> {
        Ok((business_year_id == self.business_year_id).then(|| self.business.clone()))
    }

    async fn fetch_selected_activities(
        &self,
        _business_year_id: Uuid,
    ) -> Result<Vec<SelectedActivitySummary>, StoreError> {
        Ok(self.snapshot.activities.clone())
    }

    async fn fetch_subcomponent_contexts(
        &self,
        _business_year_id: Uuid,
    ) -> Result<Vec<SubcomponentContext>, StoreError> {
        Ok(self.snapshot.subcomponents.clone())
    }

    async fn fetch_employee_allocations(
        &self,
        _business_year_id: Uuid,
    ) -> Result<Vec<EmployeeAllocation>, StoreError> {
        Ok(self.snapshot.employees.clone())
    }

    async fn fetch_contractor_allocations(
        &self,
        _business_year_id: Uuid,
    ) -> Result<Vec<ContractorAllocation>, StoreError> {
        Ok(self.snapshot.contractors.clone())
    }

    async fn fetch_supply_allocations(
        &self,
        _business_year_id: Uuid,
    ) -> Result<Vec<SupplyAllocation>, StoreError> {
        Ok(self.snapshot.supplies.clone())
    }

    async fn fetch_cached_year_totals(
        &self,
        _business_year_id: Uuid,
    ) -> Result<CachedQreTotals, StoreError> {
        Ok(self.cached.clone())
    }

    async fn fetch_federal_credit_rows(
        &self,
        business_year_id: Uuid,
    ) -> Result<Vec<FederalCreditRow>, StoreError> {
        let upserts = self.upserts.lock().unwrap();
        Ok(upserts
            .values()
            .filter(|u| u.business_year_id == business_year_id)
            .map(row_from_upsert)
            .collect())
    }

    async fn upsert_federal_credit(
        &self,
        data: &UpsertFederalCredit,
    ) -> Result<FederalCreditRow, StoreError> {
        let key = (
            data.business_year_id,
            data.client_id,
            data.research_activity_name.clone(),
        );
        self.upserts.lock().unwrap().insert(key, data.clone());
        Ok(row_from_upsert(data))
    }
}

fn row_from_upsert(data: &UpsertFederalCredit) -> FederalCreditRow {
    let now = Utc::now();
    FederalCreditRow {
        id: Uuid::new_v4(),
        business_year_id: data.business_year_id,
        client_id: data.client_id,
        research_activity_id: data.research_activity_id,
        research_activity_name: data.research_activity_name.clone(),
        direct_research_wages: data.direct_research_wages,
        supervision_wages: data.supervision_wages,
        support_wages: data.support_wages,
        supplies_expenses: data.supplies_expenses,
        contractor_expenses: data.contractor_expenses,
        total_qre: data.total_qre,
        subcomponent_count: data.subcomponent_count,
        subcomponent_groups: data.subcomponent_groups.clone(),
        applied_percent: data.applied_percent,
        line_49f_description: data.line_49f_description.clone(),
        ai_generation_timestamp: data.ai_generation_timestamp,
        ai_prompt_used: data.ai_prompt_used.clone(),
        industry_type: data.industry_type.clone(),
        focus_area: data.focus_area.clone(),
        general_description: data.general_description.clone(),
        data_snapshot: data.data_snapshot.clone(),
        is_latest: true,
        created_at: now,
        updated_at: now,
    }
}
