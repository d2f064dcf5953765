//! QRE aggregation: flat per-resource entries, per-activity grouping, and
//! grand totals for a business year.

use std::collections::{BTreeMap, HashSet};

use db::models::{business_year::CachedQreTotals, employee::RoleKind};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    rollup,
    store::{AllocationStore, StoreError, YearSnapshot},
};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("business year not found: {0}")]
    BusinessYearNotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
pub enum QreCategory {
    Employee,
    Contractor,
    Supply,
}

/// One resource's qualified expense against one subcomponent
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct QreEntry {
    pub activity_id: Uuid,
    pub activity_title: String,
    pub step_id: Uuid,
    pub step_name: String,
    pub subcomponent_id: Uuid,
    pub subcomponent_name: String,
    pub category: QreCategory,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub role: Option<RoleKind>,
    pub is_owner: bool,
    pub annual_cost: f64,
    pub applied_percentage: f64,
    pub calculated_qre: i64,
}

/// Entries grouped under one research activity
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ActivityQre {
    pub activity_id: Uuid,
    pub activity_title: String,
    pub general_description: Option<String>,
    pub employees: Vec<QreEntry>,
    pub contractors: Vec<QreEntry>,
    pub supplies: Vec<QreEntry>,
    pub total_qre: i64,
}

impl ActivityQre {
    /// Count of distinct subcomponents touched by any entry in this activity
    pub fn subcomponent_count(&self) -> usize {
        self.employees
            .iter()
            .chain(&self.contractors)
            .chain(&self.supplies)
            .map(|e| e.subcomponent_id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn employee_qre(&self) -> i64 {
        self.employees.iter().map(|e| e.calculated_qre).sum()
    }

    pub fn contractor_qre(&self) -> i64 {
        self.contractors.iter().map(|e| e.calculated_qre).sum()
    }

    pub fn supply_qre(&self) -> i64 {
        self.supplies.iter().map(|e| e.calculated_qre).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct QreTotals {
    pub employee_qre: i64,
    pub contractor_qre: i64,
    pub supply_qre: i64,
}

impl QreTotals {
    pub fn total(&self) -> i64 {
        self.employee_qre + self.contractor_qre + self.supply_qre
    }
}

impl From<CachedQreTotals> for QreTotals {
    fn from(t: CachedQreTotals) -> Self {
        Self {
            employee_qre: t.employee_qre,
            contractor_qre: t.contractor_qre,
            supply_qre: t.supply_qre,
        }
    }
}

/// Aggregation result for one business year.
///
/// When the year is locked the frozen totals are authoritative and no
/// per-entry recomputation is performed; `entries` and `activities` are
/// empty and consumers must use the persisted Section G rows instead.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct QreReport {
    pub business_year_id: Uuid,
    pub year: i32,
    pub locked: bool,
    pub entries: Vec<QreEntry>,
    pub activities: Vec<ActivityQre>,
    pub totals: QreTotals,
}

pub struct QreAggregator<S> {
    store: S,
}

impl<S: AllocationStore> QreAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Aggregate QRE for a business year, branching on the year's lock state.
    pub async fn aggregate(&self, business_year_id: Uuid) -> Result<QreReport, AggregateError> {
        let year = self
            .store
            .fetch_business_year(business_year_id)
            .await?
            .ok_or(AggregateError::BusinessYearNotFound(business_year_id))?;

        if let Some(locked) = year.locked_totals() {
            info!(
                business_year_id = %business_year_id,
                total = locked.total(),
                "QRE totals are locked; serving frozen values"
            );
            return Ok(QreReport {
                business_year_id,
                year: year.year,
                locked: true,
                entries: vec![],
                activities: vec![],
                totals: locked.into(),
            });
        }

        let snapshot = self.store.fetch_year_snapshot(business_year_id).await?;
        let (entries, activities, totals) = compute_fresh(&snapshot);

        info!(
            business_year_id = %business_year_id,
            entry_count = entries.len(),
            activity_count = activities.len(),
            total_qre = totals.total(),
            "QRE aggregation complete"
        );

        Ok(QreReport {
            business_year_id,
            year: year.year,
            locked: false,
            entries,
            activities,
            totals,
        })
    }
}

/// Compute flat entries, per-activity groups, and grand totals from a
/// snapshot. Pure: rounding happens per entry at category conversion, and
/// totals are sums of the rounded entries (round-then-sum).
pub fn compute_fresh(snapshot: &YearSnapshot) -> (Vec<QreEntry>, Vec<ActivityQre>, QreTotals) {
    let contexts: BTreeMap<Uuid, _> = snapshot
        .subcomponents
        .iter()
        .map(|c| (c.subcomponent_id, c))
        .collect();

    let mut entries = Vec::new();
    let mut allocated_subcomponents: HashSet<Uuid> = HashSet::new();

    for alloc in &snapshot.employees {
        let Some(ctx) = contexts.get(&alloc.subcomponent_id) else {
            warn!(
                subcomponent_id = %alloc.subcomponent_id,
                employee_id = %alloc.employee_id,
                "employee allocation references a subcomponent outside this year's research design; skipping"
            );
            continue;
        };
        allocated_subcomponents.insert(alloc.subcomponent_id);

        let applied = rollup::applied_percentage(&ctx.design);
        let qre = rollup::employee_qre(alloc.annual_wage, applied);
        if qre <= 0 {
            continue;
        }
        debug!(
            employee_id = %alloc.employee_id,
            subcomponent = %ctx.subcomponent_name,
            applied_percentage = applied,
            calculated_qre = qre,
            "employee QRE entry"
        );
        entries.push(QreEntry {
            activity_id: ctx.activity_id,
            activity_title: ctx.activity_title.clone(),
            step_id: ctx.step_id,
            step_name: ctx.step_name.clone(),
            subcomponent_id: ctx.subcomponent_id,
            subcomponent_name: ctx.subcomponent_name.clone(),
            category: QreCategory::Employee,
            resource_id: alloc.employee_id,
            resource_name: format!("{} {}", alloc.first_name, alloc.last_name)
                .trim()
                .to_string(),
            role: Some(alloc.role),
            is_owner: alloc.is_owner,
            annual_cost: alloc.annual_wage,
            applied_percentage: applied,
            calculated_qre: qre,
        });
    }

    for alloc in &snapshot.contractors {
        let Some(ctx) = contexts.get(&alloc.subcomponent_id) else {
            warn!(
                subcomponent_id = %alloc.subcomponent_id,
                contractor_id = %alloc.contractor_id,
                "contractor allocation references a subcomponent outside this year's research design; skipping"
            );
            continue;
        };
        allocated_subcomponents.insert(alloc.subcomponent_id);

        let applied = rollup::applied_percentage(&ctx.design);
        let qre = rollup::contractor_qre(alloc.amount, applied);
        if qre <= 0 {
            continue;
        }
        entries.push(QreEntry {
            activity_id: ctx.activity_id,
            activity_title: ctx.activity_title.clone(),
            step_id: ctx.step_id,
            step_name: ctx.step_name.clone(),
            subcomponent_id: ctx.subcomponent_id,
            subcomponent_name: ctx.subcomponent_name.clone(),
            category: QreCategory::Contractor,
            resource_id: alloc.contractor_id,
            resource_name: alloc.name.clone(),
            role: None,
            is_owner: false,
            annual_cost: alloc.amount,
            applied_percentage: applied,
            calculated_qre: qre,
        });
    }

    for alloc in &snapshot.supplies {
        let Some(ctx) = contexts.get(&alloc.subcomponent_id) else {
            warn!(
                subcomponent_id = %alloc.subcomponent_id,
                supply_id = %alloc.supply_id,
                "supply allocation references a subcomponent outside this year's research design; skipping"
            );
            continue;
        };
        allocated_subcomponents.insert(alloc.subcomponent_id);

        let qre = rollup::supply_qre(alloc.amount_applied);
        if qre <= 0 {
            continue;
        }
        entries.push(QreEntry {
            activity_id: ctx.activity_id,
            activity_title: ctx.activity_title.clone(),
            step_id: ctx.step_id,
            step_name: ctx.step_name.clone(),
            subcomponent_id: ctx.subcomponent_id,
            subcomponent_name: ctx.subcomponent_name.clone(),
            category: QreCategory::Supply,
            resource_id: alloc.supply_id,
            resource_name: alloc.name.clone(),
            role: None,
            is_owner: false,
            annual_cost: alloc.amount_applied,
            applied_percentage: rollup::applied_percentage(&ctx.design),
            calculated_qre: qre,
        });
    }

    // Absence of allocation is a valid business state ("not applicable this
    // year"); it contributes zero but is worth surfacing for data quality.
    for ctx in &snapshot.subcomponents {
        if !allocated_subcomponents.contains(&ctx.subcomponent_id) {
            warn!(
                subcomponent_id = %ctx.subcomponent_id,
                subcomponent = %ctx.subcomponent_name,
                activity = %ctx.activity_title,
                "subcomponent has no resource allocations this year; contributes zero"
            );
        }
    }

    let activities = group_by_activity(snapshot, &entries);

    let totals = QreTotals {
        employee_qre: sum_category(&entries, QreCategory::Employee),
        contractor_qre: sum_category(&entries, QreCategory::Contractor),
        supply_qre: sum_category(&entries, QreCategory::Supply),
    };

    (entries, activities, totals)
}

fn sum_category(entries: &[QreEntry], category: QreCategory) -> i64 {
    entries
        .iter()
        .filter(|e| e.category == category)
        .map(|e| e.calculated_qre)
        .sum()
}

fn group_by_activity(snapshot: &YearSnapshot, entries: &[QreEntry]) -> Vec<ActivityQre> {
    let mut activities: Vec<ActivityQre> = snapshot
        .activities
        .iter()
        .map(|a| ActivityQre {
            activity_id: a.activity_id,
            activity_title: a.activity_title.clone(),
            general_description: a.general_description.clone(),
            employees: vec![],
            contractors: vec![],
            supplies: vec![],
            total_qre: 0,
        })
        .collect();

    for entry in entries {
        let Some(activity) = activities.iter_mut().find(|a| a.activity_id == entry.activity_id)
        else {
            warn!(
                activity_id = %entry.activity_id,
                "QRE entry references an unselected activity; skipping in grouping"
            );
            continue;
        };
        match entry.category {
            QreCategory::Employee => activity.employees.push(entry.clone()),
            QreCategory::Contractor => activity.contractors.push(entry.clone()),
            QreCategory::Supply => activity.supplies.push(entry.clone()),
        }
        activity.total_qre += entry.calculated_qre;
    }

    activities
}
