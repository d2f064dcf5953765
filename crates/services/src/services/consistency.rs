//! Cross-method QRE consistency check: recomputed entry totals against the
//! cached per-category columns, with the locked totals as a third reference
//! when present.

use db::models::business_year::CachedQreTotals;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    aggregator::{QreTotals, compute_fresh},
    store::{AllocationStore, StoreError},
};

/// Differences at or below this many dollars are treated as rounding noise.
pub const DISCREPANCY_THRESHOLD: i64 = 1_000;

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("business year not found: {0}")]
    BusinessYearNotFound(Uuid),
}

/// Per-category difference between the two computation methods
/// (recomputed minus cached).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, TS)]
pub struct QreDifference {
    pub employee_qre: i64,
    pub contractor_qre: i64,
    pub supply_qre: i64,
    pub total: i64,
}

/// Result of comparing the QRE computation methods for one business year
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct QreComparison {
    pub business_year_id: Uuid,
    pub year: i32,
    /// Recomputed from allocations and design percentages
    pub recomputed: QreTotals,
    /// Cached per-category totals written by the expense management step
    pub cached: QreTotals,
    /// Frozen totals, present only when the year is locked
    pub locked: Option<QreTotals>,
    pub difference: QreDifference,
}

impl QreComparison {
    /// True when the methods disagree by more than the threshold
    pub fn is_significant(&self) -> bool {
        self.difference.total.abs() > DISCREPANCY_THRESHOLD
    }

    pub fn summary(&self) -> String {
        if self.is_significant() {
            format!(
                "QRE discrepancy for {year}: recomputed ${recomputed} vs cached ${cached} \
                 (difference ${diff})",
                year = self.year,
                recomputed = self.recomputed.total(),
                cached = self.cached.total(),
                diff = self.difference.total,
            )
        } else {
            format!(
                "QRE methods agree for {year}: ${total} (difference ${diff} within threshold)",
                year = self.year,
                total = self.recomputed.total(),
                diff = self.difference.total,
            )
        }
    }

    /// Human-readable next step for an auditor looking at this comparison
    pub fn recommendation(&self) -> String {
        if !self.is_significant() {
            return "No action needed; totals are consistent.".to_string();
        }
        let mut stale = Vec::new();
        if self.difference.employee_qre.abs() > 0 {
            stale.push("employee");
        }
        if self.difference.contractor_qre.abs() > 0 {
            stale.push("contractor");
        }
        if self.difference.supply_qre.abs() > 0 {
            stale.push("supply");
        }
        format!(
            "Re-run expense management for the {} categories to refresh the cached totals, \
             then compare again before locking.",
            stale.join(", ")
        )
    }
}

/// Read-only checker; never writes back or "fixes" either side.
pub struct QreConsistencyChecker<S> {
    store: S,
}

impl<S: AllocationStore> QreConsistencyChecker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Compare the computation methods for a business year.
    ///
    /// The fresh recomputation runs even when the year is locked so that
    /// drift between the frozen totals and the current allocation data is
    /// visible to the audit.
    pub async fn compare(&self, business_year_id: Uuid) -> Result<QreComparison, ConsistencyError> {
        let year = self
            .store
            .fetch_business_year(business_year_id)
            .await?
            .ok_or(ConsistencyError::BusinessYearNotFound(business_year_id))?;

        let snapshot = self.store.fetch_year_snapshot(business_year_id).await?;
        let (_, _, recomputed) = compute_fresh(&snapshot);

        let cached: QreTotals = self
            .store
            .fetch_cached_year_totals(business_year_id)
            .await?
            .into();

        let locked = year.locked_totals().map(CachedQreTotals::into);

        let difference = QreDifference {
            employee_qre: recomputed.employee_qre - cached.employee_qre,
            contractor_qre: recomputed.contractor_qre - cached.contractor_qre,
            supply_qre: recomputed.supply_qre - cached.supply_qre,
            total: recomputed.total() - cached.total(),
        };

        let comparison = QreComparison {
            business_year_id,
            year: year.year,
            recomputed,
            cached,
            locked,
            difference,
        };

        if comparison.is_significant() {
            warn!(
                business_year_id = %business_year_id,
                recomputed = recomputed.total(),
                cached = cached.total(),
                difference = difference.total,
                "QRE computation methods disagree beyond threshold"
            );
        } else {
            info!(
                business_year_id = %business_year_id,
                total = recomputed.total(),
                "QRE computation methods agree"
            );
        }

        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_util::{FakeStore, FixtureSpec, snapshot_fixture};

    // Default fixture recomputes to 16,000 + 5,200 + 3,250 = 24,450

    fn cached(employee: i64, contractor: i64, supply: i64) -> CachedQreTotals {
        CachedQreTotals {
            employee_qre: employee,
            contractor_qre: contractor,
            supply_qre: supply,
        }
    }

    #[tokio::test]
    async fn agreement_within_threshold_is_not_significant() {
        let mut store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        store.set_cached(cached(16_000, 5_200, 3_250));
        let business_year_id = store.business_year_id;

        let checker = QreConsistencyChecker::new(store);
        let comparison = checker.compare(business_year_id).await.unwrap();

        assert_eq!(comparison.difference.total, 0);
        assert!(!comparison.is_significant());
        assert!(comparison.summary().contains("agree"));
        assert!(comparison.recommendation().contains("No action"));
    }

    #[tokio::test]
    async fn threshold_is_strictly_greater_than() {
        // Exactly $1,000 apart stays within tolerance
        let mut store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        store.set_cached(cached(15_000, 5_200, 3_250));
        let business_year_id = store.business_year_id;

        let checker = QreConsistencyChecker::new(store);
        let comparison = checker.compare(business_year_id).await.unwrap();

        assert_eq!(comparison.difference.total, 1_000);
        assert!(!comparison.is_significant());
    }

    #[tokio::test]
    async fn large_discrepancy_is_flagged() {
        // Recomputed $104,000 vs cached $100,500: $3,500 apart
        let mut spec = FixtureSpec::default();
        spec.employees = vec![crate::services::test_util::EmployeeSpec::wage(650_000.0)];
        spec.contractor_amounts = vec![];
        spec.supply_amounts = vec![];
        let mut store = FakeStore::with_snapshot(snapshot_fixture(spec));
        store.set_cached(cached(100_500, 0, 0));
        let business_year_id = store.business_year_id;

        let checker = QreConsistencyChecker::new(store);
        let comparison = checker.compare(business_year_id).await.unwrap();

        assert_eq!(comparison.recomputed.employee_qre, 104_000);
        assert_eq!(comparison.difference.total, 3_500);
        assert!(comparison.is_significant());
        assert!(comparison.summary().contains("discrepancy"));
        assert!(comparison.recommendation().contains("employee"));
    }

    #[tokio::test]
    async fn locked_year_still_recomputes_and_reports_frozen_totals() {
        use crate::services::aggregator::QreTotals;

        let mut store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        store.set_cached(cached(16_000, 5_200, 3_250));
        store.lock_totals(QreTotals {
            employee_qre: 15_000,
            contractor_qre: 5_200,
            supply_qre: 3_250,
        });
        let business_year_id = store.business_year_id;

        let checker = QreConsistencyChecker::new(store);
        let comparison = checker.compare(business_year_id).await.unwrap();

        assert_eq!(comparison.recomputed.employee_qre, 16_000);
        let locked = comparison.locked.unwrap();
        assert_eq!(locked.employee_qre, 15_000);
    }

    #[tokio::test]
    async fn unknown_business_year_is_an_error() {
        let store = FakeStore::with_snapshot(snapshot_fixture(FixtureSpec::default()));
        let checker = QreConsistencyChecker::new(store);
        let err = checker.compare(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ConsistencyError::BusinessYearNotFound(_)));
    }
}
