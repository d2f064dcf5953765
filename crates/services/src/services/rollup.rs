//! Percentage rollup and per-category QRE dollar conversions.
//!
//! The applied percentage for a subcomponent composes four independently-set
//! percentages: practice% x time% x frequency% x year%, reduced by the step's
//! non-R&D share. Inputs are not clamped to [0, 100] and negatives are not
//! rejected here; upstream entry validation is the sole gate.

use db::models::activity::DesignPercents;

/// Statutory haircut applied to contractor costs after percentage allocation
pub const CONTRACTOR_CREDIT_FACTOR: f64 = 0.65;

/// A factor contributes only when it is strictly positive. Zero, negative,
/// and NaN values all zero out the product rather than poisoning it.
fn contributes(percent: f64) -> bool {
    percent > 0.0
}

/// Compose the applied percentage for one subcomponent.
///
/// `raw = practice/100 * time/100 * frequency/100 * year/100 * 100`, then if
/// the step carries a non-R&D share, `raw * (100 - non_rd)/100`. The non-R&D
/// adjustment only ever shrinks the unadjusted product.
pub fn applied_percentage(design: &DesignPercents) -> f64 {
    let DesignPercents {
        practice_percent,
        time_percentage,
        non_rd_percentage,
        frequency_percentage,
        year_percentage,
    } = *design;

    let factors = [
        practice_percent,
        time_percentage,
        frequency_percentage,
        year_percentage,
    ];
    if !factors.into_iter().all(contributes) {
        return 0.0;
    }

    let raw = (practice_percent / 100.0)
        * (time_percentage / 100.0)
        * (frequency_percentage / 100.0)
        * (year_percentage / 100.0)
        * 100.0;

    if non_rd_percentage > 0.0 {
        raw * ((100.0 - non_rd_percentage) / 100.0)
    } else {
        raw
    }
}

/// Employee wage QRE: allocate the annual wage and round to whole dollars.
pub fn employee_qre(annual_wage: f64, applied_percentage: f64) -> i64 {
    (annual_wage * applied_percentage / 100.0).round() as i64
}

/// Contractor cost QRE. The contract amount is allocated first and rounded,
/// then the statutory 65% factor is applied and rounded again. The ordering
/// is load-bearing: reproducing stored totals requires allocate-then-haircut.
pub fn contractor_qre(amount: f64, applied_percentage: f64) -> i64 {
    let allocated = (amount * applied_percentage / 100.0).round();
    (allocated * CONTRACTOR_CREDIT_FACTOR).round() as i64
}

/// Supply QRE: `amount_applied` is already an absolute dollar figure scoped
/// to the subcomponent.
pub fn supply_qre(amount_applied: f64) -> i64 {
    amount_applied.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design(practice: f64, time: f64, freq: f64, year: f64, non_rd: f64) -> DesignPercents {
        DesignPercents {
            practice_percent: practice,
            time_percentage: time,
            non_rd_percentage: non_rd,
            frequency_percentage: freq,
            year_percentage: year,
        }
    }

    #[test]
    fn composes_four_factors() {
        // practice=50%, time=40%, frequency=80%, year=100% -> 16.0%
        let applied = applied_percentage(&design(50.0, 40.0, 80.0, 100.0, 0.0));
        assert!((applied - 16.0).abs() < 1e-9);
    }

    #[test]
    fn non_rd_share_reduces_applied() {
        let unadjusted = applied_percentage(&design(50.0, 40.0, 80.0, 100.0, 0.0));
        let adjusted = applied_percentage(&design(50.0, 40.0, 80.0, 100.0, 25.0));
        assert!((adjusted - 12.0).abs() < 1e-9);
        assert!(adjusted <= unadjusted);
    }

    #[test]
    fn non_rd_adjustment_never_grows_the_product() {
        for non_rd in [0.0, 1.0, 25.0, 50.0, 99.0, 100.0] {
            let unadjusted = applied_percentage(&design(80.0, 30.0, 60.0, 90.0, 0.0));
            let adjusted = applied_percentage(&design(80.0, 30.0, 60.0, 90.0, non_rd));
            assert!(adjusted <= unadjusted, "non_rd={non_rd}");
            if non_rd == 0.0 {
                assert_eq!(adjusted, unadjusted);
            }
        }
    }

    #[test]
    fn any_zero_factor_zeroes_the_result() {
        assert_eq!(applied_percentage(&design(0.0, 40.0, 80.0, 100.0, 0.0)), 0.0);
        assert_eq!(applied_percentage(&design(50.0, 0.0, 80.0, 100.0, 0.0)), 0.0);
        assert_eq!(applied_percentage(&design(50.0, 40.0, 0.0, 100.0, 0.0)), 0.0);
        assert_eq!(applied_percentage(&design(50.0, 40.0, 80.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn nan_inputs_do_not_propagate() {
        let applied = applied_percentage(&design(f64::NAN, 40.0, 80.0, 100.0, 0.0));
        assert_eq!(applied, 0.0);
    }

    #[test]
    fn values_above_100_pass_through_unclamped() {
        let applied = applied_percentage(&design(150.0, 100.0, 100.0, 100.0, 0.0));
        assert!((applied - 150.0).abs() < 1e-9);
    }

    #[test]
    fn employee_wage_conversion() {
        // $100,000 at 16% -> $16,000; with 25% non-R&D -> 12% -> $12,000
        assert_eq!(employee_qre(100_000.0, 16.0), 16_000);
        assert_eq!(employee_qre(100_000.0, 12.0), 12_000);
    }

    #[test]
    fn contractor_haircut_applies_after_allocation() {
        // $50,000 at 16% -> $8,000 allocated -> $5,200 after the 65% factor
        assert_eq!(contractor_qre(50_000.0, 16.0), 5_200);
    }

    #[test]
    fn contractor_haircut_ordering_is_observable() {
        // Allocation lands on $8,000.50: rounding before the haircut gives
        // round(8001 * 0.65) = 5201, while haircutting the unrounded figure
        // gives round(8000.5 * 0.65) = 5200. The conforming result is 5201.
        let amount = 50_003.125;
        let applied = 16.0;
        let conforming = contractor_qre(amount, applied);
        let wrong_order = (amount * applied / 100.0 * CONTRACTOR_CREDIT_FACTOR).round() as i64;
        assert_eq!(conforming, 5_201);
        assert_ne!(conforming, wrong_order);
    }

    #[test]
    fn supply_amount_is_taken_directly() {
        assert_eq!(supply_qre(3_250.0), 3_250);
        assert_eq!(supply_qre(3_250.4), 3_250);
    }
}
