//! One-shot QRE consistency audit for a single business year.
//!
//! Usage: qre_audit <business_year_id>

use std::process::ExitCode;

use anyhow::Context;
use db::DBService;
use services::services::{consistency::QreConsistencyChecker, store::SqliteAllocationStore};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    utils::logging::init("warn");

    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("usage: qre_audit <business_year_id>");
        return Ok(ExitCode::FAILURE);
    };
    let business_year_id = Uuid::parse_str(&arg)
        .with_context(|| format!("'{arg}' is not a valid business year id"))?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:qre.db".to_string());
    let db = DBService::new(&database_url)
        .await
        .context("failed to connect to database")?;

    let checker = QreConsistencyChecker::new(SqliteAllocationStore::new(db.pool));
    let comparison = checker.compare(business_year_id).await?;

    println!("QRE audit for business year {} ({})", business_year_id, comparison.year);
    println!();
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "category", "recomputed", "cached", "locked"
    );
    let locked = comparison.locked;
    let fmt_locked = |f: fn(&services::services::aggregator::QreTotals) -> i64| {
        locked.as_ref().map_or("-".to_string(), |l| f(l).to_string())
    };
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "employee",
        comparison.recomputed.employee_qre,
        comparison.cached.employee_qre,
        fmt_locked(|l| l.employee_qre),
    );
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "contractor",
        comparison.recomputed.contractor_qre,
        comparison.cached.contractor_qre,
        fmt_locked(|l| l.contractor_qre),
    );
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "supply",
        comparison.recomputed.supply_qre,
        comparison.cached.supply_qre,
        fmt_locked(|l| l.supply_qre),
    );
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "total",
        comparison.recomputed.total(),
        comparison.cached.total(),
        fmt_locked(|l| l.total()),
    );
    println!();
    println!("{}", comparison.summary());
    println!("{}", comparison.recommendation());

    Ok(if comparison.is_significant() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
