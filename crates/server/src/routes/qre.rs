//! Routes for the QRE aggregation report.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use services::services::{
    aggregator::{QreAggregator, QreReport},
    store::SqliteAllocationStore,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Aggregate QRE for a business year
pub async fn get_qre_report(
    State(state): State<AppState>,
    Path(business_year_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<QreReport>>, ApiError> {
    let store = SqliteAllocationStore::new(state.db.pool.clone());
    let report = QreAggregator::new(store).aggregate(business_year_id).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/business-years/{business_year_id}/qre", get(get_qre_report))
}
