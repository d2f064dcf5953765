//! Route for the QRE consistency audit.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use services::services::{
    consistency::{QreComparison, QreConsistencyChecker},
    store::SqliteAllocationStore,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Compare the QRE computation methods for a business year
pub async fn get_qre_audit(
    State(state): State<AppState>,
    Path(business_year_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<QreComparison>>, ApiError> {
    let store = SqliteAllocationStore::new(state.db.pool.clone());
    let comparison = QreConsistencyChecker::new(store).compare(business_year_id).await?;
    Ok(ResponseJson(ApiResponse::success(comparison)))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/business-years/{business_year_id}/qre-audit",
        get(get_qre_audit),
    )
}
