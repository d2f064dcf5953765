//! Routes for Form 6765 Section G rendering and persistence.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::federal_credit::FederalCreditRow;
use serde::{Deserialize, Serialize};
use services::services::{
    section_g::{SectionGReport, SectionGService},
    store::SqliteAllocationStore,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SectionGSaveResponse {
    pub saved_count: usize,
    pub rows: Vec<FederalCreditRow>,
}

/// Render the Section G rows for a business year
pub async fn get_section_g(
    State(state): State<AppState>,
    Path(business_year_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SectionGReport>>, ApiError> {
    let store = SqliteAllocationStore::new(state.db.pool.clone());
    let service = SectionGService::new(store, state.openai.clone());
    let report = service.report(business_year_id).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

/// Compute and persist the Section G rows for a business year
pub async fn save_section_g(
    State(state): State<AppState>,
    Path(business_year_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SectionGSaveResponse>>, ApiError> {
    let store = SqliteAllocationStore::new(state.db.pool.clone());
    let service = SectionGService::new(store, state.openai.clone());
    let rows = service.save(business_year_id).await?;
    Ok(ResponseJson(ApiResponse::success(SectionGSaveResponse {
        saved_count: rows.len(),
        rows,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/business-years/{business_year_id}/section-g",
        Router::new()
            .route("/", get(get_section_g))
            .route("/save", post(save_section_g)),
    )
}
