use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    aggregator::AggregateError, consistency::ConsistencyError, section_g::SectionGError,
    store::StoreError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    SectionG(#[from] SectionGError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Aggregate(AggregateError::BusinessYearNotFound(_))
            | Self::SectionG(SectionGError::UnknownBusinessYear(_))
            | Self::Consistency(ConsistencyError::BusinessYearNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::SectionG(SectionGError::YearLocked(_)) => StatusCode::CONFLICT,
            Self::SectionG(SectionGError::MissingBusinessProfile(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal failures are logged in full but reported generically
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
