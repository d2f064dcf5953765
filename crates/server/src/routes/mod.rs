use axum::Router;

use crate::AppState;

pub mod audit;
pub mod qre;
pub mod section_g;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(qre::router())
        .merge(section_g::router())
        .merge(audit::router())
}
