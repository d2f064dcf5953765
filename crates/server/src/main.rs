mod error;
mod routes;

use anyhow::Context;
use axum::Router;
use db::DBService;
use services::services::openai_api::OpenAiApiClient;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub openai: Option<OpenAiApiClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init("info,server=debug,services=debug,db=debug");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:qre.db".to_string());
    let db = DBService::new(&database_url)
        .await
        .context("failed to connect to database")?;

    let openai = match OpenAiApiClient::from_env() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Line 49(f) generation disabled, using fallback descriptions: {e}");
            None
        }
    };

    let state = AppState { db, openai };

    let app = Router::new()
        .nest("/api", routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!("QRE engine listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}
