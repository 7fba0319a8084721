use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, load_surveys};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let surveys = load_surveys(settings.surveys_file.as_deref()).map_err(|error| {
        error!(
            surveys_file = ?settings.surveys_file,
            %error,
            "failed to load surveys; check SURVEY__SURVEYS_FILE"
        );
        error
    })?;
    info!(surveys = surveys.len(), "surveys loaded");

    let app = api::build_router(
        AppState::new(surveys),
        &settings.static_dir,
        settings.max_body_bytes,
    );

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
