// Whose Round - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use tracing::{info, warn};
use whose_round::api::{router, AppState};
use whose_round::{open_database, telemetry, Settings, TokenService};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    telemetry::init_logger(&settings.logging.level, settings.logging.json);

    if settings.uses_default_secret() {
        warn!("auth.secret_key is the built-in default; set WHOSE_ROUND__AUTH__SECRET_KEY");
    }

    let conn = open_database(&settings.database.path)
        .with_context(|| format!("Failed to open database at {:?}", settings.database.path))?;
    info!(path = ?settings.database.path, "database opened");

    let tokens = TokenService::new(
        settings.auth.secret_key.clone(),
        settings.auth.access_token_expire_minutes,
    );
    let app = router(AppState::new(conn, tokens));

    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server running");
    info!("API: http://{}/api/groups", addr);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
