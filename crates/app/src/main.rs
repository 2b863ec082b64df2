mod directory;
mod problem;
mod router;
mod telemetry;

use std::net::SocketAddr;

use tracing::info;
use staffdir_storage::Database;
use staffdir_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    if let Some(path) = env_file {
        info!(stage = "app", path = %path.display(), "loaded env file");
    }
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "app", "database ready");

    let state = router::AppState::new(metrics, database);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
