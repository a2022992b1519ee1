use berth_core::git::GitService;
use berth_core::{paths, Config, DeploymentService, StackService, Store};
use std::sync::Arc;
use tracing::info;

mod api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize observability FIRST
    berth_core::observability::init()?;

    info!("BERTH daemon starting");

    let config = Config::load()?;

    let db_path = paths::db_path();
    info!("Opening entity store at {:?}", db_path);
    let store = Store::open(&db_path)?;

    let repositories_dir = paths::repositories_dir();
    std::fs::create_dir_all(&repositories_dir)?;

    let git = Arc::new(GitService::new(config.git.clone()));
    let stacks = Arc::new(StackService::new(&store, git, repositories_dir));
    let deployments = Arc::new(DeploymentService::new(&store, stacks.clone()));

    let app = api::router(api::AppState { stacks, deployments });

    let listener = tokio::net::TcpListener::bind(&config.http_address).await?;
    info!(address = %config.http_address, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("BERTH daemon shutting down");
    Ok(())
}
