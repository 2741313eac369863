use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use grid_api::AppState;
use grid_render::RenderConfig;
use grid_service::DependencyService;
use grid_store::{EdgeStore, PostgresStore, StateStore};
use grid_worker::EdgeWorker;

/// Load the server config and run migrations, but don't bind or serve.
/// Used standalone (`grid migrate`) and as the first step of `grid serve`.
async fn connect(config_path: Option<PathBuf>) -> Result<(grid_config::ServerConfig, PostgresStore)> {
    let config = grid_config::load(config_path.as_deref()).context("loading server config")?;
    let store = PostgresStore::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    Ok((config, store))
}

pub async fn migrate(config_path: Option<PathBuf>) -> Result<()> {
    let (config, _store) = connect(config_path).await?;
    info!(database_url = %config.database_url, "migrations applied");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (config, store) = connect(config_path).await?;
    let store = Arc::new(store);

    let edges = store.clone() as Arc<dyn EdgeStore>;
    let states = store.clone() as Arc<dyn StateStore>;

    let worker = Arc::new(EdgeWorker::new(edges.clone(), states.clone()));
    let service = Arc::new(DependencyService::new(states.clone(), edges.clone(), worker.clone()));

    let render_config = RenderConfig { backend_base_url: format!("{}/tfstate", config.public_base_url) };

    let state = AppState::new(
        states,
        edges,
        service,
        worker,
        config.auth_token.clone(),
        config.render_root.clone(),
        render_config,
        config.max_blob_bytes,
    );

    let app = grid_api::build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding to {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "grid listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
