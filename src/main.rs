use anyhow::Result;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::Config::new()?;
    let addr = config.listen_addr;
    tracing::info!(
        "max file size {}KB, preview rows {}, cache capacity {}",
        config.max_file_size / 1024,
        config.preview_rows,
        config.cache_capacity
    );

    // Build our application state
    let state = Arc::new(AppState::new(config));
    let app = routes::router(state);

    // Run it
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Application state
pub struct AppState {
    config: config::Config,
    pipeline: services::pipeline::Pipeline,
}

impl AppState {
    fn new(config: config::Config) -> Self {
        let pipeline = services::pipeline::Pipeline::new(&config);
        Self { config, pipeline }
    }
}
