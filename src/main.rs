use anyhow::Result;
use axum::{http::Method, Router};
use parking_lot::Mutex;
use std::sync::Arc;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use services::llm_agent::{LlmAgent, StepAnalyzer};
use services::workspace::Workspace;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    let addr = config.bind_addr;

    // Build our application state
    let analyzer = Arc::new(LlmAgent::new(&config));
    let state = Arc::new(AppState::new(config, analyzer));

    let app = app(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    routes::routes(&state.config)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Application state
pub struct AppState {
    pub config: config::Config,
    pub workspace: Mutex<Workspace>,
    pub analyzer: Arc<dyn StepAnalyzer>,
}

impl AppState {
    pub fn new(config: config::Config, analyzer: Arc<dyn StepAnalyzer>) -> Self {
        Self {
            config,
            workspace: Mutex::new(Workspace::new()),
            analyzer,
        }
    }
}
