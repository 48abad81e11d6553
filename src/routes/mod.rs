use axum::{routing::get, Router};
use std::sync::Arc;
use crate::{config::Config, AppState};

pub mod analysis;
pub mod files;
pub mod selection;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(files::routes(config))
        .merge(selection::routes())
        .merge(analysis::routes())
}

async fn health_check() -> &'static str {
    "OK"
}
