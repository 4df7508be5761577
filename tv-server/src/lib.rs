//! Axum HTTP/WebSocket surface for the PLC/MCS log ingestion and query engine.

pub mod app_state;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tv_core::columnar::ParsedStoreCatalog;
use tv_core::file_store::RawFileStore;
use tv_core::parse;
use tv_core::upload::UploadManager;
use tv_core::{QueryExecutor, SessionManager};

use app_state::AppState;
use config::Settings;

/// Builds the full, unstarted application: opens the raw file store and catalog under
/// `settings`'s directories, wires up the session manager/query executor/upload manager, and
/// returns the `AppState` plus a router ready for `.with_state`/`axum::serve`.
pub async fn build(settings: Settings) -> anyhow::Result<(AppState, Router)> {
    let file_store = Arc::new(RawFileStore::open(settings.upload_dir.clone()).await?);
    file_store.rescan().await?;

    let catalog = Arc::new(ParsedStoreCatalog::open(settings.parsed_dir.clone()).await?);

    let sessions = SessionManager::new(file_store.clone(), catalog.clone(), parse::default_registry());
    let query = QueryExecutor::new(sessions.clone());
    let uploads = UploadManager::new(file_store.clone());

    let state = AppState {
        settings: Arc::new(settings),
        file_store,
        catalog,
        uploads,
        sessions,
        query,
    };

    let app = router(state.clone());
    Ok((state, app))
}

/// The route tree plus its middleware stack, grounded on
/// `ferrex-server/src/main.rs`'s `CorsLayer`/`TraceLayer` wiring.
pub fn router(state: AppState) -> Router {
    routes::create_api_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
