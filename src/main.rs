mod config;
mod db;
mod event;
mod frame;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::GatewayConfig;
use crate::services::identity::JwtVerifier;
use crate::state::{AppState, Backends};
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env().expect("invalid configuration");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");
    let store = Arc::new(PgStore::new(pool));
    let backends = Backends {
        identity: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        membership: store.clone(),
        messages: store.clone(),
        documents: store.clone(),
        board: store,
    };

    let port = config.port;
    let state = AppState::new(config, backends);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "collabsuite listening");
    axum::serve(listener, app).await.expect("server failed");
}
