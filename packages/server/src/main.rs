use std::net::SocketAddr;
use std::sync::Arc;

use common::storage::s3::{S3ObjectStore, S3Settings};
use tracing::{Level, info};

use server::config::AppConfig;
use server::state::AppState;
use server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load()?;

    let db = database::init_db(&config.database.url).await?;
    seed::ensure_indexes(&db).await?;

    let store = S3ObjectStore::new(&S3Settings {
        endpoint: config.storage.endpoint.clone(),
        region: config.storage.region.clone(),
        bucket: config.storage.bucket.clone(),
        access_key: config.storage.access_key.clone(),
        secret_key: config.storage.secret_key.clone(),
        request_timeout_secs: config.storage.request_timeout_secs,
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState {
        db,
        store: Arc::new(store),
        config: Arc::new(config),
    };

    let app = build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
