use std::sync::Arc;

use common::storage::ObjectStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<AppConfig>,
}
