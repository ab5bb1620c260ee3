use crate::config::Config;
use crate::supervisor::Supervisor;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub config: Config,
    pub db_pool: SqlitePool,
    pub supervisor: Arc<Mutex<Supervisor>>,
}
