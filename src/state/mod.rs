use std::sync::Arc;
use std::time::Instant;

use sea_orm::DatabaseConnection;

use crate::service::FaucetService;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub service: Arc<FaucetService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(database: DatabaseConnection, service: Arc<FaucetService>) -> Self {
        assert!(
            Arc::strong_count(&service) >= 1,
            "Faucet service must be shared"
        );
        Self {
            database,
            service,
            start_time: Instant::now(),
        }
    }
}
