use std::sync::Arc;

use mongodb::{Client, Database};

use crate::config::AppConfig;
use crate::services::sslcommerz_service::SslCommerzService;

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub gateway: Option<Arc<SslCommerzService>>,
}

impl AppState {
    pub fn new(client: Client, config: AppConfig) -> Self {
        let db = client.database(&config.database_name);
        AppState {
            client,
            db,
            config: Arc::new(config),
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<SslCommerzService>) -> Self {
        self.gateway = Some(gateway);
        self
    }
}
