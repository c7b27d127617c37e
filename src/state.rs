use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::auth::{jwt::JwtService, IdentityContext};
use crate::config::AppConfig;
use crate::service::ReviewService;
use crate::storage::ObjectStorage;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub service: ReviewService,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self> {
        let jwt = JwtService::from_config(&config)?;
        let service = ReviewService::new(store, IdentityContext::new(jwt));
        Ok(Self {
            service,
            config: Arc::new(config),
            storage,
        })
    }

    pub fn download_url_expiry(&self) -> Duration {
        Duration::from_secs(self.config.download_url_expiry_seconds)
    }
}
