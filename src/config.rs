//! Component factory for environment-based configuration
//!
//! Factory methods create the store backend and ingestor configuration
//! from environment variables, enabling easy switching between development
//! and production setups.

use crate::ingestor::IngestorConfig;
use crate::storage::{LocalStore, PgStore, Store};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the store backend from environment
    ///
    /// Environment variables:
    /// - PROMGRES_STORE_BACKEND: "memory" (default) or "postgres"
    /// - DATABASE_URL: connection string (required for postgres)
    pub async fn create_store() -> Result<Arc<dyn Store>> {
        let backend =
            std::env::var("PROMGRES_STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());

        match backend.as_str() {
            "memory" => {
                info!("using in-memory store (development mode)");
                Ok(Arc::new(LocalStore::new()))
            }
            "postgres" => {
                let dsn = std::env::var("DATABASE_URL").map_err(|_| {
                    Error::Config(
                        "DATABASE_URL required when PROMGRES_STORE_BACKEND=postgres".to_string(),
                    )
                })?;
                Ok(Arc::new(PgStore::connect(&dsn).await?))
            }
            _ => Err(Error::Config(format!(
                "unknown PROMGRES_STORE_BACKEND: {backend}. Use 'memory' or 'postgres'"
            ))),
        }
    }

    /// Create the ingestor configuration from environment
    ///
    /// Environment variables:
    /// - PROMGRES_ASYNC_ACKS: "true"/"1" to acknowledge before flush
    /// - PROMGRES_REPORT_INTERVAL: throughput log interval in seconds
    /// - PROMGRES_METRIC_CACHE_CAPACITY: metric-name cache entries
    pub fn create_ingestor_config() -> Result<IngestorConfig> {
        let mut config = IngestorConfig::default();

        if let Ok(value) = std::env::var("PROMGRES_ASYNC_ACKS") {
            let value = value.trim();
            config.async_acks = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Ok(value) = std::env::var("PROMGRES_REPORT_INTERVAL") {
            config.report_interval = value.trim().parse().map_err(|_| {
                Error::Config(format!("invalid PROMGRES_REPORT_INTERVAL: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("PROMGRES_METRIC_CACHE_CAPACITY") {
            config.metric_name_cache_capacity = value.trim().parse().map_err(|_| {
                Error::Config(format!("invalid PROMGRES_METRIC_CACHE_CAPACITY: {value}"))
            })?;
        }

        Ok(config)
    }
}
