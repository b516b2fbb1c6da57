//! Application wiring: picks the entity store from configuration and builds
//! the coordinator and catalog over it.

use crate::auth::IdentityDirectory;
use crate::catalog::PlotCatalog;
use crate::config::{Config, ConfigError, StoreBackend};
use crate::coordinator::ReservationCoordinator;
use plotmarket_core::entity_store::{EntityStore, EntityStoreError};
use plotmarket_core::environment::{Clock, SystemClock};
use plotmarket_postgres::{PoolSettings, PostgresEntityStore};
use plotmarket_testing::InMemoryEntityStore;
use std::sync::Arc;
use thiserror::Error;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Store connection failed
    #[error("Store error: {0}")]
    Store(#[from] EntityStoreError),

    /// Database migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The marketplace: booking coordinator and plot catalog sharing one store.
#[derive(Clone)]
pub struct MarketplaceApp {
    /// Booking transitions
    pub coordinator: ReservationCoordinator,
    /// Plot reads and creation
    pub catalog: PlotCatalog,
    store: Arc<dyn EntityStore>,
}

impl MarketplaceApp {
    /// Initialize the application from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the database connection or migrations fail.
    pub async fn new(
        config: &Config,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Result<Self, AppError> {
        let store: Arc<dyn EntityStore> = match config.store {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory entity store");
                Arc::new(InMemoryEntityStore::new())
            }
            StoreBackend::Postgres => {
                let settings = PoolSettings {
                    max_connections: config.postgres.max_connections,
                    min_connections: config.postgres.min_connections,
                    acquire_timeout: config.postgres.connect_timeout(),
                };
                let store = PostgresEntityStore::connect(&config.postgres.url, &settings).await?;

                if config.postgres.run_migrations {
                    tracing::info!("Running database migrations...");
                    sqlx::migrate!("./migrations").run(store.pool()).await?;
                    tracing::info!("✓ Migrations applied");
                }

                Arc::new(store)
            }
        };

        Ok(Self::with_store(store, directory, Arc::new(SystemClock)))
    }

    /// Build the application over an existing store.
    #[must_use]
    pub fn with_store(
        store: Arc<dyn EntityStore>,
        directory: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator: ReservationCoordinator::new(Arc::clone(&store), Arc::clone(&clock)),
            catalog: PlotCatalog::new(Arc::clone(&store), directory, clock),
            store,
        }
    }

    /// The shared entity store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}
