use std::sync::Arc;

use tracing::info;

use bazaar_infra::{
    AppConfig, InMemoryCatalog, InMemoryOrderStore, OrderService, OrderSettings, PostgresCatalog,
    PostgresOrderStore, StoreError,
};

/// Everything the handlers need.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub orders: OrderService,
}

impl AppServices {
    /// In-memory store over the given catalog (tests/dev).
    pub fn in_memory(catalog: Arc<InMemoryCatalog>, settings: OrderSettings) -> Self {
        let orders = OrderService::new(Arc::new(InMemoryOrderStore::new()), catalog, settings);
        Self { orders }
    }
}

/// Select backends from configuration.
///
/// With `DATABASE_URL` set, orders and the catalog live in Postgres and the
/// schema is applied on startup. Otherwise everything is in memory and the
/// catalog is optionally seeded from `CATALOG_SEED_FILE`.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let Some(database) = &config.database else {
        let catalog = match &config.catalog_seed_file {
            Some(path) => {
                info!(path = %path.display(), "seeding in-memory catalog");
                InMemoryCatalog::load_seed_file(path)?
            }
            None => InMemoryCatalog::new(),
        };
        info!("using in-memory order store");
        return Ok(AppServices::in_memory(Arc::new(catalog), config.orders));
    };

    let store = PostgresOrderStore::connect(&database.url, database.max_connections).await?;
    store.ensure_schema().await?;
    let catalog = PostgresCatalog::new(store.pool().clone());
    info!(max_connections = database.max_connections, "using postgres order store");

    Ok(AppServices {
        orders: OrderService::new(Arc::new(store), Arc::new(catalog), config.orders),
    })
}
