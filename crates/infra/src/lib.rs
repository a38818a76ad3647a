//! Infrastructure layer: persistence backends, catalog lookup, configuration,
//! and the transactional order service that composes them.

pub mod catalog;
pub mod config;
pub mod order_service;
pub mod store;

pub use catalog::{CatalogLookup, CatalogSeed, InMemoryCatalog, PostgresCatalog};
pub use config::{AppConfig, ConfigError, DatabaseConfig, OrderSettings};
pub use order_service::{ItemChange, OrderServiceError, OrderService, OrderWithItems};
pub use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore, StoreError, UnitOfWork};
