//! Order persistence boundary.
//!
//! Defines the transactional store abstraction used by the order service and
//! its two backends: an in-memory one for tests/dev and a Postgres one.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::{PostgresOrderStore, map_sqlx_error};
pub use r#trait::{OrderStore, StoreError, UnitOfWork};
