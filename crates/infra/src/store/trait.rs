use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bazaar_core::{OrderId, OrderItemId, ProductItemId};
use bazaar_orders::{Order, OrderItem, OrderQuery, Page};

/// Persistence failure.
///
/// These are **infrastructure errors** (connectivity, constraints, corrupt
/// rows) as opposed to domain errors (validation, not found, conflicts).
/// Their messages may carry driver detail and must not reach clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Transactional store for order headers and lines.
///
/// All writes go through a [`UnitOfWork`]. A listing is a plain read and does
/// not need one.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`UnitOfWork::commit`] discards
    /// every write made through it.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        (**self).list_orders(query).await
    }
}

/// One atomic sequence of reads and writes against the order store.
///
/// ## Locking
///
/// [`UnitOfWork::lock_order`] must be called before any line mutation or
/// total recomputation so that concurrent mutations of the same order
/// serialize. Different orders never block each other on the Postgres
/// backend.
///
/// ## Updates
///
/// `update_order` and `update_item` write a fixed set of columns taken from
/// the typed value; there is no dynamic column list.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Like `find_order`, but holds the order row until the unit of work ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Writes recipient fields, notes, status, total and `updated_at`.
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Returns whether a row was deleted. Lines must be deleted first.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError>;

    /// Lines of an order, oldest first.
    async fn list_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    async fn find_item(&mut self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError>;

    /// The oldest line of `order_id` for that variant, if any.
    async fn find_item_by_product_item(
        &mut self,
        order_id: OrderId,
        product_item_id: ProductItemId,
    ) -> Result<Option<OrderItem>, StoreError>;

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    /// Writes quantity, the snapshot columns and `updated_at`.
    async fn update_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    async fn delete_item(&mut self, id: OrderItemId) -> Result<bool, StoreError>;

    async fn delete_items_for_order(&mut self, order_id: OrderId) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
