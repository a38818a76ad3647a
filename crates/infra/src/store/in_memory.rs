use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bazaar_core::{OrderId, OrderItemId, ProductItemId};
use bazaar_orders::{Order, OrderItem, OrderQuery, Page};

use super::r#trait::{OrderStore, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    /// Insertion order doubles as line order.
    items: Vec<OrderItem>,
}

/// In-memory order store.
///
/// Intended for tests/dev. Units of work are serialized through one async
/// mutex and operate on a private copy of the tables that replaces the shared
/// state on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed order count.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Committed line count across all orders.
    pub async fn item_count(&self) -> usize {
        self.tables.lock().await.items.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(query.apply(tables.orders.values().cloned()))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        // The whole store is already held exclusively.
        self.find_order(id).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Constraint(format!("order {} already exists", order.id)));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let Some(existing) = self.working.orders.get_mut(&order.id) else {
            return Err(StoreError::Backend(format!("order {} vanished", order.id)));
        };
        existing.recipient_name = order.recipient_name.clone();
        existing.recipient_phone = order.recipient_phone.clone();
        existing.recipient_address = order.recipient_address.clone();
        existing.notes = order.notes.clone();
        existing.status = order.status;
        existing.total_amount = order.total_amount;
        existing.updated_at = order.updated_at;
        Ok(())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError> {
        if self.working.items.iter().any(|i| i.order_id == id) {
            return Err(StoreError::Constraint(format!("order {id} still has items")));
        }
        Ok(self.working.orders.remove(&id).is_some())
    }

    async fn list_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .working
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_item(&mut self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError> {
        Ok(self.working.items.iter().find(|i| i.id == id).cloned())
    }

    async fn find_item_by_product_item(
        &mut self,
        order_id: OrderId,
        product_item_id: ProductItemId,
    ) -> Result<Option<OrderItem>, StoreError> {
        Ok(self
            .working
            .items
            .iter()
            .find(|i| i.order_id == order_id && i.product_item_id == product_item_id)
            .cloned())
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        if !self.working.orders.contains_key(&item.order_id) {
            return Err(StoreError::Constraint(format!(
                "order {} does not exist",
                item.order_id
            )));
        }
        if self.working.items.iter().any(|i| i.id == item.id) {
            return Err(StoreError::Constraint(format!("item {} already exists", item.id)));
        }
        self.working.items.push(item.clone());
        Ok(())
    }

    async fn update_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let Some(existing) = self.working.items.iter_mut().find(|i| i.id == item.id) else {
            return Err(StoreError::Backend(format!("item {} vanished", item.id)));
        };
        existing.quantity = item.quantity;
        existing.snapshot = item.snapshot.clone();
        existing.updated_at = item.updated_at;
        Ok(())
    }

    async fn delete_item(&mut self, id: OrderItemId) -> Result<bool, StoreError> {
        let before = self.working.items.len();
        self.working.items.retain(|i| i.id != id);
        Ok(self.working.items.len() != before)
    }

    async fn delete_items_for_order(&mut self, order_id: OrderId) -> Result<u64, StoreError> {
        let before = self.working.items.len();
        self.working.items.retain(|i| i.order_id != order_id);
        Ok((before - self.working.items.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
