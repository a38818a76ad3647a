//! Transactional order operations (application-level orchestration).
//!
//! `OrderService` composes an [`OrderStore`] and a [`CatalogLookup`] and runs
//! every operation as:
//!
//! ```text
//! validate input (no IO)
//!   ↓
//! open unit of work, lock the order row
//!   ↓
//! read catalog / mutate header or lines
//!   ↓
//! recompute the order total from the live lines
//!   ↓
//! commit (or roll back and surface the original error)
//! ```
//!
//! The whole pipeline runs under a deadline. When it expires the in-flight
//! future is dropped, which drops the unit of work and discards its writes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{instrument, warn};

use bazaar_core::{DomainError, Money, OrderId, OrderItemId, ProductItemId};
use bazaar_orders::{
    LineSnapshot, Order, OrderItem, OrderLineRequest, OrderQuery, OrderUpdate, Page, PlaceOrder,
    TransitionPolicy, normalize_order_status, order_total, validate_new_quantity,
    validate_updated_quantity,
};

use crate::catalog::CatalogLookup;
use crate::config::OrderSettings;
use crate::store::{OrderStore, StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation did not finish within {0:?}")]
    Timeout(Duration),
}

/// An order header together with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Result of a line mutation: the line and its order with the new total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    pub item: OrderItem,
    pub order: Order,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogLookup>,
    settings: OrderSettings,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogLookup>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.settings.transition_policy
    }

    /// Place an order: header plus one line per requested pair, then the total.
    #[instrument(skip(self, request), fields(lines = request.items.len()), err)]
    pub async fn create_order(&self, request: PlaceOrder) -> Result<OrderWithItems, OrderServiceError> {
        self.with_deadline("create_order", async {
            let now = Utc::now();
            let (order, lines) = request.into_order(OrderId::new(), now)?;

            let mut uow = self.store.begin().await?;
            let result = self.place_in(&mut *uow, order, lines, now).await;
            finish(uow, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderWithItems, OrderServiceError> {
        self.with_deadline("get_order", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                let order = require_order(uow.find_order(id).await?, id)?;
                let items = uow.list_items(id).await?;
                Ok(OrderWithItems { order, items })
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    #[instrument(skip(self, query), err)]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Page<Order>, OrderServiceError> {
        self.with_deadline("list_orders", async {
            self.store.list_orders(&query).await.map_err(OrderServiceError::from)
        })
        .await
    }

    /// Apply a header patch and/or a status change in one unit of work.
    #[instrument(skip(self, update), fields(order_id = %id), err)]
    pub async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Order, OrderServiceError> {
        self.with_deadline("update_order", async {
            let mut uow = self.store.begin().await?;
            let result = self.update_in(&mut *uow, id, update).await;
            finish(uow, result).await
        })
        .await
    }

    /// Delete an order and its lines.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), OrderServiceError> {
        self.with_deadline("delete_order", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                require_order(uow.lock_order(id).await?, id)?;
                uow.delete_items_for_order(id).await?;
                uow.delete_order(id).await?;
                Ok(())
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    /// Add `quantity` of a variant; an existing line for the same variant grows.
    #[instrument(skip(self), fields(order_id = %order_id, product_item_id = %product_item_id), err)]
    pub async fn add_item(
        &self,
        order_id: OrderId,
        product_item_id: ProductItemId,
        quantity: i64,
    ) -> Result<ItemChange, OrderServiceError> {
        self.with_deadline("add_item", async {
            validate_new_quantity(quantity)?;
            let mut uow = self.store.begin().await?;
            let result = self.add_in(&mut *uow, order_id, product_item_id, quantity).await;
            finish(uow, result).await
        })
        .await
    }

    /// Set a line's quantity. Zero keeps the line with a zero subtotal.
    #[instrument(skip(self), fields(order_item_id = %item_id), err)]
    pub async fn update_item_quantity(
        &self,
        item_id: OrderItemId,
        quantity: Option<i64>,
    ) -> Result<ItemChange, OrderServiceError> {
        self.with_deadline("update_item_quantity", async {
            let quantity = validate_updated_quantity(quantity)?;
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                let now = Utc::now();
                let (mut order, mut item) = self.lock_line(&mut *uow, item_id).await?;
                item.set_quantity(quantity, now);
                uow.update_item(&item).await?;
                recompute_in(&mut *uow, &mut order, now).await?;
                Ok(ItemChange { item, order })
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    /// Delete a line. Returns its order with the recomputed total.
    #[instrument(skip(self), fields(order_item_id = %item_id), err)]
    pub async fn remove_item(&self, item_id: OrderItemId) -> Result<Order, OrderServiceError> {
        self.with_deadline("remove_item", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                let now = Utc::now();
                let (mut order, item) = self.lock_line(&mut *uow, item_id).await?;
                uow.delete_item(item.id).await?;
                recompute_in(&mut *uow, &mut order, now).await?;
                Ok(order)
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    /// Replace a line's snapshot with the catalog's current data.
    #[instrument(skip(self), fields(order_item_id = %item_id), err)]
    pub async fn sync_item_price(&self, item_id: OrderItemId) -> Result<ItemChange, OrderServiceError> {
        self.with_deadline("sync_item_price", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                let now = Utc::now();
                let (mut order, mut item) = self.lock_line(&mut *uow, item_id).await?;
                let snapshot = self.snapshot(item.product_item_id).await?;
                item.resnapshot(snapshot, now);
                uow.update_item(&item).await?;
                recompute_in(&mut *uow, &mut order, now).await?;
                Ok(ItemChange { item, order })
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderServiceError> {
        self.with_deadline("list_items", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                require_order(uow.find_order(order_id).await?, order_id)?;
                Ok(uow.list_items(order_id).await?)
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    /// Recompute and store an order's total from its lines.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn recompute_total(&self, order_id: OrderId) -> Result<Money, OrderServiceError> {
        self.with_deadline("recompute_total", async {
            let mut uow = self.store.begin().await?;
            let result: Result<_, OrderServiceError> = async {
                let mut order = require_order(uow.lock_order(order_id).await?, order_id)?;
                recompute_in(&mut *uow, &mut order, Utc::now()).await
            }
            .await;
            finish(uow, result).await
        })
        .await
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> Result<T, OrderServiceError>
    where
        F: Future<Output = Result<T, OrderServiceError>>,
    {
        let limit = self.settings.op_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "order operation timed out; rolled back");
                Err(OrderServiceError::Timeout(limit))
            }
        }
    }

    async fn place_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut order: Order,
        lines: Vec<OrderLineRequest>,
        now: DateTime<Utc>,
    ) -> Result<OrderWithItems, OrderServiceError> {
        uow.insert_order(&order).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let snapshot = self.snapshot(line.product_item_id).await?;
            let item = OrderItem::new(order.id, line.product_item_id, line.quantity, snapshot, now);
            uow.insert_item(&item).await?;
            items.push(item);
        }

        recompute_in(uow, &mut order, now).await?;
        Ok(OrderWithItems { order, items })
    }

    async fn update_in(
        &self,
        uow: &mut dyn UnitOfWork,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, OrderServiceError> {
        let now = Utc::now();
        let mut order = require_order(uow.lock_order(id).await?, id)?;

        order.apply_header(&update.header, now)?;
        let mut changed = !update.header.is_empty();

        if let Some(raw) = update.status.as_deref() {
            let resolved = normalize_order_status(raw);
            if resolved.is_fallback() {
                warn!(order_id = %id, raw_status = %raw, "unrecognized order status; using pending");
            }
            changed |= order.transition(resolved.value(), self.policy(), now)?;
        }

        if changed {
            uow.update_order(&order).await?;
        }
        Ok(order)
    }

    async fn add_in(
        &self,
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        product_item_id: ProductItemId,
        quantity: i64,
    ) -> Result<ItemChange, OrderServiceError> {
        let now = Utc::now();
        let mut order = require_order(uow.lock_order(order_id).await?, order_id)?;
        self.policy().ensure_lines_mutable(order.status)?;

        let snapshot = self.snapshot(product_item_id).await?;
        let item = match uow.find_item_by_product_item(order_id, product_item_id).await? {
            Some(mut existing) => {
                existing.merge_quantity(quantity, now)?;
                uow.update_item(&existing).await?;
                existing
            }
            None => {
                let item = OrderItem::new(order_id, product_item_id, quantity, snapshot, now);
                uow.insert_item(&item).await?;
                item
            }
        };

        recompute_in(uow, &mut order, now).await?;
        Ok(ItemChange { item, order })
    }

    /// Find a line, lock its order, and re-read the line under that lock.
    async fn lock_line(
        &self,
        uow: &mut dyn UnitOfWork,
        item_id: OrderItemId,
    ) -> Result<(Order, OrderItem), OrderServiceError> {
        let item = require_item(uow.find_item(item_id).await?, item_id)?;
        let order = require_order(uow.lock_order(item.order_id).await?, item.order_id)?;
        let item = require_item(uow.find_item(item_id).await?, item_id)?;
        self.policy().ensure_lines_mutable(order.status)?;
        Ok((order, item))
    }

    /// Resolve a variant and its product and capture a line snapshot.
    async fn snapshot(&self, product_item_id: ProductItemId) -> Result<LineSnapshot, OrderServiceError> {
        let item = self
            .catalog
            .product_item(product_item_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("product item {product_item_id}")))?;
        let product = self
            .catalog
            .product(item.product_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("product {}", item.product_id)))?;

        let (snapshot, status) = LineSnapshot::capture(&product, &item)?;
        if status.is_fallback() {
            warn!(
                product_item_id = %product_item_id,
                raw_status = %item.status,
                "unrecognized product item status; using available"
            );
        }
        Ok(snapshot)
    }
}

/// Sum the order's live lines and store the result on the header.
async fn recompute_in(
    uow: &mut dyn UnitOfWork,
    order: &mut Order,
    now: DateTime<Utc>,
) -> Result<Money, OrderServiceError> {
    let items = uow.list_items(order.id).await?;
    let total = order_total(&items)?;
    order.set_total(total, now);
    uow.update_order(order).await?;
    Ok(total)
}

/// Commit on success; otherwise roll back and return the original error.
async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, OrderServiceError>,
) -> Result<T, OrderServiceError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

fn require_order(order: Option<Order>, id: OrderId) -> Result<Order, DomainError> {
    order.ok_or_else(|| DomainError::not_found(format!("order {id}")))
}

fn require_item(item: Option<OrderItem>, id: OrderItemId) -> Result<OrderItem, DomainError> {
    item.ok_or_else(|| DomainError::not_found(format!("order item {id}")))
}
