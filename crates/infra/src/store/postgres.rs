//! Postgres-backed order store.
//!
//! ## Transactions and locking
//!
//! Every [`UnitOfWork`] is one database transaction. `lock_order` issues
//! `SELECT … FOR UPDATE` on the header row, so two requests mutating lines of
//! the same order serialize while different orders proceed in parallel.
//! Dropping a unit of work without committing drops the `sqlx::Transaction`,
//! which rolls back.
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |------------|-----------------|--------------|
//! | Database (unique / FK / check violation) | `23505`, `23503`, `23514` | `Constraint` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed, PoolTimedOut, Io, Tls | n/a | `Unavailable` |
//! | ColumnDecode, Decode, ColumnNotFound | n/a | `Decode` |
//! | Other | n/a | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use bazaar_core::{Money, OrderId, OrderItemId, ProductId, ProductItemId, UserId};
use bazaar_orders::{
    LineSnapshot, Order, OrderFilter, OrderItem, OrderQuery, OrderStatus, Page, SortBy,
    normalize_item_status, normalize_order_status,
};

use super::r#trait::{OrderStore, StoreError, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_orders.sql");

const ORDER_COLUMNS: &str = "id, user_id, recipient_name, recipient_phone, recipient_address, \
     notes, status, total_amount, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_item_id, quantity, product_name, \
     item_name, color, price, original_price, item_status, created_at, updated_at";

/// Postgres-backed order store.
///
/// Uses a SQLx connection pool, which is `Send + Sync`; the store is cheap to
/// clone and share.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables this store needs if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[instrument(skip(self), fields(page = query.page.page, limit = query.page.limit), err)]
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(&mut count, &query.filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_orders", e))?;

        let direction = query.sort.order.keyword();
        let sort_key = match query.sort.by {
            SortBy::Status => status_sort_key(),
            other => other.column().to_string(),
        };
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_filters(&mut select, &query.filter);
        select
            .push(" ORDER BY ")
            .push(sort_key)
            .push(" ")
            .push(direction)
            .push(", id ")
            .push(direction)
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;
        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(orders, u64::try_from(total).unwrap_or(0), query.page))
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    let mut sep = " WHERE ";
    if let Some(user_id) = filter.user_id {
        qb.push(sep).push("user_id = ").push_bind(Uuid::from(user_id));
        sep = " AND ";
    }
    if let Some(status) = filter.status {
        qb.push(sep);
        push_status_match(qb, status);
        sep = " AND ";
    }
    if let Some(start) = filter.start_date {
        qb.push(sep).push("created_at >= ").push_bind(start);
        sep = " AND ";
    }
    if let Some(end) = filter.end_date {
        qb.push(sep).push("created_at <= ").push_bind(end);
    }
}

/// Match rows whose stored status normalizes to `status`.
///
/// Legacy spellings are stored as-is, and unrecognized values read back as
/// pending, so pending is matched as "none of the other spellings".
fn push_status_match(qb: &mut QueryBuilder<'_, Postgres>, status: OrderStatus) {
    qb.push("lower(btrim(status)) ");
    if status == OrderStatus::Pending {
        let others: Vec<String> = OrderStatus::ALL
            .into_iter()
            .filter(|s| *s != OrderStatus::Pending)
            .flat_map(OrderStatus::spellings)
            .map(str::to_string)
            .collect();
        qb.push("<> ALL(").push_bind(others).push(")");
    } else {
        let spellings: Vec<String> = status.spellings().into_iter().map(str::to_string).collect();
        qb.push("= ANY(").push_bind(spellings).push(")");
    }
}

/// Sort expression ordering rows by their normalized status name.
fn status_sort_key() -> String {
    let mut key = String::from("(CASE lower(btrim(status))");
    for status in OrderStatus::ALL {
        for spelling in status.spellings() {
            key.push_str(&format!(" WHEN '{spelling}' THEN '{}'", status.as_str()));
        }
    }
    key.push_str(&format!(" ELSE '{}' END) COLLATE \"C\"", OrderStatus::Pending.as_str()));
    key
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn fetch_order(&mut self, id: OrderId, for_update: bool) -> Result<Option<Order>, StoreError> {
        let sql = if for_update {
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE")
        } else {
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")
        };
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order(id, false).await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order(id, true).await
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, recipient_name, recipient_phone, recipient_address,
                notes, status, total_amount, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(Uuid::from))
        .bind(&order.recipient_name)
        .bind(&order.recipient_phone)
        .bind(&order.recipient_address)
        .bind(&order.notes)
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET recipient_name = $2,
                recipient_phone = $3,
                recipient_address = $4,
                notes = $5,
                status = $6,
                total_amount = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.recipient_name)
        .bind(&order.recipient_phone)
        .bind(&order.recipient_address)
        .bind(&order.notes)
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_order(&mut self, id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn list_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(order_item_id = %id), err)]
    async fn find_item(&mut self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(order_id = %order_id, product_item_id = %product_item_id), err)]
    async fn find_item_by_product_item(
        &mut self,
        order_id: OrderId,
        product_item_id: ProductItemId,
    ) -> Result<Option<OrderItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items \
             WHERE order_id = $1 AND product_item_id = $2 \
             ORDER BY created_at, id LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .bind(product_item_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_item_by_product_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self, item), fields(order_id = %item.order_id, order_item_id = %item.id), err)]
    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let snapshot = &item.snapshot;
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, product_item_id, quantity, product_name,
                item_name, color, price, original_price, item_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(snapshot.product_id.get())
        .bind(item.product_item_id.get())
        .bind(item.quantity)
        .bind(&snapshot.product_name)
        .bind(&snapshot.item_name)
        .bind(&snapshot.color)
        .bind(snapshot.price.amount())
        .bind(snapshot.original_price.map(Money::amount))
        .bind(snapshot.item_status.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self, item), fields(order_item_id = %item.id), err)]
    async fn update_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let snapshot = &item.snapshot;
        sqlx::query(
            r#"
            UPDATE order_items
            SET quantity = $2,
                product_id = $3,
                product_name = $4,
                item_name = $5,
                color = $6,
                price = $7,
                original_price = $8,
                item_status = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.quantity)
        .bind(snapshot.product_id.get())
        .bind(&snapshot.product_name)
        .bind(&snapshot.item_name)
        .bind(&snapshot.color)
        .bind(snapshot.price.amount())
        .bind(snapshot.original_price.map(Money::amount))
        .bind(snapshot.item_status.as_str())
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_item_id = %id), err)]
    async fn delete_item(&mut self, id: OrderItemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn delete_items_for_order(&mut self, order_id: OrderId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_items_for_order", e))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let id: Uuid = decode(row, "id")?;
    let raw_status: String = decode(row, "status")?;
    let status = normalize_order_status(&raw_status);
    if status.is_fallback() {
        warn!(order_id = %id, raw_status = %raw_status, "unknown stored order status; treating as pending");
    }

    Ok(Order {
        id: OrderId::from_uuid(id),
        user_id: decode::<Option<Uuid>>(row, "user_id")?.map(UserId::from_uuid),
        recipient_name: decode(row, "recipient_name")?,
        recipient_phone: decode(row, "recipient_phone")?,
        recipient_address: decode(row, "recipient_address")?,
        notes: decode(row, "notes")?,
        status: status.into_value(),
        total_amount: Money::new(decode(row, "total_amount")?),
        created_at: decode::<DateTime<Utc>>(row, "created_at")?,
        updated_at: decode::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let id: Uuid = decode(row, "id")?;
    let raw_status: String = decode(row, "item_status")?;
    let item_status = normalize_item_status(&raw_status);
    if item_status.is_fallback() {
        warn!(order_item_id = %id, raw_status = %raw_status, "unknown stored item status; treating as available");
    }

    Ok(OrderItem {
        id: OrderItemId::from_uuid(id),
        order_id: OrderId::from_uuid(decode(row, "order_id")?),
        product_item_id: ProductItemId::new(decode(row, "product_item_id")?),
        quantity: decode(row, "quantity")?,
        snapshot: LineSnapshot {
            product_id: ProductId::new(decode(row, "product_id")?),
            product_name: decode(row, "product_name")?,
            item_name: decode(row, "item_name")?,
            color: decode(row, "color")?,
            price: Money::new(decode(row, "price")?),
            original_price: decode::<Option<i64>>(row, "original_price")?.map(Money::new),
            item_status: item_status.into_value(),
        },
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

/// Map a SQLx error onto [`StoreError`], tagging it with the failed operation.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(msg) if msg.contains("begin")
        ));
        assert!(matches!(
            map_sqlx_error("list_items", sqlx::Error::ColumnNotFound("price".to_string())),
            StoreError::Decode(_)
        ));
        assert!(matches!(
            map_sqlx_error("find_item", sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn status_filter_matches_every_spelling() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(
            &mut qb,
            &OrderFilter {
                status: Some(OrderStatus::Confirmed),
                ..OrderFilter::default()
            },
        );
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM orders WHERE lower(btrim(status)) = ANY($1)"
        );

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(
            &mut qb,
            &OrderFilter {
                status: Some(OrderStatus::Pending),
                ..OrderFilter::default()
            },
        );
        assert!(qb.sql().ends_with("WHERE lower(btrim(status)) <> ALL($1)"));
    }

    #[test]
    fn status_sort_key_orders_by_normalized_name() {
        let key = status_sort_key();
        assert!(key.contains("WHEN 'processing' THEN 'confirmed'"));
        assert!(key.contains("WHEN 'canceled' THEN 'cancelled'"));
        assert!(key.contains("ELSE 'pending' END"));
    }

    #[test]
    fn schema_declares_order_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS orders"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS order_items"));
    }
}
