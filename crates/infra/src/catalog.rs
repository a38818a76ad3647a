//! Read-only access to the product catalog.
//!
//! Order management never writes catalog rows; it only resolves product items
//! and their parent products when snapshotting order lines.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::instrument;

use bazaar_catalog::{Product, ProductItem};
use bazaar_core::{Money, ProductId, ProductItemId};

use crate::store::{StoreError, map_sqlx_error};

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn product_item(&self, id: ProductItemId) -> Result<Option<ProductItem>, StoreError>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
impl<C> CatalogLookup for Arc<C>
where
    C: CatalogLookup + ?Sized,
{
    async fn product_item(&self, id: ProductItemId) -> Result<Option<ProductItem>, StoreError> {
        (**self).product_item(id).await
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id).await
    }
}

/// JSON document used to seed an [`InMemoryCatalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub product_items: Vec<ProductItem>,
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
    items: RwLock<HashMap<ProductItemId, ProductItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Result<Self, StoreError> {
        let catalog = Self::new();
        for product in seed.products {
            catalog.upsert_product(product)?;
        }
        for item in seed.product_items {
            catalog.upsert_item(item)?;
        }
        Ok(catalog)
    }

    /// Load a [`CatalogSeed`] from a JSON file.
    pub fn load_seed_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("reading {}: {e}", path.display())))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Decode(format!("parsing {}: {e}", path.display())))?;
        Self::from_seed(seed)
    }

    pub fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        self.products.write().map_err(poisoned)?.insert(product.id, product);
        Ok(())
    }

    pub fn upsert_item(&self, item: ProductItem) -> Result<(), StoreError> {
        self.items.write().map_err(poisoned)?.insert(item.id, item);
        Ok(())
    }

    /// Change a variant's catalog price (existing order lines keep theirs).
    /// Returns `false` when the variant is unknown.
    pub fn set_price(&self, id: ProductItemId, price: Money) -> Result<bool, StoreError> {
        let mut items = self.items.write().map_err(poisoned)?;
        Ok(match items.get_mut(&id) {
            Some(item) => {
                item.price = price;
                true
            }
            None => false,
        })
    }

    pub fn remove_item(&self, id: ProductItemId) -> Result<bool, StoreError> {
        Ok(self.items.write().map_err(poisoned)?.remove(&id).is_some())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("catalog lock poisoned".to_string())
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn product_item(&self, id: ProductItemId) -> Result<Option<ProductItem>, StoreError> {
        Ok(self.items.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().map_err(poisoned)?.get(&id).cloned())
    }
}

/// Catalog backed by the `products` and `product_items` tables.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CatalogLookup for PostgresCatalog {
    #[instrument(skip(self), fields(product_item_id = %id), err)]
    async fn product_item(&self, id: ProductItemId) -> Result<Option<ProductItem>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, name, color, price, original_price, status
            FROM product_items
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_item", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e: sqlx::Error| map_sqlx_error("product_item", e);
        Ok(Some(ProductItem {
            id: ProductItemId::new(row.try_get("id").map_err(decode)?),
            product_id: ProductId::new(row.try_get("product_id").map_err(decode)?),
            name: row.try_get("name").map_err(decode)?,
            color: row.try_get("color").map_err(decode)?,
            price: Money::new(row.try_get("price").map_err(decode)?),
            original_price: row
                .try_get::<Option<i64>, _>("original_price")
                .map_err(decode)?
                .map(Money::new),
            status: row.try_get("status").map_err(decode)?,
        }))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e: sqlx::Error| map_sqlx_error("product", e);
        Ok(Some(Product {
            id: ProductId::new(row.try_get("id").map_err(decode)?),
            name: row.try_get("name").map_err(decode)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> CatalogSeed {
        serde_json::from_value(serde_json::json!({
            "products": [{ "id": 1, "name": "Ao dai" }],
            "productItems": [{
                "id": 10,
                "productId": 1,
                "color": "Red",
                "price": 100000,
                "status": "active"
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn seeded_catalog_resolves_items_and_products() {
        let catalog = InMemoryCatalog::from_seed(seed()).unwrap();

        let item = catalog.product_item(ProductItemId::new(10)).await.unwrap().unwrap();
        assert_eq!(item.price, Money::new(100_000));
        let product = catalog.product(item.product_id).await.unwrap().unwrap();
        assert_eq!(product.name, "Ao dai");

        assert!(catalog.product_item(ProductItemId::new(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn price_changes_and_removals_are_visible() {
        let catalog = InMemoryCatalog::from_seed(seed()).unwrap();
        assert!(catalog.set_price(ProductItemId::new(10), Money::new(5)).unwrap());
        let item = catalog.product_item(ProductItemId::new(10)).await.unwrap().unwrap();
        assert_eq!(item.price, Money::new(5));

        assert!(catalog.remove_item(ProductItemId::new(10)).unwrap());
        assert!(!catalog.set_price(ProductItemId::new(10), Money::new(6)).unwrap());
    }

    #[tokio::test]
    async fn poisoned_lock_fails_reads_and_writes_alike() {
        let catalog = Arc::new(InMemoryCatalog::from_seed(seed()).unwrap());
        let holder = catalog.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.items.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(
            catalog.product_item(ProductItemId::new(10)).await,
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            catalog.set_price(ProductItemId::new(10), Money::new(1)),
            Err(StoreError::Backend(_))
        ));
        let err = catalog
            .upsert_item(seed().product_items.remove(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        // The products map was never poisoned.
        assert!(catalog.product(ProductId::new(1)).await.unwrap().is_some());
    }
}
