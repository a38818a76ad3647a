use serde::{Deserialize, Serialize};

use bazaar_core::{Money, ProductId, ProductItemId};

/// A catalog product as seen by order management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
}

/// Availability of a product item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductItemStatus {
    #[default]
    Available,
    OutOfStock,
    Discontinued,
}

impl ProductItemStatus {
    pub const ALL: [ProductItemStatus; 3] = [
        ProductItemStatus::Available,
        ProductItemStatus::OutOfStock,
        ProductItemStatus::Discontinued,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductItemStatus::Available => "available",
            ProductItemStatus::OutOfStock => "out_of_stock",
            ProductItemStatus::Discontinued => "discontinued",
        }
    }
}

impl core::fmt::Display for ProductItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchasable variant of a product (e.g. a specific color).
///
/// `status` is kept as the raw string stored by the catalog; legacy rows carry
/// values outside [`ProductItemStatus`] and are normalized when snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductItem {
    pub id: ProductItemId,
    pub product_id: ProductId,
    #[serde(default)]
    pub name: Option<String>,
    pub color: String,
    pub price: Money,
    #[serde(default)]
    pub original_price: Option<Money>,
    pub status: String,
}
