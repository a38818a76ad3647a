//! Catalog read model (products and their purchasable variants).
//!
//! The catalog is owned by another part of the system; order management only
//! reads it, so this crate holds plain data types and no commands.

pub mod product;

pub use product::{Product, ProductItem, ProductItemStatus};
