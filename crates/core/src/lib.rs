//! `bazaar-core`: shared domain primitives (identifiers, money, errors).
//!
//! No infrastructure concerns live here.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{OrderId, OrderItemId, ProductId, ProductItemId, UserId};
pub use money::Money;
