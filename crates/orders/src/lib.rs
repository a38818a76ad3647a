//! Order management domain module.
//!
//! This crate contains the business rules for orders and their lines,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Orchestration inside transactions lives in `bazaar-infra`.

pub mod order;
pub mod query;
pub mod status;

pub use order::{
    HeaderPatch, LineSnapshot, MAX_LINE_QUANTITY, Order, OrderItem, OrderLineRequest, OrderUpdate,
    PlaceOrder, order_total, validate_new_quantity, validate_updated_quantity,
};
pub use query::{
    DateBound, OrderFilter, OrderQuery, OrderSort, Page, PageRequest, SortBy, SortOrder,
};
pub use status::{
    ORDER_STATUS_ALIASES, OrderStatus, Resolution, TransitionPolicy, normalize_item_status,
    normalize_order_status,
};
