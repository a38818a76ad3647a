use axum::Router;

pub mod order_items;
pub mod orders;
pub mod system;

/// Router for all order-management endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/order-items", order_items::router())
}
