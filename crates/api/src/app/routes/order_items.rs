use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{patch, post},
    Json, Router,
};

use bazaar_core::OrderItemId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:id", patch(update_item_quantity).delete(remove_item))
        .route("/:id/sync-price", post(sync_item_price))
}

pub async fn update_item_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: OrderItemId = match errors::parse_id(&id, "order item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };

    match services.orders.update_item_quantity(id, body.quantity).await {
        Ok(change) => errors::json_or_error(dto::item_change_to_json(&change)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderItemId = match errors::parse_id(&id, "order item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.remove_item(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn sync_item_price(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderItemId = match errors::parse_id(&id, "order item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.sync_item_price(id).await {
        Ok(change) => errors::json_or_error(dto::item_change_to_json(&change)),
        Err(e) => errors::service_error_to_response(e),
    }
}
