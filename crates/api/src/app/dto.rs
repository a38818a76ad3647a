use serde::Deserialize;
use serde_json::{Value, json};

use bazaar_core::{DomainError, DomainResult, Money, ProductItemId, UserId};
use bazaar_infra::{ItemChange, OrderWithItems};
use bazaar_orders::{
    DateBound, Order, OrderFilter, OrderItem, OrderQuery, OrderSort, Page, PageRequest, SortBy,
    SortOrder, normalize_order_status,
};

// -------------------------
// Request DTOs
// -------------------------

/// `POST /orders/:id/items`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_item_id: ProductItemId,
    pub quantity: i64,
}

/// `PATCH /order-items/:id`. `quantity` stays optional so a missing value is
/// reported as a validation error rather than a malformed body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// `GET /orders` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ListOrdersParams {
    pub fn into_query(self) -> DomainResult<OrderQuery> {
        let user_id = non_blank(self.user_id)
            .map(|raw| raw.parse::<UserId>())
            .transpose()?;

        let status = non_blank(self.status).map(|raw| {
            let resolved = normalize_order_status(&raw);
            if resolved.is_fallback() {
                tracing::warn!(raw_status = %raw, "unrecognized status filter; using pending");
            }
            resolved.into_value()
        });

        let start_date = non_blank(self.start_date)
            .map(|raw| DateBound::Start.parse(&raw))
            .transpose()?;
        let end_date = non_blank(self.end_date)
            .map(|raw| DateBound::End.parse(&raw))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(DomainError::validation("startDate must not be after endDate"));
            }
        }

        let sort = OrderSort {
            by: non_blank(self.sort_by)
                .map(|raw| SortBy::parse(&raw))
                .transpose()?
                .unwrap_or_default(),
            order: non_blank(self.sort_order)
                .map(|raw| SortOrder::parse(&raw))
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(OrderQuery {
            filter: OrderFilter {
                user_id,
                status,
                start_date,
                end_date,
            },
            sort,
            page: PageRequest::new(self.page, self.limit),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn order_to_json(order: &Order) -> Value {
    json!({
        "id": order.id.to_string(),
        "userId": order.user_id.map(|u| u.to_string()),
        "recipientName": order.recipient_name,
        "recipientPhone": order.recipient_phone,
        "recipientAddress": order.recipient_address,
        "notes": order.notes,
        "status": order.status.as_str(),
        "totalAmount": order.total_amount.amount(),
        "createdAt": order.created_at.to_rfc3339(),
        "updatedAt": order.updated_at.to_rfc3339(),
    })
}

pub fn item_to_json(item: &OrderItem) -> DomainResult<Value> {
    let snapshot = &item.snapshot;
    let subtotal = item.subtotal()?;
    Ok(json!({
        "id": item.id.to_string(),
        "orderId": item.order_id.to_string(),
        "productId": snapshot.product_id.get(),
        "productItemId": item.product_item_id.get(),
        "quantity": item.quantity,
        "productName": snapshot.product_name,
        "itemName": snapshot.item_name,
        "color": snapshot.color,
        "price": snapshot.price.amount(),
        "originalPrice": snapshot.original_price.map(Money::amount),
        "itemStatus": snapshot.item_status.as_str(),
        "subtotal": subtotal.amount(),
        "createdAt": item.created_at.to_rfc3339(),
        "updatedAt": item.updated_at.to_rfc3339(),
    }))
}

pub fn items_to_json(items: &[OrderItem]) -> DomainResult<Value> {
    items
        .iter()
        .map(item_to_json)
        .collect::<DomainResult<Vec<_>>>()
        .map(Value::Array)
}

pub fn order_with_items_to_json(value: &OrderWithItems) -> DomainResult<Value> {
    let mut body = order_to_json(&value.order);
    body["items"] = items_to_json(&value.items)?;
    Ok(body)
}

pub fn item_change_to_json(change: &ItemChange) -> DomainResult<Value> {
    let mut body = item_to_json(&change.item)?;
    body["orderTotal"] = json!(change.order.total_amount.amount());
    Ok(body)
}

pub fn page_to_json(page: Page<Order>) -> Value {
    let page = page.map(|order| order_to_json(&order));
    json!({
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
        "totalPages": page.total_pages,
    })
}
