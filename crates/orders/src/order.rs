use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_catalog::{Product, ProductItem, ProductItemStatus};
use bazaar_core::{
    DomainError, DomainResult, Money, OrderId, OrderItemId, ProductId, ProductItemId,
    UserId,
};

use crate::status::{OrderStatus, Resolution, TransitionPolicy, normalize_item_status};

/// Order header.
///
/// `total_amount` is derived data: it is only ever written with the result of
/// [`order_total`] over the order's live lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog attributes copied onto an order line.
///
/// Once captured, these never follow later catalog edits; only an explicit
/// price sync replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub product_id: ProductId,
    pub product_name: String,
    pub item_name: String,
    pub color: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub item_status: ProductItemStatus,
}

impl LineSnapshot {
    /// Capture the current catalog state of `item` (whose parent is `product`).
    ///
    /// Also returns how the raw item status was resolved so the caller can log
    /// fallbacks.
    pub fn capture(
        product: &Product,
        item: &ProductItem,
    ) -> DomainResult<(Self, Resolution<ProductItemStatus>)> {
        if item.product_id != product.id {
            return Err(DomainError::invariant(format!(
                "product item {} belongs to product {}, not {}",
                item.id, item.product_id, product.id
            )));
        }

        let item_name = match item.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} - {}", product.name, item.color),
        };
        let status = normalize_item_status(&item.status);

        let snapshot = Self {
            product_id: product.id,
            product_name: product.name.clone(),
            item_name,
            color: item.color.clone(),
            price: item.price,
            original_price: item.original_price,
            item_status: status.value(),
        };
        Ok((snapshot, status))
    }
}

/// One catalog variant's quantity within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_item_id: ProductItemId,
    pub quantity: i64,
    pub snapshot: LineSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(
        order_id: OrderId,
        product_item_id: ProductItemId,
        quantity: i64,
        snapshot: LineSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            product_item_id,
            quantity,
            snapshot,
            created_at: now,
            updated_at: now,
        }
    }

    /// `price × quantity`; never read back from storage.
    pub fn subtotal(&self) -> DomainResult<Money> {
        self.snapshot.price.times(self.quantity)
    }

    /// Adding an already-present variant increments the existing line.
    pub fn merge_quantity(&mut self, extra: i64, now: DateTime<Utc>) -> DomainResult<()> {
        validate_new_quantity(extra)?;
        self.quantity = self
            .quantity
            .checked_add(extra)
            .filter(|merged| *merged <= MAX_LINE_QUANTITY)
            .ok_or_else(|| {
                DomainError::validation(format!("line quantity cannot exceed {MAX_LINE_QUANTITY}"))
            })?;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = quantity;
        self.updated_at = now;
    }

    /// Replace the snapshot with fresh catalog data (price sync).
    pub fn resnapshot(&mut self, snapshot: LineSnapshot, now: DateTime<Utc>) {
        self.snapshot = snapshot;
        self.updated_at = now;
    }
}

/// Largest quantity a single line may carry.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Sum of line subtotals.
///
/// Amounts come from catalog prices times requested quantities, so a total
/// that does not fit is reported as a validation error on the request that
/// produced it.
pub fn order_total(items: &[OrderItem]) -> DomainResult<Money> {
    items
        .iter()
        .map(OrderItem::subtotal)
        .collect::<DomainResult<Vec<_>>>()
        .and_then(Money::sum)
        .map_err(|_| DomainError::validation("order total exceeds the supported amount"))
}

/// Quantity rule for new lines and merges.
pub fn validate_new_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(DomainError::validation(format!(
            "quantity cannot exceed {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

/// Quantity rule for edits of an existing line: required, not negative.
///
/// Zero is accepted and leaves a line with a zero subtotal.
pub fn validate_updated_quantity(quantity: Option<i64>) -> DomainResult<i64> {
    match quantity {
        None => Err(DomainError::validation("quantity is required")),
        Some(q) if q < 0 => Err(DomainError::validation("quantity cannot be negative")),
        Some(q) if q > MAX_LINE_QUANTITY => Err(DomainError::validation(format!(
            "quantity cannot exceed {MAX_LINE_QUANTITY}"
        ))),
        Some(q) => Ok(q),
    }
}

/// One requested line at order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_item_id: ProductItemId,
    pub quantity: i64,
}

/// Order placement request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub recipient_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
}

impl PlaceOrder {
    /// Validate the request and build the pending, zero-total header.
    ///
    /// Lines are returned in request order; duplicates are kept as separate
    /// lines.
    pub fn into_order(
        self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> DomainResult<(Order, Vec<OrderLineRequest>)> {
        let recipient_name = required("recipientName", self.recipient_name)?;
        let recipient_phone = required("recipientPhone", self.recipient_phone)?;
        let recipient_address = required("recipientAddress", self.recipient_address)?;

        if self.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for line in &self.items {
            validate_new_quantity(line.quantity)?;
        }

        let order = Order {
            id,
            user_id: self.user_id,
            recipient_name,
            recipient_phone,
            recipient_address,
            notes: optional_text(self.notes),
            status: OrderStatus::Pending,
            total_amount: Money::ZERO,
            created_at: now,
            updated_at: now,
        };
        Ok((order, self.items))
    }
}

/// Partial update of the order header's recipient fields and notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderPatch {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub recipient_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HeaderPatch {
    pub fn is_empty(&self) -> bool {
        self.recipient_name.is_none()
            && self.recipient_phone.is_none()
            && self.recipient_address.is_none()
            && self.notes.is_none()
    }
}

/// Everything `updateOrder` accepts: a header patch and an optional raw status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub header: HeaderPatch,
}

impl Order {
    /// Apply present fields only. Recipient fields may not be blanked; an
    /// empty `notes` clears the notes.
    pub fn apply_header(&mut self, patch: &HeaderPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        // Validate everything before touching any field.
        let name = patch
            .recipient_name
            .clone()
            .map(|v| required("recipientName", Some(v)))
            .transpose()?;
        let phone = patch
            .recipient_phone
            .clone()
            .map(|v| required("recipientPhone", Some(v)))
            .transpose()?;
        let address = patch
            .recipient_address
            .clone()
            .map(|v| required("recipientAddress", Some(v)))
            .transpose()?;

        if let Some(name) = name {
            self.recipient_name = name;
        }
        if let Some(phone) = phone {
            self.recipient_phone = phone;
        }
        if let Some(address) = address {
            self.recipient_address = address;
        }
        if let Some(notes) = &patch.notes {
            self.notes = optional_text(Some(notes.clone()));
        }
        self.updated_at = now;
        Ok(())
    }

    /// Move to `to` if `policy` allows it. Returns whether the status changed.
    pub fn transition(
        &mut self,
        to: OrderStatus,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        policy.check(self.status, to)?;
        if self.status == to {
            return Ok(false);
        }
        self.status = to;
        self.updated_at = now;
        Ok(true)
    }

    pub fn set_total(&mut self, total: Money, now: DateTime<Utc>) {
        self.total_amount = total;
        self.updated_at = now;
    }
}

fn required(field: &str, value: Option<String>) -> DomainResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DomainError::validation(format!("{field} is required"))),
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn product() -> Product {
        Product {
            id: ProductId::new(3),
            name: "Ao dai".to_string(),
        }
    }

    fn item(price: i64) -> ProductItem {
        ProductItem {
            id: ProductItemId::new(10),
            product_id: ProductId::new(3),
            name: None,
            color: "Red".to_string(),
            price: Money::new(price),
            original_price: Some(Money::new(150_000)),
            status: "active".to_string(),
        }
    }

    fn line(price: i64, quantity: i64) -> OrderItem {
        let (snapshot, _) = LineSnapshot::capture(&product(), &item(price)).unwrap();
        OrderItem::new(OrderId::new(), ProductItemId::new(10), quantity, snapshot, now())
    }

    fn place_request() -> PlaceOrder {
        PlaceOrder {
            recipient_name: Some("A".to_string()),
            recipient_phone: Some("0123".to_string()),
            recipient_address: Some("Addr".to_string()),
            items: vec![OrderLineRequest {
                product_item_id: ProductItemId::new(10),
                quantity: 2,
            }],
            ..PlaceOrder::default()
        }
    }

    #[test]
    fn capture_copies_catalog_attributes() {
        let (snapshot, status) = LineSnapshot::capture(&product(), &item(100_000)).unwrap();
        assert_eq!(snapshot.product_id, ProductId::new(3));
        assert_eq!(snapshot.product_name, "Ao dai");
        assert_eq!(snapshot.item_name, "Ao dai - Red");
        assert_eq!(snapshot.color, "Red");
        assert_eq!(snapshot.price, Money::new(100_000));
        assert_eq!(snapshot.original_price, Some(Money::new(150_000)));
        assert_eq!(snapshot.item_status, ProductItemStatus::Available);
        assert!(matches!(status, Resolution::Alias(_)));
    }

    #[test]
    fn capture_prefers_the_item_name_when_present() {
        let mut variant = item(1);
        variant.name = Some("  Limited edition ".to_string());
        let (snapshot, _) = LineSnapshot::capture(&product(), &variant).unwrap();
        assert_eq!(snapshot.item_name, "Limited edition");
    }

    #[test]
    fn capture_rejects_mismatched_parent() {
        let other = Product {
            id: ProductId::new(99),
            name: "Other".to_string(),
        };
        let err = LineSnapshot::capture(&other, &item(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn subtotal_is_price_times_quantity() {
        assert_eq!(line(100_000, 2).subtotal().unwrap(), Money::new(200_000));
        assert_eq!(line(100_000, 0).subtotal().unwrap(), Money::ZERO);
    }

    #[test]
    fn merge_adds_to_existing_quantity() {
        let mut l = line(10, 3);
        l.merge_quantity(2, now()).unwrap();
        assert_eq!(l.quantity, 5);
        assert!(l.merge_quantity(0, now()).is_err());
    }

    #[test]
    fn oversized_quantities_are_validation_errors() {
        for q in [MAX_LINE_QUANTITY + 1, 100_000_000_000_000, i64::MAX] {
            assert!(matches!(validate_new_quantity(q), Err(DomainError::Validation(_))), "{q}");
            assert!(matches!(
                validate_updated_quantity(Some(q)),
                Err(DomainError::Validation(_))
            ));
        }
        assert!(validate_new_quantity(MAX_LINE_QUANTITY).is_ok());

        let mut l = line(10, MAX_LINE_QUANTITY - 1);
        assert!(matches!(l.merge_quantity(2, now()), Err(DomainError::Validation(_))));
        assert_eq!(l.quantity, MAX_LINE_QUANTITY - 1);
        l.merge_quantity(1, now()).unwrap();
        assert_eq!(l.quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn total_overflow_is_a_validation_error() {
        let items = vec![line(i64::MAX / 2, 1), line(i64::MAX / 2, 1), line(10, 1)];
        assert!(matches!(order_total(&items), Err(DomainError::Validation(_))));
        assert!(matches!(
            order_total(&[line(i64::MAX, 2)]),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn updated_quantity_rules() {
        assert!(validate_updated_quantity(None).is_err());
        assert!(validate_updated_quantity(Some(-1)).is_err());
        assert_eq!(validate_updated_quantity(Some(0)).unwrap(), 0);
        assert_eq!(validate_updated_quantity(Some(7)).unwrap(), 7);
    }

    #[test]
    fn place_order_builds_pending_zero_total_header() {
        let mut req = place_request();
        req.notes = Some("   ".to_string());
        let (order, lines) = req.into_order(OrderId::new(), now()).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::ZERO);
        assert_eq!(order.notes, None);
        assert_eq!(order.user_id, None);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn place_order_requires_recipient_fields() {
        for clear in 0..3 {
            let mut req = place_request();
            match clear {
                0 => req.recipient_name = None,
                1 => req.recipient_phone = Some("  ".to_string()),
                _ => req.recipient_address = None,
            }
            let err = req.into_order(OrderId::new(), now()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn place_order_rejects_empty_items_and_bad_quantities() {
        let mut req = place_request();
        req.items.clear();
        assert!(matches!(
            req.into_order(OrderId::new(), now()),
            Err(DomainError::Validation(msg)) if msg.contains("at least one item")
        ));

        let mut req = place_request();
        req.items[0].quantity = 0;
        assert!(matches!(
            req.into_order(OrderId::new(), now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn place_order_keeps_duplicate_lines_separate() {
        let mut req = place_request();
        let first = req.items[0];
        req.items.push(first);
        let (_, lines) = req.into_order(OrderId::new(), now()).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn header_patch_applies_present_fields_only() {
        let (mut order, _) = place_request().into_order(OrderId::new(), now()).unwrap();
        let patch = HeaderPatch {
            recipient_phone: Some(" 0999 ".to_string()),
            notes: Some("leave at door".to_string()),
            ..HeaderPatch::default()
        };
        order.apply_header(&patch, now()).unwrap();
        assert_eq!(order.recipient_name, "A");
        assert_eq!(order.recipient_phone, "0999");
        assert_eq!(order.notes.as_deref(), Some("leave at door"));

        order
            .apply_header(
                &HeaderPatch {
                    notes: Some(String::new()),
                    ..HeaderPatch::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(order.notes, None);
    }

    #[test]
    fn header_patch_rejects_blank_recipient_without_partial_apply() {
        let (mut order, _) = place_request().into_order(OrderId::new(), now()).unwrap();
        let before = order.clone();
        let patch = HeaderPatch {
            recipient_name: Some("B".to_string()),
            recipient_address: Some(" ".to_string()),
            ..HeaderPatch::default()
        };
        assert!(order.apply_header(&patch, now()).is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn transition_reports_change_and_respects_policy() {
        let (mut order, _) = place_request().into_order(OrderId::new(), now()).unwrap();
        assert!(!order.transition(OrderStatus::Pending, TransitionPolicy::Strict, now()).unwrap());
        assert!(order.transition(OrderStatus::Confirmed, TransitionPolicy::Strict, now()).unwrap());
        assert!(order.transition(OrderStatus::Pending, TransitionPolicy::Strict, now()).is_err());
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.transition(OrderStatus::Pending, TransitionPolicy::Permissive, now()).unwrap());
    }

    #[test]
    fn order_update_deserializes_flat_json() {
        let update: OrderUpdate = serde_json::from_value(serde_json::json!({
            "status": "shipped",
            "recipientName": "B",
        }))
        .unwrap();
        assert_eq!(update.status.as_deref(), Some("shipped"));
        assert_eq!(update.header.recipient_name.as_deref(), Some("B"));
        assert!(update.header.notes.is_none());
    }

    proptest! {
        /// Property: the order total equals the sum of price × quantity.
        #[test]
        fn total_is_sum_of_subtotals(
            lines in proptest::collection::vec((0i64..10_000_000, 0i64..1_000), 0..40)
        ) {
            let items: Vec<OrderItem> = lines.iter().map(|(p, q)| line(*p, *q)).collect();
            let expected: i64 = lines.iter().map(|(p, q)| p * q).sum();
            prop_assert_eq!(order_total(&items).unwrap(), Money::new(expected));
        }
    }
}
