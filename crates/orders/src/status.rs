//! Order/item status vocabulary and the rules for moving between statuses.
//!
//! Status strings arrive from clients and from legacy rows in several
//! spellings. Normalization never fails: unknown input resolves to a default
//! and the caller is told so it can log.

use serde::{Deserialize, Serialize};

use bazaar_catalog::ProductItemStatus;
use bazaar_core::{DomainError, DomainResult};

/// Canonical order status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Normalize free-form input, discarding how it was resolved.
    pub fn normalize(input: &str) -> OrderStatus {
        normalize_order_status(input).into_value()
    }

    /// Every stored spelling that normalizes to this status: the canonical
    /// value first, then its legacy aliases.
    pub fn spellings(self) -> Vec<&'static str> {
        std::iter::once(self.as_str())
            .chain(
                ORDER_STATUS_ALIASES
                    .iter()
                    .filter(|(_, status)| *status == self)
                    .map(|(alias, _)| *alias),
            )
            .collect()
    }

    /// Delivered and cancelled orders are finished; nothing follows them.
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a raw status string was mapped onto the canonical vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Input already was a canonical value.
    Canonical(T),
    /// Input was a known legacy alias.
    Alias(T),
    /// Input was not recognized; the default was substituted.
    Fallback(T),
}

impl<T: Copy> Resolution<T> {
    pub fn value(&self) -> T {
        match self {
            Resolution::Canonical(v) | Resolution::Alias(v) | Resolution::Fallback(v) => *v,
        }
    }

    pub fn into_value(self) -> T {
        self.value()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

/// Legacy order status spellings and the canonical value they stand for.
pub const ORDER_STATUS_ALIASES: [(&str, OrderStatus); 4] = [
    ("processing", OrderStatus::Confirmed),
    ("shipped", OrderStatus::Shipping),
    ("completed", OrderStatus::Delivered),
    ("canceled", OrderStatus::Cancelled),
];

/// Map any input onto [`OrderStatus`].
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn normalize_order_status(input: &str) -> Resolution<OrderStatus> {
    let key = input.trim().to_ascii_lowercase();

    if let Some(status) = OrderStatus::ALL.into_iter().find(|s| s.as_str() == key) {
        return Resolution::Canonical(status);
    }

    ORDER_STATUS_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, status)| Resolution::Alias(*status))
        .unwrap_or(Resolution::Fallback(OrderStatus::Pending))
}

/// Map any input onto [`ProductItemStatus`].
pub fn normalize_item_status(input: &str) -> Resolution<ProductItemStatus> {
    let key = input.trim().to_ascii_lowercase();

    if let Some(status) = ProductItemStatus::ALL.into_iter().find(|s| s.as_str() == key) {
        return Resolution::Canonical(status);
    }

    match key.as_str() {
        "active" => Resolution::Alias(ProductItemStatus::Available),
        _ => Resolution::Fallback(ProductItemStatus::Available),
    }
}

/// How status changes on an order header are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any status may follow any other (manual override behaviour).
    #[default]
    Permissive,
    /// Forward-only: pending → confirmed → shipping → delivered, with
    /// cancellation allowed from pending or confirmed.
    Strict,
}

impl TransitionPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        }
    }

    pub fn check(self, from: OrderStatus, to: OrderStatus) -> DomainResult<()> {
        if self == TransitionPolicy::Permissive || from == to {
            return Ok(());
        }

        use OrderStatus::*;
        let allowed = matches!(
            (from, to),
            (Pending, Confirmed)
                | (Confirmed, Shipping)
                | (Shipping, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "illegal status transition from {from} to {to}"
            )))
        }
    }

    /// Lines of a finished order are frozen under the strict policy.
    pub fn ensure_lines_mutable(self, status: OrderStatus) -> DomainResult<()> {
        if self == TransitionPolicy::Strict && status.is_final() {
            return Err(DomainError::conflict(format!(
                "cannot modify items of a {status} order"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_values_resolve_to_themselves() {
        for status in OrderStatus::ALL {
            assert_eq!(
                normalize_order_status(status.as_str()),
                Resolution::Canonical(status)
            );
        }
        for status in ProductItemStatus::ALL {
            assert_eq!(
                normalize_item_status(status.as_str()),
                Resolution::Canonical(status)
            );
        }
    }

    #[test]
    fn legacy_order_aliases_map_to_canonical_values() {
        assert_eq!(OrderStatus::normalize("processing"), OrderStatus::Confirmed);
        assert_eq!(OrderStatus::normalize("shipped"), OrderStatus::Shipping);
        assert_eq!(OrderStatus::normalize("completed"), OrderStatus::Delivered);
        assert_eq!(OrderStatus::normalize("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::normalize("cancelled"), OrderStatus::Cancelled);
        assert!(matches!(
            normalize_order_status("shipped"),
            Resolution::Alias(OrderStatus::Shipping)
        ));
    }

    #[test]
    fn spellings_cover_canonical_value_and_aliases() {
        assert_eq!(OrderStatus::Pending.spellings(), vec!["pending"]);
        assert_eq!(OrderStatus::Confirmed.spellings(), vec!["confirmed", "processing"]);
        assert_eq!(OrderStatus::Cancelled.spellings(), vec!["cancelled", "canceled"]);
        for status in OrderStatus::ALL {
            for spelling in status.spellings() {
                assert_eq!(OrderStatus::normalize(spelling), status, "{spelling}");
            }
        }
    }

    #[test]
    fn matching_ignores_case_and_whitespace() {
        assert_eq!(
            normalize_order_status("  Delivered "),
            Resolution::Canonical(OrderStatus::Delivered)
        );
        assert_eq!(
            normalize_item_status("ACTIVE"),
            Resolution::Alias(ProductItemStatus::Available)
        );
    }

    #[test]
    fn unknown_input_falls_back_to_defaults() {
        let order = normalize_order_status("lost-in-transit");
        assert!(order.is_fallback());
        assert_eq!(order.value(), OrderStatus::Pending);

        let item = normalize_item_status("");
        assert!(item.is_fallback());
        assert_eq!(item.value(), ProductItemStatus::Available);
    }

    #[test]
    fn permissive_policy_accepts_any_transition() {
        let policy = TransitionPolicy::Permissive;
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert!(policy.check(from, to).is_ok(), "{from} -> {to}");
            }
        }
        assert!(policy.ensure_lines_mutable(OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn strict_policy_allows_the_forward_path() {
        let policy = TransitionPolicy::Strict;
        assert!(policy.check(OrderStatus::Pending, OrderStatus::Confirmed).is_ok());
        assert!(policy.check(OrderStatus::Confirmed, OrderStatus::Shipping).is_ok());
        assert!(policy.check(OrderStatus::Shipping, OrderStatus::Delivered).is_ok());
        assert!(policy.check(OrderStatus::Pending, OrderStatus::Cancelled).is_ok());
        assert!(policy.check(OrderStatus::Confirmed, OrderStatus::Cancelled).is_ok());
        assert!(policy.check(OrderStatus::Shipping, OrderStatus::Shipping).is_ok());
    }

    #[test]
    fn strict_policy_rejects_backwards_and_late_cancellation() {
        let policy = TransitionPolicy::Strict;
        for (from, to) in [
            (OrderStatus::Confirmed, OrderStatus::Pending),
            (OrderStatus::Pending, OrderStatus::Shipping),
            (OrderStatus::Shipping, OrderStatus::Cancelled),
            (OrderStatus::Delivered, OrderStatus::Cancelled),
            (OrderStatus::Cancelled, OrderStatus::Pending),
        ] {
            let err = policy.check(from, to).unwrap_err();
            assert!(matches!(err, DomainError::Conflict(_)), "{from} -> {to}");
        }
    }

    #[test]
    fn strict_policy_freezes_lines_of_finished_orders() {
        let policy = TransitionPolicy::Strict;
        assert!(policy.ensure_lines_mutable(OrderStatus::Shipping).is_ok());
        assert!(matches!(
            policy.ensure_lines_mutable(OrderStatus::Delivered),
            Err(DomainError::Conflict(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 1000,
            ..ProptestConfig::default()
        })]

        /// Property: normalizing a normalized status changes nothing.
        #[test]
        fn order_normalization_is_idempotent(input in ".*") {
            let once = OrderStatus::normalize(&input);
            let twice = OrderStatus::normalize(once.as_str());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn item_normalization_is_idempotent(input in ".*") {
            let once = normalize_item_status(&input).into_value();
            let twice = normalize_item_status(once.as_str()).into_value();
            prop_assert_eq!(once, twice);
        }

        /// Property: aliases are idempotent too, not just arbitrary noise.
        #[test]
        fn known_spellings_are_idempotent(
            input in prop::sample::select(vec![
                "pending", "confirmed", "processing", "shipping", "shipped",
                "delivered", "completed", "cancelled", "canceled",
            ]),
            upper in any::<bool>(),
        ) {
            let input = if upper { input.to_uppercase() } else { input.to_string() };
            let once = normalize_order_status(&input);
            prop_assert!(!once.is_fallback());
            let twice = normalize_order_status(once.value().as_str());
            prop_assert_eq!(twice, Resolution::Canonical(once.value()));
        }
    }
}
