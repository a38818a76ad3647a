//! Monetary amounts in integral minor units.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Amount in the smallest currency unit (single-currency system).
///
/// Arithmetic is checked: an overflow is reported as an invariant violation
/// instead of wrapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn amount(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow on addition"))
    }

    /// `price × quantity`.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow on multiplication"))
    }

    /// Sum a sequence of amounts, failing on overflow.
    pub fn sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn times_multiplies_minor_units() {
        assert_eq!(Money::new(100_000).times(2).unwrap(), Money::new(200_000));
        assert_eq!(Money::new(100_000).times(0).unwrap(), Money::ZERO);
    }

    #[test]
    fn overflow_is_an_invariant_violation() {
        let err = Money::new(i64::MAX).times(2).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = Money::sum([Money::new(i64::MAX), Money::new(1)]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn sum_of_nothing_is_zero() {
        assert_eq!(Money::sum(std::iter::empty()).unwrap(), Money::ZERO);
    }

    proptest! {
        #[test]
        fn sum_matches_plain_integer_sum(values in proptest::collection::vec(0i64..1_000_000_000, 0..50)) {
            let expected: i64 = values.iter().sum();
            let got = Money::sum(values.into_iter().map(Money::new)).unwrap();
            prop_assert_eq!(got.amount(), expected);
        }
    }
}
