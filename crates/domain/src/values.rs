//! Value objects shared by the cart, order and product aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a catalog product. Also the id of its stock stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<ProductId> for AggregateId {
    fn from(id: ProductId) -> Self {
        AggregateId::from_uuid(id.0)
    }
}

impl From<AggregateId> for ProductId {
    fn from(id: AggregateId) -> Self {
        Self(id.as_uuid())
    }
}

/// An amount in the currency's minor unit (cents for USD).
///
/// All arithmetic is integer; prices are never held as floats. The operators
/// saturate so folding stored events can never panic; commands validate
/// totals up front with the `checked_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Sum of `price * quantity` over `lines`, or `None` if it does not fit.
    pub fn checked_total(lines: impl IntoIterator<Item = (Money, u32)>) -> Option<Money> {
        lines.into_iter().try_fold(Money::zero(), |total, (price, quantity)| {
            total.checked_add(price.checked_multiply(quantity)?)
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

/// Product variant choices (size, colour, ...). Two cart lines for the same
/// product are the same logical item iff their options are equal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectedOptions(BTreeMap<String, String>);

impl SelectedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, String>> for SelectedOptions {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display_uses_minor_units() {
        assert_eq!(Money::from_cents(1999).to_string(), "19.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn money_sums_line_totals() {
        let total: Money = [Money::from_cents(1000).multiply(2), Money::from_cents(550)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(2550));
    }

    #[test]
    fn checked_total_rejects_amounts_that_do_not_fit() {
        let price = Money::from_cents(3_000_000_000);
        assert_eq!(price.checked_multiply(4_000_000_000), None);
        assert_eq!(
            Money::checked_total([(price, 2), (Money::from_cents(1), 1)]),
            Some(Money::from_cents(6_000_000_001))
        );
        assert_eq!(
            Money::checked_total([(Money::from_cents(i64::MAX), 1), (Money::from_cents(1), 1)]),
            None
        );

        // Folding stored events saturates instead of panicking.
        assert_eq!(price.multiply(4_000_000_000), Money::from_cents(i64::MAX));
        assert_eq!(
            Money::from_cents(i64::MAX) + Money::from_cents(1),
            Money::from_cents(i64::MAX)
        );
    }

    #[test]
    fn money_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Money::from_cents(1200)).unwrap(), "1200");
    }

    #[test]
    fn selected_options_compare_by_content_not_insertion_order() {
        let a = SelectedOptions::new().with("size", "M").with("color", "red");
        let b = SelectedOptions::new().with("color", "red").with("size", "M");
        assert_eq!(a, b);
        assert_ne!(a, SelectedOptions::new().with("size", "L").with("color", "red"));
    }

    #[test]
    fn product_id_round_trips_through_aggregate_id() {
        let product = ProductId::new();
        let aggregate: AggregateId = product.into();
        assert_eq!(ProductId::from(aggregate), product);
    }
}
