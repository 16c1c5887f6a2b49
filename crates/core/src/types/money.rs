//! Rupee amounts using decimal arithmetic.
//!
//! The shop trades in a single currency (INR), so [`Money`] is a thin
//! wrapper around [`Decimal`] with Indian digit grouping for display
//! (`₹1,23,456`).
//!
//! Arithmetic saturates instead of overflowing: amounts can come from a
//! client (cookies, invoice requests) and must never panic a handler.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// An amount of Indian rupees.
///
/// Serializes as a decimal string and deserializes from either a string or
/// a JSON number, since legacy catalog records stored prices as numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero rupees.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a price column can hold (`NUMERIC(12,2)`):
    /// ₹99,99,99,99,999.99.
    pub const LIMIT: Self = Self(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole rupees.
    #[must_use]
    pub fn from_rupees(rupees: i64) -> Self {
        Self(Decimal::from(rupees))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether the amount is larger than [`Money::LIMIT`].
    #[must_use]
    pub fn exceeds_limit(&self) -> bool {
        *self > Self::LIMIT
    }

    /// Whether the amount is neither negative nor above `max`.
    #[must_use]
    pub fn is_within(&self, max: Self) -> bool {
        !self.is_negative() && *self <= max
    }

    /// Sum, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Amount multiplied by a line quantity, or `None` on overflow.
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(quantity)).map(Self)
    }

    /// Amount multiplied by a line quantity, saturating on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        self.checked_times(quantity)
            .unwrap_or_else(|| Self::saturated(self.is_negative()))
    }

    const fn saturated(negative: bool) -> Self {
        if negative { Self(Decimal::MIN) } else { Self(Decimal::MAX) }
    }

    /// Display with no fraction digits, e.g. `₹1,299`.
    ///
    /// Used on shop and cart pages.
    #[must_use]
    pub fn display(&self) -> String {
        self.format_with(0)
    }

    /// Display with paise, e.g. `₹1,299.00`.
    ///
    /// Used in order management.
    #[must_use]
    pub fn display_exact(&self) -> String {
        self.format_with(2)
    }

    /// Plain ASCII rendering for documents whose fonts lack the rupee sign,
    /// e.g. `Rs. 1299`.
    #[must_use]
    pub fn display_ascii(&self) -> String {
        format!("Rs. {}", self.0.normalize())
    }

    fn format_with(&self, fraction_digits: u32) -> String {
        let rounded = self
            .0
            .round_dp_with_strategy(fraction_digits, RoundingStrategy::MidpointAwayFromZero);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        let precision = fraction_digits as usize;
        let text = format!("{:.precision$}", rounded.abs());
        let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

        let mut out = format!("{sign}₹{}", group_indian(whole));
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(fraction);
        }
        out
    }
}

/// Group digits the Indian way: the last three together, then pairs.
fn group_indian(digits: &str) -> String {
    let mut reversed: Vec<char> = Vec::with_capacity(digits.len() + digits.len() / 2);
    for (i, c) in digits.chars().rev().enumerate() {
        if i == 3 || (i > 3 && (i - 3) % 2 == 0) {
            reversed.push(',');
        }
        reversed.push(c);
    }
    reversed.into_iter().rev().collect()
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.checked_add(rhs)
            .unwrap_or_else(|| Self::saturated(rhs.is_negative()))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        self.times(rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_group_indian() {
        assert_eq!(group_indian("0"), "0");
        assert_eq!(group_indian("999"), "999");
        assert_eq!(group_indian("1000"), "1,000");
        assert_eq!(group_indian("123456"), "1,23,456");
        assert_eq!(group_indian("1234567"), "12,34,567");
        assert_eq!(group_indian("123456789"), "12,34,56,789");
    }

    #[test]
    fn test_display_rounds_to_whole_rupees() {
        assert_eq!(money("1299").display(), "₹1,299");
        assert_eq!(money("1299.5").display(), "₹1,300");
        assert_eq!(money("0").display(), "₹0");
        assert_eq!(money("-45").display(), "-₹45");
    }

    #[test]
    fn test_display_exact() {
        assert_eq!(money("1299").display_exact(), "₹1,299.00");
        assert_eq!(money("123456.789").display_exact(), "₹1,23,456.79");
    }

    #[test]
    fn test_display_ascii() {
        assert_eq!(money("1299.00").display_ascii(), "Rs. 1299");
        assert_eq!(money("49.50").display_ascii(), "Rs. 49.5");
    }

    #[test]
    fn test_arithmetic() {
        let total: Money = [money("100"), money("49.5")].into_iter().sum();
        assert_eq!(total, money("149.5"));
        assert_eq!(money("250") * 3, money("750"));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = money("79228162514264337593543950335");
        assert_eq!(huge + money("999"), Money::new(Decimal::MAX));
        assert_eq!(huge.times(3), Money::new(Decimal::MAX));
        assert_eq!(huge.checked_add(money("1")), None);
        assert_eq!(huge.checked_times(2), None);

        let mut total = Money::ZERO;
        total += huge;
        total += huge;
        assert_eq!(total, Money::new(Decimal::MAX));
    }

    #[test]
    fn test_limit() {
        assert_eq!(Money::LIMIT, money("9999999999.99"));
        assert!(!Money::LIMIT.exceeds_limit());
        assert!(money("10000000000").exceeds_limit());
        assert!(money("100").is_within(money("100")));
        assert!(!money("-1").is_within(money("100")));
        assert!(!money("100.01").is_within(money("100")));
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let from_number: Money = serde_json::from_str("799").unwrap();
        let from_string: Money = serde_json::from_str("\"799\"").unwrap();
        assert_eq!(from_number, from_string);
    }
}
