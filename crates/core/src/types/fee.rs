//! Delivery fee representation using decimal arithmetic.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A delivery fee charged by the provider.
///
/// Never negative. Remote values that are negative or unparseable are
/// rejected so the stored fee is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryFee(Decimal);

impl DeliveryFee {
    /// A zero fee.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a fee, rejecting negative amounts.
    #[must_use]
    pub fn new(amount: Decimal) -> Option<Self> {
        (!amount.is_sign_negative() || amount.is_zero()).then_some(Self(amount.normalize()))
    }

    /// Parse a fee from a provider JSON scalar (string or number).
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let amount = match value {
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok()?,
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok()?,
            _ => return None,
        };
        Self::new(amount)
    }

    /// The fee amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for DeliveryFee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_fee_rejected() {
        assert_eq!(DeliveryFee::new(Decimal::new(-500, 2)), None);
        assert!(DeliveryFee::new(Decimal::ZERO).is_some());
    }

    #[test]
    fn test_fee_from_string_and_number() {
        let from_string = DeliveryFee::from_json(&serde_json::json!(" 5000 "));
        let from_number = DeliveryFee::from_json(&serde_json::json!(5000));
        assert_eq!(from_string, from_number);
        assert_eq!(from_string.map(|f| f.amount()), Some(Decimal::new(5000, 0)));
    }

    #[test]
    fn test_fee_normalizes_trailing_zeros() {
        assert_eq!(
            DeliveryFee::from_json(&serde_json::json!("5000.00")),
            DeliveryFee::from_json(&serde_json::json!(5000))
        );
    }

    #[test]
    fn test_unparseable_fee_is_none() {
        assert_eq!(DeliveryFee::from_json(&serde_json::json!("free")), None);
        assert_eq!(DeliveryFee::from_json(&serde_json::Value::Null), None);
    }
}
