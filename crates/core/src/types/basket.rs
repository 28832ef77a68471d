//! Basket line items as handed over by the basket collaborator.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// One product configuration plus quantity pending purchase.
///
/// `calculated_price` is the configurator's output and wins over
/// `unit_price` whenever it is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub calculated_price: Option<Decimal>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl BasketLine {
    /// Price of a single unit, VAT-inclusive.
    #[must_use]
    pub fn effective_unit_price(&self) -> Decimal {
        self.calculated_price.unwrap_or(self.unit_price)
    }

    /// `effective_unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.effective_unit_price() * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(unit: Decimal, calculated: Option<Decimal>, quantity: u32) -> BasketLine {
        BasketLine {
            product_id: ProductId::new("chair-01"),
            product_name: "Oak chair".to_owned(),
            quantity,
            unit_price: unit,
            calculated_price: calculated,
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_calculated_price_takes_precedence() {
        let l = line(dec!(50), Some(dec!(65.50)), 2);
        assert_eq!(l.effective_unit_price(), dec!(65.50));
        assert_eq!(l.line_total(), dec!(131.00));
    }

    #[test]
    fn test_unit_price_without_configurator() {
        let l = line(dec!(19.99), None, 3);
        assert_eq!(l.line_total(), dec!(59.97));
    }

    #[test]
    fn test_deserialize_client_payload() {
        let json = serde_json::json!({
            "productId": 42,
            "productName": "Shelf",
            "quantity": 1,
            "unitPrice": 120.0,
            "options": { "wood": "walnut" }
        });
        let l: BasketLine = serde_json::from_value(json).unwrap();
        assert_eq!(l.product_id.as_str(), "42");
        assert_eq!(l.calculated_price, None);
        assert_eq!(l.options["wood"], "walnut");
        assert_eq!(l.line_total(), dec!(120));
    }
}
