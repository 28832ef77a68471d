//! Basket collaborator.
//!
//! The basket is owned elsewhere in the storefront. Checkout only reads its
//! lines and clears it once a payment has gone through.

use std::sync::{Mutex, PoisonError};

use atelier_core::BasketLine;
use rust_decimal::Decimal;

/// What checkout needs from a basket.
pub trait Basket: Send + Sync {
    /// Snapshot of the current lines.
    fn lines(&self) -> Vec<BasketLine>;

    /// Sum of line totals, VAT-inclusive.
    fn total_price(&self) -> Decimal {
        self.lines().iter().map(BasketLine::line_total).sum()
    }

    /// Remove every line.
    fn clear(&self);
}

/// Basket held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBasket {
    lines: Mutex<Vec<BasketLine>>,
}

impl InMemoryBasket {
    #[must_use]
    pub const fn new(lines: Vec<BasketLine>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Basket for InMemoryBasket {
    fn lines(&self) -> Vec<BasketLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use atelier_core::ProductId;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_total_and_clear() {
        let basket = InMemoryBasket::new(vec![
            BasketLine {
                product_id: ProductId::new("chair-1"),
                product_name: "Chair".into(),
                quantity: 2,
                unit_price: dec!(40),
                calculated_price: None,
                options: BTreeMap::new(),
            },
            BasketLine {
                product_id: ProductId::new("rug-4"),
                product_name: "Rug".into(),
                quantity: 1,
                unit_price: dec!(30),
                calculated_price: Some(dec!(35.50)),
                options: BTreeMap::new(),
            },
        ]);

        assert_eq!(basket.total_price(), dec!(115.50));
        assert_eq!(basket.lines().len(), 2);

        basket.clear();
        assert!(basket.is_empty());
        assert_eq!(basket.total_price(), Decimal::ZERO);
    }
}
