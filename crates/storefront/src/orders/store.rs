//! Fallback order store.
//!
//! The fallback path writes an order in two steps: the order row first, to
//! obtain its key, then the item rows referencing it. There is no transaction
//! spanning both, so callers must treat "order written, items failed" as its
//! own outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use atelier_core::{BasketLine, OrderKey, OrderNumber, OrderStatus, PaymentReference};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use super::OrderDraft;

/// Errors from the fallback store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Data in the store violates an invariant.
    #[error("Data corruption: {0}")]
    DataCorruption(String),
}

/// Order row to insert.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a OrderNumber,
    pub payment_reference: &'a PaymentReference,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub draft: &'a OrderDraft,
}

/// Structured store the fallback path writes to.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order row and return its generated key.
    async fn insert_order(&self, order: &NewOrder<'_>) -> Result<OrderKey, StoreError>;

    /// Insert item rows referencing an inserted order.
    async fn insert_items(&self, order: OrderKey, lines: &[BasketLine]) -> Result<(), StoreError>;
}

/// Order row as held by [`MemoryOrderStore`].
#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub key: OrderKey,
    pub order_number: OrderNumber,
    pub payment_reference: PaymentReference,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub draft: OrderDraft,
    pub items: Vec<BasketLine>,
}

/// In-memory [`OrderStore`] for development and tests.
///
/// Either write can be made to fail to exercise the partial-write paths.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<BTreeMap<i64, StoredOrder>>>,
    next_key: AtomicI64,
    fail_orders: AtomicBool,
    fail_items: AtomicBool,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent order inserts fail.
    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent item inserts fail.
    pub fn fail_items(&self, fail: bool) {
        self.fail_items.store(fail, Ordering::SeqCst);
    }

    /// Every stored order, by key.
    pub async fn orders(&self) -> Vec<StoredOrder> {
        self.orders.read().await.values().cloned().collect()
    }

    /// Look up an order by its number.
    pub async fn find(&self, order_number: &OrderNumber) -> Option<StoredOrder> {
        self.orders
            .read()
            .await
            .values()
            .find(|order| &order.order_number == order_number)
            .cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, order: &NewOrder<'_>) -> Result<OrderKey, StoreError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order insert rejected".to_string()));
        }

        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|existing| &existing.order_number == order.order_number)
        {
            return Err(StoreError::Unavailable(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }

        let key = OrderKey::new(self.next_key.fetch_add(1, Ordering::SeqCst) + 1);
        orders.insert(
            key.as_i64(),
            StoredOrder {
                key,
                order_number: order.order_number.clone(),
                payment_reference: order.payment_reference.clone(),
                status: order.status,
                created_at: order.created_at,
                draft: order.draft.clone(),
                items: Vec::new(),
            },
        );
        Ok(key)
    }

    async fn insert_items(&self, order: OrderKey, lines: &[BasketLine]) -> Result<(), StoreError> {
        if self.fail_items.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("item insert rejected".to_string()));
        }

        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.as_i64()).ok_or_else(|| {
            StoreError::DataCorruption(format!("items reference unknown order {order}"))
        })?;
        stored.items.extend_from_slice(lines);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use atelier_core::{FormData, ProductId};
    use rust_decimal_macros::dec;

    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft::new(
            FormData::default(),
            vec![BasketLine {
                product_id: ProductId::new("stool-2"),
                product_name: "Stool".into(),
                quantity: 1,
                unit_price: dec!(80),
                calculated_price: None,
                options: BTreeMap::new(),
            }],
        )
    }

    #[tokio::test]
    async fn test_two_step_write() {
        let store = MemoryOrderStore::new();
        let draft = draft();
        let number = OrderNumber::new("ORD-1-1");
        let reference = PaymentReference::new("pi_1");
        let order = NewOrder {
            order_number: &number,
            payment_reference: &reference,
            status: OrderStatus::Received,
            created_at: Utc::now(),
            draft: &draft,
        };

        let key = store.insert_order(&order).await.unwrap();
        store.insert_items(key, &draft.lines).await.unwrap();

        let stored = store.find(&number).await.unwrap();
        assert_eq!(stored.key, key);
        assert_eq!(stored.items.len(), 1);
        assert!(store.insert_order(&order).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryOrderStore::new();
        let draft = draft();
        let number = OrderNumber::new("ORD-2-2");
        let reference = PaymentReference::new("pi_2");
        let order = NewOrder {
            order_number: &number,
            payment_reference: &reference,
            status: OrderStatus::Received,
            created_at: Utc::now(),
            draft: &draft,
        };

        store.fail_items(true);
        let key = store.insert_order(&order).await.unwrap();
        assert!(matches!(
            store.insert_items(key, &draft.lines).await,
            Err(StoreError::Unavailable(_))
        ));

        store.fail_orders(true);
        assert!(store.insert_order(&order).await.is_err());
        assert!(matches!(
            store.insert_items(OrderKey::new(99), &[]).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
