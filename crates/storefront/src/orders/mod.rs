//! Order persistence with a primary remote write and a store fallback.
//!
//! # Paths
//!
//! 1. **Primary**: probe the order endpoint. A 404 means it is not deployed
//!    and the fallback runs straight away. Otherwise the order is POSTed with
//!    bounded, sequential retries on timeouts, transport failures, 5xx and
//!    429. A `success: false` body is a business verdict and is not retried.
//! 2. **Fallback**: synthesize `ORD-<unix-millis>-<0..999>`, insert the order
//!    row, then the item rows referencing its key.
//!
//! Guards run before either path so nothing malformed is ever written.

mod api;
mod postgres;
mod store;

pub use api::{HttpOrderApi, OrderApi, OrderRequest, OrderResponse};
pub use postgres::PgOrderStore;
pub use store::{MemoryOrderStore, NewOrder, OrderStore, StoreError, StoredOrder};

use std::sync::Arc;

use atelier_core::{
    BasketLine, FormData, OrderAmounts, OrderKey, OrderNumber, OrderStatus, PaymentReference,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::{Environment, RetryPolicy};
use crate::error::CheckoutError;
use crate::net::NetworkError;
use crate::payment::{CustomerPayload, ItemPayload};

/// Everything needed to record an order, captured at payment time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub form: FormData,
    pub lines: Vec<BasketLine>,
    pub amounts: OrderAmounts,
}

impl OrderDraft {
    #[must_use]
    pub fn new(form: FormData, lines: Vec<BasketLine>) -> Self {
        let amounts = OrderAmounts::compute(&lines, &form.shipping_method);
        Self {
            form,
            lines,
            amounts,
        }
    }
}

/// Which path recorded the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPath {
    Primary,
    Fallback,
}

/// A durably recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_number: OrderNumber,
    pub payment_reference: PaymentReference,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub path: PersistPath,
    /// Store key, for fallback writes.
    #[serde(skip)]
    pub key: Option<OrderKey>,
}

/// Why the primary path did not record the order.
#[derive(Debug, Error)]
enum PrimaryFailure {
    #[error("order endpoint not deployed")]
    NotDeployed,
    #[error("order endpoint reported success without an order id")]
    MissingOrderId,
    /// Refused, or still failing when the retry budget ran out.
    #[error("{source} (after {attempts} attempt(s))")]
    Failed {
        attempts: u32,
        #[source]
        source: CheckoutError,
    },
    /// A response that retrying cannot fix, such as a 400 or a bad body.
    #[error("order endpoint unusable: {0}")]
    Unusable(#[source] NetworkError),
}

/// Records orders, primary path first.
#[derive(Clone)]
pub struct OrderPersistence {
    api: Arc<dyn OrderApi>,
    store: Arc<dyn OrderStore>,
    retry: RetryPolicy,
    environment: Environment,
}

impl OrderPersistence {
    #[must_use]
    pub fn new(
        api: Arc<dyn OrderApi>,
        store: Arc<dyn OrderStore>,
        retry: RetryPolicy,
        environment: Environment,
    ) -> Self {
        Self {
            api,
            store,
            retry,
            environment,
        }
    }

    /// Record an order for a completed payment.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` if a guard fails, or
    /// `CheckoutError::PersistenceExhausted` if both paths failed.
    #[instrument(skip_all, fields(payment_reference = %payment_reference))]
    pub async fn persist(
        &self,
        draft: &OrderDraft,
        payment_reference: &PaymentReference,
    ) -> Result<OrderRecord, CheckoutError> {
        guard(draft, payment_reference)?;

        let primary = match self.primary(draft, payment_reference).await {
            Ok(record) => return Ok(record),
            Err(failure) => failure,
        };
        if self.environment.is_production() {
            tracing::warn!("Primary order write unavailable, using fallback store");
        } else {
            tracing::warn!(reason = %primary, "Primary order write unavailable, using fallback store");
        }

        match self.fallback(draft, payment_reference).await {
            Ok(record) => Ok(record),
            Err(fallback) => {
                tracing::error!(
                    payment_reference = %payment_reference,
                    primary = %primary,
                    fallback = %fallback,
                    "Order could not be recorded; manual intervention required"
                );
                sentry::capture_message(
                    &format!("Order for payment {payment_reference} was not recorded"),
                    sentry::Level::Error,
                );
                Err(CheckoutError::PersistenceExhausted {
                    primary: primary.to_string(),
                    fallback: fallback.to_string(),
                })
            }
        }
    }

    async fn primary(
        &self,
        draft: &OrderDraft,
        payment_reference: &PaymentReference,
    ) -> Result<OrderRecord, PrimaryFailure> {
        match self.api.probe().await {
            Ok(()) => {}
            Err(NetworkError::NotFound) => return Err(PrimaryFailure::NotDeployed),
            // Only a 404 is a verdict; anything else still gets a write attempt.
            Err(e) => tracing::debug!(error = %e, "Order endpoint probe failed"),
        }

        let request = order_request(draft, payment_reference);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.submit(&request).await {
                Ok(response) if response.success => {
                    let order_number = response
                        .order_id
                        .filter(OrderNumber::is_well_formed)
                        .ok_or(PrimaryFailure::MissingOrderId)?;
                    tracing::info!(order_id = %order_number, attempt, "Order recorded");
                    return Ok(OrderRecord {
                        order_number,
                        payment_reference: payment_reference.clone(),
                        status: OrderStatus::Received,
                        created_at: Utc::now(),
                        path: PersistPath::Primary,
                        key: None,
                    });
                }
                Ok(response) => {
                    return Err(PrimaryFailure::Failed {
                        attempts: attempt,
                        source: CheckoutError::BusinessLogic(
                            response.message.unwrap_or_default(),
                        ),
                    });
                }
                Err(NetworkError::NotFound) => return Err(PrimaryFailure::NotDeployed),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(attempt, error = %e, "Order write failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(PrimaryFailure::Failed {
                        attempts: attempt,
                        source: CheckoutError::TransientNetwork(e),
                    });
                }
                Err(e) => return Err(PrimaryFailure::Unusable(e)),
            }
        }
    }

    async fn fallback(
        &self,
        draft: &OrderDraft,
        payment_reference: &PaymentReference,
    ) -> Result<OrderRecord, StoreError> {
        let created_at = Utc::now();
        let order_number = synthesize_order_number(created_at);
        let key = self
            .store
            .insert_order(&NewOrder {
                order_number: &order_number,
                payment_reference,
                status: OrderStatus::Received,
                created_at,
                draft,
            })
            .await?;

        if let Err(e) = self.store.insert_items(key, &draft.lines).await {
            tracing::error!(
                order_id = %order_number,
                order_key = %key,
                payment_reference = %payment_reference,
                error = %e,
                "Order row written without items; manual intervention required"
            );
            sentry::capture_message(
                &format!("Order {order_number} was stored without its items"),
                sentry::Level::Error,
            );
            return Err(e);
        }

        tracing::info!(order_id = %order_number, order_key = %key, "Order recorded in fallback store");
        Ok(OrderRecord {
            order_number,
            payment_reference: payment_reference.clone(),
            status: OrderStatus::Received,
            created_at,
            path: PersistPath::Fallback,
            key: Some(key),
        })
    }
}

/// Client-side order number: `ORD-<unix-millis>-<0..999>`.
#[must_use]
pub fn synthesize_order_number(now: DateTime<Utc>) -> OrderNumber {
    let suffix: u16 = rand::rng().random_range(0..1000);
    OrderNumber::new(format!("ORD-{}-{suffix}", now.timestamp_millis()))
}

fn guard(draft: &OrderDraft, payment_reference: &PaymentReference) -> Result<(), CheckoutError> {
    if !payment_reference.is_well_formed() {
        return Err(CheckoutError::Validation(
            "payment reference is malformed".to_string(),
        ));
    }
    if draft.lines.is_empty() {
        return Err(CheckoutError::Validation("order has no items".to_string()));
    }
    for line in &draft.lines {
        if !line.product_id.is_well_formed() {
            return Err(CheckoutError::Validation(format!(
                "product id {:?} is malformed",
                line.product_id.as_str()
            )));
        }
        if line.product_name.trim().is_empty() {
            return Err(CheckoutError::Validation(format!(
                "product {} has no name",
                line.product_id
            )));
        }
        if line.quantity == 0 {
            return Err(CheckoutError::Validation(format!(
                "product {} has quantity 0",
                line.product_id
            )));
        }
        let negative = line.unit_price < Decimal::ZERO
            || line.calculated_price.is_some_and(|p| p < Decimal::ZERO);
        if negative {
            return Err(CheckoutError::Validation(format!(
                "product {} has a negative price",
                line.product_id
            )));
        }
    }
    Ok(())
}

fn order_request(draft: &OrderDraft, payment_reference: &PaymentReference) -> OrderRequest {
    let form = &draft.form;
    let invoice = |value: &str| {
        let value = value.trim();
        (form.needs_company_invoice && !value.is_empty()).then(|| value.to_owned())
    };

    OrderRequest {
        payment_reference: payment_reference.clone(),
        customer: CustomerPayload {
            first_name: form.first_name.trim().to_owned(),
            last_name: form.last_name.trim().to_owned(),
            email: form.email.trim().to_owned(),
            phone: form.phone.trim().to_owned(),
            company_name: invoice(&form.company_name),
            company_tax_id: invoice(&form.company_tax_id),
        },
        items: draft
            .lines
            .iter()
            .map(|line| ItemPayload {
                product_id: line.product_id.clone(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.effective_unit_price(),
                options: line.options.clone(),
            })
            .collect(),
        notes: form.notes.trim().to_owned(),
        shipping_method: form.shipping_method.clone(),
        billing_address: form.billing_address(),
        shipping_address: form.delivery_address(),
        total_amount: draft.amounts.total,
        tax_amount: draft.amounts.vat,
        shipping_cost: draft.amounts.shipping,
    }
}
