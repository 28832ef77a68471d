//! Handling of the payment widget's result.
//!
//! After a successful payment the basket is cleared and the customer moves
//! to the confirmation view whether or not the order could be recorded. A
//! failed write turns into a support notice carrying the payment reference,
//! never into a payment failure.

use std::sync::Arc;

use atelier_core::receipt::{self, OrderIdentity};
use atelier_core::{PaymentReference, Receipt};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::basket::Basket;
use crate::config::Environment;
use crate::error::{MessageKey, add_breadcrumb, log_failure};
use crate::orders::{OrderDraft, OrderPersistence, PersistPath};

/// What the payment widget reported.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentResult {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        /// Falls back to the reference issued with the client token.
        #[serde(default)]
        payment_reference: Option<PaymentReference>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Where the checkout ended up after the widget reported back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Paid and recorded.
    Confirmed {
        receipt: Box<Receipt>,
        #[serde(rename = "recordedVia")]
        path: PersistPath,
        message: &'static str,
    },
    /// Paid, but the order could not be recorded.
    RecordedWithSupportNotice {
        #[serde(rename = "paymentReference")]
        payment_reference: PaymentReference,
        message: &'static str,
    },
    /// The payment did not go through. The basket is untouched.
    PaymentFailed { message: &'static str },
}

impl CompletionOutcome {
    /// Whether this outcome ends the checkout.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::PaymentFailed { .. })
    }
}

/// Turns widget results into completion outcomes.
#[derive(Clone)]
pub struct ConfirmationHandler {
    persistence: OrderPersistence,
    environment: Environment,
}

impl ConfirmationHandler {
    #[must_use]
    pub const fn new(persistence: OrderPersistence, environment: Environment) -> Self {
        Self {
            persistence,
            environment,
        }
    }

    /// Record the order, then clear the basket regardless of the result.
    #[instrument(skip_all, fields(payment_reference = %payment_reference))]
    pub async fn on_success(
        &self,
        draft: &OrderDraft,
        payment_reference: &PaymentReference,
        basket: Arc<dyn Basket>,
    ) -> CompletionOutcome {
        add_breadcrumb(
            "checkout",
            "Payment succeeded",
            Some(&[("payment_reference", payment_reference.as_str())]),
        );

        let persisted = self.persistence.persist(draft, payment_reference).await;
        basket.clear();

        match persisted {
            Ok(record) => {
                let receipt = receipt::assemble(
                    &OrderIdentity {
                        order_number: &record.order_number,
                        payment_reference: &record.payment_reference,
                        status: record.status,
                        placed_at: record.created_at,
                    },
                    &draft.lines,
                    &draft.form,
                );
                tracing::info!(order_id = %record.order_number, "Checkout confirmed");
                CompletionOutcome::Confirmed {
                    receipt: Box::new(receipt),
                    path: record.path,
                    message: MessageKey::OrderConfirmed.text(),
                }
            }
            Err(err) => {
                log_failure(self.environment, "persist", &err);
                CompletionOutcome::RecordedWithSupportNotice {
                    payment_reference: payment_reference.clone(),
                    message: MessageKey::ContactSupport.text(),
                }
            }
        }
    }

    /// The widget reported a failed payment.
    pub fn on_failure(&self, code: Option<&str>, message: Option<&str>) -> CompletionOutcome {
        if self.environment.is_production() {
            tracing::warn!(code, "Payment failed");
        } else {
            tracing::warn!(code, message, "Payment failed");
        }
        CompletionOutcome::PaymentFailed {
            message: MessageKey::PaymentFailed.text(),
        }
    }
}
