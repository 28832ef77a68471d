//! Payment intent orchestration.
//!
//! Turns a validated form and basket into exactly one authorization request.
//! Authorization is never retried here: a repeated request could reserve the
//! customer's funds twice.

mod gateway;

pub use gateway::{
    AuthorizeMetadata, AuthorizeRequest, AuthorizeResponse, CustomerPayload, HttpPaymentGateway,
    ItemPayload, PaymentGateway,
};

use std::sync::Arc;

use atelier_core::validation::is_form_valid;
use atelier_core::{BasketLine, CurrencyCode, FormData, OrderAmounts, PaymentReference, Price};
use secrecy::SecretString;
use tracing::instrument;

use crate::config::Environment;
use crate::error::{AuthorizeFailure, CheckoutError, log_failure};
use crate::net::NetworkError;

/// A client token the payment widget can be opened with.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct PaymentAuthorization {
    pub client_token: SecretString,
    /// Provider reference the order is recorded under.
    pub reference_id: PaymentReference,
    /// Amount the token was issued for, in minor units.
    pub amount: i64,
    pub currency: CurrencyCode,
}

impl std::fmt::Debug for PaymentAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentAuthorization")
            .field("client_token", &"[REDACTED]")
            .field("reference_id", &self.reference_id)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .finish()
    }
}

/// Builds authorization requests and exchanges them for client tokens.
#[derive(Clone)]
pub struct PaymentIntentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    currency: CurrencyCode,
    environment: Environment,
}

impl PaymentIntentOrchestrator {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        currency: CurrencyCode,
        environment: Environment,
    ) -> Self {
        Self {
            gateway,
            currency,
            environment,
        }
    }

    /// Build the normalized authorization request.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` if a required field fails its
    /// rule, the basket is empty or the total cannot be expressed in minor
    /// units.
    pub fn build_request(
        &self,
        form: &FormData,
        lines: &[BasketLine],
        amounts: &OrderAmounts,
    ) -> Result<AuthorizeRequest, CheckoutError> {
        if !is_form_valid(form) {
            return Err(CheckoutError::Validation(
                "form has invalid fields".to_string(),
            ));
        }
        if lines.is_empty() {
            return Err(CheckoutError::Validation("basket is empty".to_string()));
        }
        let amount = Price::new(amounts.total, self.currency)
            .minor_units()
            .filter(|cents| *cents > 0)
            .ok_or_else(|| {
                CheckoutError::Validation(format!("total {} is not chargeable", amounts.total))
            })?;

        let optional = |value: &str| {
            let value = value.trim();
            (form.needs_company_invoice && !value.is_empty()).then(|| value.to_owned())
        };

        Ok(AuthorizeRequest {
            amount,
            currency: self.currency.provider_code(),
            customer: CustomerPayload {
                first_name: form.first_name.trim().to_owned(),
                last_name: form.last_name.trim().to_owned(),
                email: form.email.trim().to_owned(),
                phone: form.phone.trim().to_owned(),
                company_name: optional(&form.company_name),
                company_tax_id: optional(&form.company_tax_id),
            },
            items: lines
                .iter()
                .map(|line| ItemPayload {
                    product_id: line.product_id.clone(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    price: line.effective_unit_price(),
                    options: line.options.clone(),
                })
                .collect(),
            metadata: AuthorizeMetadata {
                shipping_method: form.shipping_method.clone(),
                notes: form.notes.trim().to_owned(),
            },
        })
    }

    /// Request a client token for this checkout.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for an invalid form or an
    /// unchargeable basket, or
    /// `CheckoutError::Authorization` for any provider or network failure.
    #[instrument(skip_all, fields(lines = lines.len(), total = %amounts.total))]
    pub async fn authorize(
        &self,
        form: &FormData,
        lines: &[BasketLine],
        amounts: &OrderAmounts,
    ) -> Result<PaymentAuthorization, CheckoutError> {
        let request = self.build_request(form, lines, amounts)?;

        let result = match self.gateway.authorize(&request).await {
            Ok(response) => self.accept(response, &request),
            Err(e) => Err(CheckoutError::Authorization {
                failure: match e {
                    NetworkError::Timeout(_) => AuthorizeFailure::Timeout,
                    _ => AuthorizeFailure::Unreachable,
                },
                detail: e.to_string(),
            }),
        };

        if let Err(err) = &result {
            log_failure(self.environment, "authorize", err);
        }
        result
    }

    fn accept(
        &self,
        response: AuthorizeResponse,
        request: &AuthorizeRequest,
    ) -> Result<PaymentAuthorization, CheckoutError> {
        if !response.success {
            return Err(CheckoutError::Authorization {
                failure: AuthorizeFailure::Rejected,
                detail: response
                    .error
                    .unwrap_or_else(|| "provider declined without a reason".to_string()),
            });
        }

        let Some(client_token) = response.client_token.filter(|t| !t.is_empty()) else {
            return Err(CheckoutError::Authorization {
                failure: AuthorizeFailure::MissingToken,
                detail: "success response without client token".to_string(),
            });
        };

        let Some(reference_id) = response
            .reference_id
            .map(PaymentReference::new)
            .filter(PaymentReference::is_well_formed)
        else {
            return Err(CheckoutError::Authorization {
                failure: AuthorizeFailure::MissingReference,
                detail: "success response without a usable payment reference".to_string(),
            });
        };
        tracing::info!(
            payment_reference = %reference_id,
            amount = request.amount,
            "Payment authorization issued"
        );

        Ok(PaymentAuthorization {
            client_token: SecretString::from(client_token),
            reference_id,
            amount: request.amount,
            currency: self.currency,
        })
    }
}
