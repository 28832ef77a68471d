//! Primary order write endpoint.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::{OrderNumber, PaymentReference, PostalAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::net::{HttpClient, NetworkError};
use crate::payment::{CustomerPayload, ItemPayload};

/// Order as the primary endpoint expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub payment_reference: PaymentReference,
    pub customer: CustomerPayload,
    pub items: Vec<ItemPayload>,
    pub notes: String,
    pub shipping_method: String,
    pub billing_address: PostalAddress,
    pub shipping_address: PostalAddress,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
}

/// Primary endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderResponse {
    pub success: bool,
    #[serde(alias = "orderNumber")]
    pub order_id: Option<OrderNumber>,
    pub message: Option<String>,
}

/// The remote order write path.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Whether the endpoint is deployed. `Err(NetworkError::NotFound)` means
    /// it is not.
    async fn probe(&self) -> Result<(), NetworkError>;

    /// Submit one order write. The caller owns retries.
    async fn submit(&self, request: &OrderRequest) -> Result<OrderResponse, NetworkError>;
}

/// [`OrderApi`] backed by the checkout API.
#[derive(Clone)]
pub struct HttpOrderApi {
    client: HttpClient,
    path: String,
    timeout: Duration,
    probe_timeout: Duration,
}

impl HttpOrderApi {
    #[must_use]
    pub fn new(client: HttpClient, config: &ApiConfig) -> Self {
        Self {
            client,
            path: config.order_path.clone(),
            timeout: config.order_timeout,
            probe_timeout: config.probe_timeout,
        }
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn probe(&self) -> Result<(), NetworkError> {
        self.client
            .probe(&self.path, self.probe_timeout)
            .await
            .map(|_| ())
    }

    async fn submit(&self, request: &OrderRequest) -> Result<OrderResponse, NetworkError> {
        match self.client.post_json(&self.path, request, self.timeout).await {
            Ok(response) => Ok(response),
            // Validation refusals come back as 4xx with a JSON verdict.
            Err(NetworkError::Client { status, body }) => {
                match serde_json::from_str::<OrderResponse>(&body) {
                    Ok(response) if !response.success => Ok(response),
                    _ => Err(NetworkError::Client { status, body }),
                }
            }
            Err(e) => Err(e),
        }
    }
}
