//! Authorization endpoint client and its wire format.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::net::{HttpClient, NetworkError};

/// Authorization request as the endpoint expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// Total in minor units (cents).
    pub amount: i64,
    /// Lowercase ISO 4217 code.
    pub currency: &'static str,
    pub customer: CustomerPayload,
    pub items: Vec<ItemPayload>,
    pub metadata: AuthorizeMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_tax_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Effective unit price, VAT-inclusive.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeMetadata {
    pub shipping_method: String,
    pub notes: String,
}

/// Authorization endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorizeResponse {
    pub success: bool,
    #[serde(alias = "clientSecret")]
    pub client_token: Option<String>,
    #[serde(alias = "paymentIntentId")]
    pub reference_id: Option<String>,
    pub error: Option<String>,
}

/// Exchanges an authorization request for a client token.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Send one authorization request. Implementations must not retry.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizeResponse, NetworkError>;
}

/// [`PaymentGateway`] backed by the checkout API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: HttpClient,
    path: String,
    timeout: Duration,
}

impl HttpPaymentGateway {
    #[must_use]
    pub fn new(client: HttpClient, config: &ApiConfig) -> Self {
        Self {
            client,
            path: config.authorize_path.clone(),
            timeout: config.authorize_timeout,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizeResponse, NetworkError> {
        match self.client.post_json(&self.path, request, self.timeout).await {
            Ok(response) => Ok(response),
            // The endpoint reports declines as 4xx with a JSON body.
            Err(NetworkError::Client { body, status }) => serde_json::from_str(&body)
                .map_err(|_| NetworkError::Client { status, body }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            amount: 13000,
            currency: "eur",
            customer: CustomerPayload {
                first_name: "Ana".into(),
                last_name: "Horvat".into(),
                email: "ana@example.hr".into(),
                phone: "091 234 5678".into(),
                company_name: None,
                company_tax_id: None,
            },
            items: vec![],
            metadata: AuthorizeMetadata {
                shipping_method: "Express delivery".into(),
                notes: String::new(),
            },
        }
    }

    fn gateway(server: &MockServer) -> HttpPaymentGateway {
        HttpPaymentGateway {
            client: HttpClient::with_base_url(server.uri().parse().unwrap(), None),
            path: "/api/create-payment-intent".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["amount"], 13000);
        assert_eq!(value["customer"]["firstName"], "Ana");
        assert!(value["customer"].get("companyName").is_none());
        assert_eq!(value["metadata"]["shippingMethod"], "Express delivery");
    }

    #[test]
    fn test_response_aliases() {
        let response: AuthorizeResponse = serde_json::from_value(json!({
            "success": true,
            "clientSecret": "pi_1_secret_2",
            "paymentIntentId": "pi_1"
        }))
        .unwrap();
        assert_eq!(response.client_token.as_deref(), Some("pi_1_secret_2"));
        assert_eq!(response.reference_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn test_authorize_posts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create-payment-intent"))
            .and(body_partial_json(json!({ "amount": 13000, "currency": "eur" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "clientToken": "tok_abc",
                "referenceId": "pi_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = gateway(&server).authorize(&request()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.client_token.as_deref(), Some("tok_abc"));
    }

    #[tokio::test]
    async fn test_decline_body_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "success": false,
                "error": "card_declined"
            })))
            .mount(&server)
            .await;

        let response = gateway(&server).authorize(&request()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("card_declined"));
    }
}
