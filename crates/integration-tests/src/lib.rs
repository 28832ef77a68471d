//! End-to-end harness for the checkout pipeline.
//!
//! [`TestContext`] serves the real router on an ephemeral port, pointed at a
//! `wiremock` stand-in for the checkout API and an in-memory fallback store.
//! Tests drive it over HTTP the way the browser does.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::Arc;

use atelier_storefront::config::CheckoutConfig;
use atelier_storefront::net::HttpClient;
use atelier_storefront::orders::{HttpOrderApi, MemoryOrderStore, OrderPersistence, OrderStore};
use atelier_storefront::payment::{HttpPaymentGateway, PaymentIntentOrchestrator};
use atelier_storefront::routes;
use atelier_storefront::state::AppState;
use reqwest::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUTHORIZE_PATH: &str = "/api/create-payment-intent";
pub const ORDER_PATH: &str = "/api/orders";

/// A running checkout service and its collaborators.
pub struct TestContext {
    /// Stand-in for the remote checkout API.
    pub api: MockServer,
    /// Fallback order store.
    pub store: Arc<MemoryOrderStore>,
    pub client: reqwest::Client,
    base_url: String,
}

impl TestContext {
    /// Start a service with a 10 ms retry delay and a 50 ms debounce.
    pub async fn start() -> Self {
        let api = MockServer::start().await;
        let api_url = api.uri();
        let config = CheckoutConfig::from_lookup(|key| {
            match key {
                "STOREFRONT_DATABASE_URL" => Some("postgres://localhost/atelier_test"),
                "PAYMENT_PUBLIC_KEY" => Some("pk_test_integration"),
                "CHECKOUT_API_BASE_URL" => Some(api_url.as_str()),
                "CHECKOUT_DEBOUNCE_MS" => Some("50"),
                "ORDER_RETRY_DELAY_MS" => Some("10"),
                _ => None,
            }
            .map(str::to_owned)
        })
        .unwrap();

        let http = HttpClient::new(&config.api);
        let store = Arc::new(MemoryOrderStore::new());
        let fallback: Arc<dyn OrderStore> = store.clone();
        let orchestrator = PaymentIntentOrchestrator::new(
            Arc::new(HttpPaymentGateway::new(http.clone(), &config.api)),
            config.payment.currency,
            config.environment,
        );
        let persistence = OrderPersistence::new(
            Arc::new(HttpOrderApi::new(http, &config.api)),
            fallback,
            config.retry,
            config.environment,
        );
        let app = routes::routes().with_state(AppState::new(config, orchestrator, persistence));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            api,
            store,
            client: reqwest::Client::new(),
            base_url: format!("http://{addr}"),
        }
    }

    /// Send a JSON request and return the status and parsed body.
    pub async fn call(&self, verb: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let verb = reqwest::Method::from_bytes(verb.as_bytes()).unwrap();
        let mut request = self.client.request(verb, format!("{}{uri}", self.base_url));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let text = response.text().await.unwrap();
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// Open a session for one 120.00 line shipped by express delivery.
    pub async fn open_session(&self) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/checkout",
                Some(json!({
                    "lines": [{
                        "productId": "desk-120",
                        "productName": "Walnut desk",
                        "quantity": 1,
                        "unitPrice": 120.0
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_owned()
    }

    /// Type a value into a field and leave it.
    pub async fn enter(&self, id: &str, field: &str, value: &str) -> Value {
        let uri = format!("/checkout/{id}/fields/{field}");
        let (status, _) = self.call("PUT", &uri, Some(json!({ "value": value }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, state) = self.call("POST", &format!("{uri}/blur"), None).await;
        assert_eq!(status, StatusCode::OK);
        state
    }

    /// Fill every always-required field with valid values.
    pub async fn fill_valid_form(&self, id: &str) {
        for (field, value) in [
            ("firstName", "Ana"),
            ("lastName", "Horvat"),
            ("email", "ana@example.com"),
            ("phone", "+385 91 234 5678"),
            ("address", "Ilica 12"),
            ("city", "Zagreb"),
            ("postalCode", "10000"),
            ("shippingMethod", "Express delivery"),
        ] {
            let state = self.enter(id, field, value).await;
            assert_eq!(state["isValid"], true, "{field} should be valid");
        }
    }

    /// Answer authorization requests with a client token.
    pub async fn approve_authorizations(&self) {
        Mock::given(method("POST"))
            .and(path(AUTHORIZE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "clientSecret": "cs_integration",
                "paymentIntentId": "pi_integration"
            })))
            .mount(&self.api)
            .await;
    }

    /// Fill the form, submit, and report a successful payment.
    pub async fn pay(&self, id: &str) -> Value {
        self.fill_valid_form(id).await;
        let (status, _) = self.call("POST", &format!("/checkout/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, outcome) = self
            .call(
                "POST",
                &format!("/checkout/{id}/payment"),
                Some(json!({ "status": "succeeded", "paymentReference": "pi_integration" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        outcome
    }

    /// Requests the mock API received for a method and path.
    pub async fn received(&self, verb: &str, route: &str) -> usize {
        self.api
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == verb && request.url.path() == route)
            .count()
    }
}
