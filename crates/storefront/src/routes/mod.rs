//! HTTP route handlers for the checkout service.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Health check
//!
//! # Checkout
//! POST   /checkout                             - Open a session for basket lines
//! GET    /checkout/{id}                        - Form, field states, validity, summary
//! PUT    /checkout/{id}/fields/{field}         - Field changed (debounced)
//! POST   /checkout/{id}/fields/{field}/blur    - Field blurred (immediate)
//! PUT    /checkout/{id}/toggles/{toggle}       - sameAsBilling / needsCompanyInvoice
//! POST   /checkout/{id}/submit                 - Request a client token (single flight)
//! POST   /checkout/{id}/cancel                 - Close the widget
//! POST   /checkout/{id}/payment                - Widget result
//! GET    /checkout/{id}/receipt                - Outcome after completion
//! DELETE /checkout/{id}                        - Tear the session down
//! ```

pub mod checkout;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::create))
        .route("/{id}", get(checkout::show).delete(checkout::close))
        .route("/{id}/fields/{field}", put(checkout::change_field))
        .route("/{id}/fields/{field}/blur", post(checkout::blur_field))
        .route("/{id}/toggles/{toggle}", put(checkout::set_toggle))
        .route("/{id}/submit", post(checkout::submit))
        .route("/{id}/cancel", post(checkout::cancel))
        .route("/{id}/payment", post(checkout::payment))
        .route("/{id}/receipt", get(checkout::receipt))
}

/// Create all routes for the checkout service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/checkout", checkout_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::CheckoutConfig;
    use crate::net::NetworkError;
    use crate::orders::{
        MemoryOrderStore, OrderApi, OrderPersistence, OrderRequest, OrderResponse,
    };
    use crate::payment::{
        AuthorizeRequest, AuthorizeResponse, PaymentGateway, PaymentIntentOrchestrator,
    };

    struct ApprovingGateway;

    #[async_trait]
    impl PaymentGateway for ApprovingGateway {
        async fn authorize(
            &self,
            _request: &AuthorizeRequest,
        ) -> Result<AuthorizeResponse, NetworkError> {
            Ok(AuthorizeResponse {
                success: true,
                client_token: Some("tok_route".into()),
                reference_id: Some("pi_route".into()),
                error: None,
            })
        }
    }

    struct AcceptingApi;

    #[async_trait]
    impl OrderApi for AcceptingApi {
        async fn probe(&self) -> Result<(), NetworkError> {
            Ok(())
        }

        async fn submit(&self, _request: &OrderRequest) -> Result<OrderResponse, NetworkError> {
            Ok(OrderResponse {
                success: true,
                order_id: Some("A-2001".into()),
                message: None,
            })
        }
    }

    fn app() -> Router {
        let config = CheckoutConfig::from_lookup(|key| match key {
            "STOREFRONT_DATABASE_URL" => Some("postgres://localhost/atelier".into()),
            "PAYMENT_PUBLIC_KEY" => Some("pk_test_route".into()),
            _ => None,
        })
        .unwrap();
        let orchestrator = PaymentIntentOrchestrator::new(
            Arc::new(ApprovingGateway),
            config.payment.currency,
            config.environment,
        );
        let persistence = OrderPersistence::new(
            Arc::new(AcceptingApi),
            Arc::new(MemoryOrderStore::new()),
            config.retry,
            config.environment,
        );
        routes().with_state(AppState::new(config, orchestrator, persistence))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn basket() -> Value {
        json!({
            "lines": [{
                "productId": 42,
                "productName": "Walnut desk",
                "quantity": 1,
                "unitPrice": 120.0
            }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_basket_rejected() {
        let (status, body) = call(&app(), "POST", "/checkout", Some(json!({ "lines": [] }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "empty_basket");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let uri = format!("/checkout/{}", uuid::Uuid::new_v4());
        let (status, body) = call(&app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "session_not_found");
    }

    #[tokio::test]
    async fn test_unknown_field() {
        let app = app();
        let (_, created) = call(&app, "POST", "/checkout", Some(basket())).await;
        let id = created["id"].as_str().unwrap();
        let (status, _) = call(&app, "POST", &format!("/checkout/{id}/fields/nickname/blur"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_flow() {
        let app = app();
        let (status, created) = call(&app, "POST", "/checkout", Some(basket())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["formValid"], false);
        let id = created["id"].as_str().unwrap().to_owned();

        for (field, value) in [
            ("firstName", "Ana"),
            ("lastName", "Horvat"),
            ("email", "ana@example.com"),
            ("phone", "091 234 5678"),
            ("address", "Ilica 12"),
            ("city", "Zagreb"),
            ("postalCode", "10000"),
            ("shippingMethod", "Express delivery"),
        ] {
            let uri = format!("/checkout/{id}/fields/{field}");
            let (status, _) = call(&app, "PUT", &uri, Some(json!({ "value": value }))).await;
            assert_eq!(status, StatusCode::ACCEPTED);
            let (status, state) = call(&app, "POST", &format!("{uri}/blur"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(state["isValid"], true, "{field}");
        }

        let (_, snapshot) = call(&app, "GET", &format!("/checkout/{id}"), None).await;
        assert_eq!(snapshot["formValid"], true);
        let total: rust_decimal::Decimal = snapshot["summary"]["total"].as_str().unwrap().parse().unwrap();
        assert_eq!(total, rust_decimal_macros::dec!(130));

        let (status, _) = call(&app, "GET", &format!("/checkout/{id}/receipt"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, handoff) = call(&app, "POST", &format!("/checkout/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(handoff["clientToken"], "tok_route");
        assert_eq!(handoff["publicKey"], "pk_test_route");
        assert_eq!(handoff["amount"], 13000);

        let (status, again) = call(&app, "POST", &format!("/checkout/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["code"], "submission_in_progress");

        let (status, outcome) = call(
            &app,
            "POST",
            &format!("/checkout/{id}/payment"),
            Some(json!({ "status": "succeeded", "paymentReference": "pi_route" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "confirmed");
        assert_eq!(outcome["receipt"]["orderNumber"], "A-2001");
        assert_eq!(outcome["recordedVia"], "primary");

        let (status, receipt) = call(&app, "GET", &format!("/checkout/{id}/receipt"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt, outcome);

        let (status, _) = call(&app, "DELETE", &format!("/checkout/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &format!("/checkout/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
