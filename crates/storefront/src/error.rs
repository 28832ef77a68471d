//! Checkout error taxonomy and HTTP error handling with Sentry integration.
//!
//! [`CheckoutError`] is what services return. [`ApiError`] is what route
//! handlers return; it captures server-class errors to Sentry before
//! responding and only ever sends text from the [`MessageKey`] table.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::Environment;
use crate::net::NetworkError;

/// Why an authorization request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeFailure {
    /// The provider answered `success: false`.
    Rejected,
    /// The provider answered success but without a client token.
    MissingToken,
    /// The provider answered success but without a payment reference.
    MissingReference,
    /// The endpoint timed out.
    Timeout,
    /// The endpoint could not be reached or answered with an error status.
    Unreachable,
}

/// Errors produced by the checkout pipeline.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Field- or form-level validation failed. Nothing was sent anywhere.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The payment provider did not hand out a client token.
    #[error("Authorization failed ({failure:?}): {detail}")]
    Authorization {
        failure: AuthorizeFailure,
        detail: String,
    },

    /// Timeout, transport failure, 5xx or 429 from the order endpoint.
    #[error("Transient network failure: {0}")]
    TransientNetwork(#[source] NetworkError),

    /// Well-formed response that refused the request.
    #[error("Request refused: {0}")]
    BusinessLogic(String),

    /// Neither the primary nor the fallback write succeeded.
    #[error("Order persistence exhausted; primary: {primary}; fallback: {fallback}")]
    PersistenceExhausted { primary: String, fallback: String },
}

impl CheckoutError {
    /// The user-facing message for this error.
    #[must_use]
    pub const fn message_key(&self) -> MessageKey {
        match self {
            Self::Validation(_) => MessageKey::InvalidForm,
            Self::Authorization {
                failure: AuthorizeFailure::Rejected,
                ..
            } => MessageKey::PaymentDeclined,
            Self::Authorization { .. } | Self::TransientNetwork(_) => {
                MessageKey::PaymentUnavailable
            }
            Self::BusinessLogic(_) => MessageKey::RequestRefused,
            Self::PersistenceExhausted { .. } => MessageKey::ContactSupport,
        }
    }
}

/// Fixed table of user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    InvalidForm,
    EmptyBasket,
    PaymentDeclined,
    PaymentUnavailable,
    PaymentFailed,
    RequestRefused,
    ContactSupport,
    OrderConfirmed,
    SessionNotFound,
    SubmissionInProgress,
    NotCompleted,
    BadRequest,
    Internal,
}

impl MessageKey {
    /// The text shown to the customer.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::InvalidForm => "Please correct the highlighted fields.",
            Self::EmptyBasket => "Your basket is empty.",
            Self::PaymentDeclined => {
                "Your payment could not be authorized. Please check your details and try again."
            }
            Self::PaymentUnavailable => {
                "Payment is temporarily unavailable. Please try again in a few minutes."
            }
            Self::PaymentFailed => "The payment did not go through. You have not been charged.",
            Self::RequestRefused => "We could not process this request.",
            Self::ContactSupport => {
                "Your payment was successful, but we could not record your order. Please contact support with your payment reference."
            }
            Self::OrderConfirmed => "Thank you! Your order has been received.",
            Self::SessionNotFound => "Your checkout session has expired. Please start again.",
            Self::SubmissionInProgress => "Your order is already being submitted.",
            Self::NotCompleted => "This checkout has not been completed yet.",
            Self::BadRequest => "The request was not understood.",
            Self::Internal => "Something went wrong on our side. Please try again.",
        }
    }
}

/// Log a pipeline failure. Raw detail is only written outside production.
pub fn log_failure(environment: Environment, context: &'static str, err: &CheckoutError) {
    let key = err.message_key();
    if environment.is_production() {
        tracing::warn!(context, message_key = ?key, "Checkout step failed");
    } else {
        tracing::warn!(context, message_key = ?key, error = %err, "Checkout step failed");
    }
}

/// Error type returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Unknown or expired session.
    #[error("Session not found")]
    SessionNotFound,

    /// A session was requested for an empty basket.
    #[error("Basket is empty")]
    EmptyBasket,

    /// A submission is already in flight for this session.
    #[error("Submission already in progress")]
    SubmissionInProgress,

    /// The receipt was requested before the checkout completed.
    #[error("Checkout not completed")]
    NotCompleted,

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: MessageKey,
    message: &'static str,
}

impl ApiError {
    const fn message_key(&self) -> MessageKey {
        match self {
            Self::Checkout(err) => err.message_key(),
            Self::EmptyBasket => MessageKey::EmptyBasket,
            Self::SessionNotFound => MessageKey::SessionNotFound,
            Self::SubmissionInProgress => MessageKey::SubmissionInProgress,
            Self::NotCompleted => MessageKey::NotCompleted,
            Self::BadRequest(_) => MessageKey::BadRequest,
            Self::Internal(_) => MessageKey::Internal,
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(CheckoutError::Validation(_) | CheckoutError::BusinessLogic(_))
            | Self::EmptyBasket => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Checkout(
                CheckoutError::Authorization { .. } | CheckoutError::TransientNetwork(_),
            ) => StatusCode::BAD_GATEWAY,
            Self::Checkout(CheckoutError::PersistenceExhausted { .. }) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::SubmissionInProgress | Self::NotCompleted => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let key = self.message_key();
        let body = ErrorBody {
            code: key,
            message: key.text(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Add a breadcrumb for checkout actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            get_status(CheckoutError::Validation("email".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(
                CheckoutError::Authorization {
                    failure: AuthorizeFailure::Rejected,
                    detail: "card_declined".into(),
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(get_status(ApiError::SessionNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(ApiError::SubmissionInProgress),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(ApiError::NotCompleted), StatusCode::CONFLICT);
        assert_eq!(
            get_status(ApiError::Internal("pool".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_keys() {
        let declined = CheckoutError::Authorization {
            failure: AuthorizeFailure::Rejected,
            detail: String::new(),
        };
        assert_eq!(declined.message_key(), MessageKey::PaymentDeclined);

        let timeout = CheckoutError::Authorization {
            failure: AuthorizeFailure::Timeout,
            detail: String::new(),
        };
        assert_eq!(timeout.message_key(), MessageKey::PaymentUnavailable);

        let unreferenced = CheckoutError::Authorization {
            failure: AuthorizeFailure::MissingReference,
            detail: String::new(),
        };
        assert_eq!(unreferenced.message_key(), MessageKey::PaymentUnavailable);

        let refused = CheckoutError::BusinessLogic("basket changed".into());
        assert_eq!(refused.message_key(), MessageKey::RequestRefused);

        let exhausted = CheckoutError::PersistenceExhausted {
            primary: "503".into(),
            fallback: "pool timed out".into(),
        };
        assert_eq!(exhausted.message_key(), MessageKey::ContactSupport);
        assert!(MessageKey::ContactSupport.text().contains("payment reference"));
    }

    #[tokio::test]
    async fn test_body_never_contains_raw_detail() {
        let err: ApiError = CheckoutError::Authorization {
            failure: AuthorizeFailure::Rejected,
            detail: "stripe: card_declined insufficient_funds".into(),
        }
        .into();
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("payment_declined"));
        assert!(!text.contains("insufficient_funds"));
    }
}
