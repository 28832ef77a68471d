//! Checkout JSON API.
//!
//! Field edits, blurs and toggles feed the session's validation engine.
//! `submit` requests a client token for the payment widget, and `payment`
//! reports what the widget did with it.

use std::sync::Arc;

use atelier_core::{BasketLine, Field, Toggle};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::basket::InMemoryBasket;
use crate::confirmation::{CompletionOutcome, PaymentResult};
use crate::error::{ApiError, Result, add_breadcrumb};
use crate::session::{CheckoutSession, SessionSnapshot, SubmitOutcome};
use crate::state::AppState;
use crate::validation::FieldState;

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<CheckoutSession>> {
    state.session(id).await.ok_or(ApiError::SessionNotFound)
}

fn parse_field(raw: &str) -> Result<Field> {
    raw.parse().map_err(ApiError::BadRequest)
}

/// Request to open a checkout.
#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub lines: Vec<BasketLine>,
}

/// POST /checkout
///
/// # Errors
///
/// Returns `ApiError::EmptyBasket` if no lines are given.
#[instrument(skip_all, fields(lines = body.lines.len()))]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSession>,
) -> Result<impl IntoResponse> {
    if body.lines.is_empty() {
        return Err(ApiError::EmptyBasket);
    }
    let session = state
        .open_session(Arc::new(InMemoryBasket::new(body.lines)))
        .await;
    tracing::info!(session = %session.id(), "Checkout session opened");
    Ok((StatusCode::CREATED, Json(session.snapshot())))
}

/// GET /checkout/{id}
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` for an unknown session.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(find_session(&state, id).await?.snapshot()))
}

/// New value of a text field.
#[derive(Debug, Deserialize)]
pub struct FieldChange {
    pub value: String,
}

/// PUT /checkout/{id}/fields/{field}
///
/// Accepted straight away; the verdict arrives after the debounce window.
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` or `ApiError::BadRequest` for an
/// unknown field.
pub async fn change_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(Uuid, String)>,
    Json(body): Json<FieldChange>,
) -> Result<StatusCode> {
    let field = parse_field(&field)?;
    find_session(&state, id).await?.change_field(field, &body.value);
    Ok(StatusCode::ACCEPTED)
}

/// POST /checkout/{id}/fields/{field}/blur
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` or `ApiError::BadRequest` for an
/// unknown field.
pub async fn blur_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(Uuid, String)>,
) -> Result<Json<FieldState>> {
    let field = parse_field(&field)?;
    let session = find_session(&state, id).await?;
    session.blur_field(field);
    let snapshot = session.snapshot();
    Ok(Json(snapshot.fields.get(&field).cloned().unwrap_or_default()))
}

/// New value of a checkbox.
#[derive(Debug, Deserialize)]
pub struct ToggleChange {
    pub enabled: bool,
}

/// PUT /checkout/{id}/toggles/{toggle}
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` or `ApiError::BadRequest` for an
/// unknown toggle.
pub async fn set_toggle(
    State(state): State<AppState>,
    Path((id, toggle)): Path<(Uuid, String)>,
    Json(body): Json<ToggleChange>,
) -> Result<Json<SessionSnapshot>> {
    let toggle: Toggle = toggle.parse().map_err(ApiError::BadRequest)?;
    let session = find_session(&state, id).await?;
    session.set_toggle(toggle, body.enabled);
    Ok(Json(session.snapshot()))
}

/// What the browser needs to open the payment widget.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetHandoff {
    pub client_token: String,
    pub public_key: String,
    pub reference_id: String,
    pub amount: i64,
    pub currency: &'static str,
}

/// POST /checkout/{id}/submit
///
/// # Errors
///
/// Returns `ApiError::SubmissionInProgress` while a submission is pending
/// or the widget is open, and `ApiError::Checkout` for validation and
/// authorization failures.
#[instrument(skip(state))]
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WidgetHandoff>> {
    let session = find_session(&state, id).await?;
    let session_id = id.to_string();
    add_breadcrumb("checkout", "Submit", Some(&[("session", session_id.as_str())]));

    match session.submit(state.orchestrator()).await? {
        SubmitOutcome::WidgetReady(authorization) => {
            state.track(&session);
            Ok(Json(WidgetHandoff {
                client_token: authorization.client_token.expose_secret().to_owned(),
                public_key: state.config().payment.public_key.clone(),
                reference_id: authorization.reference_id.as_str().to_owned(),
                amount: authorization.amount,
                currency: authorization.currency.provider_code(),
            }))
        }
        SubmitOutcome::AlreadyInFlight => Err(ApiError::SubmissionInProgress),
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// POST /checkout/{id}/cancel
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` for an unknown session.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>> {
    let session = find_session(&state, id).await?;
    let cancelled = session.cancel();
    state.track(&session);
    Ok(Json(CancelResponse { cancelled }))
}

/// POST /checkout/{id}/payment
///
/// # Errors
///
/// Returns `ApiError::BadRequest` if no payment is open, or
/// `ApiError::SubmissionInProgress` while an earlier result is being recorded.
#[instrument(skip(state, result))]
pub async fn payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(result): Json<PaymentResult>,
) -> Result<Json<CompletionOutcome>> {
    let session = find_session(&state, id).await?;
    let outcome = session.complete_payment(result, state.confirmation()).await;
    state.track(&session);
    Ok(Json(outcome?))
}

/// GET /checkout/{id}/receipt
///
/// # Errors
///
/// Returns `ApiError::NotCompleted` before the payment has gone through.
pub async fn receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionOutcome>> {
    find_session(&state, id)
        .await?
        .outcome()
        .map(Json)
        .ok_or(ApiError::NotCompleted)
}

/// DELETE /checkout/{id}
///
/// # Errors
///
/// Returns `ApiError::SessionNotFound` for an unknown session.
pub async fn close(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if state.close_session(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound)
    }
}
