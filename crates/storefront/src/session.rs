//! One customer's checkout, from first keystroke to receipt.
//!
//! A session owns the form, its validation engine, the debounce driver and
//! the submission phase. Every lock is taken and released inside a single
//! synchronous step; nothing is held across an await. When several locks are
//! needed they are taken in the order `form`, `engine`, `phase`.
//!
//! # Single flight
//!
//! `submitting` is the one gate for authorization. It is set by a
//! compare-exchange on submit and released on validation failure,
//! authorization failure, payment failure, cancel and completion. It stays
//! set while the widget is open. A submit whose request is dropped mid-flight
//! releases it too.
//!
//! Recording a paid order runs on its own task, so a caller that goes away
//! cannot leave the session half finalized.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use atelier_core::{Field, FormData, OrderAmounts, PaymentReference, Toggle};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::basket::Basket;
use crate::confirmation::{CompletionOutcome, ConfirmationHandler, PaymentResult};
use crate::error::{ApiError, CheckoutError, MessageKey, add_breadcrumb};
use crate::orders::OrderDraft;
use crate::payment::{PaymentAuthorization, PaymentIntentOrchestrator};
use crate::validation::{Clock, DebounceDriver, DebounceTarget, FieldState, ValidationEngine};

/// Where the session is in the submit/pay/confirm sequence.
#[derive(Debug)]
enum Phase {
    Editing,
    /// Widget open with this authorization, for this frozen draft.
    AwaitingPayment {
        authorization: PaymentAuthorization,
        draft: Box<OrderDraft>,
    },
    /// Payment succeeded; the order is being recorded.
    Finalizing,
    Completed(CompletionOutcome),
}

impl Phase {
    const fn name(&self) -> &'static str {
        match self {
            Self::Editing => "editing",
            Self::AwaitingPayment { .. } => "awaiting_payment",
            Self::Finalizing => "finalizing",
            Self::Completed(_) => "completed",
        }
    }
}

/// Result of a submit request.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The widget can be opened with this authorization.
    WidgetReady(PaymentAuthorization),
    /// A submission is already pending or the widget is open.
    AlreadyInFlight,
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: &'static str,
    pub form: FormData,
    pub fields: BTreeMap<Field, FieldState>,
    pub form_valid: bool,
    pub submitting: bool,
    pub summary: OrderAmounts,
}

/// A checkout session.
pub struct CheckoutSession {
    id: Uuid,
    form: Mutex<FormData>,
    engine: Mutex<ValidationEngine>,
    phase: Mutex<Phase>,
    basket: Arc<dyn Basket>,
    submitting: AtomicBool,
    wake: Arc<Notify>,
    clock: Arc<dyn Clock>,
    driver: Mutex<Option<DebounceDriver>>,
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("id", &self.id)
            .field("submitting", &self.submitting.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CheckoutSession {
    /// Create a session and start its debounce driver on the current runtime.
    #[must_use]
    pub fn start(basket: Arc<dyn Basket>, debounce: Duration, clock: Arc<dyn Clock>) -> Arc<Self> {
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            form: Mutex::new(FormData::default()),
            engine: Mutex::new(ValidationEngine::new(debounce)),
            phase: Mutex::new(Phase::Editing),
            basket,
            submitting: AtomicBool::new(false),
            wake: Arc::new(Notify::new()),
            clock,
            driver: Mutex::new(None),
        });

        let driver = DebounceDriver::spawn(
            Arc::downgrade(&session),
            Arc::clone(&session.wake),
            Arc::clone(&session.clock),
        );
        *lock(&session.driver) = Some(driver);
        session
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    /// A text field changed. Validation runs once the debounce window passes.
    pub fn change_field(&self, field: Field, value: &str) {
        let now = self.clock.now();
        {
            let mut form = lock(&self.form);
            form.set_value(field, value);
            lock(&self.engine).on_change(field, now);
        }
        self.wake.notify_one();
    }

    /// A text field lost focus.
    pub fn blur_field(&self, field: Field) {
        let form = lock(&self.form);
        lock(&self.engine).on_blur(field, &form);
    }

    /// A checkbox changed.
    pub fn set_toggle(&self, toggle: Toggle, enabled: bool) {
        let mut form = lock(&self.form);
        form.set_toggle(toggle, enabled);
        lock(&self.engine).on_toggle(toggle, &form);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let form = lock(&self.form).clone();
        let (fields, form_valid) = {
            let engine = lock(&self.engine);
            let fields = engine
                .states()
                .map(|(field, state)| (field, state.clone()))
                .collect();
            (fields, engine.is_form_valid(&form))
        };
        let phase = lock(&self.phase).name();
        let summary = OrderAmounts::compute(&self.basket.lines(), &form.shipping_method);

        SessionSnapshot {
            id: self.id,
            phase,
            form,
            fields,
            form_valid,
            submitting: self.is_submitting(),
            summary,
        }
    }

    /// Validate everything and, if the form is valid, request a client token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Checkout` for validation and authorization
    /// failures, and `ApiError::BadRequest` once the checkout has completed.
    pub async fn submit(
        &self,
        orchestrator: &PaymentIntentOrchestrator,
    ) -> Result<SubmitOutcome, ApiError> {
        if matches!(*lock(&self.phase), Phase::Completed(_)) {
            return Err(ApiError::BadRequest("checkout already completed".to_string()));
        }
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(session = %self.id, "Submit ignored, already in flight");
            return Ok(SubmitOutcome::AlreadyInFlight);
        }
        let gate = SubmitGate {
            flag: &self.submitting,
            held: true,
        };

        let (form, valid) = {
            let form = lock(&self.form);
            let valid = lock(&self.engine).validate_all(&form);
            (form.clone(), valid)
        };
        if !valid {
            return Err(CheckoutError::Validation("form has invalid fields".to_string()).into());
        }

        let lines = self.basket.lines();
        let amounts = OrderAmounts::compute(&lines, &form.shipping_method);
        add_breadcrumb("checkout", "Submitting for authorization", None);

        match orchestrator.authorize(&form, &lines, &amounts).await {
            Ok(authorization) => {
                *lock(&self.phase) = Phase::AwaitingPayment {
                    authorization: authorization.clone(),
                    draft: Box::new(OrderDraft::new(form, lines)),
                };
                gate.keep();
                Ok(SubmitOutcome::WidgetReady(authorization))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Close the widget without paying. Returns whether it was open.
    pub fn cancel(&self) -> bool {
        let mut phase = lock(&self.phase);
        if matches!(*phase, Phase::AwaitingPayment { .. }) {
            *phase = Phase::Editing;
            drop(phase);
            self.release();
            true
        } else {
            false
        }
    }

    /// Whether a payment widget is open or a paid order is being recorded.
    #[must_use]
    pub fn has_open_payment(&self) -> bool {
        matches!(
            *lock(&self.phase),
            Phase::AwaitingPayment { .. } | Phase::Finalizing
        )
    }

    /// Apply the widget's result.
    ///
    /// A repeated success after completion returns the recorded outcome
    /// without touching persistence again. A success is recorded on a
    /// detached task that finishes even if this future is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::SubmissionInProgress` while an earlier success is
    /// still being recorded, `ApiError::BadRequest` if no payment is open, or
    /// `ApiError::Internal` if the recording task died.
    pub async fn complete_payment(
        self: &Arc<Self>,
        result: PaymentResult,
        handler: &ConfirmationHandler,
    ) -> Result<CompletionOutcome, ApiError> {
        let (authorization, draft) = {
            let mut phase = lock(&self.phase);
            match std::mem::replace(&mut *phase, Phase::Finalizing) {
                Phase::AwaitingPayment {
                    authorization,
                    draft,
                } => (authorization, draft),
                Phase::Completed(outcome) => {
                    tracing::info!(session = %self.id, "Duplicate payment result ignored");
                    *phase = Phase::Completed(outcome.clone());
                    return Ok(outcome);
                }
                Phase::Finalizing => return Err(ApiError::SubmissionInProgress),
                Phase::Editing => {
                    *phase = Phase::Editing;
                    return Err(ApiError::BadRequest("no payment in progress".to_string()));
                }
            }
        };

        match result {
            PaymentResult::Failed { code, message } => {
                let outcome = handler.on_failure(code.as_deref(), message.as_deref());
                *lock(&self.phase) = Phase::Editing;
                self.release();
                Ok(outcome)
            }
            PaymentResult::Succeeded { payment_reference } => {
                let payment_reference = payment_reference
                    .filter(PaymentReference::is_well_formed)
                    .unwrap_or(authorization.reference_id);

                let session = Arc::clone(self);
                let handler = handler.clone();
                let reference = payment_reference.clone();
                let finalize = tokio::spawn(async move {
                    let outcome = handler
                        .on_success(&draft, &reference, Arc::clone(&session.basket))
                        .await;
                    session.finish(outcome.clone());
                    outcome
                });

                finalize.await.map_err(|e| {
                    tracing::error!(
                        session = %self.id,
                        error = %e,
                        "Order finalization task failed"
                    );
                    self.basket.clear();
                    self.finish(CompletionOutcome::RecordedWithSupportNotice {
                        payment_reference,
                        message: MessageKey::ContactSupport.text(),
                    });
                    ApiError::Internal(e.to_string())
                })
            }
        }
    }

    fn finish(&self, outcome: CompletionOutcome) {
        lock(&self.engine).cancel_all();
        *lock(&self.phase) = Phase::Completed(outcome);
        self.release();
    }

    /// The final outcome, once the checkout has completed.
    #[must_use]
    pub fn outcome(&self) -> Option<CompletionOutcome> {
        match &*lock(&self.phase) {
            Phase::Completed(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Stop every timer. Used when the customer navigates away or the
    /// session is evicted.
    pub fn teardown(&self) {
        lock(&self.engine).cancel_all();
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
        self.wake.notify_one();
    }

    /// Validator invocations so far.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        lock(&self.engine).evaluations()
    }

    fn release(&self) {
        self.submitting.store(false, Ordering::SeqCst);
    }
}

/// Holds the submit flag for one submission. Dropping it releases the flag
/// unless [`SubmitGate::keep`] handed it over to the open payment.
struct SubmitGate<'a> {
    flag: &'a AtomicBool,
    held: bool,
}

impl SubmitGate<'_> {
    fn keep(mut self) {
        self.held = false;
    }
}

impl Drop for SubmitGate<'_> {
    fn drop(&mut self) {
        if self.held {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

impl DebounceTarget for CheckoutSession {
    fn next_deadline(&self) -> Option<Instant> {
        lock(&self.engine).next_deadline()
    }

    fn run_due(&self) {
        let now = self.clock.now();
        let form = lock(&self.form);
        lock(&self.engine).tick(&form, now);
    }

    fn is_closed(&self) -> bool {
        lock(&self.engine).is_torn_down()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use atelier_core::{BasketLine, CurrencyCode, PaymentReference, ProductId};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::basket::InMemoryBasket;
    use crate::config::{Environment, RetryPolicy};
    use crate::net::NetworkError;
    use crate::orders::{MemoryOrderStore, OrderApi, OrderPersistence, OrderRequest, OrderResponse};
    use crate::payment::{AuthorizeRequest, AuthorizeResponse, PaymentGateway};
    use crate::validation::{ManualClock, SystemClock};

    struct SlowGateway {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<AuthorizeResponse>>,
    }

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn authorize(
            &self,
            _request: &AuthorizeRequest,
        ) -> Result<AuthorizeResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(lock(&self.replies).pop_front().unwrap_or(AuthorizeResponse {
                success: true,
                client_token: Some("tok".into()),
                reference_id: Some("pi_s".into()),
                error: None,
            }))
        }
    }

    /// Order endpoint that is not deployed, after a configurable wait.
    struct Undeployed {
        delay: Duration,
    }

    #[async_trait]
    impl OrderApi for Undeployed {
        async fn probe(&self) -> Result<(), NetworkError> {
            tokio::time::sleep(self.delay).await;
            Err(NetworkError::NotFound)
        }

        async fn submit(&self, _request: &OrderRequest) -> Result<OrderResponse, NetworkError> {
            Err(NetworkError::NotFound)
        }
    }

    fn gateway() -> Arc<SlowGateway> {
        Arc::new(SlowGateway {
            calls: AtomicUsize::new(0),
            replies: Mutex::new(VecDeque::new()),
        })
    }

    fn orchestrator(gateway: Arc<SlowGateway>) -> PaymentIntentOrchestrator {
        PaymentIntentOrchestrator::new(gateway, CurrencyCode::EUR, Environment::Development)
    }

    fn handler_with(delay: Duration, store: Arc<MemoryOrderStore>) -> ConfirmationHandler {
        ConfirmationHandler::new(
            OrderPersistence::new(
                Arc::new(Undeployed { delay }),
                store,
                RetryPolicy::default(),
                Environment::Development,
            ),
            Environment::Development,
        )
    }

    fn handler() -> ConfirmationHandler {
        handler_with(Duration::ZERO, Arc::new(MemoryOrderStore::new()))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn basket() -> Arc<InMemoryBasket> {
        Arc::new(InMemoryBasket::new(vec![BasketLine {
            product_id: ProductId::new("vase-2"),
            product_name: "Vase".into(),
            quantity: 1,
            unit_price: dec!(45),
            calculated_price: None,
            options: BTreeMap::new(),
        }]))
    }

    fn session(basket: Arc<InMemoryBasket>) -> Arc<CheckoutSession> {
        CheckoutSession::start(basket, Duration::from_millis(500), Arc::new(SystemClock))
    }

    fn fill(session: &CheckoutSession) {
        for (field, value) in [
            (Field::FirstName, "Ana"),
            (Field::LastName, "Horvat"),
            (Field::Email, "ana@example.com"),
            (Field::Phone, "+385 91 234 5678"),
            (Field::Address, "Ilica 12"),
            (Field::City, "Zagreb"),
            (Field::PostalCode, "10000"),
        ] {
            session.change_field(field, value);
            session.blur_field(field);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_change_fires_once() {
        let session = session(basket());
        for value in ["A", "An", "Ana", "Ana ", "Ana"] {
            session.change_field(Field::FirstName, value);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(session.evaluations(), 0);
        assert!(session.snapshot().fields[&Field::FirstName].is_validating);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.evaluations(), 1);
        assert!(session.snapshot().fields[&Field::FirstName].is_valid);
    }

    #[tokio::test]
    async fn test_manual_clock_drives_debounce() {
        let clock = Arc::new(ManualClock::new());
        let session = CheckoutSession::start(basket(), Duration::from_millis(500), clock.clone());

        session.change_field(Field::City, "Split");
        settle().await;
        clock.advance(Duration::from_millis(499));
        settle().await;
        assert_eq!(session.evaluations(), 0);

        clock.advance(Duration::from_millis(1));
        settle().await;
        assert_eq!(session.evaluations(), 1);
        assert!(session.snapshot().fields[&Field::City].is_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_timers() {
        let session = session(basket());
        session.change_field(Field::Email, "ana@");
        session.teardown();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.evaluations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_submit() {
        let gateway = gateway();
        let orchestrator = orchestrator(Arc::clone(&gateway));
        let session = session(basket());
        fill(&session);

        let (first, second) = tokio::join!(session.submit(&orchestrator), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.submit(&orchestrator).await
        });

        assert!(matches!(first.unwrap(), SubmitOutcome::WidgetReady(_)));
        assert!(matches!(second.unwrap(), SubmitOutcome::AlreadyInFlight));
        // widget open: still gated
        assert!(matches!(
            session.submit(&orchestrator).await.unwrap(),
            SubmitOutcome::AlreadyInFlight
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        assert!(session.cancel());
        assert!(!session.is_submitting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submit_releases_flag() {
        let gateway = gateway();
        let orchestrator = orchestrator(Arc::clone(&gateway));
        let session = session(basket());
        fill(&session);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), session.submit(&orchestrator)).await;
        assert!(abandoned.is_err());
        assert!(!session.is_submitting());
        assert_eq!(session.snapshot().phase, "editing");

        assert!(matches!(
            session.submit(&orchestrator).await.unwrap(),
            SubmitOutcome::WidgetReady(_)
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_form_releases_flag() {
        let gateway = gateway();
        let orchestrator = orchestrator(Arc::clone(&gateway));
        let session = session(basket());
        fill(&session);
        session.set_toggle(Toggle::NeedsCompanyInvoice, true);
        session.change_field(Field::CompanyName, "Atelier d.o.o.");
        session.change_field(Field::CompanyTaxId, "12345678901");

        let err = session.submit(&orchestrator).await.unwrap_err();
        assert!(matches!(err, ApiError::Checkout(CheckoutError::Validation(_))));
        assert!(!session.is_submitting());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_authorization_releases_flag() {
        let gateway = gateway();
        lock(&gateway.replies).push_back(AuthorizeResponse {
            success: false,
            error: Some("declined".into()),
            ..AuthorizeResponse::default()
        });
        let orchestrator = orchestrator(Arc::clone(&gateway));
        let session = session(basket());
        fill(&session);

        assert!(session.submit(&orchestrator).await.is_err());
        assert!(!session.is_submitting());
        assert!(matches!(
            session.submit(&orchestrator).await.unwrap(),
            SubmitOutcome::WidgetReady(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_failure_keeps_basket() {
        let orchestrator = orchestrator(gateway());
        let basket = basket();
        let session = session(Arc::clone(&basket));
        fill(&session);
        session.submit(&orchestrator).await.unwrap();

        let outcome = session
            .complete_payment(
                PaymentResult::Failed {
                    code: Some("card_declined".into()),
                    message: None,
                },
                &handler(),
            )
            .await
            .unwrap();

        assert!(!outcome.is_final());
        assert!(!basket.is_empty());
        assert!(!session.is_submitting());
        assert_eq!(session.snapshot().phase, "editing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_success_is_ignored() {
        let orchestrator = orchestrator(gateway());
        let basket = basket();
        let session = session(Arc::clone(&basket));
        fill(&session);
        session.submit(&orchestrator).await.unwrap();

        let handler = handler();
        let success = PaymentResult::Succeeded {
            payment_reference: Some(PaymentReference::new("pi_s")),
        };
        let first = session
            .complete_payment(success.clone(), &handler)
            .await
            .unwrap();
        let second = session.complete_payment(success, &handler).await.unwrap();

        assert_eq!(first, second);
        assert!(basket.is_empty());
        assert!(session.outcome().is_some());
        assert!(matches!(
            session.submit(&orchestrator).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_payment_result_still_records_order() {
        let orchestrator = orchestrator(gateway());
        let basket = basket();
        let session = session(Arc::clone(&basket));
        fill(&session);
        session.submit(&orchestrator).await.unwrap();

        let store = Arc::new(MemoryOrderStore::new());
        let handler = handler_with(Duration::from_secs(20), Arc::clone(&store));
        let success = PaymentResult::Succeeded {
            payment_reference: Some(PaymentReference::new("pi_s")),
        };

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            session.complete_payment(success.clone(), &handler),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(matches!(
            session.complete_payment(success.clone(), &handler).await,
            Err(ApiError::SubmissionInProgress)
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.orders().await.len(), 1);
        assert!(basket.is_empty());
        assert!(!session.is_submitting());
        assert_eq!(session.snapshot().phase, "completed");

        let outcome = session.complete_payment(success, &handler).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::Confirmed { .. }));
        assert_eq!(store.orders().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_widget_reference_uses_authorization() {
        let orchestrator = orchestrator(gateway());
        let session = session(basket());
        fill(&session);
        session.submit(&orchestrator).await.unwrap();

        let store = Arc::new(MemoryOrderStore::new());
        let outcome = session
            .complete_payment(
                PaymentResult::Succeeded {
                    payment_reference: Some(PaymentReference::new("")),
                },
                &handler_with(Duration::ZERO, Arc::clone(&store)),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, CompletionOutcome::Confirmed { .. }));
        let orders = store.orders().await;
        assert_eq!(orders[0].payment_reference.as_str(), "pi_s");
    }

    #[tokio::test]
    async fn test_payment_without_widget_rejected() {
        let session = session(basket());
        let result = session
            .complete_payment(
                PaymentResult::Succeeded {
                    payment_reference: None,
                },
                &handler(),
            )
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(session.snapshot().phase, "editing");
    }
}
