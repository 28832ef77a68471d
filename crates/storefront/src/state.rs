//! Application state shared across handlers.
//!
//! Checkout sessions live in a moka cache with an idle TTL. A session whose
//! payment widget is open is also pinned outside the cache, so neither the
//! TTL nor the capacity bound can drop it while money may be moving.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use moka::future::Cache;
use moka::notification::RemovalCause;
use uuid::Uuid;

use crate::basket::Basket;
use crate::config::CheckoutConfig;
use crate::confirmation::ConfirmationHandler;
use crate::orders::OrderPersistence;
use crate::payment::PaymentIntentOrchestrator;
use crate::session::CheckoutSession;
use crate::validation::{Clock, SystemClock};

/// Upper bound on live checkout sessions.
const MAX_SESSIONS: u64 = 10_000;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// checkout services and the session registry.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CheckoutConfig,
    sessions: Cache<Uuid, Arc<CheckoutSession>>,
    open_payments: Mutex<HashMap<Uuid, Arc<CheckoutSession>>>,
    orchestrator: PaymentIntentOrchestrator,
    confirmation: ConfirmationHandler,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Sessions idle for longer than `config.session_idle` are evicted and
    /// their timers torn down.
    #[must_use]
    pub fn new(
        config: CheckoutConfig,
        orchestrator: PaymentIntentOrchestrator,
        persistence: OrderPersistence,
    ) -> Self {
        Self::with_clock(config, orchestrator, persistence, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`] with an explicit debounce clock.
    #[must_use]
    pub fn with_clock(
        config: CheckoutConfig,
        orchestrator: PaymentIntentOrchestrator,
        persistence: OrderPersistence,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_idle(config.session_idle)
            .eviction_listener(
                |id: Arc<Uuid>, session: Arc<CheckoutSession>, cause: RemovalCause| {
                    tracing::debug!(session = %id, ?cause, "Checkout session removed");
                    // pinned sessions are torn down once their payment settles
                    if !session.has_open_payment() {
                        session.teardown();
                    }
                },
            )
            .build();
        let confirmation = ConfirmationHandler::new(persistence, config.environment);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions,
                open_payments: Mutex::new(HashMap::new()),
                orchestrator,
                confirmation,
                clock,
            }),
        }
    }

    /// Get a reference to the checkout configuration.
    #[must_use]
    pub fn config(&self) -> &CheckoutConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn orchestrator(&self) -> &PaymentIntentOrchestrator {
        &self.inner.orchestrator
    }

    #[must_use]
    pub fn confirmation(&self) -> &ConfirmationHandler {
        &self.inner.confirmation
    }

    /// Register a new session.
    pub async fn open_session(&self, basket: Arc<dyn Basket>) -> Arc<CheckoutSession> {
        let session = CheckoutSession::start(
            basket,
            self.inner.config.debounce,
            Arc::clone(&self.inner.clock),
        );
        self.inner
            .sessions
            .insert(session.id(), Arc::clone(&session))
            .await;
        session
    }

    /// Look up a live session.
    pub async fn session(&self, id: Uuid) -> Option<Arc<CheckoutSession>> {
        if let Some(session) = self.inner.sessions.get(&id).await {
            return Some(session);
        }
        self.pinned().get(&id).cloned()
    }

    /// Re-file a session after its phase may have changed.
    ///
    /// A session with an open payment is pinned. Pinned sessions whose
    /// payment has settled are released, and torn down if the cache has
    /// already let them go.
    pub fn track(&self, session: &Arc<CheckoutSession>) {
        let mut pinned = self.pinned();
        if session.has_open_payment() {
            pinned.insert(session.id(), Arc::clone(session));
        }
        let sessions = &self.inner.sessions;
        pinned.retain(|id, held| {
            if held.has_open_payment() {
                return true;
            }
            if !sessions.contains_key(id) {
                held.teardown();
            }
            false
        });
    }

    /// Remove a session, tearing it down. Returns whether it existed.
    pub async fn close_session(&self, id: Uuid) -> bool {
        let pinned = self.pinned().remove(&id);
        match self.inner.sessions.remove(&id).await.or(pinned) {
            Some(session) => {
                session.teardown();
                true
            }
            None => false,
        }
    }

    fn pinned(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<CheckoutSession>>> {
        self.inner
            .open_payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
