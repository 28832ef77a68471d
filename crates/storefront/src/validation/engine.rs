//! Per-field debounced validation state machine.
//!
//! Each field the customer has interacted with owns one slot holding its last
//! [`FieldState`] and one timer:
//!
//! ```text
//!   change        change (restart)        deadline / blur
//! ─────────► Pending ◄──────────┐ ─────────────────────► Done
//!              └────────────────┘
//! ```
//!
//! A change moves the field to `Pending` with a fresh deadline, a blur or an
//! expired deadline evaluates it and moves it to `Done`. Timers are
//! independent, so a change restarts only that field's deadline.
//!
//! The engine never reads the clock. Callers pass `now`, which keeps it
//! deterministic under test.

use std::collections::BTreeMap;
use std::time::Duration;

use atelier_core::validation::{self, FieldVerdict};
use atelier_core::{Field, FormData, Toggle};
use serde::Serialize;
use tokio::time::Instant;

/// Validation state of one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub is_valid: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
    /// True only while a debounce deadline is pending.
    pub is_validating: bool,
    /// Set on first interaction and never cleared.
    pub touched: bool,
}

impl FieldState {
    #[must_use]
    pub const fn show_error(&self) -> bool {
        self.touched && !self.is_valid
    }

    #[must_use]
    pub const fn show_success(&self) -> bool {
        self.touched && self.is_valid && !self.is_validating
    }

    fn apply(&mut self, verdict: &FieldVerdict) {
        self.is_valid = verdict.is_valid;
        self.error = verdict.error().map(str::to_owned);
        self.warning = verdict.warning().map(str::to_owned);
        self.is_validating = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Idle,
    Pending { due: Instant },
    Done,
}

#[derive(Debug)]
struct Slot {
    state: FieldState,
    timer: Timer,
}

impl Slot {
    fn touched() -> Self {
        Self {
            state: FieldState {
                touched: true,
                ..FieldState::default()
            },
            timer: Timer::Idle,
        }
    }
}

/// Debounced validation for one checkout form.
#[derive(Debug)]
pub struct ValidationEngine {
    debounce: Duration,
    slots: BTreeMap<Field, Slot>,
    evaluations: u64,
    torn_down: bool,
}

impl ValidationEngine {
    #[must_use]
    pub const fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            slots: BTreeMap::new(),
            evaluations: 0,
            torn_down: false,
        }
    }

    /// The field's value changed. Restarts its debounce window.
    pub fn on_change(&mut self, field: Field, now: Instant) {
        if self.torn_down {
            return;
        }
        let due = now + self.debounce;
        let slot = self.slots.entry(field).or_insert_with(Slot::touched);
        slot.state.is_validating = true;
        slot.timer = Timer::Pending { due };
    }

    /// The field lost focus. Evaluates immediately and drops any pending
    /// deadline for it.
    pub fn on_blur(&mut self, field: Field, form: &FormData) {
        if self.torn_down {
            return;
        }
        self.slots.entry(field).or_insert_with(Slot::touched);
        self.evaluate(field, form);
    }

    /// A checkbox flipped. Fields whose requiredness depends on it are
    /// re-evaluated if the customer has already seen a verdict for them.
    pub fn on_toggle(&mut self, toggle: Toggle, form: &FormData) {
        if self.torn_down {
            return;
        }
        let dependents: &[Field] = match toggle {
            Toggle::SameAsBilling => &Field::SHIPPING_ADDRESS,
            Toggle::NeedsCompanyInvoice => &Field::COMPANY_INVOICE,
        };
        for &field in dependents {
            if matches!(self.slots.get(&field), Some(slot) if slot.timer == Timer::Done) {
                self.evaluate(field, form);
            }
        }
    }

    /// Evaluate every field whose deadline has passed. Returns how many ran.
    pub fn tick(&mut self, form: &FormData, now: Instant) -> usize {
        if self.torn_down {
            return 0;
        }
        let due: Vec<Field> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot.timer, Timer::Pending { due } if due <= now))
            .map(|(field, _)| *field)
            .collect();
        for field in &due {
            self.evaluate(*field, form);
        }
        due.len()
    }

    /// Cancel all deadlines and evaluate every required field now, plus any
    /// field that was still pending. Returns the resulting form validity.
    pub fn validate_all(&mut self, form: &FormData) -> bool {
        if self.torn_down {
            return false;
        }
        let mut fields = form.required_fields();
        fields.extend(
            self.slots
                .iter()
                .filter(|(_, slot)| matches!(slot.timer, Timer::Pending { .. }))
                .map(|(field, _)| *field),
        );
        fields.sort_unstable();
        fields.dedup();

        for field in fields {
            self.slots.entry(field).or_insert_with(Slot::touched);
            self.evaluate(field, form);
        }
        self.is_form_valid(form)
    }

    /// True only if every field `form` requires has a last known state that
    /// is valid.
    #[must_use]
    pub fn is_form_valid(&self, form: &FormData) -> bool {
        form.required_fields().into_iter().all(|field| {
            self.slots
                .get(&field)
                .is_some_and(|slot| slot.state.is_valid)
        })
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| match slot.timer {
                Timer::Pending { due } => Some(due),
                Timer::Idle | Timer::Done => None,
            })
            .min()
    }

    /// Cancel every timer. No evaluation is written afterwards.
    pub fn cancel_all(&mut self) {
        self.torn_down = true;
        for slot in self.slots.values_mut() {
            slot.timer = Timer::Idle;
            slot.state.is_validating = false;
        }
    }

    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    #[must_use]
    pub fn state(&self, field: Field) -> Option<&FieldState> {
        self.slots.get(&field).map(|slot| &slot.state)
    }

    /// States of every field interacted with so far.
    pub fn states(&self) -> impl Iterator<Item = (Field, &FieldState)> {
        self.slots.iter().map(|(field, slot)| (*field, &slot.state))
    }

    /// Total validator invocations.
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn evaluate(&mut self, field: Field, form: &FormData) {
        let Some(slot) = self.slots.get_mut(&field) else {
            return;
        };
        let verdict = validation::validate_current(field, form);
        slot.state.apply(&verdict);
        slot.timer = Timer::Done;
        self.evaluations += 1;
        tracing::trace!(field = %field, valid = verdict.is_valid, "Field evaluated");
    }
}
