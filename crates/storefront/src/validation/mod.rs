//! Real-time validation for the checkout form.
//!
//! - [`engine`] - per-field `Idle/Pending/Done` state machine and form validity
//! - [`clock`] - injectable time source
//! - [`driver`] - background task that fires debounce deadlines

pub mod clock;
pub mod driver;
pub mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{DebounceDriver, DebounceTarget};
pub use engine::{FieldState, ValidationEngine};
