//! Atelier Core - shared checkout types, field validation and order arithmetic.
//!
//! This crate is used by:
//! - `storefront` - the checkout service (sessions, payment, order persistence)
//! - `cli` - migrations for the fallback order store
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions. No I/O, no database
//! access, no HTTP clients. Everything here can be called from a timer, a
//! request handler or a test without setup.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, tax ids, the form and basket lines
//! - [`validation`] - Per-field validator with conditional requiredness
//! - [`receipt`] - Shipping table, order amounts and the receipt view model

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod receipt;
pub mod types;
pub mod validation;

pub use receipt::{OrderAmounts, Receipt, ShippingMethod};
pub use types::*;
pub use validation::FieldVerdict;
