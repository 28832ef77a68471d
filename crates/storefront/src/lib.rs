//! Atelier checkout service library.
//!
//! The checkout pipeline as a library, so the binary, the route tests and
//! the integration tests share one implementation.
//!
//! - [`validation`] - debounced per-field validation for a session
//! - [`payment`] - single authorization request per submission
//! - [`confirmation`] - applying the payment widget's result
//! - [`orders`] - primary order write with a store fallback
//! - [`session`] - one customer's checkout, tying the above together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod basket;
pub mod config;
pub mod confirmation;
pub mod db;
pub mod error;
pub mod net;
pub mod orders;
pub mod payment;
pub mod routes;
pub mod session;
pub mod state;
pub mod validation;
