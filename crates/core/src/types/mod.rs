//! Core types for Atelier checkout.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod basket;
pub mod email;
pub mod form;
pub mod id;
pub mod price;
pub mod status;
pub mod tax_id;

pub use basket::BasketLine;
pub use email::{Email, EmailError};
pub use form::{Field, FormData, PostalAddress, Toggle};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
pub use tax_id::{TaxId, TaxIdError};
