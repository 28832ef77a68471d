//! Field validator for the checkout form.
//!
//! [`validate`] is a pure function of the field, its candidate value and the
//! rest of the form. It performs no I/O and always returns the same verdict
//! for the same inputs, so the real-time engine can call it from any timer
//! without coordination.
//!
//! Errors block submission. Warnings are hints (a likely mistyped mail
//! domain, an address without a house number) and never affect validity.
//!
//! # Example
//!
//! ```
//! use atelier_core::{Field, FormData, validation};
//!
//! let form = FormData::default();
//! assert!(validation::validate(Field::PostalCode, "10000", &form).is_valid);
//! assert!(!validation::validate(Field::PostalCode, "1000", &form).is_valid);
//!
//! // Not required unless a company invoice is requested.
//! assert!(validation::validate(Field::CompanyTaxId, "", &form).is_valid);
//! ```

mod rules;

pub use rules::{
    MAX_NOTES_LENGTH, MAX_PHONE_LENGTH, MIN_ADDRESS_LENGTH, MIN_NAME_LENGTH, POSTAL_CODE_LENGTH,
};

use serde::Serialize;

use crate::types::{Field, FormData};

/// User-facing validation texts.
pub mod messages {
    pub const REQUIRED: &str = "This field is required";
    pub const TOO_SHORT_NAME: &str = "Must be at least 2 characters";
    pub const NAME_CHARACTERS: &str =
        "Only letters, spaces, hyphens, apostrophes and periods are allowed";
    pub const EMAIL_INVALID: &str = "Enter a valid email address";
    pub const EMAIL_TOO_LONG: &str = "Email address is too long";
    pub const POSTAL_CODE: &str = "Postal code must be exactly 5 digits";
    pub const TAX_ID_FORMAT: &str = "Tax ID must be exactly 11 digits";
    pub const TAX_ID_CHECKSUM: &str = "Tax ID is not valid";
    pub const ADDRESS_TOO_SHORT: &str = "Address must be at least 5 characters";
    pub const ADDRESS_NO_NUMBER: &str = "Address has no house number";
    pub const PHONE: &str = "Enter a valid phone number";
    pub const COMPANY_NAME: &str = "Company name must be at least 2 characters";
    pub const NOTES_TOO_LONG: &str = "Notes can be at most 500 characters";
}

/// Outcome of validating one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldVerdict {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for FieldVerdict {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl FieldVerdict {
    fn reject(&mut self, message: &str) {
        self.is_valid = false;
        self.errors.push(message.to_owned());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// First error, if any. This is what the form displays.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    /// First warning, if any.
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        self.warnings.first().map(String::as_str)
    }
}

/// Validate `value` as the new content of `field`.
///
/// Requiredness is taken from `form`, so toggling `sameAsBilling` or
/// `needsCompanyInvoice` changes the verdict for an empty value.
#[must_use]
pub fn validate(field: Field, value: &str, form: &FormData) -> FieldVerdict {
    let mut verdict = FieldVerdict::default();
    let value = value.trim();

    if value.is_empty() {
        if form.is_required(field) {
            verdict.reject(messages::REQUIRED);
        }
        return verdict;
    }

    match field {
        Field::FirstName | Field::LastName | Field::City | Field::ShippingCity => {
            rules::name_like(value, &mut verdict);
        }
        Field::Email => rules::email(value, &mut verdict),
        Field::Phone => rules::phone(value, &mut verdict),
        Field::Address | Field::ShippingAddress => rules::address(value, &mut verdict),
        Field::PostalCode | Field::ShippingPostalCode => rules::postal_code(value, &mut verdict),
        Field::CompanyName => rules::company_name(value, &mut verdict),
        Field::CompanyTaxId => rules::tax_id(value, &mut verdict),
        Field::ShippingMethod => {}
        Field::Notes => rules::notes(value, &mut verdict),
    }

    verdict
}

/// Validate a field against its current value in `form`.
#[must_use]
pub fn validate_current(field: Field, form: &FormData) -> FieldVerdict {
    validate(field, form.value(field), form)
}

/// Whether every field `form` currently requires passes validation.
///
/// This is the stateless counterpart of the engine's form validity and is
/// what the server re-checks before authorizing a payment.
#[must_use]
pub fn is_form_valid(form: &FormData) -> bool {
    form.required_fields()
        .into_iter()
        .all(|field| validate_current(field, form).is_valid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Toggle;

    fn filled_form() -> FormData {
        FormData {
            first_name: "Ana".to_owned(),
            last_name: "Horvat-Kovač".to_owned(),
            email: "ana@example.hr".to_owned(),
            phone: "+385 91 234 5678".to_owned(),
            address: "Ilica 10".to_owned(),
            city: "Zagreb".to_owned(),
            postal_code: "10000".to_owned(),
            ..FormData::default()
        }
    }

    #[test]
    fn test_names_accept_accents_and_punctuation() {
        let form = FormData::default();
        for name in ["Željko", "O'Brien", "Jean-Luc", "St. Clair", "Ana María"] {
            assert!(validate(Field::FirstName, name, &form).is_valid, "{name}");
        }
    }

    #[test]
    fn test_names_reject_digits_and_short() {
        let form = FormData::default();
        let verdict = validate(Field::LastName, "R2D2", &form);
        assert_eq!(verdict.error(), Some(messages::NAME_CHARACTERS));

        let verdict = validate(Field::FirstName, "A", &form);
        assert_eq!(verdict.error(), Some(messages::TOO_SHORT_NAME));
    }

    #[test]
    fn test_city_uses_name_rules() {
        let form = FormData::default();
        assert!(validate(Field::City, "Slavonski Brod", &form).is_valid);
        assert!(!validate(Field::ShippingCity, "10000", &form).is_valid);
    }

    #[test]
    fn test_required_empty_value() {
        let form = FormData::default();
        let verdict = validate(Field::Email, "   ", &form);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.error(), Some(messages::REQUIRED));
    }

    #[test]
    fn test_optional_empty_value() {
        let form = FormData::default();
        assert!(validate(Field::ShippingAddress, "", &form).is_valid);
        assert!(validate(Field::Notes, "", &form).is_valid);
    }

    #[test]
    fn test_conditional_requiredness_follows_form() {
        let mut form = FormData::default();
        form.set_toggle(Toggle::SameAsBilling, false);
        assert!(!validate(Field::ShippingCity, "", &form).is_valid);

        form.set_toggle(Toggle::NeedsCompanyInvoice, true);
        assert!(!validate(Field::CompanyName, "", &form).is_valid);
    }

    #[test]
    fn test_email_requires_dotted_domain() {
        let form = FormData::default();
        assert!(validate(Field::Email, "kupac@trgovina.hr", &form).is_valid);
        assert!(!validate(Field::Email, "kupac@localhost", &form).is_valid);
        assert!(!validate(Field::Email, "kupac.trgovina.hr", &form).is_valid);
    }

    #[test]
    fn test_email_typo_is_warning_only() {
        let form = FormData::default();
        let verdict = validate(Field::Email, "ana@gmial.com", &form);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warning(), Some("Did you mean @gmail.com?"));
    }

    #[test]
    fn test_postal_code_exactly_five_ascii_digits() {
        let form = FormData::default();
        assert!(validate(Field::PostalCode, "21000", &form).is_valid);
        assert!(!validate(Field::PostalCode, "2100", &form).is_valid);
        assert!(!validate(Field::PostalCode, "210000", &form).is_valid);
        assert!(!validate(Field::PostalCode, "21a00", &form).is_valid);
        assert!(!validate(Field::ShippingPostalCode, "٢١٠٠٠", &form).is_valid);
    }

    #[test]
    fn test_tax_id_rules() {
        let mut form = FormData::default();
        form.set_toggle(Toggle::NeedsCompanyInvoice, true);

        assert!(validate(Field::CompanyTaxId, "12345678900", &form).is_valid);
        assert_eq!(
            validate(Field::CompanyTaxId, "12345678901", &form).error(),
            Some(messages::TAX_ID_CHECKSUM)
        );
        assert_eq!(
            validate(Field::CompanyTaxId, "1234567890", &form).error(),
            Some(messages::TAX_ID_FORMAT)
        );
    }

    #[test]
    fn test_address_rules() {
        let form = FormData::default();
        assert_eq!(
            validate(Field::Address, "Ul 1", &form).error(),
            Some(messages::ADDRESS_TOO_SHORT)
        );
        let verdict = validate(Field::Address, "Trg bana Jelačića", &form);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warning(), Some(messages::ADDRESS_NO_NUMBER));
        assert!(validate(Field::Address, "Ilica 242", &form).warnings.is_empty());
    }

    #[test]
    fn test_phone_rules() {
        let form = FormData::default();
        assert!(validate(Field::Phone, "+385 (1) 234-5678", &form).is_valid);
        assert!(validate(Field::Phone, "091234567", &form).is_valid);
        assert!(!validate(Field::Phone, "12345", &form).is_valid);
        assert!(!validate(Field::Phone, "call me maybe", &form).is_valid);
        assert!(!validate(Field::Phone, "+-+-+-( )12", &form).is_valid);
        assert!(!validate(Field::Phone, &"1".repeat(21), &form).is_valid);
    }

    #[test]
    fn test_notes_limits() {
        let form = FormData::default();
        let verdict = validate(Field::Notes, &"a".repeat(460), &form);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warning(), Some("40 characters left"));
        assert!(!validate(Field::Notes, &"a".repeat(501), &form).is_valid);
    }

    #[test]
    fn test_is_form_valid() {
        let mut form = filled_form();
        assert!(is_form_valid(&form));

        form.set_toggle(Toggle::NeedsCompanyInvoice, true);
        form.set_value(Field::CompanyName, "Atelier d.o.o.");
        form.set_value(Field::CompanyTaxId, "12345678901");
        assert!(!is_form_valid(&form));

        form.set_value(Field::CompanyTaxId, "94817263505");
        assert!(is_form_valid(&form));
    }

    #[test]
    fn test_deterministic() {
        let form = filled_form();
        assert_eq!(
            validate(Field::Email, "x@gmai.com", &form),
            validate(Field::Email, "x@gmai.com", &form)
        );
    }
}
