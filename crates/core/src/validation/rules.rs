//! Per-category field rules.
//!
//! Each rule receives a non-empty trimmed value and pushes its findings into
//! the verdict. Requiredness is handled by the caller.

use std::sync::LazyLock;

use regex::Regex;

use super::{FieldVerdict, messages};
use crate::types::{Email, EmailError, TaxId, TaxIdError};

pub const MIN_NAME_LENGTH: usize = 2;
pub const MIN_ADDRESS_LENGTH: usize = 5;
pub const POSTAL_CODE_LENGTH: usize = 5;
pub const MIN_PHONE_LENGTH: usize = 6;
pub const MAX_PHONE_LENGTH: usize = 20;
pub const MIN_PHONE_DIGITS: usize = 6;
pub const MAX_NOTES_LENGTH: usize = 500;
pub const LONG_NOTES_WARNING: usize = 450;

/// Letters in any script plus space, hyphen, apostrophe and period.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\s\-'.]+$").expect("Invalid regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9 +\-/()]+$").expect("Invalid regex"));

/// Misspelled mail domains and the domain the customer most likely meant.
const DOMAIN_TYPOS: &[(&str, &str)] = &[
    ("gmial.com", "gmail.com"),
    ("gmai.com", "gmail.com"),
    ("gmail.co", "gmail.com"),
    ("gnail.com", "gmail.com"),
    ("hotmial.com", "hotmail.com"),
    ("hotmal.com", "hotmail.com"),
    ("yaho.com", "yahoo.com"),
    ("yahooo.com", "yahoo.com"),
    ("outlok.com", "outlook.com"),
    ("icloud.co", "icloud.com"),
];

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// First and last name, billing and shipping city.
pub fn name_like(value: &str, verdict: &mut FieldVerdict) {
    if char_len(value) < MIN_NAME_LENGTH {
        verdict.reject(messages::TOO_SHORT_NAME);
    }
    if !NAME_RE.is_match(value) {
        verdict.reject(messages::NAME_CHARACTERS);
    }
}

pub fn email(value: &str, verdict: &mut FieldVerdict) {
    match Email::parse(value) {
        Ok(email) => {
            let domain = email.domain().to_ascii_lowercase();
            if let Some((_, intended)) = DOMAIN_TYPOS.iter().find(|(typo, _)| *typo == domain) {
                verdict.warn(format!("Did you mean @{intended}?"));
            }
        }
        Err(EmailError::TooLong { .. }) => verdict.reject(messages::EMAIL_TOO_LONG),
        Err(EmailError::Empty | EmailError::Malformed) => verdict.reject(messages::EMAIL_INVALID),
    }
}

pub fn postal_code(value: &str, verdict: &mut FieldVerdict) {
    if value.len() != POSTAL_CODE_LENGTH || !value.bytes().all(|b| b.is_ascii_digit()) {
        verdict.reject(messages::POSTAL_CODE);
    }
}

pub fn tax_id(value: &str, verdict: &mut FieldVerdict) {
    match TaxId::parse(value) {
        Ok(_) => {}
        Err(TaxIdError::WrongLength | TaxIdError::NonDigit) => {
            verdict.reject(messages::TAX_ID_FORMAT);
        }
        Err(TaxIdError::Checksum) => verdict.reject(messages::TAX_ID_CHECKSUM),
    }
}

pub fn address(value: &str, verdict: &mut FieldVerdict) {
    if char_len(value) < MIN_ADDRESS_LENGTH {
        verdict.reject(messages::ADDRESS_TOO_SHORT);
    } else if !value.chars().any(|c| c.is_ascii_digit()) {
        verdict.warn(messages::ADDRESS_NO_NUMBER);
    }
}

pub fn phone(value: &str, verdict: &mut FieldVerdict) {
    let len = value.len();
    let digits = value.bytes().filter(u8::is_ascii_digit).count();
    if !PHONE_RE.is_match(value)
        || !(MIN_PHONE_LENGTH..=MAX_PHONE_LENGTH).contains(&len)
        || digits < MIN_PHONE_DIGITS
    {
        verdict.reject(messages::PHONE);
    }
}

pub fn company_name(value: &str, verdict: &mut FieldVerdict) {
    if char_len(value) < MIN_NAME_LENGTH {
        verdict.reject(messages::COMPANY_NAME);
    }
}

pub fn notes(value: &str, verdict: &mut FieldVerdict) {
    let len = char_len(value);
    if len > MAX_NOTES_LENGTH {
        verdict.reject(messages::NOTES_TOO_LONG);
    } else if len > LONG_NOTES_WARNING {
        verdict.warn(format!(
            "{} characters left",
            MAX_NOTES_LENGTH.saturating_sub(len)
        ));
    }
}
