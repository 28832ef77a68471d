//! National tax identifier (11 digits with a weighted mod-11 check digit).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Number of digits in a tax identifier.
pub const TAX_ID_LENGTH: usize = 11;

/// Errors that can occur when parsing a [`TaxId`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxIdError {
    /// The input is not exactly 11 characters long.
    #[error("tax id must be exactly {TAX_ID_LENGTH} digits")]
    WrongLength,
    /// The input contains something other than `0-9`.
    #[error("tax id may only contain digits")]
    NonDigit,
    /// The check digit does not match.
    #[error("tax id check digit is invalid")]
    Checksum,
}

/// A validated 11-digit tax identifier.
///
/// ```
/// use atelier_core::TaxId;
///
/// assert!(TaxId::parse("12345678900").is_ok());
/// assert!(TaxId::parse("12345678901").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    /// Parse and checksum-verify a tax identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaxIdError`] describing the first rule the input breaks.
    pub fn parse(s: &str) -> Result<Self, TaxIdError> {
        let digits = digits_of(s)?;
        let (body, check) = digits.split_at(TAX_ID_LENGTH - 1);
        if check.first().copied() != Some(check_digit(body)) {
            return Err(TaxIdError::Checksum);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the check digit for the first ten digits.
///
/// Weights run 10 down to 1. A remainder below 2 yields check digit 0,
/// otherwise the check digit is `11 - remainder`.
#[must_use]
pub fn check_digit(body: &[u8]) -> u8 {
    let sum: u32 = body
        .iter()
        .zip((1..=10u32).rev())
        .map(|(&d, w)| u32::from(d) * w)
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        // remainder is in 2..=10 so the result is a single digit
        u8::try_from(11 - remainder).unwrap_or(0)
    }
}

fn digits_of(s: &str) -> Result<Vec<u8>, TaxIdError> {
    if s.len() != TAX_ID_LENGTH {
        return Err(TaxIdError::WrongLength);
    }
    s.bytes()
        .map(|b| {
            if b.is_ascii_digit() {
                Ok(b - b'0')
            } else {
                Err(TaxIdError::NonDigit)
            }
        })
        .collect()
}
