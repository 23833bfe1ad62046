//! One-time payment verification codes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Number of digits in a payment OTP.
pub const OTP_LENGTH: usize = 6;

/// Errors that can occur when building an [`OtpCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    /// Wrong number of digits.
    #[error("code must have exactly {OTP_LENGTH} digits (got {0})")]
    Length(usize),
    /// A character that is not an ASCII digit.
    #[error("code may only contain digits (found {0:?})")]
    NonDigit(char),
    /// Digit slot outside `0..OTP_LENGTH`.
    #[error("digit position {0} is out of range")]
    Position(usize),
}

/// A complete six-digit OTP.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OtpCode([u8; OTP_LENGTH]);

impl OtpCode {
    /// Build a code from six digit values (each `0..=9`).
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::NonDigit`] if a value is greater than 9.
    pub fn from_digits(digits: [u8; OTP_LENGTH]) -> Result<Self, OtpError> {
        if let Some(bad) = digits.iter().find(|d| **d > 9) {
            return Err(OtpError::NonDigit(char::from(b'0'.saturating_add(*bad))));
        }
        Ok(Self(digits))
    }

    /// Parse a code such as `"042917"`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, OtpError> {
        let s = s.trim();
        let count = s.chars().count();
        if count != OTP_LENGTH {
            return Err(OtpError::Length(count));
        }
        let mut digits = [0u8; OTP_LENGTH];
        for (slot, ch) in digits.iter_mut().zip(s.chars()) {
            *slot = digit_value(ch)?;
        }
        Ok(Self(digits))
    }

    /// The code as a string of digits.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.0.iter().map(|d| char::from(b'0' + d)).collect()
    }
}

/// Convert one character into a digit value.
///
/// # Errors
///
/// Returns [`OtpError::NonDigit`] for anything other than `0`-`9`.
pub fn digit_value(ch: char) -> Result<u8, OtpError> {
    ch.to_digit(10)
        .and_then(|d| u8::try_from(d).ok())
        .ok_or(OtpError::NonDigit(ch))
}

// Codes are credentials; keep them out of logs.
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}

impl TryFrom<String> for OtpCode {
    type Error = OtpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OtpCode> for String {
    fn from(code: OtpCode) -> Self {
        code.as_string()
    }
}
