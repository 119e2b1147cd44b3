//! Small helpers for auth input validation.

use crate::error::{Error, ErrorKind};
use regex::Regex;

/// Country calling code assumed for national-format numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "82";

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// E.164: `+`, a non-zero leading digit, 8 to 15 digits in total.
pub(crate) fn valid_e164(phone_number: &str) -> bool {
    Regex::new(r"^\+[1-9]\d{7,14}$").is_ok_and(|regex| regex.is_match(phone_number))
}

pub(crate) fn valid_verification_code(code: &str) -> bool {
    Regex::new(r"^\d{6}$").is_ok_and(|regex| regex.is_match(code))
}

/// Normalize a phone number to E.164.
///
/// Separators are stripped. National numbers (`010-1234-5678`) get the
/// default country code with the trunk `0` dropped; `82...` gets a `+`.
/// A trunk `0` written after `+82` is dropped as well.
///
/// # Errors
/// `MissingPhoneNumber` for blank input, `InvalidPhoneNumber` when the result
/// is not valid E.164.
pub fn normalize_phone(phone_number: &str) -> Result<String, Error> {
    let compact: String = phone_number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.' | '\t'))
        .collect();
    if compact.is_empty() {
        return Err(Error::Precondition(ErrorKind::MissingPhoneNumber));
    }

    let normalized = if compact.starts_with('+') {
        compact
    } else if let Some(national) = compact.strip_prefix('0') {
        format!("+{DEFAULT_COUNTRY_CODE}{national}")
    } else if compact.starts_with(DEFAULT_COUNTRY_CODE) {
        format!("+{compact}")
    } else {
        format!("+{DEFAULT_COUNTRY_CODE}{compact}")
    };
    // trunk `0` never follows the country code in E.164
    let normalized = match normalized.strip_prefix(&format!("+{DEFAULT_COUNTRY_CODE}0")) {
        Some(subscriber) => format!("+{DEFAULT_COUNTRY_CODE}{subscriber}"),
        None => normalized,
    };

    if valid_e164(&normalized) {
        Ok(normalized)
    } else {
        Err(Error::Precondition(ErrorKind::InvalidPhoneNumber))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_and_checked() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert!(valid_email("a@x.com"));
        assert!(!valid_email("a@x"));
        assert!(!valid_email("a x@y.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn national_numbers_get_country_code() {
        assert_eq!(normalize_phone("010-1234-5678").ok().as_deref(), Some("+821012345678"));
        assert_eq!(normalize_phone("010 1234 5678").ok().as_deref(), Some("+821012345678"));
        assert_eq!(normalize_phone("821012345678").ok().as_deref(), Some("+821012345678"));
        assert_eq!(normalize_phone("1012345678").ok().as_deref(), Some("+821012345678"));
    }

    #[test]
    fn trunk_zero_after_country_code_is_dropped() {
        assert_eq!(normalize_phone("+82 010-1234-5678").ok().as_deref(), Some("+821012345678"));
        assert_eq!(normalize_phone("82-010-1234-5678").ok().as_deref(), Some("+821012345678"));
        assert_eq!(normalize_phone("+82 10 1234 5678").ok().as_deref(), Some("+821012345678"));
    }

    #[test]
    fn international_numbers_are_kept() {
        assert_eq!(normalize_phone("+1 (415) 555-0100").ok().as_deref(), Some("+14155550100"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(normalize_phone("  ").is_err_and(|err| err.is(ErrorKind::MissingPhoneNumber)));
        assert!(normalize_phone("01-2").is_err_and(|err| err.is(ErrorKind::InvalidPhoneNumber)));
        assert!(normalize_phone("+82abc").is_err_and(|err| err.is(ErrorKind::InvalidPhoneNumber)));
    }

    #[test]
    fn verification_codes_are_six_digits() {
        assert!(valid_verification_code("123456"));
        assert!(!valid_verification_code("12345"));
        assert!(!valid_verification_code("12345a"));
    }
}
