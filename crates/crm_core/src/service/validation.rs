//! Contact-field format rules.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_DIGITS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10,11}$").expect("valid phone regex"));

/// Returns `true` for `local@domain.tld` shaped input.
pub fn is_valid_email(email: &str) -> bool {
    let trimmed = email.trim();
    !trimmed.is_empty() && EMAIL_RE.is_match(trimmed)
}

/// Digits-only form of a phone number.
///
/// Nine-digit input is assumed to have lost its leading `0`.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 9 {
        format!("0{digits}")
    } else {
        digits
    }
}

/// Returns `true` when the normalized number has 10 or 11 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    if phone.trim().is_empty() {
        return false;
    }
    PHONE_DIGITS_RE.is_match(&normalize_phone(phone))
}
