//! Room-name validation.
//!
//! Part of the wire contract: this must stay bit-exact with the validator
//! shipped in the client SDK. Length is counted in Unicode code points, not
//! bytes, and the allowed character class is the CJK Han range
//! `U+4E00..=U+9FA5` plus ASCII letters, digits, space, underscore and
//! hyphen.

use crate::error::NameError;

/// Minimum room-name length in code points.
pub const MIN_LEN: usize = 2;

/// Maximum room-name length in code points.
pub const MAX_LEN: usize = 12;

/// Whether a single character is allowed in a room name.
fn is_allowed(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
        || c.is_ascii_alphanumeric()
        || c == ' '
        || c == '_'
        || c == '-'
}

/// Validate a room name against the shared naming rule.
pub fn validate(name: &str) -> Result<(), NameError> {
    let count = name.chars().count();
    if count < MIN_LEN {
        return Err(NameError::TooShort);
    }
    if count > MAX_LEN {
        return Err(NameError::TooLong);
    }
    if !name.chars().all(is_allowed) {
        return Err(NameError::BadCharacters);
    }
    Ok(())
}
