//! Compact base-62 codec for record identities.
//!
//! Saved queries are referenced from URLs through a single `q` parameter.
//! Rather than exposing raw integers, record identities are rendered in a
//! fixed 62-character alphabet (digits, uppercase, lowercase), none of which
//! require URL escaping. The mapping is a total bijection over `u64`:
//! [`decode`] accepts every string [`encode`] produces and rejects
//! everything else with [`RequeryError::InvalidEncoding`].

use crate::error::{RequeryError, Result};
use crate::spec::RecordId;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u64 = 62;

/// Render a record identity in the URL-safe alphabet.
///
/// `0` encodes as `"0"`, `42` as `"g"`, `123456789` as `"8M0kX"`.
pub fn encode(id: RecordId) -> String {
    if id == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut rest = id;
    while rest > 0 {
        digits.push(ALPHABET[(rest % BASE) as usize]);
        rest /= BASE;
    }
    digits.reverse();
    // The alphabet is pure ASCII, so the byte string is valid UTF-8.
    String::from_utf8(digits).unwrap_or_default()
}

/// Reverse [`encode`]. Fails on the empty string, on any character outside
/// the alphabet, and on values past `u64::MAX`; it never returns a wrong
/// identity silently.
pub fn decode(encoded: &str) -> Result<RecordId> {
    if encoded.is_empty() {
        return Err(RequeryError::InvalidEncoding(
            "empty identity string".to_string(),
        ));
    }
    let mut id: u64 = 0;
    for c in encoded.bytes() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| {
                RequeryError::InvalidEncoding(format!(
                    "character '{}' is not in the identity alphabet",
                    c as char
                ))
            })?;
        id = id
            .checked_mul(BASE)
            .and_then(|n| n.checked_add(digit as u64))
            .ok_or_else(|| {
                RequeryError::InvalidEncoding(format!("identity '{encoded}' overflows"))
            })?;
    }
    Ok(id)
}
