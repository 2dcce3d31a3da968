//! Report identifiers.
//!
//! Ids look like `bug-3f9a0c1d2e`: a fixed prefix plus the first hex digits
//! of a BLAKE3 digest over the creation timestamp and the submission text.
//! The timestamp is strictly increasing per engine, so ids never collide
//! within one process; callers still check the store before use.

use blake3::Hasher;

pub const ID_PREFIX: &str = "bug-";

/// Hex digits kept from the digest.
pub const ID_HEX_LEN: usize = 10;

#[must_use]
pub fn generate_report_id(created_at_us: i64, text: &str, attempt: u32) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&created_at_us.to_le_bytes());
    hasher.update(&attempt.to_le_bytes());
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("{ID_PREFIX}{}", &hex.as_str()[..ID_HEX_LEN])
}

/// Whether `s` has the shape of a generated report id.
#[must_use]
pub fn is_report_id(s: &str) -> bool {
    s.strip_prefix(ID_PREFIX).is_some_and(|rest| {
        rest.len() == ID_HEX_LEN && rest.chars().all(|c| c.is_ascii_hexdigit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic_and_well_formed() {
        let a = generate_report_id(42, "Checkout crashes", 0);
        let b = generate_report_id(42, "Checkout crashes", 0);
        assert_eq!(a, b);
        assert!(is_report_id(&a), "{a}");
    }

    #[test]
    fn timestamp_and_attempt_change_the_id() {
        let base = generate_report_id(42, "Checkout crashes", 0);
        assert_ne!(base, generate_report_id(43, "Checkout crashes", 0));
        assert_ne!(base, generate_report_id(42, "Checkout crashes", 1));
    }

    #[test]
    fn foreign_strings_are_not_ids() {
        assert!(!is_report_id("bug-xyz"));
        assert!(!is_report_id("BUG-0123456789"));
        assert!(!is_report_id("item-0123456789"));
    }
}
