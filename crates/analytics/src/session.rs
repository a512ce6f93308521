//! Session identifier hashing.
//!
//! Event writers store `session_hash` instead of the raw session id, so a
//! session-scoped read must hash the caller's id the same way, bit for bit.

/// 32-bit rolling hash (`h = h * 31 + unit`) over the UTF-16 code units of
/// `session_id`, with two's-complement wraparound, returned as its absolute
/// value.
pub fn hash_session_id(session_id: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in session_id.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(hash_session_id(""), 0);
        assert_eq!(hash_session_id("a"), 97);
        assert_eq!(hash_session_id("ab"), 3105);
        assert_eq!(hash_session_id("abc"), 96354);
        assert_eq!(hash_session_id("hello"), 99_162_322);
    }

    #[test]
    fn test_overflow_wraps() {
        // "hello world" overflows i32 during accumulation.
        assert_eq!(hash_session_id("hello world"), 1_794_106_052);
    }

    #[test]
    fn test_negative_hash_is_made_positive() {
        // Accumulates to -31_368_149 before the absolute value.
        assert_eq!(hash_session_id("abc-session"), 31_368_149);
    }

    #[test]
    fn test_hashes_utf16_units() {
        // U+00E9 is a single UTF-16 unit (233) but two UTF-8 bytes.
        assert_eq!(hash_session_id("\u{e9}"), 233);
        // U+1F600 is a surrogate pair: 0xD83D, 0xDE00.
        assert_eq!(hash_session_id("\u{1F600}"), 0xD83D * 31 + 0xDE00);
    }
}
