//! # Fingerprints
//!
//! 64-bit FNV-1a hashes used as equality shortcuts: one over the raw XML
//! bytes of a record, one over a decision triple. Collisions are tolerated;
//! a false "equal" on a decision only merges two groups under one key,
//! the decision value itself still lives in each entry's payload.

use std::hash::Hasher;

use fnv::FnvHasher;

/// Fingerprint of one record's raw `<content>…</content>` bytes, exactly
/// as captured from the tokenized stream, interior whitespace included.
pub fn record_fingerprint(raw: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(raw);
    hasher.finish()
}

/// Fingerprint of a decision triple, hashed as `org SP number SP date`.
pub fn decision_fingerprint(org: &str, number: &str, date: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(org.as_bytes());
    hasher.write(b" ");
    hasher.write(number.as_bytes());
    hasher.write(b" ");
    hasher.write(date.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vectors for 64-bit FNV-1a.
    #[test]
    fn fnv1a_reference_vectors() {
        assert_eq!(record_fingerprint(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(record_fingerprint(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(record_fingerprint(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn record_fingerprint_is_byte_exact() {
        let a = record_fingerprint(b"<content id=\"1\"> </content>");
        let b = record_fingerprint(b"<content id=\"1\"></content>");
        assert_ne!(a, b);
        assert_eq!(a, record_fingerprint(b"<content id=\"1\"> </content>"));
    }

    #[test]
    fn decision_fingerprint_matches_concatenation() {
        let direct = record_fingerprint(b"org 123/45 2024-01-01");
        assert_eq!(decision_fingerprint("org", "123/45", "2024-01-01"), direct);
        assert_ne!(
            decision_fingerprint("org", "123/45", "2024-01-01"),
            decision_fingerprint("org", "123/45", "2024-01-02"),
        );
    }
}
