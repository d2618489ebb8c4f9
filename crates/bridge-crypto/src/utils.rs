//! Constant-time comparison for signature verification.
//!
//! Signature and MAC checks must not leak where two values diverge, so
//! the verifier never compares them with `==`.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal() {
        assert!(constant_time_compare(b"signature", b"signature"));
    }

    #[test]
    fn test_different() {
        assert!(!constant_time_compare(b"signature", b"signaturE"));
    }

    #[test]
    fn test_different_length() {
        assert!(!constant_time_compare(b"sig", b"signature"));
    }
}
