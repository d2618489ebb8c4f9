//! Request canonicalization and HMAC-SHA256 signing.
//!
//! A request is reduced to a canonical message of five newline-joined
//! fields (method, path-with-query, decimal timestamp, nonce, hex body
//! hash) and signed with the derived auth key. The verifier recomputes the
//! exact same message, so every byte here is wire protocol.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::hash::sha256_hex;

type HmacSha256 = Hmac<Sha256>;

/// Size of the nonce's random component (protocol v1). 16 hex chars on
/// the wire; collisions within the replay window are what the verifier's
/// nonce cache keys on, so this must stay unguessable.
pub const NONCE_RANDOM_BYTES: usize = 8;

/// Error type for signing operations.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// OS random source failed. Fatal, not user-recoverable.
    #[error("RNG failed")]
    Rng,
}

/// Everything that was authenticated for one request. Mutating any field
/// after signing invalidates `signature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub path_with_query: String,
    pub timestamp: u64,
    pub nonce: String,
    pub body_hash: String,
    /// Lowercase hex HMAC-SHA256 over the canonical message.
    pub signature: String,
}

/// Canonical path: append `?query` only when the query is non-empty.
pub fn canonical_path(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

/// Hex SHA-256 of the body bytes. An empty body hashes as zero bytes,
/// not as an empty string.
pub fn body_hash(body: &[u8]) -> String {
    sha256_hex(body)
}

/// Single-use nonce: `{unix_seconds}_{16 lowercase hex chars}`.
///
/// Safe under concurrent signing: uniqueness comes from the 8 random
/// bytes, not from any shared counter.
pub fn generate_nonce(unix_seconds: u64) -> Result<String, SignError> {
    let mut random = [0u8; NONCE_RANDOM_BYTES];
    getrandom::getrandom(&mut random).map_err(|_| SignError::Rng)?;
    Ok(format!("{}_{}", unix_seconds, hex::encode(random)))
}

/// The exact byte string both ends authenticate.
pub fn canonical_message(
    method: &str,
    path_with_query: &str,
    timestamp: u64,
    nonce: &str,
    body_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method, path_with_query, timestamp, nonce, body_hash
    )
}

/// HMAC-SHA256 with the derived auth key.
pub fn hmac_sha256(auth_key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(auth_key).expect("HMAC can take keys of any size");
    mac.update(message);
    let out = mac.finalize().into_bytes();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Sign one request with a caller-supplied timestamp (host time base,
/// see the clock sync in bridge-core).
pub fn sign_request(
    method: &str,
    path: &str,
    query: &str,
    body: &[u8],
    auth_key: &[u8; 32],
    timestamp: u64,
) -> Result<SignedRequest, SignError> {
    let path_with_query = canonical_path(path, query);
    let body_hash = body_hash(body);
    let nonce = generate_nonce(timestamp)?;

    let message = canonical_message(method, &path_with_query, timestamp, &nonce, &body_hash);
    let signature = hex::encode(hmac_sha256(auth_key, message.as_bytes()));

    Ok(SignedRequest {
        method: method.to_string(),
        path_with_query,
        timestamp,
        nonce,
        body_hash,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11u8; 32];

    #[test]
    fn test_canonical_path_query_handling() {
        assert_eq!(canonical_path("/v1/health", ""), "/v1/health");
        assert_eq!(canonical_path("/v1/pair", "force=1"), "/v1/pair?force=1");
    }

    #[test]
    fn test_empty_body_hashes_zero_bytes() {
        // SHA-256 of the empty input, not of the string "".
        assert_eq!(
            body_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_nonce_format() {
        let nonce = generate_nonce(1_760_000_000).unwrap();
        let (secs, random) = nonce.split_once('_').unwrap();
        assert_eq!(secs, "1760000000");
        assert_eq!(random.len(), 16);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_nonces_unique() {
        let a = generate_nonce(1000).unwrap();
        let b = generate_nonce(1000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_message_layout() {
        let msg = canonical_message("POST", "/v1/pair", 1700000000, "1700000000_00ff", "abcd");
        assert_eq!(msg, "POST\n/v1/pair\n1700000000\n1700000000_00ff\nabcd");
    }

    #[test]
    fn test_signature_is_hex_hmac() {
        let req = sign_request("GET", "/v1/health", "", b"", &KEY, 1700000000).unwrap();
        let message = canonical_message(
            "GET",
            "/v1/health",
            1700000000,
            &req.nonce,
            &req.body_hash,
        );
        assert_eq!(
            req.signature,
            hex::encode(hmac_sha256(&KEY, message.as_bytes()))
        );
        assert_eq!(req.signature.len(), 64);
    }

    #[test]
    fn test_different_keys_different_signatures() {
        let a = hmac_sha256(&[1u8; 32], b"msg");
        let b = hmac_sha256(&[2u8; 32], b"msg");
        assert_ne!(a, b);
    }
}
