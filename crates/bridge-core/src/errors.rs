//! Error types for the bridge core.
//!
//! Client-side errors split into two retry classes: network failures are
//! retried automatically by the connection manager within its budget,
//! while credential corruption is fatal and must surface a re-pair
//! prompt. Host-side verification errors collapse into one generic wire
//! message so a caller cannot probe which check failed.

use thiserror::Error;

use bridge_crypto::keypair::KeyError;
use bridge_crypto::sign::SignError;

/// Unified error type for client-side bridge operations.
#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    /// Peer public key is not a valid curve point (malformed pairing
    /// code or corrupted persisted record). Never retried; re-pair.
    #[error("invalid peer public key")]
    InvalidPeerKey,

    /// Pairing code carries an unknown protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    /// The host time query failed; signatures would drift.
    #[error("clock sync failed: {0}")]
    ClockSyncFailed(String),

    /// Host answered the pairing request with `rejected`.
    #[error("pairing rejected by host")]
    PairingRejected,

    /// No pairing record, or the record is incomplete/corrupted.
    #[error("pairing credentials missing or corrupted")]
    CredentialsMissing,

    /// The host rejected a signed request. The wire carries no detail.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Network-level failure. Retried within the backoff budget.
    #[error("network unavailable: {0}")]
    Network(String),

    /// Request timed out. Retried within the backoff budget.
    #[error("request timed out")]
    Timeout,

    /// Unexpected response shape from the host.
    #[error("bad response from host: {0}")]
    BadResponse(String),

    /// Credential store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Entropy or other cryptographic failure. Fatal.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The owning manager cancelled the in-flight attempt.
    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Fatal errors are never retried automatically; the current session
    /// ends and the user must re-pair or intervene.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidPeerKey
                | BridgeError::CredentialsMissing
                | BridgeError::UnsupportedProtocolVersion(_)
                | BridgeError::PairingRejected
                | BridgeError::Crypto(_)
        )
    }
}

impl From<KeyError> for BridgeError {
    fn from(err: KeyError) -> Self {
        match err {
            // A private key that no longer parses means the record is
            // corrupted as a whole.
            KeyError::InvalidPrivateKey => BridgeError::CredentialsMissing,
            KeyError::InvalidPeerKey | KeyError::InvalidEncoding => BridgeError::InvalidPeerKey,
        }
    }
}

impl From<SignError> for BridgeError {
    fn from(err: SignError) -> Self {
        BridgeError::Crypto(err.to_string())
    }
}

/// Host-side verification failures. Internal only: the wire sees a single
/// generic message for all of them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("unknown device")]
    UnknownDevice,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("timestamp out of range")]
    TimestampOutOfRange,
    #[error("nonce replayed")]
    NonceReplayed,
}

impl VerifyError {
    /// The one message every rejection maps to on the wire. Which check
    /// failed is logged host-side only.
    pub fn to_wire(&self) -> &'static str {
        "authentication failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::InvalidPeerKey.is_fatal());
        assert!(BridgeError::CredentialsMissing.is_fatal());
        assert!(BridgeError::UnsupportedProtocolVersion("v0".into()).is_fatal());
        assert!(!BridgeError::Network("unreachable".into()).is_fatal());
        assert!(!BridgeError::Timeout.is_fatal());
        assert!(!BridgeError::ClockSyncFailed("no route".into()).is_fatal());
    }

    #[test]
    fn test_key_error_mapping() {
        assert!(matches!(
            BridgeError::from(KeyError::InvalidPeerKey),
            BridgeError::InvalidPeerKey
        ));
        assert!(matches!(
            BridgeError::from(KeyError::InvalidPrivateKey),
            BridgeError::CredentialsMissing
        ));
    }

    #[test]
    fn test_verify_errors_collapse_on_wire() {
        let all = [
            VerifyError::UnknownDevice,
            VerifyError::SignatureMismatch,
            VerifyError::TimestampOutOfRange,
            VerifyError::NonceReplayed,
        ];
        for err in &all {
            assert_eq!(err.to_wire(), "authentication failed");
        }
    }
}
