//! P-256 key agreement for the bridge pairing protocol.
//!
//! A fresh key pair is generated for every pairing attempt. The private
//! scalar is the only key material that gets persisted; the ECDH shared
//! secret is recomputed on demand and zeroized on drop.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::{ecdh, elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand_core::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Error type for key agreement operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    /// Peer public key bytes do not decode to a point on the curve.
    #[error("invalid peer public key")]
    InvalidPeerKey,
    /// Persisted private scalar is malformed.
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid base64 key encoding")]
    InvalidEncoding,
}

/// The host's long-lived ECDH public key, received out-of-band in the
/// pairing code and persisted after a successful pairing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerPublicKey {
    point: PublicKey,
}

impl PeerPublicKey {
    /// Parse from SEC1 bytes (uncompressed on the wire: 0x04 || X || Y).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        PublicKey::from_sec1_bytes(bytes)
            .map(|point| Self { point })
            .map_err(|_| KeyError::InvalidPeerKey)
    }

    /// Encode as an uncompressed SEC1 point (65 bytes).
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.point.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_sec1_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_sec1_bytes())
    }
}

/// An ephemeral P-256 key pair. Never reused across pairing attempts.
pub struct KeyPair {
    secret: SecretKey,
}

impl core::fmt::Debug for KeyPair {
    /// Only the public half is printable.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key().to_base64())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Restore a key pair from the persisted 32-byte scalar.
    pub fn from_scalar_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        SecretKey::from_slice(bytes)
            .map(|secret| Self { secret })
            .map_err(|_| KeyError::InvalidPrivateKey)
    }

    /// Restore from the base64 form used by the credential store.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_scalar_bytes(&bytes)
    }

    /// The private scalar, for credential persistence.
    pub fn scalar_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes().into()
    }

    pub fn scalar_base64(&self) -> String {
        BASE64.encode(self.scalar_bytes())
    }

    /// Our public key, sent to the host in the pairing request.
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey {
            point: self.secret.public_key(),
        }
    }

    /// ECDH scalar multiplication against the peer's public key.
    pub fn agree(&self, peer: &PeerPublicKey) -> SharedSecret {
        let shared = ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.point.as_affine());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(shared.raw_secret_bytes());
        SharedSecret(bytes)
    }
}

/// Raw ECDH output. Never persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub(crate) [u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_consistency() {
        let device = KeyPair::generate();
        let host = KeyPair::generate();

        let device_side = device.agree(&host.public_key());
        let host_side = host.agree(&device.public_key());

        assert_eq!(device_side.as_bytes(), host_side.as_bytes());
    }

    #[test]
    fn test_fresh_keypair_per_attempt() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.scalar_bytes(), b.scalar_bytes());
        assert_ne!(
            a.public_key().to_sec1_bytes(),
            b.public_key().to_sec1_bytes()
        );
    }

    #[test]
    fn test_uncompressed_encoding() {
        let pair = KeyPair::generate();
        let bytes = pair.public_key().to_sec1_bytes();
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);
    }

    #[test]
    fn test_scalar_round_trip() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_base64(&pair.scalar_base64()).unwrap();
        assert_eq!(pair.scalar_bytes(), restored.scalar_bytes());

        let peer = KeyPair::generate().public_key();
        assert_eq!(pair.agree(&peer).as_bytes(), restored.agree(&peer).as_bytes());
    }

    #[test]
    fn test_invalid_peer_key_rejected() {
        // Not a point on the curve.
        let mut bytes = KeyPair::generate().public_key().to_sec1_bytes();
        bytes[10] ^= 0xFF;
        assert_eq!(
            PeerPublicKey::from_sec1_bytes(&bytes).unwrap_err(),
            KeyError::InvalidPeerKey
        );

        assert_eq!(
            PeerPublicKey::from_sec1_bytes(&[0u8; 65]).unwrap_err(),
            KeyError::InvalidPeerKey
        );
    }

    #[test]
    fn test_bad_base64_rejected() {
        assert_eq!(
            PeerPublicKey::from_base64("not base64!").unwrap_err(),
            KeyError::InvalidEncoding
        );
        assert_eq!(
            KeyPair::from_base64("%%%").unwrap_err(),
            KeyError::InvalidEncoding
        );
    }

    #[test]
    fn test_peer_key_base64_round_trip() {
        let key = KeyPair::generate().public_key();
        let restored = PeerPublicKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn test_debug_omits_private_scalar() {
        let pair = KeyPair::generate();
        let printed = format!("{:?}", pair);
        assert!(printed.contains(&pair.public_key().to_base64()));
        assert!(!printed.contains(&pair.scalar_base64()));
    }
}
