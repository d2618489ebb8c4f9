//! Key derivation for the bridge protocol.
//!
//! The ECDH shared secret is expanded via HKDF-SHA256 into two independent
//! 256-bit keys. The salt and info constants are part of the wire protocol:
//! both ends must use byte-identical values or every signed request fails
//! verification with no earlier symptom. Changing any of them requires a
//! new protocol version string.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keypair::SharedSecret;

/// Fixed all-zero HKDF salt (protocol v1).
pub const HKDF_SALT: [u8; 32] = [0u8; 32];

/// HKDF info string for the authentication key (protocol v1).
pub const INFO_AUTH: &[u8] = b"talkie-bridge-v1-auth";

/// HKDF info string for the encryption key (protocol v1).
///
/// The encryption key is derived but not currently used to encrypt any
/// payload; request bodies travel as plaintext over the private network.
/// The derivation stays because removing it would be a wire-incompatible
/// change for any peer that starts consuming it.
pub const INFO_ENCRYPT: &[u8] = b"talkie-bridge-v1-encrypt";

/// The two keys expanded from one shared secret. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    pub auth_key: [u8; 32],
    pub encryption_key: [u8; 32],
}

impl DerivedKeys {
    /// Deterministic expansion; the distinct info strings guarantee
    /// `auth_key != encryption_key` for any shared secret.
    pub fn derive(secret: &SharedSecret) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(&HKDF_SALT), secret.as_bytes());

        let mut auth_key = [0u8; 32];
        let mut encryption_key = [0u8; 32];
        hk.expand(INFO_AUTH, &mut auth_key).expect("hkdf expand");
        hk.expand(INFO_ENCRYPT, &mut encryption_key)
            .expect("hkdf expand");

        Self {
            auth_key,
            encryption_key,
        }
    }
}
