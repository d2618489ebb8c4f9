
#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::kdf::DerivedKeys;
    use crate::keypair::SharedSecret;
    use crate::sign::{canonical_message, hmac_sha256, sign_request};
    use crate::utils::constant_time_compare;

    proptest! {
        // Derivation determinism: same secret always yields the same keys.
        #[test]
        fn test_kdf_determinism(secret in any::<[u8; 32]>()) {
            let a = DerivedKeys::derive(&SharedSecret::from_bytes(secret));
            let b = DerivedKeys::derive(&SharedSecret::from_bytes(secret));
            prop_assert_eq!(a.auth_key, b.auth_key);
            prop_assert_eq!(a.encryption_key, b.encryption_key);
        }

        // Auth and encryption keys never collide for any shared secret.
        #[test]
        fn test_kdf_key_independence(secret in any::<[u8; 32]>()) {
            let keys = DerivedKeys::derive(&SharedSecret::from_bytes(secret));
            prop_assert_ne!(keys.auth_key, keys.encryption_key);
        }

        // A signed request verifies against its own canonical message, and
        // tampering with any field breaks the signature.
        #[test]
        fn test_sign_tamper_detection(
            key in any::<[u8; 32]>(),
            body in any::<Vec<u8>>(),
            timestamp in 1u64..4_000_000_000,
        ) {
            let req = sign_request("POST", "/v1/messages", "", &body, &key, timestamp).unwrap();

            let good = canonical_message(
                &req.method,
                &req.path_with_query,
                req.timestamp,
                &req.nonce,
                &req.body_hash,
            );
            let expected = hex::encode(hmac_sha256(&key, good.as_bytes()));
            prop_assert_eq!(&req.signature, &expected);

            let tampered = canonical_message(
                "GET",
                &req.path_with_query,
                req.timestamp,
                &req.nonce,
                &req.body_hash,
            );
            let bad = hex::encode(hmac_sha256(&key, tampered.as_bytes()));
            prop_assert_ne!(&req.signature, &bad);

            let shifted = canonical_message(
                &req.method,
                &req.path_with_query,
                req.timestamp + 1,
                &req.nonce,
                &req.body_hash,
            );
            let bad = hex::encode(hmac_sha256(&key, shifted.as_bytes()));
            prop_assert_ne!(&req.signature, &bad);
        }

        // Constant-time comparison agrees with plain equality.
        #[test]
        fn test_constant_time_matches_eq(a in any::<Vec<u8>>(), b in any::<Vec<u8>>()) {
            prop_assert_eq!(constant_time_compare(&a, &b), a == b);
        }
    }
}
