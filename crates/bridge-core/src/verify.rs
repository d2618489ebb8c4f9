//! Host-side verification of signed requests.
//!
//! Recomputes the canonical message for an incoming request, checks the
//! HMAC in constant time, enforces the timestamp tolerance window, and
//! tracks nonces in a bounded, time-evicted cache. Every rejection is
//! reported to the caller as the same generic authentication failure;
//! the concrete reason is only logged here.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use bridge_crypto::sign::{body_hash, canonical_message, hmac_sha256};
use bridge_crypto::utils::constant_time_compare;

use crate::errors::VerifyError;

/// Protocol-v1 tolerance, in seconds, for both the timestamp check and
/// nonce retention. A nonce is kept at least as long as its timestamp
/// could still verify.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    pub tolerance_secs: u64,
    /// Upper bound on cached nonces across all devices.
    pub max_cached_nonces: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: TIMESTAMP_TOLERANCE_SECS,
            max_cached_nonces: 4096,
        }
    }
}

/// The authenticated fields of one incoming request.
#[derive(Clone, Debug)]
pub struct IncomingRequest<'a> {
    pub method: &'a str,
    pub path_with_query: &'a str,
    pub device_id: &'a str,
    pub timestamp: u64,
    pub nonce: &'a str,
    pub body: &'a [u8],
    /// Lowercase hex HMAC-SHA256, from `X-Signature`.
    pub signature: &'a str,
}

/// Verifier holding the `device_id -> auth_key` table and the replay
/// cache. One instance per host process.
pub struct RequestVerifier {
    config: VerifierConfig,
    devices: RwLock<HashMap<String, [u8; 32]>>,
    /// (device_id, nonce) -> timestamp first seen (host time base).
    nonces: RwLock<HashMap<(String, String), u64>>,
}

impl RequestVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            devices: RwLock::new(HashMap::new()),
            nonces: RwLock::new(HashMap::new()),
        }
    }

    /// Register a paired device's auth key.
    pub async fn register_device(&self, device_id: impl Into<String>, auth_key: [u8; 32]) {
        let device_id = device_id.into();
        debug!(device_id = %device_id, "device registered with verifier");
        self.devices.write().await.insert(device_id, auth_key);
    }

    /// Remove a device, e.g. after the host side unpairs it.
    pub async fn remove_device(&self, device_id: &str) {
        self.devices.write().await.remove(device_id);
    }

    pub async fn is_registered(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    /// Verify one request against the host's current time.
    ///
    /// The checks run in a fixed order (device, signature, timestamp,
    /// nonce) but callers must collapse any `Err` into the one generic
    /// wire failure via [`VerifyError::to_wire`].
    pub async fn verify(
        &self,
        req: &IncomingRequest<'_>,
        host_now: u64,
    ) -> Result<(), VerifyError> {
        let auth_key = {
            let devices = self.devices.read().await;
            match devices.get(req.device_id) {
                Some(key) => *key,
                None => {
                    warn!(device_id = %req.device_id, "rejected: unknown device");
                    return Err(VerifyError::UnknownDevice);
                }
            }
        };

        self.verify_with_key(req, &auth_key, host_now).await
    }

    /// Verify against a caller-supplied auth key, skipping the device
    /// lookup. Used for the pairing bootstrap, where the key is derived
    /// from the public key inside the request body before the device is
    /// registered.
    pub async fn verify_with_key(
        &self,
        req: &IncomingRequest<'_>,
        auth_key: &[u8; 32],
        host_now: u64,
    ) -> Result<(), VerifyError> {
        let message = canonical_message(
            req.method,
            req.path_with_query,
            req.timestamp,
            req.nonce,
            &body_hash(req.body),
        );
        let expected = hmac_sha256(auth_key, message.as_bytes());
        let presented = match hex::decode(req.signature) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(device_id = %req.device_id, "rejected: signature not valid hex");
                return Err(VerifyError::SignatureMismatch);
            }
        };
        if !constant_time_compare(&expected, &presented) {
            warn!(device_id = %req.device_id, "rejected: signature mismatch");
            return Err(VerifyError::SignatureMismatch);
        }

        if host_now.abs_diff(req.timestamp) > self.config.tolerance_secs {
            warn!(
                device_id = %req.device_id,
                timestamp = req.timestamp,
                host_now,
                "rejected: timestamp out of range"
            );
            return Err(VerifyError::TimestampOutOfRange);
        }

        self.check_and_record_nonce(req.device_id, req.nonce, host_now)
            .await
    }

    /// Record the nonce, evicting entries older than the tolerance
    /// window and bounding the cache size.
    async fn check_and_record_nonce(
        &self,
        device_id: &str,
        nonce: &str,
        host_now: u64,
    ) -> Result<(), VerifyError> {
        let mut nonces = self.nonces.write().await;

        let horizon = host_now.saturating_sub(self.config.tolerance_secs);
        nonces.retain(|_, seen_at| *seen_at >= horizon);

        let key = (device_id.to_string(), nonce.to_string());
        if nonces.contains_key(&key) {
            warn!(device_id = %device_id, "rejected: nonce replayed");
            return Err(VerifyError::NonceReplayed);
        }

        if nonces.len() >= self.config.max_cached_nonces {
            // Time eviction did not make room: drop the oldest entries.
            let mut by_age: Vec<_> = nonces
                .iter()
                .map(|(k, seen)| (k.clone(), *seen))
                .collect();
            by_age.sort_by_key(|(_, seen)| *seen);
            for (old_key, _) in by_age
                .into_iter()
                .take(nonces.len() + 1 - self.config.max_cached_nonces)
            {
                nonces.remove(&old_key);
            }
        }

        nonces.insert(key, host_now);
        Ok(())
    }

    #[cfg(test)]
    async fn cached_nonce_count(&self) -> usize {
        self.nonces.read().await.len()
    }
}

impl Default for RequestVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}
