//! Connection lifecycle for every session after the first pairing.
//!
//! The manager owns credential restoration, key re-derivation, clock
//! re-sync, and the bounded exponential-backoff retry loop. It is an
//! explicitly constructed service object: callers hold it, there is no
//! process-wide instance. All attempts for one `connect()` run inside a
//! single spawned task, so cancelling that task cancels the pending
//! retry with it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use bridge_crypto::kdf::DerivedKeys;
use bridge_crypto::keypair::{KeyPair, PeerPublicKey};

use crate::client::BridgeClient;
use crate::clock::{self, ClockOffset};
use crate::errors::BridgeError;
use crate::pairing::{PairingOutcome, PairingSession};
use crate::store::CredentialStore;
use crate::types::{ConnectionState, PairStatus, PairingCode, PairingRecord};

/// Bounded exponential backoff for reconnect attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// In-memory state of an established session. Dropped on disconnect;
/// rebuilt from the persisted record on the next connect.
#[derive(Clone)]
pub struct LiveSession {
    pub auth_key: [u8; 32],
    pub offset: ClockOffset,
    pub client: BridgeClient,
    pub host_display_name: String,
}

/// Owns the `Disconnected -> Connecting -> Connected` lifecycle, with
/// `Error` reachable from `Connecting`.
pub struct ConnectionManager {
    store: Arc<dyn CredentialStore>,
    policy: RetryPolicy,
    state: Arc<RwLock<ConnectionState>>,
    session: Arc<RwLock<Option<LiveSession>>>,
    drive: Mutex<Option<AbortHandle>>,
    attempts_made: Arc<AtomicU32>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn CredentialStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            session: Arc::new(RwLock::new(None)),
            drive: Mutex::new(None),
            attempts_made: Arc::new(AtomicU32::new(0)),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn session(&self) -> Option<LiveSession> {
        self.session.read().await.clone()
    }

    /// Total connection attempts since the counter was last reset.
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made.load(Ordering::Relaxed)
    }

    /// Restore the persisted pairing and establish a session. A no-op
    /// when nothing is paired. Retryable failures are re-attempted with
    /// backoff inside this call; credential corruption is surfaced
    /// immediately with no retry.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let record = self
            .store
            .load_record()
            .await
            .map_err(|e| BridgeError::Store(e.to_string()))?;
        let Some(record) = record else {
            debug!("no pairing record, nothing to connect to");
            return Ok(());
        };
        let identity = self
            .store
            .load_identity()
            .await
            .map_err(|e| BridgeError::Store(e.to_string()))?
            .ok_or(BridgeError::CredentialsMissing)?;

        let handle = {
            let mut drive = self.drive.lock().await;
            if let Some(prior) = drive.take() {
                warn!("cancelling prior connection task");
                prior.abort();
            }

            let policy = self.policy;
            let state = Arc::clone(&self.state);
            let session = Arc::clone(&self.session);
            let attempts = Arc::clone(&self.attempts_made);
            let handle = tokio::spawn(async move {
                drive_connect(policy, state, session, attempts, record, identity.device_id).await
            });
            *drive = Some(handle.abort_handle());
            handle
        };

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(BridgeError::Cancelled),
            Err(join_err) => Err(BridgeError::Crypto(join_err.to_string())),
        }
    }

    /// Drive one pairing attempt and reflect its outcome on the
    /// connection state: success adopts the fresh session, any failure
    /// (including rejection by the host) lands in `Error`. Nothing is
    /// retried; a failed pairing needs a new code or user action.
    pub async fn pair(
        &self,
        session: &PairingSession,
        code: PairingCode,
    ) -> Result<PairStatus, BridgeError> {
        *self.state.write().await = ConnectionState::Connecting;
        match session.pair(code).await {
            Ok(outcome) => {
                let status = outcome.status;
                self.adopt(outcome).await;
                Ok(status)
            }
            Err(err) => {
                warn!(error = %err, "pairing failed");
                *self.state.write().await = ConnectionState::Error(err.to_string());
                Err(err)
            }
        }
    }

    /// Install the session a just-completed pairing produced, skipping
    /// the reconnect round trips.
    pub async fn adopt(&self, outcome: PairingOutcome) {
        if let Some(prior) = self.drive.lock().await.take() {
            prior.abort();
        }
        *self.session.write().await = Some(LiveSession {
            auth_key: outcome.keys.auth_key,
            offset: outcome.offset,
            client: outcome.client,
            host_display_name: outcome.record.host_display_name.clone(),
        });
        self.attempts_made.store(0, Ordering::Relaxed);
        *self.state.write().await = ConnectionState::Connected;
    }

    /// Cancel any in-flight attempt or pending retry and drop the
    /// in-memory session. Credentials stay persisted.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.drive.lock().await.take() {
            handle.abort();
        }
        *self.session.write().await = None;
        *self.state.write().await = ConnectionState::Disconnected;
        info!("disconnected");
    }

    /// Disconnect, then delete the pairing record and device identity.
    /// The next pairing starts with a brand-new identity.
    pub async fn unpair(&self) -> Result<(), BridgeError> {
        self.disconnect().await;
        self.store
            .clear_all()
            .await
            .map_err(|e| BridgeError::Store(e.to_string()))?;
        info!("unpaired, credentials cleared");
        Ok(())
    }

    /// User-initiated retry after the automatic budget is exhausted.
    /// Resets the attempt counter and connects again.
    pub async fn retry(&self) -> Result<(), BridgeError> {
        self.attempts_made.store(0, Ordering::Relaxed);
        self.connect().await
    }

    /// Issue a signed GET through the established session.
    pub async fn signed_get(
        &self,
        path: &str,
        query: &str,
    ) -> Result<serde_json::Value, BridgeError> {
        let live = self
            .session
            .read()
            .await
            .clone()
            .ok_or(BridgeError::CredentialsMissing)?;
        live.client
            .signed_get(path, query, &live.auth_key, live.offset.now())
            .await
    }
}

async fn drive_connect(
    policy: RetryPolicy,
    state: Arc<RwLock<ConnectionState>>,
    session: Arc<RwLock<Option<LiveSession>>>,
    attempts: Arc<AtomicU32>,
    record: PairingRecord,
    device_id: String,
) -> Result<(), BridgeError> {
    let mut retry = 0u32;
    loop {
        *state.write().await = ConnectionState::Connecting;
        attempts.fetch_add(1, Ordering::Relaxed);

        match attempt_connect(&record, &device_id).await {
            Ok(live) => {
                info!(host = %live.host_display_name, "connected");
                *session.write().await = Some(live);
                attempts.store(0, Ordering::Relaxed);
                *state.write().await = ConnectionState::Connected;
                return Ok(());
            }
            Err(err) if err.is_fatal() => {
                warn!(error = %err, "connection failed fatally, re-pair required");
                *state.write().await = ConnectionState::Error(err.to_string());
                return Err(err);
            }
            Err(err) => {
                retry += 1;
                if retry > policy.max_attempts {
                    warn!(error = %err, retries = policy.max_attempts, "retry budget exhausted");
                    *state.write().await = ConnectionState::Error(err.to_string());
                    return Err(err);
                }
                let delay = policy.delay_for(retry);
                warn!(error = %err, retry, delay_ms = delay.as_millis() as u64, "connection failed, retrying");
                *state.write().await = ConnectionState::Error(err.to_string());
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One connection attempt: re-derive keys from the stored credentials,
/// sync the clock, and confirm with a signed health check.
async fn attempt_connect(
    record: &PairingRecord,
    device_id: &str,
) -> Result<LiveSession, BridgeError> {
    // Any failure to restore our own key means the record is unusable.
    let keypair = KeyPair::from_base64(&record.own_private_key)
        .map_err(|_| BridgeError::CredentialsMissing)?;
    let peer = PeerPublicKey::from_base64(&record.peer_public_key)?;
    let keys = DerivedKeys::derive(&keypair.agree(&peer));

    let client = BridgeClient::new(&record.host_hostname, record.host_port, device_id)?;
    let offset = clock::sync(&client, &keys.auth_key).await?;
    let health = client.health(&keys.auth_key, offset.now()).await?;

    Ok(LiveSession {
        auth_key: keys.auth_key,
        offset,
        client,
        host_display_name: health.name,
    })
}
