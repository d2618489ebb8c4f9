//! First-contact pairing state machine.
//!
//! A scanned pairing code drives one attempt end to end: version check,
//! fresh key pair, key agreement and derivation, clock sync against the
//! host, the signed pairing request itself, then persistence. Each
//! attempt generates a new key pair; only an approved (or pending)
//! attempt ever writes to the store. Starting a new attempt cancels any
//! attempt still in flight.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use bridge_crypto::kdf::DerivedKeys;
use bridge_crypto::keypair::{KeyPair, PeerPublicKey};

use crate::client::BridgeClient;
use crate::clock::{self, ClockOffset};
use crate::errors::BridgeError;
use crate::store::CredentialStore;
use crate::types::{
    DeviceIdentity, PairRequestBody, PairStatus, PairingCode, PairingRecord, PROTOCOL_VERSION,
};

/// Observable progress of a pairing attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    GeneratingIdentity,
    DerivingKeys,
    SyncingClock,
    AwaitingHostApproval,
    Paired,
    Rejected,
    Failed(String),
}

/// Everything a successful attempt produces. Handed to the connection
/// layer so the freshly paired session can be used without a reconnect.
pub struct PairingOutcome {
    pub record: PairingRecord,
    pub status: PairStatus,
    pub keys: DerivedKeys,
    pub offset: ClockOffset,
    pub client: BridgeClient,
}

impl fmt::Debug for PairingOutcome {
    /// Key material stays out of debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingOutcome")
            .field("status", &self.status)
            .field("host", &self.record.host_display_name)
            .finish_non_exhaustive()
    }
}

/// The attempt currently occupying the session, tagged so a finished
/// attempt can tell whether the slot still holds its own handle.
struct InFlight {
    attempt: u64,
    abort: AbortHandle,
}

/// Orchestrates pairing attempts against one credential store. At most
/// one attempt runs at a time.
pub struct PairingSession {
    store: Arc<dyn CredentialStore>,
    device_name: String,
    state: Arc<RwLock<PairingState>>,
    in_flight: Mutex<Option<InFlight>>,
    attempt_counter: AtomicU64,
}

impl PairingSession {
    pub fn new(store: Arc<dyn CredentialStore>, device_name: impl Into<String>) -> Self {
        Self {
            store,
            device_name: device_name.into(),
            state: Arc::new(RwLock::new(PairingState::Idle)),
            in_flight: Mutex::new(None),
            attempt_counter: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> PairingState {
        self.state.read().await.clone()
    }

    /// Run one pairing attempt. Cancels any attempt still in flight
    /// before starting; the cancelled attempt resolves as `Cancelled`
    /// and leaves nothing persisted.
    pub async fn pair(&self, code: PairingCode) -> Result<PairingOutcome, BridgeError> {
        let attempt = self.attempt_counter.fetch_add(1, Ordering::Relaxed);
        let handle = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(prior) = in_flight.take() {
                warn!("cancelling in-flight pairing attempt");
                prior.abort.abort();
            }

            let store = Arc::clone(&self.store);
            let device_name = self.device_name.clone();
            let state = Arc::clone(&self.state);
            let handle =
                tokio::spawn(async move { run_attempt(store, device_name, state, code).await });
            *in_flight = Some(InFlight {
                attempt,
                abort: handle.abort_handle(),
            });
            handle
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(BridgeError::Cancelled),
            Err(join_err) => Err(BridgeError::Crypto(join_err.to_string())),
        };

        // Clear the slot only if it still holds this attempt. A newer
        // attempt may have replaced it while we were awaiting, and its
        // handle must stay reachable for cancellation.
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref().map(|f| f.attempt) == Some(attempt) {
            in_flight.take();
        }
        result
    }

    /// Abort the in-flight attempt, if any, and return to `Idle`.
    pub async fn cancel(&self) {
        if let Some(in_flight) = self.in_flight.lock().await.take() {
            in_flight.abort.abort();
        }
        *self.state.write().await = PairingState::Idle;
    }
}

async fn set_state(state: &RwLock<PairingState>, next: PairingState) {
    *state.write().await = next;
}

async fn run_attempt(
    store: Arc<dyn CredentialStore>,
    device_name: String,
    state: Arc<RwLock<PairingState>>,
    code: PairingCode,
) -> Result<PairingOutcome, BridgeError> {
    match attempt_inner(store, device_name, &state, code).await {
        Ok(outcome) => {
            set_state(&state, PairingState::Paired).await;
            Ok(outcome)
        }
        Err(BridgeError::PairingRejected) => {
            set_state(&state, PairingState::Rejected).await;
            Err(BridgeError::PairingRejected)
        }
        Err(err) => {
            set_state(&state, PairingState::Failed(err.to_string())).await;
            Err(err)
        }
    }
}

async fn attempt_inner(
    store: Arc<dyn CredentialStore>,
    device_name: String,
    state: &RwLock<PairingState>,
    code: PairingCode,
) -> Result<PairingOutcome, BridgeError> {
    // Version gate before any cryptographic work.
    if code.protocol != PROTOCOL_VERSION {
        return Err(BridgeError::UnsupportedProtocolVersion(code.protocol));
    }

    set_state(state, PairingState::GeneratingIdentity).await;
    let identity = match store
        .load_identity()
        .await
        .map_err(|e| BridgeError::Store(e.to_string()))?
    {
        Some(existing) => existing,
        None => {
            let fresh = DeviceIdentity::generate(device_name);
            store
                .save_identity(&fresh)
                .await
                .map_err(|e| BridgeError::Store(e.to_string()))?;
            fresh
        }
    };
    // Fresh key pair per attempt; a reused pair from a failed attempt
    // would tie this attempt to key material the host never approved.
    let keypair = KeyPair::generate();

    set_state(state, PairingState::DerivingKeys).await;
    let peer = PeerPublicKey::from_base64(&code.public_key)?;
    let keys = DerivedKeys::derive(&keypair.agree(&peer));

    set_state(state, PairingState::SyncingClock).await;
    let client = BridgeClient::new(&code.hostname, code.port, identity.device_id.clone())?;
    let offset = clock::sync(&client, &keys.auth_key).await?;

    set_state(state, PairingState::AwaitingHostApproval).await;
    let body = PairRequestBody {
        device_id: identity.device_id.clone(),
        public_key: keypair.public_key().to_base64(),
        name: identity.display_name.clone(),
    };
    let response = client.pair(&body, &keys.auth_key, offset.now()).await?;

    let status = match response.status {
        PairStatus::Rejected => return Err(BridgeError::PairingRejected),
        approved => approved,
    };

    // Follow-up signed call: confirms the host accepts our signatures
    // and yields its display name for the record.
    let health = client.health(&keys.auth_key, offset.now()).await?;

    let record = PairingRecord {
        host_hostname: code.hostname,
        host_port: code.port,
        own_private_key: keypair.scalar_base64(),
        peer_public_key: code.public_key,
        host_display_name: health.name,
    };
    store
        .save_record(&record)
        .await
        .map_err(|e| BridgeError::Store(e.to_string()))?;

    info!(
        host = %record.host_hostname,
        status = ?status,
        "pairing persisted"
    );

    Ok(PairingOutcome {
        record,
        status,
        keys,
        offset,
        client,
    })
}
