//! Data model and wire payloads for the bridge protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BridgeError;

/// Protocol version carried in the pairing code. Checked before any
/// cryptographic operation happens.
pub const PROTOCOL_VERSION: &str = "talkie-bridge-v1";

/// Stable identity of this install. Created once and deleted only on a
/// full unpair, which forces a fresh identity (and therefore a fresh
/// trust entry on the host) at the next pairing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub display_name: String,
}

impl DeviceIdentity {
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
        }
    }
}

/// Scanned pairing code payload (JSON, out-of-band).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairingCode {
    /// Host's long-lived ECDH public key: base64, uncompressed point.
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub hostname: String,
    pub port: u16,
    pub protocol: String,
}

impl PairingCode {
    pub fn parse(json: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(json).map_err(|e| BridgeError::BadResponse(e.to_string()))
    }
}

/// The durable pairing record. All-or-nothing: if any field is missing
/// from the store, the device is unpaired.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub host_hostname: String,
    pub host_port: u16,
    /// Own P-256 private scalar, base64.
    pub own_private_key: String,
    /// Host's public key, base64 uncompressed point.
    pub peer_public_key: String,
    pub host_display_name: String,
}

/// In-memory connection state. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

// ============================================================================
// Wire payloads
// ============================================================================

/// Body of `POST /v1/pair`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairRequestBody {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Device's own public key: base64, uncompressed point.
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub name: String,
}

/// Host's decision on a pairing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Approved,
    /// Still treated as a successful connection: a host that approves
    /// quietly later keeps accepting signed calls in the meantime.
    PendingApproval,
    Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairResponse {
    pub status: PairStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response of `GET /v1/health`: host identity plus its current time,
/// which doubles as the clock sync source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub name: String,
    /// Host's current unix time in seconds.
    pub now: u64,
}
