use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use bridge_core::client::{HEADER_DEVICE_ID, HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use bridge_core::clock::local_unix_now;
use bridge_core::types::{HealthResponse, PairRequestBody, PairResponse, PairStatus};
use bridge_core::verify::{IncomingRequest, RequestVerifier};
use bridge_crypto::kdf::DerivedKeys;
use bridge_crypto::keypair::{KeyPair, PeerPublicKey};
use bridge_crypto::sign::canonical_path;

use crate::config::{HostConfig, PairingPolicy};

/// Metadata the host keeps per paired device. The auth key itself lives
/// in the verifier.
#[derive(Clone, Debug)]
pub struct PairedDevice {
    pub name: String,
    pub paired_at: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub config: HostConfig,
    pub host_key: Arc<KeyPair>,
    pub verifier: Arc<RequestVerifier>,
    pub devices: Arc<DashMap<String, PairedDevice>>,
}

/// The single body every authentication rejection produces. Which check
/// failed never reaches the wire.
fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "authentication failed" })),
    )
        .into_response()
}

/// Pull the four signing headers out of a request, if all are present.
struct AuthHeaders<'a> {
    device_id: &'a str,
    timestamp: u64,
    nonce: &'a str,
    signature: &'a str,
}

fn auth_headers(headers: &HeaderMap) -> Option<AuthHeaders<'_>> {
    let get = |name: &str| headers.get(name)?.to_str().ok();
    Some(AuthHeaders {
        device_id: get(HEADER_DEVICE_ID)?,
        timestamp: get(HEADER_TIMESTAMP)?.parse().ok()?,
        nonce: get(HEADER_NONCE)?,
        signature: get(HEADER_SIGNATURE)?,
    })
}

fn incoming<'a>(
    method: &'a str,
    path_with_query: &'a str,
    auth: &'a AuthHeaders<'a>,
    body: &'a [u8],
) -> IncomingRequest<'a> {
    IncomingRequest {
        method,
        path_with_query,
        device_id: auth.device_id,
        timestamp: auth.timestamp,
        nonce: auth.nonce,
        body,
        signature: auth.signature,
    }
}

// POST /v1/pair
//
// The device is not yet registered, so the auth key is derived from the
// public key carried in the body itself, then the signature is checked
// against that derived key. A forged body fails the check because the
// signer must hold the private half of the submitted public key and the
// host's public key to land on the same HMAC key.
pub async fn post_pair(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: PairRequestBody = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return (StatusCode::BAD_REQUEST, "malformed pairing request").into_response(),
    };

    let peer = match PeerPublicKey::from_base64(&request.public_key) {
        Ok(p) => p,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid public key").into_response(),
    };
    let keys = DerivedKeys::derive(&state.host_key.agree(&peer));

    let Some(auth) = auth_headers(&headers) else {
        return unauthorized();
    };
    if auth.device_id != request.device_id {
        warn!("pair rejected: header device id does not match body");
        return unauthorized();
    }

    let path_with_query = canonical_path(uri.path(), uri.query().unwrap_or(""));
    let req = incoming("POST", &path_with_query, &auth, &body);
    if state
        .verifier
        .verify_with_key(&req, &keys.auth_key, local_unix_now())
        .await
        .is_err()
    {
        return unauthorized();
    }

    let status = match state.config.pairing_policy {
        PairingPolicy::Approve => PairStatus::Approved,
        PairingPolicy::Pending => PairStatus::PendingApproval,
        PairingPolicy::Reject => {
            info!(device_id = %request.device_id, "pairing rejected by policy");
            return Json(PairResponse {
                status: PairStatus::Rejected,
                message: Some("pairing not accepted by this host".to_string()),
            })
            .into_response();
        }
    };

    state
        .verifier
        .register_device(request.device_id.clone(), keys.auth_key)
        .await;
    state.devices.insert(
        request.device_id.clone(),
        PairedDevice {
            name: request.name.clone(),
            paired_at: local_unix_now(),
        },
    );
    info!(device_id = %request.device_id, name = %request.name, status = ?status, "device paired");

    Json(PairResponse {
        status,
        message: None,
    })
    .into_response()
}

// GET /v1/health
//
// The bootstrap endpoint: it is the clock sync source a device needs
// before it can sign anything the host can check. A re-pairing device
// signs with a key the host has not seen yet, and a drifted clock makes
// every signature fail its own timestamp window, so enforcing
// verification here would lock both out of the one endpoint that lets
// them recover. The body discloses only the host's name and time;
// signature failures from registered devices are logged, never blocked.
pub async fn get_health(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Some(auth) = auth_headers(&headers) {
        if state.verifier.is_registered(auth.device_id).await {
            let path_with_query = canonical_path(uri.path(), uri.query().unwrap_or(""));
            let req = incoming("GET", &path_with_query, &auth, b"");
            if state.verifier.verify(&req, local_unix_now()).await.is_err() {
                warn!(device_id = %auth.device_id, "health signature did not verify, serving anyway");
            }
        }
    }

    Json(HealthResponse {
        name: state.config.display_name.clone(),
        now: local_unix_now(),
    })
    .into_response()
}

// GET /v1/sessions
//
// Signed-only route listing the host's paired devices.
pub async fn get_sessions(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(auth) = auth_headers(&headers) else {
        return unauthorized();
    };
    let path_with_query = canonical_path(uri.path(), uri.query().unwrap_or(""));
    let req = incoming("GET", &path_with_query, &auth, b"");
    if state.verifier.verify(&req, local_unix_now()).await.is_err() {
        return unauthorized();
    }

    let sessions: Vec<_> = state
        .devices
        .iter()
        .map(|entry| {
            json!({
                "deviceId": entry.key(),
                "name": entry.value().name,
                "pairedAt": entry.value().paired_at,
            })
        })
        .collect();

    Json(json!({ "sessions": sessions })).into_response()
}
