//! Signed HTTP client for the host API.
//!
//! Every request is canonicalized and HMAC-signed before it leaves the
//! device; the four authentication headers fully determine what was
//! signed. Payloads travel as plaintext JSON over the private network.

use std::time::Duration;

use tracing::debug;

use bridge_crypto::sign::sign_request;

use crate::errors::BridgeError;
use crate::types::{HealthResponse, PairRequestBody, PairResponse};

pub const HEADER_DEVICE_ID: &str = "X-Device-ID";
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub const HEADER_NONCE: &str = "X-Nonce";
pub const HEADER_SIGNATURE: &str = "X-Signature";

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client bound to one host and one device identity.
#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    device_id: String,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(
        hostname: &str,
        port: u16,
        device_id: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        Ok(Self {
            base_url: format!("http://{}:{}", hostname, port),
            device_id: device_id.into(),
            client,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }

    /// Sign and send one request. `timestamp` is in the host time base
    /// (see `clock`).
    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
        body: Vec<u8>,
        auth_key: &[u8; 32],
        timestamp: u64,
    ) -> Result<reqwest::Response, BridgeError> {
        let signed = sign_request(method.as_str(), path, query, &body, auth_key, timestamp)?;
        debug!(method = %method, path = %signed.path_with_query, "sending signed request");

        let resp = self
            .client
            .request(method, self.url(path, query))
            .header(HEADER_DEVICE_ID, &self.device_id)
            .header(HEADER_TIMESTAMP, signed.timestamp.to_string())
            .header(HEADER_NONCE, &signed.nonce)
            .header(HEADER_SIGNATURE, &signed.signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeError::Timeout
                } else {
                    BridgeError::Network(e.to_string())
                }
            })?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(BridgeError::AuthenticationFailed)
            }
            other => Err(BridgeError::BadResponse(format!("status={}", other))),
        }
    }

    /// Signed health check: liveness, host display name, and the host
    /// time used for clock sync.
    pub async fn health(
        &self,
        auth_key: &[u8; 32],
        timestamp: u64,
    ) -> Result<HealthResponse, BridgeError> {
        let resp = self
            .send_signed(
                reqwest::Method::GET,
                "/v1/health",
                "",
                Vec::new(),
                auth_key,
                timestamp,
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| BridgeError::BadResponse(e.to_string()))
    }

    /// Send the signed pairing request carrying our public key and
    /// device identity.
    pub async fn pair(
        &self,
        body: &PairRequestBody,
        auth_key: &[u8; 32],
        timestamp: u64,
    ) -> Result<PairResponse, BridgeError> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| BridgeError::BadResponse(e.to_string()))?;
        let resp = self
            .send_signed(
                reqwest::Method::POST,
                "/v1/pair",
                "",
                bytes,
                auth_key,
                timestamp,
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| BridgeError::BadResponse(e.to_string()))
    }

    /// Signed GET against an arbitrary host route, returning raw JSON.
    pub async fn signed_get(
        &self,
        path: &str,
        query: &str,
        auth_key: &[u8; 32],
        timestamp: u64,
    ) -> Result<serde_json::Value, BridgeError> {
        let resp = self
            .send_signed(
                reqwest::Method::GET,
                path,
                query,
                Vec::new(),
                auth_key,
                timestamp,
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| BridgeError::BadResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = BridgeClient::new("mac.local", 8765, "dev-1").unwrap();
        assert_eq!(
            client.url("/v1/health", ""),
            "http://mac.local:8765/v1/health"
        );
        assert_eq!(
            client.url("/v1/sessions", "active=1"),
            "http://mac.local:8765/v1/sessions?active=1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Discard port, nothing listens there.
        let client = BridgeClient::new("127.0.0.1", 9, "dev-1").unwrap();
        let err = client.health(&[0u8; 32], 0).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Network(_) | BridgeError::Timeout
        ));
    }
}
