use axum::Router;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use bridge_core::types::{PairingCode, PROTOCOL_VERSION};
use bridge_core::verify::RequestVerifier;
use bridge_crypto::keypair::KeyPair;

use crate::api::{self, AppState, PairedDevice};
use crate::config::HostConfig;

pub struct BridgeHost {
    config: HostConfig,
    host_key: Arc<KeyPair>,
    verifier: Arc<RequestVerifier>,
    devices: Arc<DashMap<String, PairedDevice>>,
}

impl BridgeHost {
    pub fn new(config: HostConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let host_key = match &config.key_path {
            Some(path) => load_or_create_key(path)?,
            None => {
                info!("no key path configured, using an ephemeral host key");
                KeyPair::generate()
            }
        };

        Ok(Self {
            config,
            host_key: Arc::new(host_key),
            verifier: Arc::new(RequestVerifier::default()),
            devices: Arc::new(DashMap::new()),
        })
    }

    /// The JSON payload a device scans to pair with this host.
    pub fn pairing_code(&self) -> PairingCode {
        PairingCode {
            public_key: self.host_key.public_key().to_base64(),
            hostname: self.config.advertised_hostname(),
            port: self.config.bind_addr.port(),
            protocol: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            host_key: Arc::clone(&self.host_key),
            verifier: Arc::clone(&self.verifier),
            devices: Arc::clone(&self.devices),
        };

        Router::new()
            .route("/v1/pair", axum::routing::post(api::post_pair))
            .route("/v1/health", axum::routing::get(api::get_health))
            .route("/v1/sessions", axum::routing::get(api::get_sessions))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("bridge-host listening on {}", self.config.bind_addr);
        info!(
            "pairing code: {}",
            serde_json::to_string(&self.pairing_code())?
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

fn load_or_create_key(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let encoded = std::fs::read_to_string(path)?;
        let key = KeyPair::from_base64(encoded.trim())
            .map_err(|e| anyhow::anyhow!("host key at {} is unreadable: {}", path.display(), e))?;
        info!("loaded host key from {}", path.display());
        Ok(key)
    } else {
        let key = KeyPair::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, key.scalar_base64())?;
        info!("generated new host key at {}", path.display());
        Ok(key)
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).ok()
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            #[cfg(unix)]
            {
                if let Some(ref mut sigterm) = sigterm {
                    sigterm.recv().await;
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PairingPolicy;

    #[test]
    fn test_pairing_code_carries_protocol_version() {
        let host = BridgeHost::new(HostConfig::default()).unwrap();
        let code = host.pairing_code();
        assert_eq!(code.protocol, PROTOCOL_VERSION);
        assert_eq!(code.port, 8765);
        // 65-byte uncompressed point, base64.
        use base64::{engine::general_purpose::STANDARD, Engine};
        assert_eq!(STANDARD.decode(code.public_key).unwrap().len(), 65);
    }

    #[test]
    fn test_key_persisted_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("host.key");
        let config = HostConfig {
            key_path: Some(key_path),
            pairing_policy: PairingPolicy::Approve,
            ..Default::default()
        };

        let first = BridgeHost::new(config.clone()).unwrap();
        let second = BridgeHost::new(config).unwrap();
        assert_eq!(
            first.pairing_code().public_key,
            second.pairing_code().public_key
        );
    }

    #[test]
    fn test_ephemeral_keys_differ() {
        let a = BridgeHost::new(HostConfig::default()).unwrap();
        let b = BridgeHost::new(HostConfig::default()).unwrap();
        assert_ne!(a.pairing_code().public_key, b.pairing_code().public_key);
    }
}
