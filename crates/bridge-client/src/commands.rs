//! One-shot CLI commands over the pairing and connection layers.

use std::sync::Arc;

use tracing::info;

use bridge_core::connection::{ConnectionManager, RetryPolicy};
use bridge_core::pairing::PairingSession;
use bridge_core::store::{CredentialStore, FileStore};
use bridge_core::types::{ConnectionState, PairStatus, PairingCode};

use crate::config::ClientConfig;

async fn open_store(config: &ClientConfig) -> anyhow::Result<Arc<FileStore>> {
    tokio::fs::create_dir_all(&config.state_dir).await?;
    let store = FileStore::open(config.credentials_path()).await?;
    Ok(Arc::new(store))
}

/// Pair with a host from its pairing code JSON.
pub async fn pair(config: &ClientConfig, code_json: &str) -> anyhow::Result<()> {
    let code = PairingCode::parse(code_json)?;
    let store = open_store(config).await?;

    let session = PairingSession::new(store.clone(), config.device_name.clone());
    let manager = ConnectionManager::new(store, RetryPolicy::default());
    let status = manager.pair(&session, code).await?;
    let live = manager.session().await.expect("pairing adopted a session");

    match status {
        PairStatus::Approved => {
            println!("paired with {}", live.host_display_name);
        }
        PairStatus::PendingApproval => {
            println!(
                "pairing with {} is pending approval on the host",
                live.host_display_name
            );
        }
        PairStatus::Rejected => unreachable!("rejected pairings surface as errors"),
    }
    Ok(())
}

/// Connect from persisted credentials and report the resulting state.
pub async fn connect(config: &ClientConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    if store.load_record().await?.is_none() {
        println!("not paired; run `pair` first");
        return Ok(());
    }

    let manager = ConnectionManager::new(store, RetryPolicy::default());
    manager.connect().await?;

    match manager.state().await {
        ConnectionState::Connected => {
            let live = manager.session().await.expect("connected implies session");
            println!("connected to {}", live.host_display_name);
        }
        other => println!("connection state: {:?}", other),
    }
    Ok(())
}

/// Show whether this device is paired, without touching the network.
pub async fn status(config: &ClientConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    match store.load_record().await? {
        Some(record) => println!(
            "paired with {} ({}:{})",
            record.host_display_name, record.host_hostname, record.host_port
        ),
        None => println!("not paired"),
    }
    Ok(())
}

/// Issue one signed GET and print the JSON response.
pub async fn request(config: &ClientConfig, path: &str, query: &str) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let manager = ConnectionManager::new(store, RetryPolicy::default());
    manager.connect().await?;
    if manager.state().await != ConnectionState::Connected {
        anyhow::bail!("not connected");
    }

    let value = manager.signed_get(path, query).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Delete the pairing record and device identity.
pub async fn unpair(config: &ClientConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let manager = ConnectionManager::new(store, RetryPolicy::default());
    manager.unpair().await?;
    info!("credentials cleared");
    println!("unpaired");
    Ok(())
}
