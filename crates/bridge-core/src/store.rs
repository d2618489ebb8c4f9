//! Credential storage for the bridge.
//!
//! This module defines the `CredentialStore` trait plus an in-memory
//! implementation for tests and a JSON-file implementation for real
//! installs. The persisted record is all-or-nothing: a store with any
//! record field absent reports the device as unpaired.
//!
//! Store access is single-writer: every mutation takes the one write
//! lock, so a concurrent `unpair()` and a completing pairing persist
//! cannot interleave into a partially-written record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{DeviceIdentity, PairingRecord};

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage abstraction for the device identity and pairing record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Save the device identity.
    async fn save_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError>;

    /// Load the device identity, if one was created.
    async fn load_identity(&self) -> Result<Option<DeviceIdentity>, StoreError>;

    /// Save the complete pairing record.
    async fn save_record(&self, record: &PairingRecord) -> Result<(), StoreError>;

    /// Load the pairing record. Returns `None` when any field is
    /// missing; partial records are never surfaced.
    async fn load_record(&self) -> Result<Option<PairingRecord>, StoreError>;

    /// Delete the pairing record and the device identity together.
    async fn clear_all(&self) -> Result<(), StoreError>;
}

// ============================================================================
// On-disk / in-slot layout
// ============================================================================

/// Credential slots as individually-optional logical keys. This is the
/// JSON shape on disk; `record()` enforces the all-or-nothing rule.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CredentialSlots {
    device_id: Option<String>,
    device_name: Option<String>,
    host_hostname: Option<String>,
    host_port: Option<u16>,
    own_private_key: Option<String>,
    peer_public_key: Option<String>,
    host_display_name: Option<String>,
}

impl CredentialSlots {
    fn identity(&self) -> Option<DeviceIdentity> {
        Some(DeviceIdentity {
            device_id: self.device_id.clone()?,
            display_name: self.device_name.clone()?,
        })
    }

    fn record(&self) -> Option<PairingRecord> {
        Some(PairingRecord {
            host_hostname: self.host_hostname.clone()?,
            host_port: self.host_port?,
            own_private_key: self.own_private_key.clone()?,
            peer_public_key: self.peer_public_key.clone()?,
            host_display_name: self.host_display_name.clone()?,
        })
    }

    fn set_identity(&mut self, identity: &DeviceIdentity) {
        self.device_id = Some(identity.device_id.clone());
        self.device_name = Some(identity.display_name.clone());
    }

    fn set_record(&mut self, record: &PairingRecord) {
        self.host_hostname = Some(record.host_hostname.clone());
        self.host_port = Some(record.host_port);
        self.own_private_key = Some(record.own_private_key.clone());
        self.peer_public_key = Some(record.peer_public_key.clone());
        self.host_display_name = Some(record.host_display_name.clone());
    }
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Thread-safe in-memory store for tests and ephemeral use.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    slots: Arc<RwLock<CredentialSlots>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn save_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        self.slots.write().await.set_identity(identity);
        Ok(())
    }

    async fn load_identity(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        Ok(self.slots.read().await.identity())
    }

    async fn save_record(&self, record: &PairingRecord) -> Result<(), StoreError> {
        self.slots.write().await.set_record(record);
        Ok(())
    }

    async fn load_record(&self) -> Result<Option<PairingRecord>, StoreError> {
        Ok(self.slots.read().await.record())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        *self.slots.write().await = CredentialSlots::default();
        Ok(())
    }
}

// ============================================================================
// File Store Implementation
// ============================================================================

/// JSON-file credential store. Writes go to a temp file in the same
/// directory followed by a rename, so a crash mid-write leaves either
/// the old file or the new one, never a torn record.
pub struct FileStore {
    path: PathBuf,
    /// In-memory view of the file, guarded by the single writer lock.
    slots: RwLock<CredentialSlots>,
}

impl FileStore {
    /// Open (or initialize) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let slots = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no credential file yet, starting empty");
                CredentialSlots::default()
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        Ok(Self {
            path,
            slots: RwLock::new(slots),
        })
    }

    async fn persist(&self, slots: &CredentialSlots) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(slots)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn save_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        slots.set_identity(identity);
        self.persist(&slots).await
    }

    async fn load_identity(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        Ok(self.slots.read().await.identity())
    }

    async fn save_record(&self, record: &PairingRecord) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        slots.set_record(record);
        self.persist(&slots).await
    }

    async fn load_record(&self) -> Result<Option<PairingRecord>, StoreError> {
        Ok(self.slots.read().await.record())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        *slots = CredentialSlots::default();
        info!(path = %self.path.display(), "credentials cleared");
        self.persist(&slots).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> PairingRecord {
        PairingRecord {
            host_hostname: "mac.local".into(),
            host_port: 8765,
            own_private_key: "cHJpdg==".into(),
            peer_public_key: "cHVi".into(),
            host_display_name: "Office Mac".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_record_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.load_record().await.unwrap().is_none());

        let record = make_record();
        store.save_record(&record).await.unwrap();
        assert_eq!(store.load_record().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_memory_clear_all_removes_both() {
        let store = InMemoryStore::new();
        store
            .save_identity(&DeviceIdentity::generate("phone"))
            .await
            .unwrap();
        store.save_record(&make_record()).await.unwrap();

        store.clear_all().await.unwrap();
        assert!(store.load_identity().await.unwrap().is_none());
        assert!(store.load_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .save_identity(&DeviceIdentity::generate("phone"))
                .await
                .unwrap();
            store.save_record(&make_record()).await.unwrap();
        }

        // Reopen from disk.
        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.load_record().await.unwrap(), Some(make_record()));
        assert!(store.load_identity().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_partial_record_reports_unpaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        // A record missing the peer public key is not a record at all.
        tokio::fs::write(
            &path,
            r#"{
                "device_id": "abc",
                "device_name": "phone",
                "host_hostname": "mac.local",
                "host_port": 8765,
                "own_private_key": "cHJpdg=="
            }"#,
        )
        .await
        .unwrap();

        let store = FileStore::open(&path).await.unwrap();
        assert!(store.load_record().await.unwrap().is_none());
        // The identity half is complete and still loads.
        assert!(store.load_identity().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nope.json")).await.unwrap();
        assert!(store.load_identity().await.unwrap().is_none());
        assert!(store.load_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writes_never_tear() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..8u16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut record = make_record();
                record.host_port = 8000 + i;
                store.save_record(&record).await.unwrap();
            }));
        }
        let clearer = {
            let store = store.clone();
            tokio::spawn(async move {
                store.clear_all().await.unwrap();
            })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        clearer.await.unwrap();

        // Whatever won, the record is either complete or absent.
        match store.load_record().await.unwrap() {
            Some(record) => assert!(record.host_port >= 8000),
            None => {}
        }
    }
}
