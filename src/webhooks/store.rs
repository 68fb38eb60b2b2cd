//! Durable webhook registration table
//!
//! One JSON document per entry:
//!
//! ```json
//! {"version": 1, "key": "flowhome_webhooks_<entry_id>",
//!  "data": {"<webhook_id>": {"name": "...", "local_only": true}}}
//! ```
//!
//! Writes go to a temporary file that is fsynced and renamed over the
//! document, so readers see either the old table or the new one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::WebhookInfo;

/// Current document version
pub const STORE_VERSION: u32 = 1;

/// Prefix of the storage key; the entry id is appended
pub const STORE_KEY_PREFIX: &str = "flowhome_webhooks_";

/// Registration table keyed by webhook id
pub type WebhookTable = BTreeMap<String, WebhookInfo>;

/// Persistence errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{operation} failed for {path}: {reason}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("corrupt webhook store {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported webhook store version {found}")]
    UnsupportedVersion { found: u32 },
}

impl StorageError {
    fn io(operation: &'static str, path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    key: String,
    #[serde(default)]
    data: WebhookTable,
}

/// File-backed store for one entry's webhook table
#[derive(Debug)]
pub struct WebhookStore {
    path: PathBuf,
    key: String,
    write_lock: Mutex<()>,
}

impl WebhookStore {
    /// Store for `entry_id` under `storage_dir`
    pub fn new(storage_dir: impl AsRef<Path>, entry_id: &str) -> Self {
        let key = format!("{STORE_KEY_PREFIX}{entry_id}");
        let path = storage_dir.as_ref().join(format!("{key}.json"));

        Self {
            path,
            key,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the table; a missing file is an empty table
    pub async fn load(&self) -> Result<WebhookTable, StorageError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(WebhookTable::new()),
            Err(e) => return Err(StorageError::io("read", &self.path, e)),
        };

        let document: StoreDocument =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if document.version > STORE_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: document.version,
            });
        }

        if document.key != self.key {
            tracing::warn!(
                expected = %self.key,
                found = %document.key,
                "Webhook store key mismatch, loading anyway"
            );
        }

        Ok(document.data)
    }

    /// Atomically replace the persisted table
    pub async fn save(&self, table: &WebhookTable) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let document = StoreDocument {
            version: STORE_VERSION,
            key: self.key.clone(),
            data: table.clone(),
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io("create_dir", parent, e))?;
        }

        let temp = self.temp_path();
        if let Err(e) = write_synced(&temp, &json).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StorageError::io("write", &temp, e));
        }

        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StorageError::io("rename", &self.path, e));
        }

        sync_parent(&self.path).await;

        tracing::debug!(path = %self.path.display(), webhooks = table.len(), "Webhook table saved");
        Ok(())
    }

    /// Delete the persisted table; returns whether a file existed
    pub async fn remove(&self) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("remove", &self.path, e)),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Best-effort fsync of the directory entry after a rename
async fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Ok(dir) = tokio::fs::File::open(parent).await {
        let _ = dir.sync_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table() -> WebhookTable {
        let mut table = WebhookTable::new();
        table.insert(
            "abc".to_string(),
            WebhookInfo {
                name: "Door".to_string(),
                local_only: false,
            },
        );
        table
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = WebhookStore::new(dir.path(), "entry1");
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_document_format() {
        let dir = TempDir::new().unwrap();
        let store = WebhookStore::new(dir.path(), "entry1");

        store.save(&table()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["key"], "flowhome_webhooks_entry1");
        assert_eq!(raw["data"]["abc"]["name"], "Door");
        assert_eq!(raw["data"]["abc"]["local_only"], false);

        assert_eq!(store.load().await.unwrap(), table());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let store = WebhookStore::new(dir.path(), "entry1");
        store.save(&table()).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(store.temp_path()).unwrap();

        let err = store.save(&WebhookTable::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.load().await.unwrap(), table());
    }

    #[tokio::test]
    async fn test_corrupt_and_future_documents() {
        let dir = TempDir::new().unwrap();
        let store = WebhookStore::new(dir.path(), "entry1");

        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(store.load().await, Err(StorageError::Corrupt { .. })));

        std::fs::write(
            store.path(),
            br#"{"version": 9, "key": "flowhome_webhooks_entry1", "data": {}}"#,
        )
        .unwrap();
        assert_eq!(
            store.load().await,
            Err(StorageError::UnsupportedVersion { found: 9 })
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = WebhookStore::new(dir.path(), "entry1");

        assert!(!store.remove().await.unwrap());
        store.save(&table()).await.unwrap();
        assert!(store.remove().await.unwrap());
        assert!(!store.path().exists());
    }
}
