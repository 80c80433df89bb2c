// # File Stores
//
// JSON-file implementations of the store traits with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "jane@example.com": {
//       "email": "jane@example.com",
//       "contact_id": 1234,
//       "relation_id": 5678,
//       "created_at": "2025-01-09T12:00:00Z",
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{
    ConfigStore, LanguageId, ListMapping, ListMappingStore, ListMappingTransaction,
    NewsletterDirectory, SubscriberRecord, SubscriberStore,
};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Ord, V: Serialize",
    deserialize = "K: DeserializeOwned + Ord, V: DeserializeOwned"
))]
struct StoreFileFormat<K, V> {
    version: String,
    records: BTreeMap<K, V>,
}

/// A keyed table persisted as one JSON file
///
/// Every mutation is written through immediately. If the write fails the
/// in-memory table is restored, so readers never observe a change that did
/// not reach disk.
#[derive(Debug)]
struct JsonTable<K, V> {
    path: PathBuf,
    records: RwLock<BTreeMap<K, V>>,
}

impl<K, V> JsonTable<K, V>
where
    K: Serialize + DeserializeOwned + Ord + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Create or load a table
    ///
    /// This will:
    /// 1. Try to load the existing file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty table
    /// 4. Create parent directories if needed
    async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let records = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Load the file, falling back to its backup when the main file is corrupted
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<K, V>, Error> {
        match Self::load(path).await {
            Ok(records) => {
                tracing::debug!(
                    "Loaded {} record(s) from {}",
                    records.len(),
                    path.display()
                );
                Ok(records)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(BTreeMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(records) => {
                        tracing::info!("Recovered {} record(s) from backup", records.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore {} from backup: {}",
                                path.display(),
                                restore_err
                            );
                        }
                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<BTreeMap<K, V>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat<K, V> = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.records)
    }

    async fn get(&self, key: &K) -> Option<V> {
        self.records.read().await.get(key).cloned()
    }

    async fn keys(&self) -> Vec<K> {
        self.records.read().await.keys().cloned().collect()
    }

    async fn values(&self) -> Vec<V> {
        self.records.read().await.values().cloned().collect()
    }

    /// Apply `change` and write the result to disk
    ///
    /// `change` may refuse the mutation by returning an error, in which case
    /// nothing is written.
    async fn mutate<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut BTreeMap<K, V>) -> Result<(), Error> + Send,
    {
        let mut guard = self.records.write().await;
        let snapshot = guard.clone();

        let result = match change(&mut *guard) {
            Ok(()) => self.write(&*guard).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            *guard = snapshot;
        }
        result
    }

    /// Write the table atomically: temp file, backup of the current file, rename
    async fn write(&self, records: &BTreeMap<K, V>) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.to_path_buf();
    backup.set_extension("backup");
    backup
}

/// File-backed subscriber store
///
/// # Example
///
/// ```rust,no_run
/// use mailsync_core::state::FileSubscriberStore;
/// use mailsync_core::traits::{SubscriberRecord, SubscriberStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSubscriberStore::new("/var/lib/mailsync/subscribers.json").await?;
///     store.insert(&SubscriberRecord::new("jane@example.com", 42)).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSubscriberStore {
    table: JsonTable<String, SubscriberRecord>,
}

impl FileSubscriberStore {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self {
            table: JsonTable::open(path).await?,
        })
    }
}

#[async_trait]
impl SubscriberStore for FileSubscriberStore {
    async fn get(&self, email: &str) -> Result<Option<SubscriberRecord>, Error> {
        Ok(self.table.get(&email.to_string()).await)
    }

    async fn insert(&self, record: &SubscriberRecord) -> Result<(), Error> {
        let record = record.clone();
        self.table
            .mutate(move |records| {
                if records.contains_key(&record.email) {
                    return Err(Error::store(format!(
                        "Subscriber already exists: {}",
                        record.email
                    )));
                }
                records.insert(record.email.clone(), record);
                Ok(())
            })
            .await
    }

    async fn save(&self, record: &SubscriberRecord) -> Result<(), Error> {
        let record = record.clone();
        self.table
            .mutate(move |records| {
                records.insert(record.email.clone(), record);
                Ok(())
            })
            .await
    }

    async fn delete(&self, email: &str) -> Result<(), Error> {
        let email = email.to_string();
        self.table
            .mutate(move |records| {
                records.remove(&email);
                Ok(())
            })
            .await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.table.keys().await)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every mutation is written through
        Ok(())
    }
}

/// File-backed list mapping store
#[derive(Debug, Clone)]
pub struct FileListMappingStore {
    table: Arc<JsonTable<LanguageId, ListMapping>>,
}

impl FileListMappingStore {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self {
            table: Arc::new(JsonTable::open(path).await?),
        })
    }
}

#[async_trait]
impl ListMappingStore for FileListMappingStore {
    async fn get(&self, language_id: LanguageId) -> Result<Option<ListMapping>, Error> {
        Ok(self.table.get(&language_id).await)
    }

    async fn list(&self) -> Result<Vec<ListMapping>, Error> {
        Ok(self.table.values().await)
    }

    async fn begin(&self) -> Result<Box<dyn ListMappingTransaction>, Error> {
        Ok(Box::new(FileListMappingTransaction {
            table: Arc::clone(&self.table),
            staged: Vec::new(),
            finished: false,
        }))
    }
}

/// Staged writes committed as a single file write
struct FileListMappingTransaction {
    table: Arc<JsonTable<LanguageId, ListMapping>>,
    staged: Vec<ListMapping>,
    finished: bool,
}

#[async_trait]
impl ListMappingTransaction for FileListMappingTransaction {
    async fn upsert(
        &mut self,
        language_id: LanguageId,
        contacts_list_name: &str,
    ) -> Result<(), Error> {
        if self.finished {
            return Err(Error::store("List mapping transaction already finished"));
        }
        self.staged
            .push(ListMapping::new(language_id, contacts_list_name));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::store("List mapping transaction already finished"));
        }
        let staged = std::mem::take(&mut self.staged);
        self.finished = true;
        self.table
            .mutate(move |records| {
                for mapping in staged {
                    records.insert(mapping.language_id, mapping);
                }
                Ok(())
            })
            .await
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.staged.clear();
        self.finished = true;
        Ok(())
    }
}

/// File-backed key/value settings
#[derive(Debug)]
pub struct FileConfigStore {
    table: JsonTable<String, String>,
}

impl FileConfigStore {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self {
            table: JsonTable::open(path).await?,
        })
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.table.get(&key.to_string()).await)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let (key, value) = (key.to_string(), value.to_string());
        self.table
            .mutate(move |records| {
                records.insert(key, value);
                Ok(())
            })
            .await
    }
}

/// File-backed newsletter directory
///
/// Subscription id to email map, persisted across restarts.
#[derive(Debug)]
pub struct FileNewsletterDirectory {
    table: JsonTable<u64, String>,
}

impl FileNewsletterDirectory {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self {
            table: JsonTable::open(path).await?,
        })
    }

    /// Record (or change) the email of a subscription
    pub async fn set_email(
        &self,
        subscription_id: u64,
        email: impl Into<String>,
    ) -> Result<(), Error> {
        let email = email.into();
        self.table
            .mutate(move |records| {
                records.insert(subscription_id, email);
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl NewsletterDirectory for FileNewsletterDirectory {
    async fn email_of(&self, subscription_id: u64) -> Result<Option<String>, Error> {
        Ok(self.table.get(&subscription_id).await)
    }
}
