// # Memory Stores
//
// In-memory implementations of the store and storefront traits.
//
// ## Purpose
//
// Fast stores that don't persist across restarts. Useful for testing and for
// embedding mailsync where the host application owns persistence.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - A resubscribe after restart creates a new provider contact, since the
//   local existence check finds nothing

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{
    ConfigStore, Language, LanguageId, ListMapping, ListMappingStore, ListMappingTransaction,
    LocaleRegistry, NewsletterDirectory, SubscriberRecord, SubscriberStore,
};

/// In-memory subscriber store
///
/// # Example
///
/// ```rust,no_run
/// use mailsync_core::state::MemorySubscriberStore;
/// use mailsync_core::traits::{SubscriberRecord, SubscriberStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySubscriberStore::new();
///     store.insert(&SubscriberRecord::new("jane@example.com", 42)).await?;
///
///     let record = store.get("jane@example.com").await?;
///     assert_eq!(record.map(|r| r.contact_id), Some(42));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriberStore {
    inner: Arc<RwLock<HashMap<String, SubscriberRecord>>>,
}

impl MemorySubscriberStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn get(&self, email: &str) -> Result<Option<SubscriberRecord>, Error> {
        Ok(self.inner.read().await.get(email).cloned())
    }

    async fn insert(&self, record: &SubscriberRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&record.email) {
            return Err(Error::store(format!(
                "Subscriber already exists: {}",
                record.email
            )));
        }
        guard.insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn save(&self, record: &SubscriberRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, email: &str) -> Result<(), Error> {
        self.inner.write().await.remove(email);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let mut emails: Vec<String> = self.inner.read().await.keys().cloned().collect();
        emails.sort();
        Ok(emails)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

type MappingTable = Arc<RwLock<BTreeMap<LanguageId, ListMapping>>>;

/// In-memory list mapping store
#[derive(Debug, Clone, Default)]
pub struct MemoryListMappingStore {
    inner: MappingTable,
}

impl MemoryListMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListMappingStore for MemoryListMappingStore {
    async fn get(&self, language_id: LanguageId) -> Result<Option<ListMapping>, Error> {
        Ok(self.inner.read().await.get(&language_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ListMapping>, Error> {
        Ok(self.inner.read().await.values().cloned().collect())
    }

    async fn begin(&self) -> Result<Box<dyn ListMappingTransaction>, Error> {
        Ok(Box::new(MemoryListMappingTransaction {
            table: Arc::clone(&self.inner),
            staged: Vec::new(),
            finished: false,
        }))
    }
}

/// Staged writes against a [`MemoryListMappingStore`]
struct MemoryListMappingTransaction {
    table: MappingTable,
    staged: Vec<ListMapping>,
    finished: bool,
}

impl MemoryListMappingTransaction {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::store("List mapping transaction already finished"));
        }
        Ok(())
    }
}

#[async_trait]
impl ListMappingTransaction for MemoryListMappingTransaction {
    async fn upsert(
        &mut self,
        language_id: LanguageId,
        contacts_list_name: &str,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.staged
            .push(ListMapping::new(language_id, contacts_list_name));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let mut guard = self.table.write().await;
        for mapping in self.staged.drain(..) {
            guard.insert(mapping.language_id, mapping);
        }
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.staged.clear();
        self.finished = true;
        Ok(())
    }
}

/// In-memory key/value settings
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Locale registry over a fixed language list
#[derive(Debug, Clone, Default)]
pub struct StaticLocaleRegistry {
    languages: Vec<Language>,
}

impl StaticLocaleRegistry {
    pub fn new(languages: Vec<Language>) -> Self {
        Self { languages }
    }

    /// Parse `id:locale` pairs separated by commas, e.g. `1:en_US,2:fr_FR`
    pub fn parse(entries: &str) -> Result<Self, Error> {
        let mut languages = Vec::new();
        for entry in entries.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (id, locale) = entry.split_once(':').ok_or_else(|| {
                Error::config(format!(
                    "Invalid language entry '{}', expected id:locale",
                    entry
                ))
            })?;
            let id = id.trim().parse::<LanguageId>().map_err(|e| {
                Error::config(format!("Invalid language id in '{}': {}", entry, e))
            })?;
            if locale.trim().is_empty() {
                return Err(Error::config(format!("Empty locale in '{}'", entry)));
            }
            languages.push(Language::new(id, locale.trim()));
        }
        Ok(Self { languages })
    }
}

#[async_trait]
impl LocaleRegistry for StaticLocaleRegistry {
    async fn active_languages(&self) -> Result<Vec<Language>, Error> {
        Ok(self.languages.clone())
    }
}

/// In-memory storefront newsletter subscriptions
#[derive(Debug, Clone, Default)]
pub struct MemoryNewsletterDirectory {
    inner: Arc<RwLock<HashMap<u64, String>>>,
}

impl MemoryNewsletterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or change) the email of a subscription
    pub async fn set_email(&self, subscription_id: u64, email: impl Into<String>) {
        self.inner
            .write()
            .await
            .insert(subscription_id, email.into());
    }
}

#[async_trait]
impl NewsletterDirectory for MemoryNewsletterDirectory {
    async fn email_of(&self, subscription_id: u64) -> Result<Option<String>, Error> {
        Ok(self.inner.read().await.get(&subscription_id).cloned())
    }
}
