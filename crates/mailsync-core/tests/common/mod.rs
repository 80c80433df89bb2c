//! Test doubles and common utilities for sync contract tests
//!
//! The doubles count calls so tests can assert how many remote requests and
//! local writes an operation performed.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mailsync_core::config::keys;
use mailsync_core::error::{Error, Result};
use mailsync_core::traits::{
    ConfigStore, ContactApi, ContactId, LanguageId, ListMapping, ListMappingStore,
    ListMappingTransaction, RelationId, SubscriberRecord, SubscriberStore,
};
use mailsync_core::{
    Collaborators, EngineConfig, MemoryConfigStore, MemoryListMappingStore,
    MemoryNewsletterDirectory, MemorySubscriberStore, StaticLocaleRegistry, SyncEngine, SyncEvent,
};
use tokio::sync::mpsc;

pub const DEFAULT_LIST_ADDRESS: &str = "newsletter@lists.example.com";
pub const DEFAULT_LIST: &str = "Newsletter";

/// Arguments of one `add_to_list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCall {
    pub contact_id: ContactId,
    pub relation_id: RelationId,
    pub email: String,
    pub list_name: String,
}

/// A contact API double with call counters and failure switches
#[derive(Default)]
pub struct MockContactApi {
    next_id: AtomicU64,
    lists: Mutex<HashSet<String>>,
    addresses: Mutex<HashMap<String, String>>,

    create_calls: AtomicUsize,
    add_calls: Mutex<Vec<AddCall>>,
    remove_calls: Mutex<Vec<(String, RelationId)>>,
    unsubscribe_calls: Mutex<Vec<(String, RelationId)>>,
    list_exists_calls: AtomicUsize,

    pub fail_create: AtomicBool,
    pub zero_contact_id: AtomicBool,
    pub fail_add: AtomicBool,
    pub zero_relation_id: AtomicBool,
    pub refuse_remove: AtomicBool,
    pub refuse_unsubscribe: AtomicBool,
    pub fail_list_exists: AtomicBool,
}

impl MockContactApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(100),
            ..Self::default()
        }
    }

    /// Make a contact list exist on the provider
    pub fn with_list(self, name: &str) -> Self {
        self.lists.lock().unwrap().insert(name.to_string());
        self
    }

    /// Map a list address to a list name
    pub fn with_address(self, address: &str, name: &str) -> Self {
        self.addresses
            .lock()
            .unwrap()
            .insert(address.to_string(), name.to_string());
        self
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> Vec<AddCall> {
        self.add_calls.lock().unwrap().clone()
    }

    pub fn remove_calls(&self) -> Vec<(String, RelationId)> {
        self.remove_calls.lock().unwrap().clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<(String, RelationId)> {
        self.unsubscribe_calls.lock().unwrap().clone()
    }

    pub fn list_exists_call_count(&self) -> usize {
        self.list_exists_calls.load(Ordering::SeqCst)
    }

    /// Total number of remote calls of any kind
    pub fn total_calls(&self) -> usize {
        self.create_call_count()
            + self.add_calls.lock().unwrap().len()
            + self.remove_calls.lock().unwrap().len()
            + self.unsubscribe_calls.lock().unwrap().len()
            + self.list_exists_call_count()
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContactApi for MockContactApi {
    async fn create_contact(
        &self,
        email: &str,
        _first_name: &str,
        _last_name: &str,
    ) -> Result<ContactId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::remote_api("mock", format!("cannot create {}", email)));
        }
        if self.zero_contact_id.load(Ordering::SeqCst) {
            return Ok(0);
        }
        Ok(self.next_id())
    }

    async fn add_to_list(
        &self,
        contact_id: ContactId,
        relation_id: RelationId,
        email: &str,
        list_name: &str,
    ) -> Result<RelationId> {
        self.add_calls.lock().unwrap().push(AddCall {
            contact_id,
            relation_id,
            email: email.to_string(),
            list_name: list_name.to_string(),
        });
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(Error::remote_api("mock", "list add failed"));
        }
        if self.zero_relation_id.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if relation_id != 0 {
            return Ok(relation_id);
        }
        Ok(self.next_id())
    }

    async fn remove_from_list(&self, email: &str, relation_id: RelationId) -> Result<bool> {
        self.remove_calls
            .lock()
            .unwrap()
            .push((email.to_string(), relation_id));
        Ok(!self.refuse_remove.load(Ordering::SeqCst))
    }

    async fn unsubscribe(&self, email: &str, relation_id: RelationId) -> Result<bool> {
        self.unsubscribe_calls
            .lock()
            .unwrap()
            .push((email.to_string(), relation_id));
        Ok(!self.refuse_unsubscribe.load(Ordering::SeqCst))
    }

    async fn list_exists(&self, list_name: &str) -> Result<bool> {
        self.list_exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_exists.load(Ordering::SeqCst) {
            return Err(Error::http("connection reset"));
        }
        Ok(self.lists.lock().unwrap().contains(list_name))
    }

    async fn list_name_from_address(&self, address: &str) -> Result<Option<String>> {
        Ok(self.addresses.lock().unwrap().get(address).cloned())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A subscriber store that counts writes
#[derive(Default)]
pub struct CountingSubscriberStore {
    inner: MemorySubscriberStore,
    writes: AtomicUsize,
    pub fail_insert: AtomicBool,
}

impl CountingSubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SubscriberStore for CountingSubscriberStore {
    async fn get(&self, email: &str) -> Result<Option<SubscriberRecord>> {
        self.inner.get(email).await
    }

    async fn insert(&self, record: &SubscriberRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::store("disk full"));
        }
        self.inner.insert(record).await
    }

    async fn save(&self, record: &SubscriberRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record).await
    }

    async fn delete(&self, email: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(email).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.inner.list().await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// A list mapping store whose transactions fail on the Nth upsert
pub struct FailingListMappingStore {
    inner: MemoryListMappingStore,
    fail_on_upsert: usize,
    rollbacks: Arc<AtomicUsize>,
}

impl FailingListMappingStore {
    /// `fail_on_upsert` is 1-based
    pub fn new(fail_on_upsert: usize) -> Self {
        Self {
            inner: MemoryListMappingStore::new(),
            fail_on_upsert,
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

struct FailingTransaction {
    inner: Box<dyn ListMappingTransaction>,
    upserts: usize,
    fail_on_upsert: usize,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ListMappingStore for FailingListMappingStore {
    async fn get(&self, language_id: LanguageId) -> Result<Option<ListMapping>> {
        self.inner.get(language_id).await
    }

    async fn list(&self) -> Result<Vec<ListMapping>> {
        self.inner.list().await
    }

    async fn begin(&self) -> Result<Box<dyn ListMappingTransaction>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
            upserts: 0,
            fail_on_upsert: self.fail_on_upsert,
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

#[async_trait::async_trait]
impl ListMappingTransaction for FailingTransaction {
    async fn upsert(&mut self, language_id: LanguageId, contacts_list_name: &str) -> Result<()> {
        self.upserts += 1;
        if self.upserts == self.fail_on_upsert {
            return Err(Error::store(format!("write #{} rejected", self.upserts)));
        }
        self.inner.upsert(language_id, contacts_list_name).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

/// Everything an engine needs, with handles kept for assertions
pub struct Harness {
    pub api: Arc<MockContactApi>,
    pub subscribers: Arc<CountingSubscriberStore>,
    pub mappings: Arc<MemoryListMappingStore>,
    pub locales: Arc<StaticLocaleRegistry>,
    pub config: Arc<MemoryConfigStore>,
    pub newsletters: Arc<MemoryNewsletterDirectory>,
}

impl Harness {
    /// Languages en_US (1) and fr_FR (2), no mappings, default list configured
    pub async fn new(api: MockContactApi) -> Self {
        let config = Arc::new(MemoryConfigStore::new());
        config
            .write(keys::NEWSLETTER_LIST, DEFAULT_LIST_ADDRESS)
            .await
            .unwrap();

        Self {
            api: Arc::new(api.with_address(DEFAULT_LIST_ADDRESS, DEFAULT_LIST)),
            subscribers: Arc::new(CountingSubscriberStore::new()),
            mappings: Arc::new(MemoryListMappingStore::new()),
            locales: Arc::new(StaticLocaleRegistry::parse("1:en_US,2:fr_FR").unwrap()),
            config,
            newsletters: Arc::new(MemoryNewsletterDirectory::new()),
        }
    }

    /// Map a language to a contact list name
    pub async fn map_language(&self, language_id: LanguageId, name: &str) {
        let mut tx = self.mappings.begin().await.unwrap();
        tx.upsert(language_id, name).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            api: self.api.clone(),
            subscribers: self.subscribers.clone(),
            list_mappings: self.mappings.clone(),
            locales: self.locales.clone(),
            config: self.config.clone(),
            newsletters: self.newsletters.clone(),
        }
    }

    pub fn engine(&self) -> (SyncEngine, mpsc::Receiver<SyncEvent>) {
        SyncEngine::new(self.collaborators(), &EngineConfig::default())
            .expect("engine construction succeeds")
    }

    pub async fn record(&self, email: &str) -> Option<SubscriberRecord> {
        self.subscribers.get(email).await.unwrap()
    }
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
