// # Subscriber Store Trait
//
// Defines the interface for the local mirror of provider-side subscribers.
//
// ## Purpose
//
// The subscriber store keeps, per subscriber email:
// - The provider contact id (assigned once, on first successful subscribe)
// - The relation id of the current list membership (`0` when none)
//
// The local existence check is what keeps subscribe idempotent: a stored
// record means the provider contact already exists.
//
// ## Implementations
//
// - In-memory: `MemorySubscriberStore`
// - JSON file: `FileSubscriberStore`

use async_trait::async_trait;

use crate::traits::contact_api::{ContactId, NO_RELATION, RelationId};

/// Local record of a provider-side subscriber
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriberRecord {
    /// Subscriber email, case-sensitive as supplied
    pub email: String,
    /// Provider contact id (nonzero)
    pub contact_id: ContactId,
    /// Current list membership, [`NO_RELATION`] when none
    pub relation_id: RelationId,
    /// When the record was created
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the record was last written
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SubscriberRecord {
    /// Create a record for a freshly created provider contact
    pub fn new(email: impl Into<String>, contact_id: ContactId) -> Self {
        let now = chrono::Utc::now();
        Self {
            email: email.into(),
            contact_id,
            relation_id: NO_RELATION,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the subscriber currently belongs to a tracked list
    pub fn is_list_member(&self) -> bool {
        self.relation_id != NO_RELATION
    }

    /// Replace the relation id and bump `updated_at`
    pub fn set_relation(&mut self, relation_id: RelationId) {
        self.relation_id = relation_id;
        self.updated_at = chrono::Utc::now();
    }

    /// Clear the relation id
    pub fn clear_relation(&mut self) {
        self.set_relation(NO_RELATION);
    }
}

/// Trait for subscriber store implementations
///
/// Lookups are by exact email. Implementations must be thread-safe;
/// read-then-write sequences across calls are not atomic, callers serialize
/// operations for the same email.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Get the record for `email`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: Record found
    /// - `Ok(None)`: No record
    /// - `Err(Error)`: Storage error
    async fn get(&self, email: &str) -> Result<Option<SubscriberRecord>, crate::Error>;

    /// Insert a new record
    ///
    /// Fails with a store error if a record already exists for the email.
    async fn insert(&self, record: &SubscriberRecord) -> Result<(), crate::Error>;

    /// Create or overwrite the record keyed by `record.email`
    async fn save(&self, record: &SubscriberRecord) -> Result<(), crate::Error>;

    /// Delete the record for `email` (no error if absent)
    async fn delete(&self, email: &str) -> Result<(), crate::Error>;

    /// List all stored emails
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
