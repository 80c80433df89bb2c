// # List Mapping Store Trait
//
// Persisted mapping from storefront language to provider contact list name.
//
// Writes only happen through a [`ListMappingTransaction`]: the admin surface
// saves the names of every active language at once, and either all of them
// land or none do.

use async_trait::async_trait;

use crate::traits::storefront::LanguageId;

/// Contact list name for one language
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ListMapping {
    /// Storefront language id
    pub language_id: LanguageId,
    /// Provider-side contact list name
    pub contacts_list_name: String,
    /// When the row was last written
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ListMapping {
    pub fn new(language_id: LanguageId, contacts_list_name: impl Into<String>) -> Self {
        Self {
            language_id,
            contacts_list_name: contacts_list_name.into(),
            updated_at: chrono::Utc::now(),
        }
    }
}

/// Trait for list mapping store implementations
///
/// At most one row exists per language id.
#[async_trait]
pub trait ListMappingStore: Send + Sync {
    /// Get the mapping for a language
    async fn get(&self, language_id: LanguageId) -> Result<Option<ListMapping>, crate::Error>;

    /// List all mappings, ordered by language id
    async fn list(&self) -> Result<Vec<ListMapping>, crate::Error>;

    /// Open a write transaction
    async fn begin(&self) -> Result<Box<dyn ListMappingTransaction>, crate::Error>;
}

/// A scoped batch of mapping writes
///
/// Nothing written through `upsert` is visible to readers before `commit`.
/// Dropping a transaction without committing discards it; `rollback` does the
/// same explicitly.
#[async_trait]
pub trait ListMappingTransaction: Send {
    /// Create or update the row for `language_id`
    async fn upsert(
        &mut self,
        language_id: LanguageId,
        contacts_list_name: &str,
    ) -> Result<(), crate::Error>;

    /// Apply all staged writes
    async fn commit(&mut self) -> Result<(), crate::Error>;

    /// Discard all staged writes
    async fn rollback(&mut self) -> Result<(), crate::Error>;
}
