// # Contact API Trait
//
// Defines the interface to the email-marketing provider's contact-list API.
//
// ## Implementations
//
// - Mailjet: `mailsync-provider-mailjet` crate
//
// ## Usage
//
// ```rust,ignore
// use mailsync_core::ContactApi;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let api = /* ContactApi implementation */;
//
//     let contact_id = api.create_contact("jane@example.com", "Jane", "Doe").await?;
//     let relation_id = api
//         .add_to_list(contact_id, 0, "jane@example.com", "newsletter-en")
//         .await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::ProviderConfig;

/// Identifier of a contact on the provider side
pub type ContactId = u64;

/// Identifier of a contact's membership in one provider contact list
pub type RelationId = u64;

/// Relation id meaning "not a member of any tracked list"
pub const NO_RELATION: RelationId = 0;

/// Trait for contact API implementations
///
/// Each method performs the remote side of one step of the subscription
/// lifecycle. Implementations are single-shot: they perform the request(s)
/// needed for the call and report the outcome. They never touch the local
/// stores and never retry.
///
/// # Identifiers
///
/// A returned [`ContactId`] or [`RelationId`] of `0` is how some providers
/// signal a silent failure. Callers treat `0` as "no identifier" and never
/// persist it as a valid membership.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ContactApi: Send + Sync {
    /// Create a contact for `email`
    ///
    /// # Returns
    ///
    /// - `Ok(ContactId)`: The provider-assigned contact id (may be `0` on silent failure)
    /// - `Err(Error)`: The request failed
    async fn create_contact(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<ContactId, crate::Error>;

    /// Put a contact into the list named `list_name`
    ///
    /// # Parameters
    ///
    /// - `contact_id`: The provider contact id
    /// - `relation_id`: The current relation id, or [`NO_RELATION`]
    /// - `email`: The subscriber email
    /// - `list_name`: Target contact list name
    ///
    /// # Returns
    ///
    /// - `Ok(RelationId)`: The membership id (may be `0` on silent failure)
    /// - `Err(Error)`: The request failed
    async fn add_to_list(
        &self,
        contact_id: ContactId,
        relation_id: RelationId,
        email: &str,
        list_name: &str,
    ) -> Result<RelationId, crate::Error>;

    /// Remove a list membership
    ///
    /// Returns `Ok(false)` when the provider refused the removal.
    async fn remove_from_list(
        &self,
        email: &str,
        relation_id: RelationId,
    ) -> Result<bool, crate::Error>;

    /// Mark a list membership as unsubscribed
    ///
    /// Returns `Ok(false)` when the provider refused the change.
    async fn unsubscribe(&self, email: &str, relation_id: RelationId)
    -> Result<bool, crate::Error>;

    /// Check whether a contact list named `list_name` exists on the provider
    async fn list_exists(&self, list_name: &str) -> Result<bool, crate::Error>;

    /// Derive a contact list name from a list address string
    ///
    /// Returns `Ok(None)` when the address is empty or matches no list.
    async fn list_name_from_address(&self, address: &str) -> Result<Option<String>, crate::Error>;

    /// Get the provider name (for logging/metrics)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing contact API clients from configuration
pub trait ContactApiFactory: Send + Sync {
    /// Create a ContactApi instance from configuration
    ///
    /// # Returns
    ///
    /// A boxed ContactApi trait object
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ContactApi>, crate::Error>;
}
