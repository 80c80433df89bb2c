//! Core traits for the mailsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ContactApi`]: Remote contact-list operations on the provider
//! - [`SubscriberStore`]: Local mirror of provider contacts and list memberships
//! - [`ListMappingStore`]: Language → contact list name, written transactionally
//! - [`LocaleRegistry`], [`NewsletterDirectory`], [`ConfigStore`]: storefront collaborators

pub mod contact_api;
pub mod list_mapping_store;
pub mod storefront;
pub mod subscriber_store;

pub use contact_api::{ContactApi, ContactApiFactory, ContactId, NO_RELATION, RelationId};
pub use list_mapping_store::{ListMapping, ListMappingStore, ListMappingTransaction};
pub use storefront::{ConfigStore, Language, LanguageId, LocaleRegistry, NewsletterDirectory};
pub use subscriber_store::{SubscriberRecord, SubscriberStore};
