//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Creating provider contacts for new subscribers (once per email)
//! - Putting subscribers into the contact list resolved for their locale
//! - Migrating list membership when a subscriber changes email
//! - Unsubscribing
//! - Persisting contact and relation ids after successful remote calls
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ EventDispatcher │─── LifecycleEvent ───┐
//! └─────────────────┘                      │
//!                                          ▼
//!                                 ┌──────────────┐
//!                                 │  SyncEngine  │
//!                                 └──────────────┘
//!                                          │
//!         ┌──────────────────┬─────────────┼──────────────┬─────────────────┐
//!         ▼                  ▼             ▼              ▼                 ▼
//! ┌───────────────┐ ┌──────────────┐ ┌────────────┐ ┌─────────────────┐ ┌──────────┐
//! │ ListResolver  │ │  ContactApi  │ │ Subscriber │ │   Newsletter    │ │  Events  │
//! │ (target list) │ │  (remote)    │ │   Store    │ │   Directory     │ │ (notify) │
//! └───────────────┘ └──────────────┘ └────────────┘ └─────────────────┘ └──────────┘
//! ```
//!
//! ## Subscriber states
//!
//! `Unknown → Registered (contact id) → ListMember (relation id) → Registered`
//!
//! A failed contact creation leaves the subscriber `Unknown`. A failed list
//! add leaves it `Registered`; the next subscribe retries the add without
//! creating another contact.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::resolver::ListResolver;
use crate::traits::{
    ConfigStore, ContactApi, ContactId, ListMappingStore, LocaleRegistry, NO_RELATION,
    NewsletterDirectory, RelationId, SubscriberRecord, SubscriberStore,
};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A provider contact was created and recorded locally
    ContactCreated { email: String, contact_id: ContactId },

    /// A subscriber joined a contact list
    ListJoined {
        email: String,
        list_name: String,
        relation_id: RelationId,
    },

    /// A list membership was removed ahead of an email change
    ListLeft {
        email: String,
        relation_id: RelationId,
    },

    /// A subscriber was unsubscribed from its list
    Unsubscribed {
        email: String,
        relation_id: RelationId,
    },

    /// A lifecycle operation failed
    OperationFailed {
        operation: &'static str,
        email: String,
        error: String,
    },
}

/// Result of a lifecycle operation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The subscriber is a member of `list_name`
    Subscribed {
        email: String,
        contact_id: ContactId,
        relation_id: RelationId,
        list_name: String,
        /// Whether this call created the provider contact
        contact_created: bool,
    },

    /// The subscriber left its list under the old email and subscribed
    /// under the new one
    Migrated {
        previous_email: String,
        subscription: Box<SyncOutcome>,
    },

    /// The subscriber's list membership was marked unsubscribed
    Unsubscribed {
        email: String,
        relation_id: RelationId,
    },

    /// Nothing to do
    Skipped(SkipReason),
}

/// Why an operation did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Update carried the email already on file
    EmailUnchanged,
    /// Update referenced a subscription the storefront doesn't know
    UnknownSubscription,
    /// No local record for the email involved
    NoLocalRecord,
    /// Update found a record without a list membership to move
    NoMembership,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::EmailUnchanged => "email unchanged",
            SkipReason::UnknownSubscription => "unknown newsletter subscription",
            SkipReason::NoLocalRecord => "subscriber not synchronized",
            SkipReason::NoMembership => "no list membership to migrate",
        }
    }
}

/// Injected collaborators of the engine
///
/// Every collaborator is shared; the engine holds no state of its own beyond
/// what these persist.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn ContactApi>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub list_mappings: Arc<dyn ListMappingStore>,
    pub locales: Arc<dyn LocaleRegistry>,
    pub config: Arc<dyn ConfigStore>,
    pub newsletters: Arc<dyn NewsletterDirectory>,
}

/// Core sync engine
///
/// ## Concurrency
///
/// Operations for the same email must not run concurrently: the
/// read-then-write of the relation id around the remote call is not atomic.
/// Operations for different emails are independent.
pub struct SyncEngine {
    api: Arc<dyn ContactApi>,
    subscribers: Arc<dyn SubscriberStore>,
    newsletters: Arc<dyn NewsletterDirectory>,
    resolver: ListResolver,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields sync events
    pub fn new(
        collaborators: Collaborators,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let resolver = ListResolver::new(
            collaborators.locales,
            collaborators.list_mappings,
            collaborators.config,
            Arc::clone(&collaborators.api),
        );

        let engine = Self {
            api: collaborators.api,
            subscribers: collaborators.subscribers,
            newsletters: collaborators.newsletters,
            resolver,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The resolver used for subscribe
    pub fn resolver(&self) -> &ListResolver {
        &self.resolver
    }

    /// Subscribe `email` to the list resolved for `locale`
    ///
    /// Creates the provider contact if no local record exists. The local
    /// record is the authority: a second call never creates a second contact.
    ///
    /// A created contact stays recorded even when the list add fails.
    pub async fn subscribe(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        locale: Option<&str>,
    ) -> Result<SyncOutcome> {
        let result = self.do_subscribe(email, first_name, last_name, locale).await;
        self.report_failure("subscribe", email, &result);
        result
    }

    async fn do_subscribe(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        locale: Option<&str>,
    ) -> Result<SyncOutcome> {
        let (mut record, contact_created) = match self.subscribers.get(email).await? {
            Some(record) => {
                debug!("Subscriber {} already has contact {}", email, record.contact_id);
                (record, false)
            }
            None => (self.create_contact(email, first_name, last_name).await?, true),
        };

        let list_name = self.resolver.resolve_list_name(locale).await?;

        let relation_id = self
            .api
            .add_to_list(record.contact_id, record.relation_id, email, &list_name)
            .await?;

        if relation_id == NO_RELATION {
            return Err(Error::remote_api(
                self.api.provider_name(),
                format!(
                    "Adding {} to contact list '{}' returned no relation id",
                    email, list_name
                ),
            ));
        }

        record.set_relation(relation_id);
        self.subscribers.save(&record).await?;

        info!(
            "Subscribed {} to contact list '{}' (relation {})",
            email, list_name, relation_id
        );
        self.emit_event(SyncEvent::ListJoined {
            email: email.to_string(),
            list_name: list_name.clone(),
            relation_id,
        });

        Ok(SyncOutcome::Subscribed {
            email: email.to_string(),
            contact_id: record.contact_id,
            relation_id,
            list_name,
            contact_created,
        })
    }

    /// Create the provider contact and its local record
    async fn create_contact(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<SubscriberRecord> {
        let contact_id = self
            .api
            .create_contact(email, first_name, last_name)
            .await?;

        if contact_id == 0 {
            return Err(Error::remote_api(
                self.api.provider_name(),
                format!("Creating contact {} returned no contact id", email),
            ));
        }

        let record = SubscriberRecord::new(email, contact_id);
        if let Err(e) = self.subscribers.insert(&record).await {
            error!(
                "Contact {} created on {} but could not be recorded: {}",
                contact_id,
                self.api.provider_name(),
                e
            );
            return Err(e);
        }

        info!("Created contact {} for {}", contact_id, email);
        self.emit_event(SyncEvent::ContactCreated {
            email: email.to_string(),
            contact_id,
        });

        Ok(record)
    }

    /// Move subscription `subscription_id` to `new_email`
    ///
    /// The previous email is read from the newsletter directory. The list
    /// membership held under it is removed, its relation id cleared, and the
    /// new email goes through a full subscribe. The record of the previous
    /// email stays, without relation.
    ///
    /// The removal call identifies the subscriber by the new email together
    /// with the old relation id, matching what the provider expects for a
    /// relation being handed over.
    ///
    /// If the removal fails, nothing changes locally and no subscribe runs.
    pub async fn update(
        &self,
        subscription_id: u64,
        new_email: &str,
        first_name: &str,
        last_name: &str,
        locale: Option<&str>,
    ) -> Result<SyncOutcome> {
        let result = self
            .do_update(subscription_id, new_email, first_name, last_name, locale)
            .await;
        self.report_failure("update", new_email, &result);
        result
    }

    async fn do_update(
        &self,
        subscription_id: u64,
        new_email: &str,
        first_name: &str,
        last_name: &str,
        locale: Option<&str>,
    ) -> Result<SyncOutcome> {
        let Some(previous_email) = self.newsletters.email_of(subscription_id).await? else {
            debug!("Newsletter subscription {} not found", subscription_id);
            return Ok(SyncOutcome::Skipped(SkipReason::UnknownSubscription));
        };

        if previous_email == new_email {
            return Ok(SyncOutcome::Skipped(SkipReason::EmailUnchanged));
        }

        let Some(mut record) = self.subscribers.get(&previous_email).await? else {
            debug!("No synchronized subscriber for {}", previous_email);
            return Ok(SyncOutcome::Skipped(SkipReason::NoLocalRecord));
        };

        if !record.is_list_member() {
            debug!(
                "{} holds no list membership, nothing to migrate to {}",
                previous_email, new_email
            );
            return Ok(SyncOutcome::Skipped(SkipReason::NoMembership));
        }

        let relation_id = record.relation_id;
        let removed = self.api.remove_from_list(new_email, relation_id).await?;
        if !removed {
            warn!(
                "{} refused removal of relation {} ({} -> {}), update abandoned",
                self.api.provider_name(),
                relation_id,
                previous_email,
                new_email
            );
            return Err(Error::remote_api(
                self.api.provider_name(),
                format!("Removal of relation {} was refused", relation_id),
            ));
        }

        record.clear_relation();
        self.subscribers.save(&record).await?;
        self.emit_event(SyncEvent::ListLeft {
            email: previous_email.clone(),
            relation_id,
        });

        let subscription = self
            .do_subscribe(new_email, first_name, last_name, locale)
            .await?;

        info!("Moved newsletter subscription {} -> {}", previous_email, new_email);
        Ok(SyncOutcome::Migrated {
            previous_email,
            subscription: Box::new(subscription),
        })
    }

    /// Unsubscribe `email` from its contact list
    ///
    /// On success the relation id is cleared and the record kept, so a later
    /// subscribe reuses the existing contact.
    pub async fn unsubscribe(&self, email: &str) -> Result<SyncOutcome> {
        let result = self.do_unsubscribe(email).await;
        self.report_failure("unsubscribe", email, &result);
        result
    }

    async fn do_unsubscribe(&self, email: &str) -> Result<SyncOutcome> {
        let Some(mut record) = self.subscribers.get(email).await? else {
            debug!("No synchronized subscriber for {}", email);
            return Ok(SyncOutcome::Skipped(SkipReason::NoLocalRecord));
        };

        let relation_id = record.relation_id;
        if !self.api.unsubscribe(email, relation_id).await? {
            return Err(Error::remote_api(
                self.api.provider_name(),
                format!("Unsubscribe of {} (relation {}) was refused", email, relation_id),
            ));
        }

        record.clear_relation();
        self.subscribers.save(&record).await?;

        info!("Unsubscribed {} (relation {})", email, relation_id);
        self.emit_event(SyncEvent::Unsubscribed {
            email: email.to_string(),
            relation_id,
        });

        Ok(SyncOutcome::Unsubscribed {
            email: email.to_string(),
            relation_id,
        })
    }

    /// Log a failed operation and emit it as an event
    fn report_failure(&self, operation: &'static str, email: &str, result: &Result<SyncOutcome>) {
        if let Err(e) = result {
            error!("Newsletter {} failed for {}: {}", operation, email, e);
            self.emit_event(SyncEvent::OperationFailed {
                operation,
                email: email.to_string(),
                error: e.to_string(),
            });
        }
    }

    /// Emit a sync event
    fn emit_event(&self, event: SyncEvent) {
        // Full or closed channel drops the event
        if self.event_tx.try_send(event).is_err() {
            warn!("Sync event channel full or closed, dropping event");
        }
    }
}
