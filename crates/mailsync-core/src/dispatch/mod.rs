//! Lifecycle event dispatch
//!
//! Routes named newsletter lifecycle events to the matching [`SyncEngine`]
//! operation through a fixed dispatch table, and applies the operator's
//! throw-on-error policy.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mailsync_core::dispatch::{EventDispatcher, LifecycleEvent};
//!
//! let dispatcher = EventDispatcher::new(engine, config_store);
//! let event = LifecycleEvent::subscribe("jane@example.com", "Jane", "Doe", Some("en_US"));
//!
//! // Never fails; failures are logged and reported in the outcome
//! let outcome = dispatcher.dispatch(&event).await;
//!
//! // Fails when the throw-on-error flag is set
//! let outcome = dispatcher.dispatch_strict(&event).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info_span};

use crate::config;
use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::{Error, Result};
use crate::traits::ConfigStore;

/// Newsletter lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "newsletter.subscribe")]
    Subscribe,
    #[serde(rename = "newsletter.update")]
    Update,
    #[serde(rename = "newsletter.unsubscribe")]
    Unsubscribe,
}

impl EventKind {
    /// All event kinds, in dispatch table order
    pub const ALL: [EventKind; 3] = [EventKind::Subscribe, EventKind::Update, EventKind::Unsubscribe];

    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Subscribe => "newsletter.subscribe",
            EventKind::Update => "newsletter.update",
            EventKind::Unsubscribe => "newsletter.unsubscribe",
        }
    }

    /// Look up an event kind by name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| Error::invalid_input(format!("Unknown lifecycle event: {}", name)))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A newsletter lifecycle event as emitted by the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Storefront newsletter subscription id (needed by update)
    #[serde(default)]
    pub subscription_id: Option<u64>,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub locale: Option<String>,
}

impl LifecycleEvent {
    pub fn subscribe(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        locale: Option<&str>,
    ) -> Self {
        Self {
            kind: EventKind::Subscribe,
            subscription_id: None,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            locale: locale.map(str::to_string),
        }
    }

    pub fn update(
        subscription_id: u64,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        locale: Option<&str>,
    ) -> Self {
        Self {
            kind: EventKind::Update,
            subscription_id: Some(subscription_id),
            ..Self::subscribe(email, first_name, last_name, locale)
        }
    }

    pub fn unsubscribe(email: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Unsubscribe,
            ..Self::subscribe(email, "", "", None)
        }
    }
}

/// What the dispatcher reports back to the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub event: EventKind,
    pub correlation_id: String,
    pub success: bool,
    /// Human-readable failure (or skip) message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Routes lifecycle events to the sync engine
pub struct EventDispatcher {
    engine: Arc<SyncEngine>,
    config: Arc<dyn ConfigStore>,
}

impl EventDispatcher {
    pub fn new(engine: Arc<SyncEngine>, config: Arc<dyn ConfigStore>) -> Self {
        Self { engine, config }
    }

    /// Event names this dispatcher handles
    pub fn subscribed_events(&self) -> Vec<&'static str> {
        EventKind::ALL.iter().map(EventKind::name).collect()
    }

    /// Handle an event, reporting failure in the outcome instead of raising
    pub async fn dispatch(&self, event: &LifecycleEvent) -> HandlerOutcome {
        self.handle(event).await.0
    }

    /// Handle an event, raising failures when the throw-on-error flag is set
    ///
    /// The raised error is the one the engine returned, so callers can still
    /// tell a resolution failure from a remote API failure.
    pub async fn dispatch_strict(&self, event: &LifecycleEvent) -> Result<HandlerOutcome> {
        let (outcome, failure) = self.handle(event).await;
        let Some(err) = failure else {
            return Ok(outcome);
        };

        let raise = match config::exception_on_errors(self.config.as_ref()).await {
            Ok(flag) => flag,
            Err(e) => {
                error!("Cannot read throw-on-error policy: {}", e);
                false
            }
        };

        if raise {
            error!(
                "{} failed [{}], raising: {}",
                outcome.event, outcome.correlation_id, err
            );
            return Err(err);
        }
        Ok(outcome)
    }

    /// Run the handler in a correlation span and build the outcome
    async fn handle(&self, event: &LifecycleEvent) -> (HandlerOutcome, Option<Error>) {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!(
            "lifecycle_event",
            event = event.kind.name(),
            correlation_id = %correlation_id
        );

        let result = self.run_handler(event).instrument(span).await;

        let mut outcome = HandlerOutcome {
            event: event.kind,
            correlation_id,
            success: true,
            message: None,
        };
        match result {
            Ok(SyncOutcome::Skipped(reason)) => {
                outcome.message = Some(reason.as_str().to_string());
                (outcome, None)
            }
            Ok(_) => (outcome, None),
            Err(e) => {
                outcome.success = false;
                outcome.message = Some(e.to_string());
                (outcome, Some(e))
            }
        }
    }

    /// Dispatch table: one engine operation per event kind
    async fn run_handler(&self, event: &LifecycleEvent) -> Result<SyncOutcome> {
        let engine = self.engine.as_ref();
        let locale = event.locale.as_deref();

        match event.kind {
            EventKind::Subscribe => {
                engine
                    .subscribe(&event.email, &event.first_name, &event.last_name, locale)
                    .await
            }
            EventKind::Update => {
                let subscription_id = event.subscription_id.ok_or_else(|| {
                    Error::invalid_input("newsletter.update event without subscription_id")
                })?;
                engine
                    .update(
                        subscription_id,
                        &event.email,
                        &event.first_name,
                        &event.last_name,
                        locale,
                    )
                    .await
            }
            EventKind::Unsubscribe => engine.unsubscribe(&event.email).await,
        }
    }
}
