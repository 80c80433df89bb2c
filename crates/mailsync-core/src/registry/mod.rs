//! Plugin-based provider registry
//!
//! The registry lets contact API clients be registered at runtime, so the
//! daemon picks the provider from configuration instead of a hardcoded match.
//!
//! ## Registration
//!
//! Provider crates expose a `register()` function:
//!
//! ```rust,ignore
//! // In mailsync-provider-mailjet
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("mailjet", Box::new(MailjetFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{ContactApi, ContactApiFactory};

/// Registry of contact API factories keyed by provider type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn ContactApiFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contact API factory under `name` (e.g. "mailjet")
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn ContactApiFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(name.into(), factory);
    }

    /// Create a contact API client from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ContactApi>)`: Created client
    /// - `Err(Error)`: If the provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn ContactApi>> {
        let provider_type = config.type_name();
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.contains_key(name)
    }
}
