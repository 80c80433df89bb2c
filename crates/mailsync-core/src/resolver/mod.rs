//! Contact list resolution
//!
//! Decides which provider contact list an event targets:
//!
//! 1. A locale with an active language and a mapped list name uses that name,
//!    after checking the list exists on the provider. A mapped list that the
//!    provider doesn't know is an operator error and fails the resolution.
//! 2. Anything else falls back to the list derived from the configured
//!    newsletter list address.
//! 3. No name at all fails the resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::keys;
use crate::error::{Error, Result};
use crate::traits::{ConfigStore, ContactApi, ListMappingStore, LocaleRegistry};

/// Resolves the contact list name for a lifecycle event
#[derive(Clone)]
pub struct ListResolver {
    locales: Arc<dyn LocaleRegistry>,
    mappings: Arc<dyn ListMappingStore>,
    config: Arc<dyn ConfigStore>,
    api: Arc<dyn ContactApi>,
}

impl ListResolver {
    pub fn new(
        locales: Arc<dyn LocaleRegistry>,
        mappings: Arc<dyn ListMappingStore>,
        config: Arc<dyn ConfigStore>,
        api: Arc<dyn ContactApi>,
    ) -> Self {
        Self {
            locales,
            mappings,
            config,
            api,
        }
    }

    /// Resolve the list name for `locale`
    ///
    /// # Returns
    ///
    /// - `Ok(name)`: The list to target
    /// - `Err(Error::Resolution)`: The mapped list is missing on the provider,
    ///   or no list is configured at all
    /// - `Err(_)`: A store or provider call failed
    pub async fn resolve_list_name(&self, locale: Option<&str>) -> Result<String> {
        let locale = locale.filter(|l| !l.is_empty());

        if let Some(locale) = locale
            && let Some(name) = self.mapped_list_name(locale).await?
        {
            if !self.api.list_exists(&name).await? {
                warn!(
                    "Contact list '{}' mapped for locale {} does not exist on {}",
                    name,
                    locale,
                    self.api.provider_name()
                );
                return Err(Error::unverified_list(name, locale));
            }
            debug!("Resolved contact list '{}' for locale {}", name, locale);
            return Ok(name);
        }

        match self.default_list_name().await? {
            Some(name) => {
                debug!("Using default contact list '{}'", name);
                Ok(name)
            }
            None => Err(Error::no_list_configured(locale)),
        }
    }

    /// Non-empty list name mapped to the active language for `locale`
    async fn mapped_list_name(&self, locale: &str) -> Result<Option<String>> {
        let Some(language) = self.locales.find_by_locale(locale).await? else {
            debug!("No active language for locale {}", locale);
            return Ok(None);
        };

        let name = self
            .mappings
            .get(language.id)
            .await?
            .map(|mapping| mapping.contacts_list_name)
            .filter(|name| !name.is_empty());

        if name.is_none() {
            debug!("No contact list mapped for language {}", language.id);
        }
        Ok(name)
    }

    /// List name derived from the configured newsletter list address
    async fn default_list_name(&self) -> Result<Option<String>> {
        let address = self.config.read_or(keys::NEWSLETTER_LIST, "").await?;
        if address.is_empty() {
            return Ok(None);
        }

        Ok(self
            .api
            .list_name_from_address(&address)
            .await?
            .filter(|name| !name.is_empty()))
    }
}

impl std::fmt::Debug for ListResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListResolver")
            .field("provider", &self.api.provider_name())
            .finish()
    }
}
