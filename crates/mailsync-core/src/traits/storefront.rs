// # Storefront Collaborators
//
// Interfaces owned by the storefront that mailsync only reads from:
// - [`LocaleRegistry`]: the currently active languages
// - [`NewsletterDirectory`]: the storefront's own newsletter subscriptions
// - [`ConfigStore`]: flat key/value settings

use async_trait::async_trait;

/// Storefront language identifier
pub type LanguageId = u32;

/// An active storefront language
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Language {
    pub id: LanguageId,
    /// Locale code, e.g. `en_US`
    pub locale: String,
}

impl Language {
    pub fn new(id: LanguageId, locale: impl Into<String>) -> Self {
        Self {
            id,
            locale: locale.into(),
        }
    }
}

/// Source of the active storefront languages
#[async_trait]
pub trait LocaleRegistry: Send + Sync {
    /// Active languages, in storefront order
    async fn active_languages(&self) -> Result<Vec<Language>, crate::Error>;

    /// Find the active language for a locale
    async fn find_by_locale(&self, locale: &str) -> Result<Option<Language>, crate::Error> {
        Ok(self
            .active_languages()
            .await?
            .into_iter()
            .find(|lang| lang.locale == locale))
    }
}

/// Lookup of storefront newsletter subscriptions by internal id
#[async_trait]
pub trait NewsletterDirectory: Send + Sync {
    /// Current email of subscription `subscription_id`, if it exists
    async fn email_of(&self, subscription_id: u64) -> Result<Option<String>, crate::Error>;
}

/// Persisted key/value settings
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read a value
    async fn read(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Write a value (create or overwrite)
    async fn write(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Read a value, falling back to `default` when unset
    async fn read_or(&self, key: &str, default: &str) -> Result<String, crate::Error> {
        Ok(self
            .read(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }
}
