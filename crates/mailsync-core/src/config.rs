//! Configuration types for the mailsync system
//!
//! Two layers live here:
//! - [`SyncConfig`]: how the components are wired (provider, stores, engine)
//! - [`ProviderSettings`]: the operator-editable settings persisted in a
//!   [`ConfigStore`] under the keys in [`keys`]

use serde::{Deserialize, Serialize};

use crate::traits::ConfigStore;

/// Config store keys
pub mod keys {
    /// Provider API key
    pub const API_KEY: &str = "mailjet.api.key";
    /// Provider API secret
    pub const API_SECRET: &str = "mailjet.api.secret";
    /// Provider API base address
    pub const WS_ADDRESS: &str = "mailjet.api.webservice_address";
    /// Address of the default newsletter contact list
    pub const NEWSLETTER_LIST: &str = "mailjet.newsletter_list";
    /// Whether lifecycle failures propagate to the caller
    pub const EXCEPTION_ON_ERRORS: &str = "mailjet.exception_on_errors";
}

/// Default provider API base address
pub const DEFAULT_WS_ADDRESS: &str = "https://api.mailjet.com/v3/REST";

/// Main mailsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Contact API provider configuration
    pub provider: ProviderConfig,

    /// Local stores configuration
    #[serde(default)]
    pub stores: StoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.stores.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Contact API provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Mailjet REST API v3
    Mailjet {
        /// API key
        api_key: String,
        /// API secret
        api_secret: String,
        /// API base address
        #[serde(default = "default_ws_address")]
        ws_address: String,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Build the provider config from persisted settings
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        ProviderConfig::Mailjet {
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            ws_address: settings.ws_address.clone(),
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Mailjet {
                api_key,
                api_secret,
                ws_address,
            } => {
                if api_key.is_empty() || api_secret.is_empty() {
                    return Err(crate::Error::config(
                        "Mailjet API key and secret cannot be empty",
                    ));
                }
                if !ws_address.starts_with("https://") && !ws_address.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Mailjet API address must be an HTTP(S) URL, got: {}",
                        ws_address
                    )));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Mailjet { .. } => "mailjet",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Mailjet {
            api_key: String::new(),
            api_secret: String::new(),
            ws_address: default_ws_address(),
        }
    }
}

/// Local stores configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON files in a directory
    File {
        /// Directory holding `subscribers.json`, `list_mappings.json`, `settings.json`
        dir: String,
    },

    /// In-memory stores (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { dir } if dir.is_empty() => {
                Err(crate::Error::config("Store directory cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_ws_address() -> String {
    DEFAULT_WS_ADDRESS.to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Operator-editable provider settings
///
/// The admin surface writes these; the engine and dispatcher read them.
/// `Debug` redacts the credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: String,
    pub api_secret: String,
    pub ws_address: String,
    /// Address of the default newsletter list
    pub newsletter_list: String,
    /// Propagate lifecycle failures to the caller
    pub exception_on_errors: bool,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("ws_address", &self.ws_address)
            .field("newsletter_list", &self.newsletter_list)
            .field("exception_on_errors", &self.exception_on_errors)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            ws_address: default_ws_address(),
            newsletter_list: String::new(),
            exception_on_errors: false,
        }
    }
}

impl ProviderSettings {
    /// Read settings from a config store, using defaults for unset keys
    pub async fn load(store: &dyn ConfigStore) -> Result<Self, crate::Error> {
        Ok(Self {
            api_key: store.read_or(keys::API_KEY, "").await?,
            api_secret: store.read_or(keys::API_SECRET, "").await?,
            ws_address: store.read_or(keys::WS_ADDRESS, DEFAULT_WS_ADDRESS).await?,
            newsletter_list: store.read_or(keys::NEWSLETTER_LIST, "").await?,
            exception_on_errors: exception_on_errors(store).await?,
        })
    }

    /// Write every setting to a config store
    pub async fn save(&self, store: &dyn ConfigStore) -> Result<(), crate::Error> {
        store.write(keys::API_KEY, &self.api_key).await?;
        store.write(keys::API_SECRET, &self.api_secret).await?;
        store.write(keys::WS_ADDRESS, &self.ws_address).await?;
        store.write(keys::NEWSLETTER_LIST, &self.newsletter_list).await?;
        store
            .write(keys::EXCEPTION_ON_ERRORS, bool_value(self.exception_on_errors))
            .await?;
        Ok(())
    }
}

/// Read the throw-on-error flag
pub async fn exception_on_errors(store: &dyn ConfigStore) -> Result<bool, crate::Error> {
    let raw = store.read(keys::EXCEPTION_ON_ERRORS).await?;
    Ok(raw.as_deref().map(parse_bool).unwrap_or(false))
}

/// Parse a stored flag; anything but a truthy spelling is false
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn bool_value(flag: bool) -> &'static str {
    if flag { "true" } else { "false" }
}
