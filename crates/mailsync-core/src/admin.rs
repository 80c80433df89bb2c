//! Administrative configuration operations
//!
//! What the admin surface calls when an operator saves the provider settings
//! or the per-language contact list names. Both surface the underlying error
//! message so the form can show it next to the submitted values.

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::ProviderSettings;
use crate::error::{Error, Result};
use crate::traits::{
    ConfigStore, Language, LanguageId, ListMappingStore, ListMappingTransaction, LocaleRegistry,
};

/// Persist the provider settings
pub async fn save_provider_settings(
    config: &dyn ConfigStore,
    settings: &ProviderSettings,
) -> Result<()> {
    settings.save(config).await?;
    info!("Provider settings saved");
    Ok(())
}

/// Save the contact list name of every active language in one transaction
///
/// `names` holds the submitted name per language id. An active language
/// without a submitted name is saved with an empty name, which the resolver
/// treats as "use the default list".
///
/// # Errors
///
/// - `Error::Configuration` when there are no active languages; nothing is written
/// - Any store error during the batch; the transaction is rolled back and no
///   language's mapping changes
pub async fn save_list_mappings(
    locales: &dyn LocaleRegistry,
    mappings: &dyn ListMappingStore,
    names: &HashMap<LanguageId, String>,
) -> Result<usize> {
    let languages = locales.active_languages().await?;
    if languages.is_empty() {
        return Err(Error::config("No active languages"));
    }

    let mut tx = mappings.begin().await?;

    if let Err(e) = write_batch(tx.as_mut(), &languages, names).await {
        error!("Saving contact list mappings failed, rolling back: {}", e);
        if let Err(rollback_err) = tx.rollback().await {
            error!("Rollback of contact list mappings failed: {}", rollback_err);
        }
        return Err(e);
    }

    info!("Saved contact list mappings for {} language(s)", languages.len());
    Ok(languages.len())
}

async fn write_batch(
    tx: &mut dyn ListMappingTransaction,
    languages: &[Language],
    names: &HashMap<LanguageId, String>,
) -> Result<()> {
    for language in languages {
        let name = names.get(&language.id).map(String::as_str).unwrap_or("");
        tx.upsert(language.id, name).await?;
    }
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::state::{MemoryConfigStore, MemoryListMappingStore, StaticLocaleRegistry};
    use tokio_test::{assert_err, assert_ok, block_on};

    #[test]
    fn test_save_provider_settings() {
        let store = MemoryConfigStore::new();
        let settings = ProviderSettings {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            newsletter_list: "news@lists.mailjet.com".to_string(),
            ..ProviderSettings::default()
        };

        block_on(async {
            assert_ok!(save_provider_settings(&store, &settings).await);
            assert_eq!(
                store.read(keys::NEWSLETTER_LIST).await.unwrap().as_deref(),
                Some("news@lists.mailjet.com")
            );
            assert_eq!(ProviderSettings::load(&store).await.unwrap(), settings);
        });
    }

    #[test]
    fn test_save_list_mappings_overwrites_previous_names() {
        let locales = StaticLocaleRegistry::parse("1:en_US,2:fr_FR").unwrap();
        let store = MemoryListMappingStore::new();

        block_on(async {
            let first = HashMap::from([(1, "Old EN".to_string()), (2, "Old FR".to_string())]);
            assert_eq!(assert_ok!(save_list_mappings(&locales, &store, &first).await), 2);

            let second = HashMap::from([(1, "New EN".to_string())]);
            assert_ok!(save_list_mappings(&locales, &store, &second).await);

            assert_eq!(store.get(1).await.unwrap().unwrap().contacts_list_name, "New EN");
            assert_eq!(store.get(2).await.unwrap().unwrap().contacts_list_name, "");
        });
    }

    #[test]
    fn test_save_list_mappings_without_languages() {
        let store = MemoryListMappingStore::new();
        block_on(async {
            assert_err!(
                save_list_mappings(&StaticLocaleRegistry::default(), &store, &HashMap::new()).await
            );
        });
    }
}
