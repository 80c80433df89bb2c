// # mailsync-core
//
// Core library for synchronizing a storefront's newsletter subscribers with an
// email-marketing provider's contact lists.
//
// ## Architecture Overview
//
// - **ContactApi**: Trait for the provider's contact-list API
// - **SubscriberStore**: Local mirror of provider contact and relation ids
// - **ListMappingStore**: Per-language contact list names, written transactionally
// - **ListResolver**: Picks the contact list for an event's locale
// - **SyncEngine**: Subscribe / update / unsubscribe orchestration
// - **EventDispatcher**: Routes named lifecycle events to the engine
// - **ProviderRegistry**: Plugin-based registry for contact API clients
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider clients
// 2. **Injected Collaborators**: Stores and clients are passed in, no globals
// 3. **Local Authority**: The subscriber store decides whether a contact exists
// 4. **Library-First**: All core functionality can be used as a library

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, ProviderConfig, ProviderSettings, StoreConfig, SyncConfig};
pub use dispatch::{EventDispatcher, EventKind, HandlerOutcome, LifecycleEvent};
pub use engine::{Collaborators, SkipReason, SyncEngine, SyncEvent, SyncOutcome};
pub use error::{Error, Result};
pub use registry::ProviderRegistry;
pub use resolver::ListResolver;
pub use state::{
    FileConfigStore, FileListMappingStore, FileNewsletterDirectory, FileSubscriberStore,
    MemoryConfigStore, MemoryListMappingStore, MemoryNewsletterDirectory, MemorySubscriberStore,
    StaticLocaleRegistry,
};
pub use traits::{
    ConfigStore, ContactApi, ListMappingStore, LocaleRegistry, NewsletterDirectory,
    SubscriberStore,
};
