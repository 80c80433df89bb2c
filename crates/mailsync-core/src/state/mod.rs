// # Store Implementations
//
// This module provides implementations of the store and storefront traits
// for different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{
    FileConfigStore, FileListMappingStore, FileNewsletterDirectory, FileSubscriberStore,
};
pub use memory::{
    MemoryConfigStore, MemoryListMappingStore, MemoryNewsletterDirectory, MemorySubscriberStore,
    StaticLocaleRegistry,
};
