//! Height hints that let notifiers resume after a restart without rescanning
//! from the birthday of every watched output.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::OutPoint;
use crate::chain::ChainHash;
use crate::error::Error;

/// What a hint is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintKey {
    /// Earliest height an outpoint could have been spent at.
    Spend(OutPoint),
    /// Earliest height a transaction could have confirmed at.
    Confirm(ChainHash),
}

/// Persistent storage behind a [`HeightHintCache`].
pub trait HeightHintStore: Send + Sync {
    /// Prepares the store (creates buckets, tables).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be initialised.
    fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Reads the hint for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &HintKey) -> Result<Option<u32>, Error>;

    /// Writes the hint for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn put(&self, key: HintKey, height: u32) -> Result<(), Error>;
}

/// In-process hint store.
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    hints: RwLock<HashMap<HintKey, u32>>,
}

impl MemoryHintStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeightHintStore for MemoryHintStore {
    fn get(&self, key: &HintKey) -> Result<Option<u32>, Error> {
        Ok(self.hints.read().get(key).copied())
    }

    fn put(&self, key: HintKey, height: u32) -> Result<(), Error> {
        self.hints.write().insert(key, height);
        Ok(())
    }
}

/// Height-hint cache settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Writes still happen but queries always miss.
    pub query_disable: bool,
}

/// Height-hint cache shared by the notifiers of one chain.
pub struct HeightHintCache {
    config: CacheConfig,
    store: Arc<dyn HeightHintStore>,
}

impl fmt::Debug for HeightHintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeightHintCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HeightHintCache {
    /// Opens the cache over `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to initialise.
    pub fn new(config: CacheConfig, store: Arc<dyn HeightHintStore>) -> Result<Self, Error> {
        store.init()?;
        if config.query_disable {
            tracing::info!("height hint cache queries disabled");
        }
        Ok(Self { config, store })
    }

    /// Records `height` as the hint for `key`.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn commit_hint(&self, key: HintKey, height: u32) -> Result<(), Error> {
        self.store.put(key, height)
    }

    /// Returns the hint for `key`, or `None` if absent or queries are
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn query_hint(&self, key: &HintKey) -> Result<Option<u32>, Error> {
        if self.config.query_disable {
            return Ok(None);
        }
        self.store.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend_key() -> HintKey {
        HintKey::Spend(OutPoint {
            txid: ChainHash::from_bytes([7; 32]),
            index: 1,
        })
    }

    #[test]
    fn commits_are_queryable() {
        let cache = HeightHintCache::new(CacheConfig::default(), Arc::new(MemoryHintStore::new()))
            .unwrap();
        assert_eq!(cache.query_hint(&spend_key()).unwrap(), None);
        cache.commit_hint(spend_key(), 700_000).unwrap();
        assert_eq!(cache.query_hint(&spend_key()).unwrap(), Some(700_000));
    }

    #[test]
    fn disabled_queries_still_write() {
        let store = Arc::new(MemoryHintStore::new());
        let cache = HeightHintCache::new(
            CacheConfig {
                query_disable: true,
            },
            Arc::clone(&store) as Arc<dyn HeightHintStore>,
        )
        .unwrap();
        cache.commit_hint(spend_key(), 10).unwrap();
        assert_eq!(cache.query_hint(&spend_key()).unwrap(), None);
        assert_eq!(store.get(&spend_key()).unwrap(), Some(10));
    }
}
