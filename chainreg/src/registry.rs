//! Process-wide registry of active chains.
//!
//! Written during startup and when the primary chain is designated; read
//! concurrently for the rest of the process lifetime. A single
//! [`parking_lot::RwLock`] guards all state, so a registration is visible
//! entirely or not at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chain::{ChainCode, ChainHash, NetworkParams, chain_for_genesis};
use crate::control::ChainControl;

struct RegistryState<H> {
    active: HashMap<ChainCode, Arc<H>>,
    net_params: HashMap<ChainCode, &'static NetworkParams>,
    primary: ChainCode,
}

/// Active chain handles keyed by chain code.
///
/// Handles are shared out as [`Arc`]s. Replacing or dropping an entry never
/// stops the handle; releasing it stays with whoever built it.
pub struct ChainRegistry<H = ChainControl> {
    state: RwLock<RegistryState<H>>,
}

impl<H> fmt::Debug for ChainRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ChainRegistry")
            .field("active", &state.active.keys().collect::<Vec<_>>())
            .field("primary", &state.primary)
            .finish_non_exhaustive()
    }
}

impl<H> Default for ChainRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ChainRegistry<H> {
    /// Creates an empty registry whose primary chain is the default chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                active: HashMap::new(),
                net_params: HashMap::new(),
                primary: ChainCode::default(),
            }),
        }
    }

    /// Registers `handle` as the active handle for `chain`, returning the
    /// handle it replaced.
    pub fn register_chain(&self, chain: ChainCode, handle: Arc<H>) -> Option<Arc<H>> {
        let replaced = self.state.write().active.insert(chain, handle);
        if replaced.is_some() {
            tracing::debug!(%chain, "replaced chain handle");
        } else {
            tracing::debug!(%chain, "registered chain handle");
        }
        replaced
    }

    /// Active handle for `chain`.
    #[must_use]
    pub fn lookup_chain(&self, chain: ChainCode) -> Option<Arc<H>> {
        self.state.read().active.get(&chain).cloned()
    }

    /// Active handle for the chain whose genesis block is `genesis`.
    #[must_use]
    pub fn lookup_chain_by_hash(&self, genesis: &ChainHash) -> Option<Arc<H>> {
        let state = self.state.read();
        let chain = chain_for_genesis(genesis)?;
        state.active.get(&chain).cloned()
    }

    /// Designates `chain` as the home chain.
    pub fn register_primary_chain(&self, chain: ChainCode) {
        self.state.write().primary = chain;
        tracing::info!(%chain, "primary chain designated");
    }

    /// The home chain.
    #[must_use]
    pub fn primary_chain(&self) -> ChainCode {
        self.state.read().primary
    }

    /// Snapshot of the registered chain codes, in no particular order.
    #[must_use]
    pub fn active_chains(&self) -> Vec<ChainCode> {
        self.state.read().active.keys().copied().collect()
    }

    /// Number of registered chains.
    #[must_use]
    pub fn num_active_chains(&self) -> usize {
        self.state.read().active.len()
    }

    /// Records the network parameters `chain` runs with.
    pub fn register_net_params(&self, chain: ChainCode, params: &'static NetworkParams) {
        self.state.write().net_params.insert(chain, params);
    }

    /// Network parameters recorded for `chain`.
    #[must_use]
    pub fn lookup_net_params(&self, chain: ChainCode) -> Option<&'static NetworkParams> {
        self.state.read().net_params.get(&chain).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::chain::{
        BROCOIN_MAINNET_GENESIS, BROCOIN_SIGNET_GENESIS, BROCOIN_TESTNET_GENESIS,
        LITECOIN_MAINNET_GENESIS, Network,
    };

    #[derive(Debug, PartialEq, Eq)]
    struct Handle {
        generation: u64,
        check: u64,
    }

    fn handle(generation: u64) -> Arc<Handle> {
        Arc::new(Handle {
            generation,
            check: generation * 7,
        })
    }

    #[test]
    fn lookup_by_code() {
        let registry = ChainRegistry::new();
        let h1 = handle(1);
        assert!(registry.register_chain(ChainCode::Brocoin, Arc::clone(&h1)).is_none());
        assert!(Arc::ptr_eq(&registry.lookup_chain(ChainCode::Brocoin).unwrap(), &h1));
        assert!(registry.lookup_chain(ChainCode::Litecoin).is_none());
    }

    #[test]
    fn lookup_by_genesis_hash() {
        let registry = ChainRegistry::new();
        let h1 = handle(1);
        registry.register_chain(ChainCode::Brocoin, Arc::clone(&h1));

        let found = registry.lookup_chain_by_hash(&BROCOIN_MAINNET_GENESIS).unwrap();
        assert!(Arc::ptr_eq(&found, &h1));
        assert!(registry.lookup_chain_by_hash(&BROCOIN_TESTNET_GENESIS).is_some());
        assert!(registry.lookup_chain_by_hash(&LITECOIN_MAINNET_GENESIS).is_none());
        assert!(registry.lookup_chain_by_hash(&BROCOIN_SIGNET_GENESIS).is_none());
        assert!(registry.lookup_chain_by_hash(&ChainHash::ZERO).is_none());
    }

    #[test]
    fn primary_and_active_set() {
        let registry = ChainRegistry::new();
        registry.register_chain(ChainCode::Brocoin, handle(1));
        registry.register_chain(ChainCode::Litecoin, handle(2));
        registry.register_primary_chain(ChainCode::Litecoin);

        assert_eq!(registry.primary_chain(), ChainCode::Litecoin);
        assert_eq!(registry.num_active_chains(), 2);
        let mut active = registry.active_chains();
        active.sort();
        assert_eq!(active, vec![ChainCode::Brocoin, ChainCode::Litecoin]);
    }

    #[test]
    fn empty_registry_defaults() {
        let registry: ChainRegistry<Handle> = ChainRegistry::default();
        assert_eq!(registry.primary_chain(), ChainCode::Brocoin);
        assert_eq!(registry.num_active_chains(), 0);
        assert!(registry.active_chains().is_empty());
        assert!(registry.lookup_net_params(ChainCode::Brocoin).is_none());
    }

    #[test]
    fn re_registration_replaces_without_touching_old_handle() {
        let registry = ChainRegistry::new();
        let h1 = handle(1);
        registry.register_chain(ChainCode::Brocoin, Arc::clone(&h1));
        let replaced = registry.register_chain(ChainCode::Brocoin, handle(2)).unwrap();

        assert!(Arc::ptr_eq(&replaced, &h1));
        assert_eq!(*h1, Handle { generation: 1, check: 7 });
        assert_eq!(registry.lookup_chain(ChainCode::Brocoin).unwrap().generation, 2);
        assert_eq!(registry.num_active_chains(), 1);
    }

    #[test]
    fn net_params_round_trip() {
        let registry: ChainRegistry<Handle> = ChainRegistry::new();
        let params = NetworkParams::for_chain(ChainCode::Litecoin, Network::Testnet).unwrap();
        registry.register_net_params(ChainCode::Litecoin, params);
        assert_eq!(registry.lookup_net_params(ChainCode::Litecoin), Some(params));
        assert!(registry.lookup_net_params(ChainCode::Brocoin).is_none());
    }

    #[test]
    fn concurrent_readers_never_see_torn_handles() {
        let registry = ChainRegistry::new();
        registry.register_chain(ChainCode::Brocoin, handle(0));
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mut last = 0;
                    while !done.load(Ordering::Acquire) {
                        let seen = registry.lookup_chain(ChainCode::Brocoin).unwrap();
                        assert_eq!(seen.check, seen.generation * 7);
                        assert!(seen.generation >= last, "went back in time");
                        last = seen.generation;
                    }
                });
            }
            scope.spawn(|| {
                for generation in 1..=1_000 {
                    registry.register_chain(ChainCode::Brocoin, handle(generation));
                }
                done.store(true, Ordering::Release);
            });
        });

        assert_eq!(registry.lookup_chain(ChainCode::Brocoin).unwrap().generation, 1_000);
    }
}
