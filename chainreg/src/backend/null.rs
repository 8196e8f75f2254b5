//! Inert backend for running without any chain connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    AlwaysHealthy, BackendParts, BlockEpoch, ChainNotifier, ChainSource, FilteredBlock,
    FilteredChainView, OutPoint,
};
use crate::chain::ChainHash;
use crate::error::Error;
use crate::fee::{FEE_PER_KW_FLOOR, FeeEstimator, SatPerKWeight, check_conf_target};
use crate::service::Service;

/// Notifier, chain view and fee estimator that never do anything.
///
/// Subscriptions succeed but never deliver.
#[derive(Debug)]
pub struct NoChainBackend {
    epochs: broadcast::Sender<BlockEpoch>,
    blocks: broadcast::Sender<FilteredBlock>,
}

impl NoChainBackend {
    /// Creates the inert backend.
    #[must_use]
    pub fn new() -> Self {
        let (epochs, _) = broadcast::channel(1);
        let (blocks, _) = broadcast::channel(1);
        Self { epochs, blocks }
    }
}

impl Default for NoChainBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for NoChainBackend {
    async fn start(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl ChainNotifier for NoChainBackend {
    fn subscribe_block_epochs(&self) -> Result<broadcast::Receiver<BlockEpoch>, Error> {
        Ok(self.epochs.subscribe())
    }
}

#[async_trait]
impl FilteredChainView for NoChainBackend {
    async fn update_filter(&self, _outpoints: &[OutPoint], _update_height: u32) -> Result<(), Error> {
        Ok(())
    }

    fn filtered_blocks(&self) -> broadcast::Receiver<FilteredBlock> {
        self.blocks.subscribe()
    }
}

#[async_trait]
impl FeeEstimator for NoChainBackend {
    async fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<SatPerKWeight, Error> {
        check_conf_target(conf_target)?;
        Ok(FEE_PER_KW_FLOOR)
    }

    fn relay_fee_per_kw(&self) -> SatPerKWeight {
        FEE_PER_KW_FLOOR
    }
}

/// Chain source reporting an empty chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChainSource;

impl NoChainSource {
    /// Creates the empty-chain source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChainSource for NoChainSource {
    fn backend_name(&self) -> &'static str {
        "nochainbackend"
    }

    async fn best_block(&self) -> Result<BlockEpoch, Error> {
        Ok(BlockEpoch {
            hash: ChainHash::ZERO,
            height: 0,
        })
    }

    async fn send_raw_transaction(&self, _tx: &[u8]) -> Result<ChainHash, Error> {
        Err(Error::connection("no chain backend to broadcast to"))
    }

    async fn rescan(&self, _start: ChainHash, _outpoints: &[OutPoint]) -> Result<(), Error> {
        Ok(())
    }
}

pub(super) fn build() -> BackendParts {
    let backend = Arc::new(NoChainBackend::new());
    BackendParts {
        notifier: Arc::clone(&backend) as Arc<dyn ChainNotifier>,
        view: backend,
        source: Arc::new(NoChainSource::new()),
        probe: Arc::new(AlwaysHealthy),
        fee_source: None,
    }
}
