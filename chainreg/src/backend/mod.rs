//! Chain backend variants and the capability set they all produce.
//!
//! A backend is picked by [`BackendKind`] and built by one constructor per
//! variant. Every constructor returns [`BackendParts`]: a block notifier, a
//! filtered chain view, a chain source, a liveness probe and, when the
//! backend can estimate fees itself, a [`FeeRateSource`].
//!
//! The protocol clients themselves (pub/sub listeners, websocket RPC, compact
//! filter sync) live outside this crate and are handed in through
//! [`Connectors`].

pub mod full_node;
pub mod light_client;
pub mod null;
pub mod rpc;
pub mod rpc_tls;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

use crate::chain::{ChainCode, ChainHash, NetworkParams};
use crate::config::Config;
use crate::error::Error;
use crate::fee::FeeRateSource;
use crate::hint_cache::HeightHintCache;
use crate::service::{Cleanup, Service};

pub use self::full_node::{FullNodeConnConfig, FullNodeConnection, FullNodeConnector};
pub use self::light_client::LightClientService;
pub use self::null::{NoChainBackend, NoChainSource};
pub use self::rpc_tls::{RpcTlsClients, RpcTlsConnConfig, RpcTlsConnector};

/// Which protocol the node uses to reach its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Compact-filter light client (`neutrino`).
    LightClient,
    /// Full node over JSON-RPC plus pub/sub (`brocoind`, `litecoind`).
    FullNode,
    /// Full node over TLS JSON-RPC and websockets (`brond`, `ltcd`).
    RpcTls,
    /// No backend at all (`nochainbackend`).
    Null,
}

impl BackendKind {
    /// Whether the backend can produce live fee estimates.
    #[must_use]
    pub const fn has_fee_estimation(self) -> bool {
        matches!(self, Self::FullNode | Self::RpcTls)
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutrino" => Ok(Self::LightClient),
            "brocoind" | "litecoind" => Ok(Self::FullNode),
            "brond" | "ltcd" => Ok(Self::RpcTls),
            "nochainbackend" => Ok(Self::Null),
            other => Err(Error::config(format!("unknown node type: {other}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LightClient => "light client",
            Self::FullNode => "full node",
            Self::RpcTls => "rpc/tls",
            Self::Null => "no chain backend",
        };
        f.write_str(name)
    }
}

/// A block connected to the best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEpoch {
    /// Block hash.
    pub hash: ChainHash,
    /// Block height.
    pub height: u32,
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction id.
    pub txid: ChainHash,
    /// Output index.
    pub index: u32,
}

/// A block reduced to the watched outputs it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredBlock {
    /// Block hash.
    pub hash: ChainHash,
    /// Block height.
    pub height: u32,
    /// Watched outpoints spent in this block.
    pub spent: Vec<OutPoint>,
}

/// Delivers block notifications.
pub trait ChainNotifier: Service {
    /// Subscribes to new best-chain blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the notifier has shut down.
    fn subscribe_block_epochs(&self) -> Result<broadcast::Receiver<BlockEpoch>, Error>;
}

/// Tracks spends of a watched outpoint set, following reorgs.
#[async_trait]
pub trait FilteredChainView: Service {
    /// Adds outpoints to the filter, rescanning from `update_height`.
    async fn update_filter(&self, outpoints: &[OutPoint], update_height: u32)
    -> Result<(), Error>;

    /// Blocks connected after filtering.
    fn filtered_blocks(&self) -> broadcast::Receiver<FilteredBlock>;
}

/// Primary chain interface used by the wallet.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Current best block.
    async fn best_block(&self) -> Result<BlockEpoch, Error>;

    /// Broadcasts a serialized transaction, returning its id.
    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<ChainHash, Error>;

    /// Rescans from `start` for spends of `outpoints`.
    async fn rescan(&self, start: ChainHash, outpoints: &[OutPoint]) -> Result<(), Error>;
}

/// Low-cost query asserting the backend is still reachable.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Runs the probe. Failures are runtime signals, not construction errors.
    async fn check(&self) -> Result<(), Error>;
}

/// Probe that asks the chain source for its best block.
pub struct BestBlockProbe(pub Arc<dyn ChainSource>);

#[async_trait]
impl LivenessProbe for BestBlockProbe {
    async fn check(&self) -> Result<(), Error> {
        self.0
            .best_block()
            .await
            .map(|_| ())
            .map_err(|e| Error::probe(format!("{}: {e}", self.0.backend_name())))
    }
}

/// Probe that always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl LivenessProbe for AlwaysHealthy {
    async fn check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// What every backend constructor produces.
pub struct BackendParts {
    /// Block notifier.
    pub notifier: Arc<dyn ChainNotifier>,
    /// Filtered chain view for the router.
    pub view: Arc<dyn FilteredChainView>,
    /// Chain source for the wallet.
    pub source: Arc<dyn ChainSource>,
    /// Liveness probe.
    pub probe: Arc<dyn LivenessProbe>,
    /// Live fee data, when the backend has it.
    pub fee_source: Option<Arc<dyn FeeRateSource>>,
}

impl fmt::Debug for BackendParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendParts")
            .field("source", &self.source.backend_name())
            .field("fee_source", &self.fee_source.is_some())
            .finish_non_exhaustive()
    }
}

/// Externally supplied protocol clients, one slot per backend variant.
#[derive(Clone, Default)]
pub struct Connectors {
    /// Running light-client service. Required for `neutrino`.
    pub light_client: Option<Arc<dyn LightClientService>>,
    /// Full-node pub/sub connector. Required for `brocoind`/`litecoind`.
    pub full_node: Option<Arc<dyn FullNodeConnector>>,
    /// TLS websocket RPC connector. Required for `brond`/`ltcd`.
    pub rpc_tls: Option<Arc<dyn RpcTlsConnector>>,
}

impl fmt::Debug for Connectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connectors")
            .field("light_client", &self.light_client.is_some())
            .field("full_node", &self.full_node.is_some())
            .field("rpc_tls", &self.rpc_tls.is_some())
            .finish()
    }
}

/// Inputs shared by all backend constructors.
pub struct BackendContext<'a> {
    /// Chain being built.
    pub chain: ChainCode,
    /// Its network parameters.
    pub params: &'static NetworkParams,
    /// Node configuration.
    pub settings: &'a Config,
    /// Height-hint cache for notifiers.
    pub hints: Arc<HeightHintCache>,
    /// Protocol clients.
    pub connectors: &'a Connectors,
    /// General fee-source URL. Constructors may fold legacy options into it.
    pub fee_url: Option<Url>,
}

/// Builds the backend selected by `kind`.
///
/// Anything the constructor starts is registered in `cleanup` before the
/// next fallible step.
///
/// # Errors
///
/// Propagates the constructor's configuration, resource or connection error.
pub async fn build(
    kind: BackendKind,
    ctx: &mut BackendContext<'_>,
    cleanup: &mut Cleanup,
) -> Result<BackendParts, Error> {
    tracing::info!(chain = %ctx.chain, network = %ctx.params.network, backend = %kind, "building chain backend");
    match kind {
        BackendKind::LightClient => light_client::build(ctx),
        BackendKind::FullNode => full_node::build(ctx, cleanup).await,
        BackendKind::RpcTls => rpc_tls::build(ctx).await,
        BackendKind::Null => Ok(null::build()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn node_names_map_to_kinds() {
        assert_eq!("neutrino".parse::<BackendKind>().unwrap(), BackendKind::LightClient);
        assert_eq!("brocoind".parse::<BackendKind>().unwrap(), BackendKind::FullNode);
        assert_eq!("litecoind".parse::<BackendKind>().unwrap(), BackendKind::FullNode);
        assert_eq!("brond".parse::<BackendKind>().unwrap(), BackendKind::RpcTls);
        assert_eq!("ltcd".parse::<BackendKind>().unwrap(), BackendKind::RpcTls);
        assert_eq!("nochainbackend".parse::<BackendKind>().unwrap(), BackendKind::Null);
    }

    #[test]
    fn unknown_node_name_is_a_config_error() {
        let err = "electrum".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "config: unknown node type: electrum");
    }

    #[tokio::test]
    async fn best_block_probe_reports_source_failures() {
        let healthy = BestBlockProbe(Arc::new(NoChainSource::new()));
        healthy.check().await.unwrap();

        let failing = BestBlockProbe(Arc::new(crate::testutil::MockSource::failing()));
        let err = failing.check().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Probe);
    }
}
