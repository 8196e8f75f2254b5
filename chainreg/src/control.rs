//! Assembles the per-chain handle the rest of the node talks to.
//!
//! Construction happens in two stages. [`new_partial_chain_control`] builds
//! everything that needs only configuration: backend clients, fee estimator,
//! default policies. [`ChainControl::new`] later layers a started wallet on
//! top of that partial handle.
//!
//! Both return their result together with a [`Cleanup`]. The cleanup holds
//! whatever was started before the result was decided and must be run by the
//! caller whether construction succeeded or not.

use std::fmt;
use std::sync::Arc;

use crate::backend::{
    self, BackendContext, BackendKind, ChainNotifier, ChainSource, Connectors,
    FilteredChainView, LivenessProbe,
};
use crate::chain::{
    ChainCode, ChannelConstraints, ForwardingPolicy, MilliSatoshi, NetworkParams,
    default_channel_constraints,
};
use crate::config::Config;
use crate::error::{Error, ResultExt, Step};
use crate::fee::FeeEstimator;
use crate::fee::policy::{self, EstimatorChoice, FeePolicyInput};
use crate::hint_cache::{CacheConfig, HeightHintCache, HeightHintStore, MemoryHintStore};
use crate::service::{Cleanup, Service};

/// Inputs to [`new_partial_chain_control`].
#[derive(Clone)]
pub struct ChainControlConfig {
    /// Node configuration.
    pub settings: Config,
    /// Store behind the height-hint cache.
    pub hint_store: Arc<dyn HeightHintStore>,
    /// Protocol clients for the backends.
    pub connectors: Connectors,
}

impl fmt::Debug for ChainControlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainControlConfig")
            .field("settings", &self.settings)
            .field("connectors", &self.connectors)
            .finish_non_exhaustive()
    }
}

impl ChainControlConfig {
    /// Configuration with an in-memory hint store and no connectors.
    #[must_use]
    pub fn new(settings: Config) -> Self {
        Self {
            settings,
            hint_store: Arc::new(MemoryHintStore::new()),
            connectors: Connectors::default(),
        }
    }

    /// Replaces the protocol clients.
    #[must_use]
    pub fn with_connectors(mut self, connectors: Connectors) -> Self {
        self.connectors = connectors;
        self
    }

    /// Replaces the height-hint store.
    #[must_use]
    pub fn with_hint_store(mut self, store: Arc<dyn HeightHintStore>) -> Self {
        self.hint_store = store;
        self
    }
}

/// Wallet-independent part of a chain's handle.
pub struct PartialChainControl {
    /// Chain this handle serves.
    pub chain: ChainCode,
    /// Network parameters it was built for.
    pub params: &'static NetworkParams,
    /// Backend variant in use.
    pub backend: BackendKind,
    /// Backend liveness probe.
    pub health_check: Arc<dyn LivenessProbe>,
    /// Started fee estimator.
    pub fee_estimator: Arc<dyn FeeEstimator>,
    /// Which estimator was selected.
    pub fee_choice: EstimatorChoice,
    /// Block notifier.
    pub chain_notifier: Arc<dyn ChainNotifier>,
    /// Filtered chain view for the router.
    pub chain_view: Arc<dyn FilteredChainView>,
    /// Wallet chain source.
    pub chain_source: Arc<dyn ChainSource>,
    /// Default forwarding policy.
    pub routing_policy: ForwardingPolicy,
    /// Smallest HTLC accepted in.
    pub min_htlc_in: MilliSatoshi,
    /// Default constraints for new channels.
    pub channel_constraints: ChannelConstraints,
}

impl fmt::Debug for PartialChainControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialChainControl")
            .field("chain", &self.chain)
            .field("network", &self.params.network)
            .field("backend", &self.backend)
            .field("fee_choice", &self.fee_choice)
            .field("source", &self.chain_source.backend_name())
            .field("routing_policy", &self.routing_policy)
            .field("min_htlc_in", &self.min_htlc_in)
            .field("channel_constraints", &self.channel_constraints)
            .finish_non_exhaustive()
    }
}

/// Builds the partial chain control for the configured primary chain.
///
/// Always returns a cleanup, also on error; it stops everything started so
/// far, including the fee estimator once selected.
pub async fn new_partial_chain_control(
    cfg: &ChainControlConfig,
) -> (Result<PartialChainControl, Error>, Cleanup) {
    let mut cleanup = Cleanup::new();
    let result = build_partial(cfg, &mut cleanup).await;
    if let Err(err) = &result {
        tracing::error!(%err, pending_stops = cleanup.len(), "chain control construction failed");
    }
    (result, cleanup)
}

async fn build_partial(
    cfg: &ChainControlConfig,
    cleanup: &mut Cleanup,
) -> Result<PartialChainControl, Error> {
    let settings = &cfg.settings;
    let chain = settings.primary_chain;
    tracing::info!(%chain, "primary chain selected");

    let chain_config = settings
        .chain(chain)
        .ok_or_else(|| Error::config(format!("no [chains.{chain}] section")))
        .during(chain, Step::RoutingPolicy)?;
    if !chain_config.inner.active {
        return Err(Error::config(format!("primary chain {chain} is not active"))
            .during(chain, Step::RoutingPolicy));
    }
    let params = NetworkParams::for_chain(chain, chain_config.inner.network)
        .during(chain, Step::RoutingPolicy)?;
    let routing_policy = chain_config.routing_policy();
    let min_htlc_in = chain_config.min_htlc_in();

    let hints = HeightHintCache::new(
        CacheConfig {
            query_disable: settings.height_hint_cache_query_disable,
        },
        Arc::clone(&cfg.hint_store),
    )
    .during(chain, Step::HeightHintCache)?;

    let kind = chain_config
        .inner
        .node
        .parse::<BackendKind>()
        .during(chain, Step::Backend)?;
    let mut ctx = BackendContext {
        chain,
        params,
        settings,
        hints: Arc::new(hints),
        connectors: &cfg.connectors,
        fee_url: settings.fee_url.clone(),
    };
    let parts = backend::build(kind, &mut ctx, cleanup)
        .await
        .during(chain, Step::Backend)?;

    let selected = policy::select(FeePolicyInput {
        chain,
        network: params.network,
        backend: kind,
        fee_url: ctx.fee_url.as_ref(),
        fee_source: parts.fee_source.as_ref(),
    })
    .during(chain, Step::FeePolicy)?;

    // Registered before start so a failed start is still stopped.
    cleanup.push("fee estimator", Arc::clone(&selected.estimator));
    selected
        .estimator
        .start()
        .await
        .during(chain, Step::FeeEstimatorStart)?;

    let channel_constraints = default_channel_constraints(chain);
    tracing::info!(
        %chain,
        network = %params.network,
        backend = %kind,
        fee_estimator = %selected.choice,
        dust_limit = %channel_constraints.dust_limit,
        "partial chain control ready"
    );

    Ok(PartialChainControl {
        chain,
        params,
        backend: kind,
        health_check: parts.probe,
        fee_estimator: selected.estimator,
        fee_choice: selected.choice,
        chain_notifier: parts.notifier,
        chain_view: parts.view,
        chain_source: parts.source,
        routing_policy,
        min_htlc_in,
        channel_constraints,
    })
}

/// Signing wallet layered on a partial chain control.
pub trait Wallet: Service {}

/// Complete handle for one chain: the partial control plus a running wallet.
pub struct ChainControl {
    partial: Arc<PartialChainControl>,
    wallet: Arc<dyn Wallet>,
}

impl fmt::Debug for ChainControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainControl")
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

impl ChainControl {
    /// Starts `wallet` on top of `partial`.
    ///
    /// The returned cleanup shuts the wallet down; it is empty if the wallet
    /// never started.
    pub async fn new(
        partial: Arc<PartialChainControl>,
        wallet: Arc<dyn Wallet>,
    ) -> (Result<Self, Error>, Cleanup) {
        let mut cleanup = Cleanup::new();
        if let Err(err) = wallet.start().await.during(partial.chain, Step::Wallet) {
            return (Err(err), cleanup);
        }
        cleanup.push("wallet", Arc::clone(&wallet));
        tracing::info!(chain = %partial.chain, "wallet opened");
        (Ok(Self { partial, wallet }), cleanup)
    }

    /// The wallet-independent part.
    #[must_use]
    pub const fn partial(&self) -> &Arc<PartialChainControl> {
        &self.partial
    }

    /// The running wallet.
    #[must_use]
    pub const fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    /// Chain this handle serves.
    #[must_use]
    pub fn chain(&self) -> ChainCode {
        self.partial.chain
    }
}
