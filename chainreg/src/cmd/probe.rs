//! `chainreg probe`: check that every active chain's backend is reachable.
//!
//! Runs the parts of chain construction that need no protocol client: host
//! and port resolution, RPC credentials and health-check selection, TLS
//! certificate loading, fee URL merging and fee estimator selection. The
//! results are registered in a [`ChainRegistry`] and probed once, or every
//! `--watch` seconds until a shutdown signal arrives.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chainreg::backend::full_node::resolve_full_node_host;
use chainreg::backend::light_client::merge_fee_url;
use chainreg::backend::rpc::{JsonRpcClient, RpcCommandProbe, SmartFeeSource, health_check_method};
use chainreg::backend::rpc_tls::{load_rpc_cert, tls_client_config};
use chainreg::backend::{AlwaysHealthy, BackendKind, LivenessProbe};
use chainreg::chain::{ChainCode, NetworkParams};
use chainreg::config::{ChainConfig, Config, load_config};
use chainreg::fee::policy::{FeePolicyInput, SelectedEstimator, select};
use chainreg::fee::{FeeEstimator, FeeRateSource};
use chainreg::{ChainRegistry, Cleanup, Error, Service};
use tokio_util::sync::CancellationToken;

use crate::signal::SigDown;

/// Confirmation target quoted in probe reports.
const PROBE_CONF_TARGET: u32 = 6;

/// What the probe knows about one chain.
struct ChainProbe {
    params: &'static NetworkParams,
    backend: BackendKind,
    liveness: Arc<dyn LivenessProbe>,
    fee: SelectedEstimator,
}

impl fmt::Debug for ChainProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainProbe")
            .field("network", &self.params.network)
            .field("backend", &self.backend)
            .field("fee", &self.fee.choice)
            .finish_non_exhaustive()
    }
}

/// Execute the `probe` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, a chain cannot be
/// prepared, or (without `--watch`) any backend fails its probe.
#[allow(clippy::future_not_send)]
pub async fn run(config_path: &Path, watch: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = load_config(config_path)?;
    let registry = ChainRegistry::<ChainProbe>::new();
    let mut cleanup = Cleanup::new();

    let result = match prepare(&config, &registry, &mut cleanup).await {
        Ok(()) => match watch {
            None => probe_round(&registry).await,
            Some(secs) => self::watch(&registry, Duration::from_secs(secs)).await,
        },
        Err(e) => Err(e.into()),
    };

    cleanup.run().await;
    result
}

async fn prepare(
    config: &Config,
    registry: &ChainRegistry<ChainProbe>,
    cleanup: &mut Cleanup,
) -> Result<(), Error> {
    for chain_cfg in config.chains.0.iter().filter(|c| c.inner.active) {
        let probe = prepare_chain(config, chain_cfg, cleanup)
            .await
            .map_err(|e| Error::config(format!("{}: {e}", chain_cfg.chain)))?;
        registry.register_net_params(chain_cfg.chain, probe.params);
        registry.register_chain(chain_cfg.chain, Arc::new(probe));
    }

    if registry.num_active_chains() == 0 {
        return Err(Error::config("no active chains configured"));
    }
    if registry.lookup_chain(config.primary_chain).is_none() {
        return Err(Error::config(format!(
            "primary chain {} is not active",
            config.primary_chain
        )));
    }
    registry.register_primary_chain(config.primary_chain);
    Ok(())
}

async fn prepare_chain(
    config: &Config,
    chain_cfg: &ChainConfig,
    cleanup: &mut Cleanup,
) -> Result<ChainProbe, Error> {
    let chain = chain_cfg.chain;
    let params = NetworkParams::for_chain(chain, chain_cfg.inner.network)?;
    let backend = chain_cfg.inner.node.parse::<BackendKind>()?;
    let mut fee_url = config.fee_url.clone();

    let (liveness, fee_source): (Arc<dyn LivenessProbe>, Option<Arc<dyn FeeRateSource>>) =
        match backend {
            BackendKind::FullNode => {
                let settings = config.full_node(chain);
                let host = resolve_full_node_host(&settings.rpc_host, params).await;
                let client = Arc::new(JsonRpcClient::new(
                    &host,
                    &settings.rpc_user,
                    &settings.rpc_pass,
                )?);
                let method = health_check_method(&client).await?;
                tracing::info!(%chain, %host, method, "full node RPC reachable");
                let liveness: Arc<dyn LivenessProbe> =
                    Arc::new(RpcCommandProbe::new(Arc::clone(&client), method));
                let fee_source: Arc<dyn FeeRateSource> =
                    Arc::new(SmartFeeSource::new(client, settings.estimate_mode));
                (liveness, Some(fee_source))
            }
            BackendKind::RpcTls => {
                let cert = load_rpc_cert(config.rpc_tls(chain)).await?;
                tls_client_config(&cert)?;
                tracing::warn!(%chain, "RPC certificate accepted; websocket session is not probed");
                (always_healthy(), None)
            }
            BackendKind::LightClient => {
                fee_url = merge_fee_url(fee_url, config.neutrino.fee_url.as_ref())?;
                (always_healthy(), None)
            }
            BackendKind::Null => (always_healthy(), None),
        };

    let fee = select(FeePolicyInput {
        chain,
        network: params.network,
        backend,
        fee_url: fee_url.as_ref(),
        fee_source: fee_source.as_ref(),
    })?;
    cleanup.push("fee estimator", Arc::clone(&fee.estimator));
    fee.estimator.start().await?;

    Ok(ChainProbe {
        params,
        backend,
        liveness,
        fee,
    })
}

fn always_healthy() -> Arc<dyn LivenessProbe> {
    Arc::new(AlwaysHealthy)
}

/// Probes every registered chain once, primary first.
#[allow(clippy::future_not_send)]
async fn probe_round(registry: &ChainRegistry<ChainProbe>) -> Result<(), Box<dyn std::error::Error>> {
    let primary = registry.primary_chain();
    let mut chains = registry.active_chains();
    chains.sort_by_key(|c| (*c != primary, *c));

    let mut failed = Vec::new();
    for chain in chains {
        let Some(probe) = registry.lookup_chain(chain) else {
            continue;
        };
        if let Err(e) = check_chain(chain, &probe).await {
            tracing::error!(%chain, error = %e, "backend probe failed");
            failed.push(chain);
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
        Err(Error::probe(format!("unhealthy: {}", names.join(", "))).into())
    }
}

async fn check_chain(chain: ChainCode, probe: &ChainProbe) -> Result<(), Error> {
    probe.liveness.check().await?;
    let fee = probe.fee.estimator.estimate_fee_per_kw(PROBE_CONF_TARGET).await?;
    tracing::info!(
        %chain,
        network = %probe.params.network,
        backend = %probe.backend,
        estimator = %probe.fee.choice,
        target = PROBE_CONF_TARGET,
        %fee,
        "backend healthy"
    );
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn watch(
    registry: &ChainRegistry<ChainProbe>,
    period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let sig_down = SigDown::try_new()?;
    let failed_rounds = watch_loop(registry, period, &sig_down.cancellation_token()).await;
    sig_down.recv().await;
    tracing::info!(failed_rounds, "probe stopped");
    Ok(())
}

/// Probes on every tick until `token` is cancelled, returning the number of
/// rounds in which some chain was unhealthy.
#[allow(clippy::future_not_send)]
async fn watch_loop(
    registry: &ChainRegistry<ChainProbe>,
    period: Duration,
    token: &CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(period);
    let mut failed_rounds = 0;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = probe_round(registry).await {
                    failed_rounds += 1;
                    tracing::warn!(%err, "probe round failed");
                }
            }
        }
    }
    failed_rounds
}
