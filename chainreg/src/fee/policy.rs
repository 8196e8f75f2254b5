//! Picks the fee estimator a chain control runs with.
//!
//! Layers, later ones winning:
//!
//! 1. the chain's static rate (the inert estimator for backend-less nodes);
//! 2. live estimates from the backend, unless the network is reproducible;
//! 3. an external fee source URL, uncached on reproducible networks.
//!
//! A light client on mainnet has no live estimates, so there the URL is
//! mandatory.

use std::fmt;
use std::sync::Arc;

use url::Url;

use super::{
    FALLBACK_FEE_RATE, FeeEstimator, FeeRateSource, NodeEstimator, StaticEstimator,
    WebApiEstimator,
};
use crate::backend::{BackendKind, NoChainBackend};
use crate::chain::{ChainCode, ChainDefaults, Network};
use crate::error::Error;

/// Which estimator [`select`] settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorChoice {
    /// Fixed per-chain rate.
    Static,
    /// No backend; constant floor rate.
    Inert,
    /// The backend's own estimation.
    Node,
    /// External fee source.
    WebApi {
        /// Whether fetched tables are cached and refreshed in the background.
        cached: bool,
    },
}

impl fmt::Display for EstimatorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Inert => f.write_str("inert"),
            Self::Node => f.write_str("node"),
            Self::WebApi { cached: true } => f.write_str("web api (cached)"),
            Self::WebApi { cached: false } => f.write_str("web api (uncached)"),
        }
    }
}

/// Result of [`select`]. The estimator has not been started.
pub struct SelectedEstimator {
    /// What was chosen.
    pub choice: EstimatorChoice,
    /// The estimator itself.
    pub estimator: Arc<dyn FeeEstimator>,
}

impl fmt::Debug for SelectedEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedEstimator")
            .field("choice", &self.choice)
            .finish_non_exhaustive()
    }
}

/// What the selector needs to know about the chain being built.
#[derive(Clone, Copy)]
pub struct FeePolicyInput<'a> {
    /// Chain being built.
    pub chain: ChainCode,
    /// Its network.
    pub network: Network,
    /// Backend variant in use.
    pub backend: BackendKind,
    /// External fee source, after any legacy option was folded in.
    pub fee_url: Option<&'a Url>,
    /// Live fee data exposed by the backend.
    pub fee_source: Option<&'a Arc<dyn FeeRateSource>>,
}

impl fmt::Debug for FeePolicyInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeePolicyInput")
            .field("chain", &self.chain)
            .field("network", &self.network)
            .field("backend", &self.backend)
            .field("fee_url", &self.fee_url)
            .field("fee_source", &self.fee_source.is_some())
            .finish()
    }
}

/// Selects the fee estimator for a chain control.
///
/// # Errors
///
/// Returns [`Error::Config`] for a light client on mainnet without a fee
/// URL, and [`Error::Connection`] if the external fee source client cannot be
/// created.
pub fn select(input: FeePolicyInput<'_>) -> Result<SelectedEstimator, Error> {
    if input.backend == BackendKind::LightClient
        && input.network == Network::Mainnet
        && input.fee_url.is_none()
    {
        return Err(Error::config(
            "fee_url is required when running a light client on mainnet",
        ));
    }

    if let Some(url) = input.fee_url {
        let cached = !input.network.is_reproducible();
        tracing::info!(%url, cached, "using external fee estimator");
        return Ok(SelectedEstimator {
            choice: EstimatorChoice::WebApi { cached },
            estimator: Arc::new(WebApiEstimator::new(url.clone(), !cached)?),
        });
    }

    if let Some(source) = input.fee_source
        && input.backend.has_fee_estimation()
        && !input.network.is_reproducible()
    {
        tracing::info!(backend = %input.backend, fallback = %FALLBACK_FEE_RATE, "using backend fee estimator");
        return Ok(SelectedEstimator {
            choice: EstimatorChoice::Node,
            estimator: Arc::new(NodeEstimator::new(
                Arc::clone(source),
                FALLBACK_FEE_RATE.fee_per_kw(),
            )),
        });
    }

    if input.backend == BackendKind::Null {
        return Ok(SelectedEstimator {
            choice: EstimatorChoice::Inert,
            estimator: Arc::new(NoChainBackend::new()),
        });
    }

    let defaults = ChainDefaults::for_chain(input.chain);
    tracing::info!(fee = %defaults.static_fee_per_kw, "using static fee estimator");
    Ok(SelectedEstimator {
        choice: EstimatorChoice::Static,
        estimator: Arc::new(StaticEstimator::new(
            defaults.static_fee_per_kw,
            defaults.static_min_relay_fee,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fee::{SatPerKVByte, SatPerKWeight};
    use crate::testutil::MockFeeSource;

    fn source() -> Arc<dyn FeeRateSource> {
        Arc::new(MockFeeSource {
            estimate: Some(SatPerKVByte(40_000)),
            relay: SatPerKVByte(1_000),
        })
    }

    fn input<'a>(
        backend: BackendKind,
        network: Network,
        fee_url: Option<&'a Url>,
        fee_source: Option<&'a Arc<dyn FeeRateSource>>,
    ) -> FeePolicyInput<'a> {
        FeePolicyInput {
            chain: ChainCode::Brocoin,
            network,
            backend,
            fee_url,
            fee_source,
        }
    }

    #[test]
    fn light_client_on_mainnet_needs_a_fee_url() {
        let err = select(input(BackendKind::LightClient, Network::Mainnet, None, None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let url = Url::parse("https://fees.example/v1").unwrap();
        let selected =
            select(input(BackendKind::LightClient, Network::Mainnet, Some(&url), None)).unwrap();
        assert_eq!(selected.choice, EstimatorChoice::WebApi { cached: true });
    }

    #[test]
    fn light_client_off_mainnet_uses_static_rate() {
        let selected = select(input(BackendKind::LightClient, Network::Testnet, None, None)).unwrap();
        assert_eq!(selected.choice, EstimatorChoice::Static);
    }

    #[tokio::test]
    async fn backend_estimates_replace_static_rate() {
        let source = source();
        let selected =
            select(input(BackendKind::FullNode, Network::Testnet, None, Some(&source))).unwrap();
        assert_eq!(selected.choice, EstimatorChoice::Node);
        assert_eq!(
            selected.estimator.estimate_fee_per_kw(6).await.unwrap(),
            SatPerKWeight(10_000)
        );
    }

    #[tokio::test]
    async fn reproducible_networks_keep_static_rate() {
        let source = source();
        for network in [Network::Regtest, Network::Simnet] {
            let selected =
                select(input(BackendKind::RpcTls, network, None, Some(&source))).unwrap();
            assert_eq!(selected.choice, EstimatorChoice::Static);
            assert_eq!(
                selected.estimator.estimate_fee_per_kw(6).await.unwrap(),
                SatPerKWeight(12_500)
            );
        }
    }

    #[test]
    fn fee_url_overrides_backend_and_skips_cache_on_regtest() {
        let source = source();
        let url = Url::parse("https://fees.example/v1").unwrap();
        let selected =
            select(input(BackendKind::FullNode, Network::Mainnet, Some(&url), Some(&source)))
                .unwrap();
        assert_eq!(selected.choice, EstimatorChoice::WebApi { cached: true });

        let selected =
            select(input(BackendKind::FullNode, Network::Regtest, Some(&url), Some(&source)))
                .unwrap();
        assert_eq!(selected.choice, EstimatorChoice::WebApi { cached: false });
    }

    #[test]
    fn null_backend_gets_inert_estimator() {
        let selected = select(input(BackendKind::Null, Network::Mainnet, None, None)).unwrap();
        assert_eq!(selected.choice, EstimatorChoice::Inert);
    }

    #[test]
    fn litecoin_static_rate() {
        let selected = select(FeePolicyInput {
            chain: ChainCode::Litecoin,
            ..input(BackendKind::FullNode, Network::Regtest, None, None)
        })
        .unwrap();
        assert_eq!(selected.choice, EstimatorChoice::Static);
        assert_eq!(selected.estimator.relay_fee_per_kw(), SatPerKWeight(0));
    }
}
