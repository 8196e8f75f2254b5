use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{
    FEE_PER_KW_FLOOR, FeeEstimator, FeeRateSource, SatPerKVByte, SatPerKWeight, check_conf_target,
};
use crate::error::Error;
use crate::service::Service;

/// Rate used when the backend has no estimate for a target.
pub const FALLBACK_FEE_RATE: SatPerKVByte = SatPerKVByte(25 * 1000);

/// Fee estimator backed by the chain backend's own estimation.
pub struct NodeEstimator {
    source: Arc<dyn FeeRateSource>,
    fallback: SatPerKWeight,
    relay_fee: AtomicU64,
}

impl fmt::Debug for NodeEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEstimator")
            .field("fallback", &self.fallback)
            .field("relay_fee", &self.relay_fee_per_kw())
            .finish_non_exhaustive()
    }
}

impl NodeEstimator {
    /// Creates an estimator over `source`, answering with `fallback` when
    /// the backend has no estimate.
    #[must_use]
    pub fn new(source: Arc<dyn FeeRateSource>, fallback: SatPerKWeight) -> Self {
        Self {
            source,
            fallback,
            relay_fee: AtomicU64::new(FEE_PER_KW_FLOOR.0),
        }
    }
}

#[async_trait]
impl Service for NodeEstimator {
    /// Fetches the backend's relay fee, never going below the floor.
    async fn start(&self) -> Result<(), Error> {
        let relay = self.source.min_relay_fee().await?.fee_per_kw();
        let relay = relay.max(FEE_PER_KW_FLOOR);
        self.relay_fee.store(relay.0, Ordering::Release);
        tracing::info!(relay_fee = %relay, "node fee estimator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl FeeEstimator for NodeEstimator {
    async fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<SatPerKWeight, Error> {
        check_conf_target(conf_target)?;
        let fee = match self.source.estimate_fee(conf_target).await? {
            Some(rate) => rate.fee_per_kw(),
            None => {
                tracing::debug!(conf_target, fallback = %self.fallback, "no backend estimate, using fallback");
                self.fallback
            }
        };
        Ok(fee.max(self.relay_fee_per_kw()))
    }

    fn relay_fee_per_kw(&self) -> SatPerKWeight {
        SatPerKWeight(self.relay_fee.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockFeeSource;

    #[tokio::test]
    async fn uses_backend_estimate() {
        let estimator = NodeEstimator::new(
            Arc::new(MockFeeSource {
                estimate: Some(SatPerKVByte(40_000)),
                relay: SatPerKVByte(1_000),
            }),
            FALLBACK_FEE_RATE.fee_per_kw(),
        );
        estimator.start().await.unwrap();
        assert_eq!(estimator.estimate_fee_per_kw(6).await.unwrap(), SatPerKWeight(10_000));
    }

    #[tokio::test]
    async fn falls_back_when_backend_has_no_estimate() {
        let estimator = NodeEstimator::new(
            Arc::new(MockFeeSource {
                estimate: None,
                relay: SatPerKVByte(1_000),
            }),
            FALLBACK_FEE_RATE.fee_per_kw(),
        );
        estimator.start().await.unwrap();
        assert_eq!(estimator.estimate_fee_per_kw(6).await.unwrap(), SatPerKWeight(6_250));
    }

    #[tokio::test]
    async fn never_below_relay_fee() {
        let estimator = NodeEstimator::new(
            Arc::new(MockFeeSource {
                estimate: Some(SatPerKVByte(2_000)),
                relay: SatPerKVByte(4_000),
            }),
            FALLBACK_FEE_RATE.fee_per_kw(),
        );
        assert_eq!(estimator.relay_fee_per_kw(), FEE_PER_KW_FLOOR);
        estimator.start().await.unwrap();
        assert_eq!(estimator.relay_fee_per_kw(), SatPerKWeight(1_000));
        assert_eq!(estimator.estimate_fee_per_kw(2).await.unwrap(), SatPerKWeight(1_000));
    }
}
