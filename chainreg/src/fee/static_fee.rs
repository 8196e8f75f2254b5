use async_trait::async_trait;

use super::{FeeEstimator, SatPerKWeight, check_conf_target};
use crate::error::Error;
use crate::service::Service;

/// Returns the same fee rate for every confirmation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEstimator {
    fee_per_kw: SatPerKWeight,
    relay_fee: SatPerKWeight,
}

impl StaticEstimator {
    /// Creates a static estimator.
    #[must_use]
    pub const fn new(fee_per_kw: SatPerKWeight, relay_fee: SatPerKWeight) -> Self {
        Self {
            fee_per_kw,
            relay_fee,
        }
    }
}

#[async_trait]
impl Service for StaticEstimator {
    async fn start(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl FeeEstimator for StaticEstimator {
    async fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<SatPerKWeight, Error> {
        check_conf_target(conf_target)?;
        Ok(self.fee_per_kw)
    }

    fn relay_fee_per_kw(&self) -> SatPerKWeight {
        self.relay_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::FEE_PER_KW_FLOOR;

    #[tokio::test]
    async fn same_rate_for_every_target() {
        let estimator = StaticEstimator::new(SatPerKWeight(12_500), FEE_PER_KW_FLOOR);
        estimator.start().await.unwrap();
        assert_eq!(estimator.estimate_fee_per_kw(1).await.unwrap(), SatPerKWeight(12_500));
        assert_eq!(estimator.estimate_fee_per_kw(144).await.unwrap(), SatPerKWeight(12_500));
        assert_eq!(estimator.relay_fee_per_kw(), FEE_PER_KW_FLOOR);
        estimator.stop().await.unwrap();
    }
}
