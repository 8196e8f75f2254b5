//! Fee-rate units, the [`FeeEstimator`] capability and its implementations.
//!
//! - [`StaticEstimator`] — fixed rate, the baseline for every chain.
//! - [`NodeEstimator`] — live estimates from the chain backend.
//! - [`WebApiEstimator`] — estimates from an external HTTP fee source.
//! - [`policy`] — picks one of the above for a chain control.

mod node;
pub mod policy;
mod static_fee;
mod web_api;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::node::*;
pub use self::static_fee::*;
pub use self::web_api::*;
use crate::error::Error;
use crate::service::Service;

/// Weight units per virtual byte.
const WITNESS_SCALE_FACTOR: u64 = 4;

/// Fee rate in base units per 1000 weight units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SatPerKWeight(pub u64);

/// Fee rate in base units per 1000 virtual bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SatPerKVByte(pub u64);

impl SatPerKVByte {
    /// Converts to a per-kiloweight rate.
    #[must_use]
    pub const fn fee_per_kw(self) -> SatPerKWeight {
        SatPerKWeight(self.0 / WITNESS_SCALE_FACTOR)
    }
}

impl SatPerKWeight {
    /// Converts to a per-kilo-vbyte rate.
    #[must_use]
    pub const fn fee_per_kvbyte(self) -> SatPerKVByte {
        SatPerKVByte(self.0 * WITNESS_SCALE_FACTOR)
    }
}

impl fmt::Display for SatPerKWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kw", self.0)
    }
}

impl fmt::Display for SatPerKVByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kvb", self.0)
    }
}

/// Lowest fee rate that still relays: 1 sat/vbyte rounded up to whole
/// sat/kw after the witness discount.
pub const FEE_PER_KW_FLOOR: SatPerKWeight = SatPerKWeight(253);

/// Largest confirmation target any estimator accepts.
pub const MAX_BLOCK_TARGET: u32 = 1008;

/// Produces fee-rate recommendations for a confirmation target.
#[async_trait]
pub trait FeeEstimator: Service {
    /// Fee rate expected to confirm within `conf_target` blocks.
    async fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<SatPerKWeight, Error>;

    /// Minimum rate the backend will relay.
    fn relay_fee_per_kw(&self) -> SatPerKWeight;
}

/// Raw fee data exposed by a chain backend that supports live estimation.
#[async_trait]
pub trait FeeRateSource: Send + Sync {
    /// Backend estimate for `conf_target`, or `None` when it has too little
    /// data to produce one.
    async fn estimate_fee(&self, conf_target: u32) -> Result<Option<SatPerKVByte>, Error>;

    /// The backend's minimum relay fee.
    async fn min_relay_fee(&self) -> Result<SatPerKVByte, Error>;
}

pub(crate) fn check_conf_target(conf_target: u32) -> Result<(), Error> {
    if conf_target == 0 || conf_target > MAX_BLOCK_TARGET {
        return Err(Error::config(format!(
            "confirmation target must be within 1..={MAX_BLOCK_TARGET}, got {conf_target}"
        )));
    }
    Ok(())
}
