//! Chain identities, fixed network data and per-chain defaults.
//!
//! - [`params`] — genesis chain index, DNS seed hints, [`NetworkParams`].
//! - [`policy`] — default forwarding policy, channel constraints and fee
//!   constants per chain.

mod params;
mod policy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use self::params::*;
pub use self::policy::*;
use crate::error::Error;

/// A settlement chain the node can be active on.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainCode {
    /// The primary chain.
    #[default]
    Brocoin,
    /// The alternate chain.
    Litecoin,
}

impl ChainCode {
    /// Lowercase name as used in configuration keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brocoin => "brocoin",
            Self::Litecoin => "litecoin",
        }
    }
}

impl fmt::Display for ChainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brocoin" => Ok(Self::Brocoin),
            "litecoin" => Ok(Self::Litecoin),
            other => Err(Error::config(format!("unknown chain: {other}"))),
        }
    }
}

/// Network class a chain runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Signed-block test network.
    Signet,
    /// Local regression-test network.
    Regtest,
    /// Local simulation network.
    Simnet,
}

impl Network {
    /// Whether runs on this network must be deterministic: no live fee
    /// estimation and no fee caching.
    #[must_use]
    pub const fn is_reproducible(self) -> bool {
        matches!(self, Self::Regtest | Self::Simnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
            Self::Simnet => "simnet",
        };
        f.write_str(name)
    }
}
