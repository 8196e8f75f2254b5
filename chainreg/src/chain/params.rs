//! Network parameters, the genesis chain index and DNS seed hints.
//!
//! Everything here is fixed data compiled into the binary. The tables are
//! plain `static` slices, so concurrent readers need no synchronization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ChainCode, Network};
use crate::error::Error;

/// Size of a chain hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte block hash, stored in internal (little-endian) byte order.
///
/// Formatting and parsing use the conventional reversed hex order, so the
/// Litecoin mainnet genesis prints as `12a765e3...7e04bfe2`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainHash(pub [u8; HASH_SIZE]);

impl ChainHash {
    /// The all-zero hash.
    pub const ZERO: Self = Self([0; HASH_SIZE]);

    /// Wraps raw bytes given in internal byte order.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes in internal byte order.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({self})")
    }
}

impl FromStr for ChainHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::config(format!("invalid chain hash '{s}': {e}")))?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Genesis hash of Brocoin's main chain.
pub const BROCOIN_MAINNET_GENESIS: ChainHash = ChainHash([
    0xd2, 0x28, 0x0d, 0x8c, 0xf4, 0x3a, 0x3e, 0xfd, 0x9a, 0x51, 0x41, 0x4b, 0x15, 0xbf, 0x6a, 0xb0,
    0x2b, 0x1c, 0x12, 0xfb, 0x78, 0xd6, 0xb6, 0x9e, 0x63, 0xf8, 0x88, 0xc5, 0xe3, 0x18, 0xbf, 0x05,
]);

/// Genesis hash of Brocoin's test chain.
pub const BROCOIN_TESTNET_GENESIS: ChainHash = ChainHash([
    0xce, 0xeb, 0x1a, 0x38, 0x06, 0xf0, 0x71, 0x0c, 0xda, 0x62, 0xbd, 0x49, 0x32, 0x8d, 0x70, 0x62,
    0xb1, 0x0c, 0xca, 0x75, 0xd1, 0xd8, 0x16, 0x9f, 0xa9, 0x9e, 0xed, 0x16, 0xfa, 0x0c, 0x00, 0x00,
]);

/// Genesis hash of Brocoin's signet chain.
pub const BROCOIN_SIGNET_GENESIS: ChainHash = ChainHash([
    0xf6, 0x1e, 0xee, 0x3b, 0x63, 0xa3, 0x80, 0xa4, 0x77, 0xa0, 0x63, 0xaf, 0x32, 0xb2, 0xbb, 0xc9,
    0x7c, 0x9f, 0xf9, 0xf0, 0x1f, 0x2c, 0x42, 0x25, 0xe9, 0x73, 0x98, 0x81, 0x08, 0x00, 0x00, 0x00,
]);

/// Genesis hash of Litecoin's main chain.
pub const LITECOIN_MAINNET_GENESIS: ChainHash = ChainHash([
    0xe2, 0xbf, 0x04, 0x7e, 0x7e, 0x5a, 0x19, 0x1a, 0xa4, 0xef, 0x34, 0xd3, 0x14, 0x97, 0x9d, 0xc9,
    0x98, 0x6e, 0x0f, 0x19, 0x25, 0x1e, 0xda, 0xba, 0x59, 0x40, 0xfd, 0x1f, 0xe3, 0x65, 0xa7, 0x12,
]);

/// Genesis hash of Litecoin's testnet4 chain.
pub const LITECOIN_TESTNET_GENESIS: ChainHash = ChainHash([
    0xa0, 0x29, 0x3e, 0x4e, 0xeb, 0x3d, 0xa6, 0xe6, 0xf5, 0x6f, 0x81, 0xed, 0x59, 0x5f, 0x57, 0x88,
    0x0d, 0x1a, 0x21, 0x56, 0x9e, 0x13, 0xee, 0xfd, 0xd9, 0x51, 0x28, 0x4b, 0x5a, 0x62, 0x66, 0x49,
]);

/// Genesis hash → chain code. Signet is deliberately absent.
static CHAIN_INDEX: &[(ChainHash, ChainCode)] = &[
    (BROCOIN_TESTNET_GENESIS, ChainCode::Brocoin),
    (LITECOIN_TESTNET_GENESIS, ChainCode::Litecoin),
    (BROCOIN_MAINNET_GENESIS, ChainCode::Brocoin),
    (LITECOIN_MAINNET_GENESIS, ChainCode::Litecoin),
];

/// Resolves a genesis hash to the chain it belongs to.
///
/// Returns `None` for any hash not in the index; there is no default chain.
#[must_use]
pub fn chain_for_genesis(hash: &ChainHash) -> Option<ChainCode> {
    CHAIN_INDEX
        .iter()
        .find(|(genesis, _)| genesis == hash)
        .map(|(_, chain)| *chain)
}

/// A peer bootstrap hint.
///
/// `primary` is used for the SRV lookup. `soa`, when present, is the A record
/// naming the seed's authoritative DNS server, queried when the primary
/// lookup gets no answer over UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsSeed {
    /// Host tried first.
    pub primary: &'static str,
    /// Fallback authoritative-server record.
    pub soa: Option<&'static str>,
}

static DNS_SEEDS: &[(ChainHash, &[DnsSeed])] = &[
    (
        BROCOIN_MAINNET_GENESIS,
        &[DnsSeed {
            primary: "207.180.196.129",
            soa: None,
        }],
    ),
    (
        BROCOIN_TESTNET_GENESIS,
        &[DnsSeed {
            primary: "207.180.196.129",
            soa: None,
        }],
    ),
    (
        BROCOIN_SIGNET_GENESIS,
        &[DnsSeed {
            primary: "ln.signet.secp.tech",
            soa: None,
        }],
    ),
    (
        LITECOIN_MAINNET_GENESIS,
        &[DnsSeed {
            primary: "ltc.nodes.lightning.directory",
            soa: Some("soa.nodes.lightning.directory"),
        }],
    ),
];

/// Ordered bootstrap hints for the network with the given genesis hash.
///
/// Empty when the network has no seeds.
#[must_use]
pub fn dns_seeds(hash: &ChainHash) -> &'static [DnsSeed] {
    DNS_SEEDS
        .iter()
        .find(|(genesis, _)| genesis == hash)
        .map_or(&[], |(_, seeds)| seeds)
}

/// Static parameters of one (chain, network) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    /// Chain family.
    pub chain: ChainCode,
    /// Network class.
    pub network: Network,
    /// Genesis hash, for networks with a fixed public genesis block.
    pub genesis_hash: Option<ChainHash>,
    /// RPC port of the TLS full-node daemon. The plain full-node daemon
    /// listens two below it.
    pub rpc_port: u16,
}

static NETWORK_PARAMS: &[NetworkParams] = &[
    NetworkParams {
        chain: ChainCode::Brocoin,
        network: Network::Mainnet,
        genesis_hash: Some(BROCOIN_MAINNET_GENESIS),
        rpc_port: 8334,
    },
    NetworkParams {
        chain: ChainCode::Brocoin,
        network: Network::Testnet,
        genesis_hash: Some(BROCOIN_TESTNET_GENESIS),
        rpc_port: 18334,
    },
    NetworkParams {
        chain: ChainCode::Brocoin,
        network: Network::Signet,
        genesis_hash: Some(BROCOIN_SIGNET_GENESIS),
        rpc_port: 38332,
    },
    NetworkParams {
        chain: ChainCode::Brocoin,
        network: Network::Regtest,
        genesis_hash: None,
        rpc_port: 18334,
    },
    NetworkParams {
        chain: ChainCode::Brocoin,
        network: Network::Simnet,
        genesis_hash: None,
        rpc_port: 18556,
    },
    NetworkParams {
        chain: ChainCode::Litecoin,
        network: Network::Mainnet,
        genesis_hash: Some(LITECOIN_MAINNET_GENESIS),
        rpc_port: 9334,
    },
    NetworkParams {
        chain: ChainCode::Litecoin,
        network: Network::Testnet,
        genesis_hash: Some(LITECOIN_TESTNET_GENESIS),
        rpc_port: 19334,
    },
    NetworkParams {
        chain: ChainCode::Litecoin,
        network: Network::Regtest,
        genesis_hash: None,
        rpc_port: 19334,
    },
    NetworkParams {
        chain: ChainCode::Litecoin,
        network: Network::Simnet,
        genesis_hash: None,
        rpc_port: 18556,
    },
];

impl NetworkParams {
    /// Looks up the parameters for a chain on a network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the chain does not run that network.
    pub fn for_chain(chain: ChainCode, network: Network) -> Result<&'static Self, Error> {
        NETWORK_PARAMS
            .iter()
            .find(|p| p.chain == chain && p.network == network)
            .ok_or_else(|| Error::config(format!("{chain} has no {network} network")))
    }
}
