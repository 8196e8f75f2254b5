//! Per-chain forwarding, channel and fee defaults.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ChainCode;
use crate::fee::{FEE_PER_KW_FLOOR, SatPerKWeight};

/// An amount in thousandths of the chain's base unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilliSatoshi(pub u64);

impl fmt::Display for MilliSatoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mSAT", self.0)
    }
}

/// An on-chain amount in the chain's base unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SAT", self.0)
    }
}

/// Forwarding policy applied to channels that don't carry their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingPolicy {
    /// Smallest HTLC forwarded out.
    pub min_htlc_out: MilliSatoshi,
    /// Flat fee per forwarded HTLC.
    pub base_fee: MilliSatoshi,
    /// Proportional fee, in millionths of the forwarded amount.
    pub fee_rate: MilliSatoshi,
    /// CLTV delta required between incoming and outgoing HTLCs.
    pub time_lock_delta: u32,
}

/// Constraints proposed for any incoming or outgoing channel reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConstraints {
    /// Outputs below this value are not created.
    pub dust_limit: Amount,
    /// Maximum HTLCs the remote party may add.
    pub max_accepted_htlcs: u16,
}

/// Protocol maximum of HTLCs on a commitment, both directions combined.
pub const MAX_HTLC_NUMBER: u16 = 966;

/// Size of the largest standard spendable output script: a version byte, a
/// push opcode and a 40-byte witness program.
pub const UNKNOWN_WITNESS_SIZE: usize = 1 + 1 + 40;

/// Relay fee, in sat/kvB, that dust thresholds are computed against.
pub const DEFAULT_RELAY_FEE_PER_KB: u64 = 1000;

/// Fixed Litecoin dust limit.
pub const LITECOIN_DUST_LIMIT: Amount = Amount(54_600);

/// Bytes needed to serialize `n` as a compact-size integer.
const fn var_int_size(n: u64) -> u64 {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Dust threshold of a witness output with a script of `script_size` bytes.
///
/// The cost is three times the relay fee of the output plus the witness
/// input that would later spend it.
#[must_use]
pub const fn dust_limit_for_size(script_size: usize) -> Amount {
    // outpoint(36) + empty script len(1) + sequence(4) + discounted witness(107/4)
    const WITNESS_INPUT_SIZE: u64 = 32 + 4 + 1 + 107 / 4 + 4;
    let script_size = script_size as u64;
    let total = 8 + var_int_size(script_size) + script_size + WITNESS_INPUT_SIZE;
    Amount(3 * total * DEFAULT_RELAY_FEE_PER_KB / 1000)
}

/// Default channel constraints for a chain.
#[must_use]
pub const fn default_channel_constraints(chain: ChainCode) -> ChannelConstraints {
    let dust_limit = match chain {
        ChainCode::Brocoin => dust_limit_for_size(UNKNOWN_WITNESS_SIZE),
        ChainCode::Litecoin => LITECOIN_DUST_LIMIT,
    };
    ChannelConstraints {
        dust_limit,
        max_accepted_htlcs: MAX_HTLC_NUMBER / 2,
    }
}

/// Compiled-in defaults for one chain, overridable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDefaults {
    /// Smallest HTLC accepted in.
    pub min_htlc_in: MilliSatoshi,
    /// Default forwarding policy.
    pub policy: ForwardingPolicy,
    /// Rate of the baseline static estimator.
    pub static_fee_per_kw: SatPerKWeight,
    /// Relay floor of the baseline static estimator.
    pub static_min_relay_fee: SatPerKWeight,
}

impl ChainDefaults {
    /// Defaults for `chain`.
    #[must_use]
    pub const fn for_chain(chain: ChainCode) -> Self {
        match chain {
            ChainCode::Brocoin => Self {
                min_htlc_in: MilliSatoshi(1),
                policy: ForwardingPolicy {
                    min_htlc_out: MilliSatoshi(1000),
                    base_fee: MilliSatoshi(1000),
                    fee_rate: MilliSatoshi(1),
                    time_lock_delta: 40,
                },
                // 50 sat/vbyte
                static_fee_per_kw: SatPerKWeight(12_500),
                static_min_relay_fee: FEE_PER_KW_FLOOR,
            },
            ChainCode::Litecoin => Self {
                min_htlc_in: MilliSatoshi(1),
                policy: ForwardingPolicy {
                    min_htlc_out: MilliSatoshi(1000),
                    base_fee: MilliSatoshi(1000),
                    fee_rate: MilliSatoshi(1),
                    time_lock_delta: 576,
                },
                // 200 sat/vbyte
                static_fee_per_kw: SatPerKWeight(50_000),
                static_min_relay_fee: SatPerKWeight(0),
            },
        }
    }
}
