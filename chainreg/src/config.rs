//! Configuration loading and default template generation.
//!
//! This module provides:
//!
//! - [`Config`] — node-level chain settings: which chains are active, which
//!   backend each uses, and per-backend connection parameters.
//! - [`load_config`] — reads and parses a TOML configuration file.
//! - [`generate_default_config`] — produces a commented TOML template.
//!
//! # Configuration File Format
//!
//! ```toml
//! primary_chain = "brocoin"
//! fee_url = "https://nodes.lightning.computer/fees/v1/btc-fee-estimates.json"
//!
//! [chains.brocoin]
//! network = "mainnet"
//! node = "brocoind"
//!
//! [brocoind]
//! rpc_host = "localhost"
//! rpc_user = "$BROCOIND_RPC_USER"
//! rpc_pass = "$BROCOIND_RPC_PASS"
//! zmq_pub_raw_block = "tcp://127.0.0.1:28332"
//! zmq_pub_raw_tx = "tcp://127.0.0.1:28333"
//! ```
//!
//! Credential fields accept environment references (`"$VAR"` or
//! `"${VAR}"`), resolved at load time.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chain::{ChainCode, ChainDefaults, ForwardingPolicy, MilliSatoshi, Network};
use crate::error::Error;

/// Top-level chain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chain treated as home base.
    pub primary_chain: ChainCode,
    /// External fee-source URL. Overrides any other estimator when set.
    pub fee_url: Option<Url>,
    /// Disable height-hint cache queries (writes still happen).
    pub height_hint_cache_query_disable: bool,
    /// Per-chain settings keyed by chain code.
    pub chains: ChainsConfig,
    /// Light-client settings.
    pub neutrino: NeutrinoConfig,
    /// Full-node settings for Brocoin.
    pub brocoind: FullNodeConfig,
    /// Full-node settings for Litecoin.
    pub litecoind: FullNodeConfig,
    /// TLS RPC settings for Brocoin.
    pub brond: RpcTlsConfig,
    /// TLS RPC settings for Litecoin.
    pub ltcd: RpcTlsConfig,
}

impl Config {
    /// Settings for `chain`, if configured.
    #[must_use]
    pub fn chain(&self, chain: ChainCode) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }

    /// Full-node settings used when `chain` runs a full node.
    #[must_use]
    pub const fn full_node(&self, chain: ChainCode) -> &FullNodeConfig {
        match chain {
            ChainCode::Brocoin => &self.brocoind,
            ChainCode::Litecoin => &self.litecoind,
        }
    }

    /// TLS RPC settings used when `chain` runs a TLS RPC node.
    #[must_use]
    pub const fn rpc_tls(&self, chain: ChainCode) -> &RpcTlsConfig {
        match chain {
            ChainCode::Brocoin => &self.brond,
            ChainCode::Litecoin => &self.ltcd,
        }
    }

    fn resolve_credentials(&mut self) -> Result<(), Error> {
        for node in [&mut self.brocoind, &mut self.litecoind] {
            node.rpc_user = resolve_env(&node.rpc_user)?;
            node.rpc_pass = resolve_env(&node.rpc_pass)?;
        }
        for node in [&mut self.brond, &mut self.ltcd] {
            node.rpc_user = resolve_env(&node.rpc_user)?;
            node.rpc_pass = resolve_env(&node.rpc_pass)?;
            node.raw_rpc_cert = resolve_env(&node.raw_rpc_cert)?;
        }
        Ok(())
    }
}

/// TOML-level settings for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfigInner {
    /// Whether the chain is active.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Network class.
    #[serde(default)]
    pub network: Network,
    /// Backend node type (`neutrino`, `brocoind`, `litecoind`, `brond`,
    /// `ltcd`, `nochainbackend`). Validated when the chain is built.
    pub node: String,
    /// Smallest HTLC accepted in.
    #[serde(default)]
    pub min_htlc_in: Option<MilliSatoshi>,
    /// Smallest HTLC forwarded out.
    #[serde(default)]
    pub min_htlc_out: Option<MilliSatoshi>,
    /// Base forwarding fee.
    #[serde(default)]
    pub base_fee: Option<MilliSatoshi>,
    /// Proportional forwarding fee.
    #[serde(default)]
    pub fee_rate: Option<MilliSatoshi>,
    /// Forwarding CLTV delta.
    #[serde(default)]
    pub time_lock_delta: Option<u32>,
}

const fn default_true() -> bool {
    true
}

/// Settings for one chain together with its chain code.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Which chain these settings are for.
    pub chain: ChainCode,
    /// TOML-level settings.
    pub inner: ChainConfigInner,
}

impl ChainConfig {
    /// Forwarding policy: compiled-in defaults with configured overrides.
    #[must_use]
    pub fn routing_policy(&self) -> ForwardingPolicy {
        let defaults = ChainDefaults::for_chain(self.chain).policy;
        ForwardingPolicy {
            min_htlc_out: self.inner.min_htlc_out.unwrap_or(defaults.min_htlc_out),
            base_fee: self.inner.base_fee.unwrap_or(defaults.base_fee),
            fee_rate: self.inner.fee_rate.unwrap_or(defaults.fee_rate),
            time_lock_delta: self
                .inner
                .time_lock_delta
                .unwrap_or(defaults.time_lock_delta),
        }
    }

    /// Minimum inbound HTLC: default unless overridden.
    #[must_use]
    pub fn min_htlc_in(&self) -> MilliSatoshi {
        self.inner
            .min_htlc_in
            .unwrap_or(ChainDefaults::for_chain(self.chain).min_htlc_in)
    }
}

/// Ordered collection of [`ChainConfig`] entries.
///
/// Serialised as a TOML map keyed by chain code.
#[derive(Debug, Clone, Default)]
pub struct ChainsConfig(pub Vec<ChainConfig>);

impl Deref for ChainsConfig {
    type Target = Vec<ChainConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for ChainsConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for chain_config in &self.0 {
            map.serialize_entry(chain_config.chain.as_str(), &chain_config.inner)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChainsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::fmt;

        use serde::de::{MapAccess, Visitor};

        struct ChainsVisitor;

        impl<'de> Visitor<'de> for ChainsVisitor {
            type Value = ChainsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of chain codes to chain configurations")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut chains: Vec<ChainConfig> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));

                while let Some(key) = access.next_key::<String>()? {
                    let chain: ChainCode = key.parse().map_err(|_| {
                        serde::de::Error::custom(format!("Unexpected chain: {key}"))
                    })?;
                    if chains.iter().any(|c| c.chain == chain) {
                        return Err(serde::de::Error::custom(format!(
                            "Duplicate chain: {key}"
                        )));
                    }
                    let inner: ChainConfigInner = access.next_value()?;
                    chains.push(ChainConfig { chain, inner });
                }

                Ok(ChainsConfig(chains))
            }
        }

        deserializer.deserialize_map(ChainsVisitor)
    }
}

/// Light-client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutrinoConfig {
    /// Deprecated: use the top-level `fee_url`. Both set is an error.
    pub fee_url: Option<Url>,
}

/// Fee estimation mode passed to `estimatesmartfee`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EstimateMode {
    /// Favor fast confirmation.
    #[default]
    Conservative,
    /// Favor lower fees.
    Economical,
}

impl EstimateMode {
    /// Name as sent over RPC.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "CONSERVATIVE",
            Self::Economical => "ECONOMICAL",
        }
    }
}

/// Settings for a full node reached over JSON-RPC and pub/sub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FullNodeConfig {
    /// RPC host, with or without port.
    pub rpc_host: String,
    /// RPC user.
    pub rpc_user: String,
    /// RPC password.
    pub rpc_pass: String,
    /// Pub/sub endpoint for raw blocks.
    pub zmq_pub_raw_block: String,
    /// Pub/sub endpoint for raw transactions.
    pub zmq_pub_raw_tx: String,
    /// Fee estimation mode.
    pub estimate_mode: EstimateMode,
    /// Peers to fetch pruned blocks from.
    pub pruned_node_max_peers: u8,
}

impl Default for FullNodeConfig {
    fn default() -> Self {
        Self {
            rpc_host: "localhost".to_owned(),
            rpc_user: String::new(),
            rpc_pass: String::new(),
            zmq_pub_raw_block: String::new(),
            zmq_pub_raw_tx: String::new(),
            estimate_mode: EstimateMode::default(),
            pruned_node_max_peers: 0,
        }
    }
}

/// Settings for a full node reached over TLS RPC and websockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcTlsConfig {
    /// RPC host, with or without port.
    pub rpc_host: String,
    /// RPC user.
    pub rpc_user: String,
    /// RPC password.
    pub rpc_pass: String,
    /// Path to the node's TLS certificate.
    pub rpc_cert: PathBuf,
    /// Hex-encoded certificate bytes. Takes precedence over `rpc_cert`.
    pub raw_rpc_cert: String,
}

impl Default for RpcTlsConfig {
    fn default() -> Self {
        Self {
            rpc_host: "localhost".to_owned(),
            rpc_user: String::new(),
            rpc_pass: String::new(),
            rpc_cert: PathBuf::new(),
            raw_rpc_cert: String::new(),
        }
    }
}

/// Resolve an environment-variable reference (`$VAR` or `${VAR}`), returning
/// the literal string unchanged if it does not match either pattern.
fn resolve_env(value: &str) -> Result<String, Error> {
    if let Some(var_name) = value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return std::env::var(var_name).map_err(|_| {
            Error::config(format!(
                "env var '{var_name}' not found (referenced as '{value}')"
            ))
        });
    }
    if let Some(var_name) = value.strip_prefix('$')
        && !var_name.is_empty()
        && var_name.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return std::env::var(var_name).map_err(|_| {
            Error::config(format!(
                "env var '{var_name}' not found (referenced as '{value}')"
            ))
        });
    }
    Ok(value.to_owned())
}

/// Parse configuration from TOML text and resolve credential references.
///
/// # Errors
///
/// Returns [`Error::Config`] if the text is not valid configuration or an
/// environment reference is unset.
pub fn parse_config(content: &str) -> Result<Config, Error> {
    let mut config: Config =
        toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))?;
    config.resolve_credentials()?;
    Ok(config)
}

/// Load configuration from a TOML file at the given path.
///
/// # Errors
///
/// Returns an error if the file cannot be resolved, read, or parsed.
pub fn load_config(path: &Path) -> Result<Config, Error> {
    let config_path = path
        .canonicalize()
        .map_err(|e| Error::resource_with(format!("config path '{}'", path.display()), e))?;
    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| Error::resource_with(format!("config file '{}'", config_path.display()), e))?;
    parse_config(&content).map_err(|e| match e {
        Error::Config(msg) => Error::config(format!("{}: {msg}", config_path.display())),
        other => other,
    })
}

/// Generate a default TOML configuration template.
#[must_use]
pub fn generate_default_config() -> String {
    String::from(
        r#"# Chain backend configuration

# Chain used as home base.
primary_chain = "brocoin"

# External fee source. Required for the light client on mainnet.
# fee_url = "https://nodes.lightning.computer/fees/v1/btc-fee-estimates.json"

# Disable height-hint cache queries (hints are still written).
height_hint_cache_query_disable = false

# ── Chains ──────────────────────────────────────────────────────────
# node: neutrino | brocoind | litecoind | brond | ltcd | nochainbackend

[chains.brocoin]
network = "mainnet"
node = "brocoind"
# min_htlc_in = 1
# min_htlc_out = 1000
# base_fee = 1000
# fee_rate = 1
# time_lock_delta = 40

# ── Full node (JSON-RPC + pub/sub) ─────────────────────────────────
# Values support environment variable references: "$VAR" or "${VAR}"

[brocoind]
rpc_host = "localhost"
rpc_user = "$BROCOIND_RPC_USER"
rpc_pass = "$BROCOIND_RPC_PASS"
zmq_pub_raw_block = "tcp://127.0.0.1:28332"
zmq_pub_raw_tx = "tcp://127.0.0.1:28333"
estimate_mode = "CONSERVATIVE"

# ── Full node (TLS RPC + websockets) ───────────────────────────────

# [brond]
# rpc_host = "localhost"
# rpc_user = "$BROND_RPC_USER"
# rpc_pass = "$BROND_RPC_PASS"
# rpc_cert = "~/.brond/rpc.cert"
"#,
    )
}
