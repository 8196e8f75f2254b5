//! Full node reached over JSON-RPC plus publish/subscribe block and
//! transaction feeds (`brocoind`, `litecoind`).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::rpc::{JsonRpcClient, RpcCommandProbe, SmartFeeSource, health_check_method};
use super::{BackendContext, BackendParts, ChainNotifier, ChainSource, FilteredChainView};
use crate::chain::{ChainCode, Network, NetworkParams};
use crate::error::Error;
use crate::hint_cache::HeightHintCache;
use crate::service::{Cleanup, Service};

/// Read deadline on the pub/sub sockets.
pub const ZMQ_READ_DEADLINE: Duration = Duration::from_secs(5);

/// Offset from a chain's RPC port to the full-node RPC port.
const FULL_NODE_PORT_OFFSET: u16 = 2;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters handed to a [`FullNodeConnector`].
#[derive(Clone, PartialEq, Eq)]
pub struct FullNodeConnConfig {
    /// Chain the node serves.
    pub chain: ChainCode,
    /// Network the node runs on.
    pub network: Network,
    /// RPC `host:port`.
    pub host: String,
    /// RPC user.
    pub user: String,
    /// RPC password.
    pub pass: String,
    /// Raw-block publisher endpoint.
    pub zmq_block_host: String,
    /// Raw-transaction publisher endpoint.
    pub zmq_tx_host: String,
    /// Read deadline on the publisher sockets.
    pub zmq_read_deadline: Duration,
    /// Peers to fetch pruned blocks from.
    pub pruned_node_max_peers: u8,
}

impl fmt::Debug for FullNodeConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullNodeConnConfig")
            .field("chain", &self.chain)
            .field("network", &self.network)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("zmq_block_host", &self.zmq_block_host)
            .field("zmq_tx_host", &self.zmq_tx_host)
            .field("zmq_read_deadline", &self.zmq_read_deadline)
            .field("pruned_node_max_peers", &self.pruned_node_max_peers)
            .finish()
    }
}

/// Opens connections to a full node.
#[async_trait]
pub trait FullNodeConnector: Send + Sync {
    /// Creates a connection. It is not started.
    async fn connect(
        &self,
        config: &FullNodeConnConfig,
    ) -> Result<Arc<dyn FullNodeConnection>, Error>;
}

/// A live full-node connection from which the chain clients are derived.
pub trait FullNodeConnection: Service {
    /// Block notifier sharing this connection.
    fn notifier(&self, hints: Arc<HeightHintCache>) -> Arc<dyn ChainNotifier>;

    /// Filtered chain view sharing this connection.
    fn filtered_view(&self) -> Arc<dyn FilteredChainView>;

    /// Wallet chain source sharing this connection.
    fn chain_source(&self) -> Arc<dyn ChainSource>;
}

/// Port to try when the derived full-node port is unreachable on a local
/// test network.
const fn fallback_rpc_port(chain: ChainCode, network: Network) -> Option<u16> {
    match (chain, network) {
        (ChainCode::Brocoin, Network::Regtest) => Some(18871),
        (ChainCode::Brocoin, Network::Signet) => Some(38332),
        (ChainCode::Litecoin, Network::Regtest) => Some(19443),
        _ => None,
    }
}

/// Resolves the RPC address of a full node.
///
/// A host with a port is used as is. Otherwise the port is the chain's RPC
/// port minus two, and on networks with a known alternative that address is
/// probed over TCP, switching to the alternative port when unreachable.
pub async fn resolve_full_node_host(rpc_host: &str, params: &NetworkParams) -> String {
    if rpc_host.contains(':') {
        return rpc_host.to_owned();
    }
    let port = params.rpc_port.saturating_sub(FULL_NODE_PORT_OFFSET);
    probe_or_fallback(
        rpc_host,
        port,
        fallback_rpc_port(params.chain, params.network),
    )
    .await
}

async fn probe_or_fallback(host: &str, port: u16, fallback: Option<u16>) -> String {
    let address = format!("{host}:{port}");
    let Some(fallback) = fallback else {
        return address;
    };
    match tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(&address)).await {
        Ok(Ok(_stream)) => address,
        Ok(Err(err)) => {
            tracing::debug!(%address, %err, fallback, "full node port unreachable");
            format!("{host}:{fallback}")
        }
        Err(_) => {
            tracing::debug!(%address, fallback, "full node port probe timed out");
            format!("{host}:{fallback}")
        }
    }
}

const fn node_name(chain: ChainCode) -> &'static str {
    match chain {
        ChainCode::Brocoin => "brocoind",
        ChainCode::Litecoin => "litecoind",
    }
}

pub(super) async fn build(
    ctx: &BackendContext<'_>,
    cleanup: &mut Cleanup,
) -> Result<BackendParts, Error> {
    let name = node_name(ctx.chain);
    let connector = ctx.connectors.full_node.as_ref().ok_or_else(|| {
        Error::config(format!("node type {name} requires a full node connector"))
    })?;
    let settings = ctx.settings.full_node(ctx.chain);

    let host = resolve_full_node_host(&settings.rpc_host, ctx.params).await;
    let conn_config = FullNodeConnConfig {
        chain: ctx.chain,
        network: ctx.params.network,
        host: host.clone(),
        user: settings.rpc_user.clone(),
        pass: settings.rpc_pass.clone(),
        zmq_block_host: settings.zmq_pub_raw_block.clone(),
        zmq_tx_host: settings.zmq_pub_raw_tx.clone(),
        zmq_read_deadline: ZMQ_READ_DEADLINE,
        pruned_node_max_peers: settings.pruned_node_max_peers,
    };

    let conn = connector.connect(&conn_config).await?;
    // A start that fails partway may leave sessions open; stop releases them.
    cleanup.push(format!("{} {name} connection", ctx.chain), Arc::clone(&conn));
    conn.start()
        .await
        .map_err(|e| Error::connection_with(format!("unable to connect to {name}"), e))?;
    tracing::info!(%host, node = name, "connected to full node");

    let notifier = conn.notifier(Arc::clone(&ctx.hints));
    let view = conn.filtered_view();
    let source = conn.chain_source();

    // Side channel for calls the chain clients do not expose.
    let rpc = Arc::new(JsonRpcClient::new(
        &host,
        &settings.rpc_user,
        &settings.rpc_pass,
    )?);
    let method = health_check_method(&rpc).await?;
    tracing::info!(mode = settings.estimate_mode.as_str(), "full node fee source ready");

    Ok(BackendParts {
        notifier,
        view,
        source,
        probe: Arc::new(RpcCommandProbe::new(Arc::clone(&rpc), method)),
        fee_source: Some(Arc::new(SmartFeeSource::new(rpc, settings.estimate_mode))),
    })
}
