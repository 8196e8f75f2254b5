//! Local network stubs and collaborator mocks for tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::backend::{
    BlockEpoch, ChainNotifier, ChainSource, FilteredChainView, FullNodeConnConfig,
    FullNodeConnection, FullNodeConnector, LightClientService, NoChainBackend, OutPoint,
    RpcTlsClients, RpcTlsConnConfig, RpcTlsConnector,
};
use crate::chain::{ChainHash, NetworkParams};
use crate::error::Error;
use crate::fee::{FeeRateSource, SatPerKVByte};
use crate::hint_cache::HeightHintCache;
use crate::service::Service;
use crate::service::tests::CountingService;

/// Self-signed EC certificate for `localhost`.
pub(crate) const TEST_CERT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIBfzCCASWgAwIBAgIUayYACLmFnMwhNyEdrdVh4qLuVr4wCgYIKoZIzj0EAwIw
FDESMBAGA1UEAwwJbG9jYWxob3N0MCAXDTI2MTAxOTA3MTQwN1oYDzIxMjYwOTI1
MDcxNDA3WjAUMRIwEAYDVQQDDAlsb2NhbGhvc3QwWTATBgcqhkjOPQIBBggqhkjO
PQMBBwNCAAT9/D4Syd/vgIgEjLG0SVHeLpWj3YiQNmGc3pBW+YLmcnSSjp+XqNqU
jT3r7fJzdP6ohkmkN2Z9w6c+uoOYmkdoo1MwUTAdBgNVHQ4EFgQUvH/Egnr+vamr
N2nWPd+FnuQ97TAwHwYDVR0jBBgwFoAUvH/Egnr+vamrN2nWPd+FnuQ97TAwDwYD
VR0TAQH/BAUwAwEB/zAKBggqhkjOPQQDAgNIADBFAiEA9uKOxCLeNt78pds2D5fm
Fvw9STogQhjhmunIEwhTDdQCIH4m+iFLsVWnqC//9Xm/twvZzZHt2cYcC/iTzrm5
5Y12
-----END CERTIFICATE-----
";

/// A request as seen by a [`serve`] handler.
#[derive(Debug, Clone)]
pub(crate) struct StubRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) body: String,
}

impl StubRequest {
    /// The JSON-RPC method named in the body, if any.
    pub(crate) fn rpc_method(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        value.get("method")?.as_str().map(str::to_owned)
    }
}

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub(crate) struct StubResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

impl StubResponse {
    pub(crate) fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub(crate) fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

type Handler = Arc<dyn Fn(StubRequest) -> StubResponse + Send + Sync>;

/// Serves HTTP/1.1 on an ephemeral localhost port until the runtime exits.
pub(crate) async fn serve<F>(handler: F) -> SocketAddr
where
    F: Fn(StubRequest) -> StubResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler: Handler = Arc::new(handler);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let _ = handle_connection(stream, handler).await;
            });
        }
    });
    addr
}

async fn handle_connection(stream: TcpStream, handler: Handler) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_owned();
        let path = parts.next().unwrap_or_default().to_owned();

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        let response = handler(StubRequest {
            method,
            path,
            body: String::from_utf8_lossy(&body).into_owned(),
        });

        let reply = format!(
            "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            response.status,
            response.body.len(),
            response.body
        );
        let stream = reader.get_mut();
        stream.write_all(reply.as_bytes()).await?;
        stream.flush().await?;
    }
}

/// Binds and immediately releases a localhost port, returning its address.
///
/// Nothing listens there afterwards, so connections are refused.
pub(crate) async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Chain source answering from memory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MockSource {
    fail: bool,
}

impl MockSource {
    pub(crate) const fn healthy() -> Self {
        Self { fail: false }
    }

    pub(crate) const fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl ChainSource for MockSource {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn best_block(&self) -> Result<BlockEpoch, Error> {
        if self.fail {
            return Err(Error::connection("backend went away"));
        }
        Ok(BlockEpoch {
            hash: ChainHash::from_bytes([0xab; 32]),
            height: 800_000,
        })
    }

    async fn send_raw_transaction(&self, _tx: &[u8]) -> Result<ChainHash, Error> {
        Ok(ChainHash::from_bytes([0xcd; 32]))
    }

    async fn rescan(&self, _start: ChainHash, _outpoints: &[OutPoint]) -> Result<(), Error> {
        Ok(())
    }
}

/// Fixed answers standing in for a backend's fee data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MockFeeSource {
    pub(crate) estimate: Option<SatPerKVByte>,
    pub(crate) relay: SatPerKVByte,
}

#[async_trait]
impl FeeRateSource for MockFeeSource {
    async fn estimate_fee(&self, _conf_target: u32) -> Result<Option<SatPerKVByte>, Error> {
        Ok(self.estimate)
    }

    async fn min_relay_fee(&self) -> Result<SatPerKVByte, Error> {
        Ok(self.relay)
    }
}

/// Light client handing out inert clients.
#[derive(Debug, Default)]
pub(crate) struct MockLightClient {
    pub(crate) hints_given: AtomicBool,
}

impl LightClientService for MockLightClient {
    fn notifier(&self, _hints: Arc<HeightHintCache>) -> Arc<dyn ChainNotifier> {
        self.hints_given.store(true, Ordering::SeqCst);
        Arc::new(NoChainBackend::new())
    }

    fn filtered_view(&self) -> Result<Arc<dyn FilteredChainView>, Error> {
        Ok(Arc::new(NoChainBackend::new()))
    }

    fn chain_source(&self, _params: &'static NetworkParams) -> Arc<dyn ChainSource> {
        Arc::new(MockSource::healthy())
    }
}

/// Full-node connection counting its lifecycle calls.
#[derive(Debug, Default)]
pub(crate) struct MockFullNodeConnection {
    pub(crate) lifecycle: CountingService,
    pub(crate) hints_given: AtomicBool,
}

impl MockFullNodeConnection {
    pub(crate) fn failing_start() -> Self {
        Self {
            lifecycle: CountingService {
                fail_start: true,
                ..CountingService::default()
            },
            ..Self::default()
        }
    }
}

#[async_trait]
impl Service for MockFullNodeConnection {
    async fn start(&self) -> Result<(), Error> {
        self.lifecycle.start().await
    }

    async fn stop(&self) -> Result<(), Error> {
        self.lifecycle.stop().await
    }
}

impl FullNodeConnection for MockFullNodeConnection {
    fn notifier(&self, _hints: Arc<HeightHintCache>) -> Arc<dyn ChainNotifier> {
        self.hints_given.store(true, Ordering::SeqCst);
        Arc::new(NoChainBackend::new())
    }

    fn filtered_view(&self) -> Arc<dyn FilteredChainView> {
        Arc::new(NoChainBackend::new())
    }

    fn chain_source(&self) -> Arc<dyn ChainSource> {
        Arc::new(MockSource::healthy())
    }
}

/// Connector returning one shared [`MockFullNodeConnection`].
#[derive(Debug, Default)]
pub(crate) struct MockFullNodeConnector {
    pub(crate) connection: Arc<MockFullNodeConnection>,
    pub(crate) seen: Mutex<Option<FullNodeConnConfig>>,
}

impl MockFullNodeConnector {
    pub(crate) fn with_connection(connection: MockFullNodeConnection) -> Self {
        Self {
            connection: Arc::new(connection),
            seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FullNodeConnector for MockFullNodeConnector {
    async fn connect(
        &self,
        config: &FullNodeConnConfig,
    ) -> Result<Arc<dyn FullNodeConnection>, Error> {
        *self.seen.lock() = Some(config.clone());
        Ok(Arc::clone(&self.connection) as Arc<dyn FullNodeConnection>)
    }
}

/// Websocket RPC connector recording what it was asked for.
#[derive(Debug, Default)]
pub(crate) struct MockRpcTlsConnector {
    pub(crate) seen: Mutex<Option<RpcTlsConnConfig>>,
}

#[async_trait]
impl RpcTlsConnector for MockRpcTlsConnector {
    async fn connect(
        &self,
        config: &RpcTlsConnConfig,
        _hints: Arc<HeightHintCache>,
    ) -> Result<RpcTlsClients, Error> {
        *self.seen.lock() = Some(config.clone());
        let backend = Arc::new(NoChainBackend::new());
        Ok(RpcTlsClients {
            notifier: Arc::clone(&backend) as Arc<dyn ChainNotifier>,
            view: backend,
            source: Arc::new(MockSource::healthy()),
            fee_source: Some(Arc::new(MockFeeSource {
                estimate: Some(SatPerKVByte(40_000)),
                relay: SatPerKVByte(1_000),
            })),
        })
    }
}
