//! Full node reached over TLS-secured websocket RPC (`brond`, `ltcd`).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use rustls::{ClientConfig, RootCertStore};

use super::{
    BackendContext, BackendParts, BestBlockProbe, ChainNotifier, ChainSource, FilteredChainView,
};
use crate::chain::{ChainCode, Network};
use crate::config::RpcTlsConfig;
use crate::error::Error;
use crate::fee::FeeRateSource;
use crate::hint_cache::HeightHintCache;

/// Websocket endpoint path on the node's RPC server.
pub const WEBSOCKET_ENDPOINT: &str = "ws";

/// Parameters handed to an [`RpcTlsConnector`].
#[derive(Clone)]
pub struct RpcTlsConnConfig {
    /// Chain the node serves.
    pub chain: ChainCode,
    /// Network the node runs on.
    pub network: Network,
    /// RPC `host:port`.
    pub host: String,
    /// Websocket endpoint path.
    pub endpoint: &'static str,
    /// RPC user.
    pub user: String,
    /// RPC password.
    pub pass: String,
    /// TLS settings trusting the node's certificate.
    pub tls: Arc<ClientConfig>,
}

impl fmt::Debug for RpcTlsConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcTlsConnConfig")
            .field("chain", &self.chain)
            .field("network", &self.network)
            .field("host", &self.host)
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Clients produced by an [`RpcTlsConnector`], all sharing one node.
pub struct RpcTlsClients {
    /// Block notifier.
    pub notifier: Arc<dyn ChainNotifier>,
    /// Filtered chain view.
    pub view: Arc<dyn FilteredChainView>,
    /// Wallet chain source.
    pub source: Arc<dyn ChainSource>,
    /// Fee data from the node, if it offers any.
    pub fee_source: Option<Arc<dyn FeeRateSource>>,
}

/// Creates websocket RPC clients for a TLS full node.
#[async_trait]
pub trait RpcTlsConnector: Send + Sync {
    /// Creates the clients. Nothing is started.
    async fn connect(
        &self,
        config: &RpcTlsConnConfig,
        hints: Arc<HeightHintCache>,
    ) -> Result<RpcTlsClients, Error>;
}

/// Loads the node certificate: hex `raw_rpc_cert` when set, else the file at
/// `rpc_cert`.
///
/// # Errors
///
/// Returns [`Error::Resource`] if the hex is malformed or the file cannot be
/// read.
pub async fn load_rpc_cert(settings: &RpcTlsConfig) -> Result<Vec<u8>, Error> {
    if !settings.raw_rpc_cert.is_empty() {
        return hex::decode(settings.raw_rpc_cert.trim())
            .map_err(|e| Error::resource_with("raw_rpc_cert", e));
    }
    read_cert_file(&settings.rpc_cert).await
}

async fn read_cert_file(path: &Path) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path)
        .await
        .map_err(|e| Error::resource_with(format!("rpc cert '{}'", path.display()), e))
}

/// Builds a TLS client configuration trusting exactly the certificates in
/// `cert`, which may be PEM (one or more blocks) or a single DER certificate.
///
/// # Errors
///
/// Returns [`Error::Resource`] if no usable certificate can be parsed.
pub fn tls_client_config(cert: &[u8]) -> Result<ClientConfig, Error> {
    let certs = if cert.trim_ascii_start().starts_with(b"-----BEGIN") {
        CertificateDer::pem_slice_iter(cert)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::resource_with("rpc cert PEM", e))?
    } else {
        vec![CertificateDer::from(cert.to_vec())]
    };

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| Error::resource_with("rpc cert", e))?;
    }
    if roots.is_empty() {
        return Err(Error::resource_with(
            "rpc cert",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "no certificates found"),
        ));
    }

    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::resource_with("tls protocol versions", e))
        .map(|builder| {
            builder
                .with_root_certificates(roots)
                .with_no_client_auth()
        })
}

pub(super) async fn build(ctx: &BackendContext<'_>) -> Result<BackendParts, Error> {
    let connector = ctx.connectors.rpc_tls.as_ref().ok_or_else(|| {
        Error::config(format!(
            "{} rpc/tls backend requires a websocket rpc connector",
            ctx.chain
        ))
    })?;
    let settings = ctx.settings.rpc_tls(ctx.chain);

    let cert = load_rpc_cert(settings).await?;
    let tls = Arc::new(tls_client_config(&cert)?);

    let host = if settings.rpc_host.contains(':') {
        settings.rpc_host.clone()
    } else {
        format!("{}:{}", settings.rpc_host, ctx.params.rpc_port)
    };
    let config = RpcTlsConnConfig {
        chain: ctx.chain,
        network: ctx.params.network,
        host,
        endpoint: WEBSOCKET_ENDPOINT,
        user: settings.rpc_user.clone(),
        pass: settings.rpc_pass.clone(),
        tls,
    };

    let clients = connector.connect(&config, Arc::clone(&ctx.hints)).await?;
    tracing::info!(host = %config.host, "rpc/tls clients created");

    Ok(BackendParts {
        notifier: clients.notifier,
        view: clients.view,
        probe: Arc::new(BestBlockProbe(Arc::clone(&clients.source))),
        source: clients.source,
        fee_source: clients.fee_source,
    })
}
