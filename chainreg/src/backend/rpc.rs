//! Plain JSON-RPC over HTTP POST, as spoken by full nodes on their RPC port.
//!
//! Used for the full-node liveness probe and for `estimatesmartfee`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::LivenessProbe;
use crate::config::EstimateMode;
use crate::error::Error;
use crate::fee::{FeeRateSource, SatPerKVByte};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// First node version (0.15.0) that answers `uptime`.
pub const UPTIME_MIN_VERSION: u64 = 150_000;

/// Base units per coin.
const SATS_PER_COIN: f64 = 100_000_000.0;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Minimal JSON-RPC client with HTTP basic auth.
pub struct JsonRpcClient {
    endpoint: String,
    user: String,
    pass: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Creates a client for `host` (`host:port`, no scheme). No connection
    /// is made until the first request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(host: &str, user: &str, pass: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::connection_with("failed to build rpc client", e))?;
        Ok(Self {
            endpoint: format!("http://{host}/"),
            user: user.to_owned(),
            pass: pass.to_owned(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Sends `method` with positional `params` and returns the `result`
    /// member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] on transport failure, rejected
    /// credentials, an undecodable reply or an error object in the reply.
    pub async fn raw_request(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::connection_with(format!("{method}: rpc request failed"), e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::connection(format!(
                "{method}: rpc credentials rejected"
            )));
        }

        // Nodes report method errors as HTTP 500 with a JSON-RPC error body.
        let reply: RpcResponse = response.json().await.map_err(|e| {
            Error::connection_with(format!("{method}: undecodable rpc reply ({status})"), e)
        })?;
        if let Some(err) = reply.error {
            return Err(Error::connection(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(reply.result)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkInfo {
    version: u64,
    #[serde(default)]
    relayfee: f64,
}

async fn network_info(client: &JsonRpcClient) -> Result<NetworkInfo, Error> {
    let value = client.raw_request("getnetworkinfo", &[]).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::connection_with("getnetworkinfo: unexpected reply", e))
}

/// Picks the cheapest liveness query the node supports: `uptime` from
/// version 0.15.0 on, `getblockchaininfo` before that.
///
/// # Errors
///
/// Returns [`Error::Connection`] if `getnetworkinfo` fails.
pub async fn health_check_method(client: &JsonRpcClient) -> Result<&'static str, Error> {
    let info = network_info(client).await?;
    let method = if info.version >= UPTIME_MIN_VERSION {
        "uptime"
    } else {
        "getblockchaininfo"
    };
    tracing::debug!(version = info.version, method, "selected health check");
    Ok(method)
}

/// Liveness probe issuing one parameterless RPC command.
#[derive(Debug)]
pub struct RpcCommandProbe {
    client: Arc<JsonRpcClient>,
    method: &'static str,
}

impl RpcCommandProbe {
    /// Probe calling `method` on `client`.
    #[must_use]
    pub const fn new(client: Arc<JsonRpcClient>, method: &'static str) -> Self {
        Self { client, method }
    }

    /// The command issued on each check.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }
}

#[async_trait]
impl LivenessProbe for RpcCommandProbe {
    async fn check(&self) -> Result<(), Error> {
        self.client
            .raw_request(self.method, &[])
            .await
            .map(|_| ())
            .map_err(|e| Error::probe(e.to_string()))
    }
}

/// Converts a coin-denominated rate to base units, rejecting nonsense.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coins_to_sats(coins: f64) -> Option<u64> {
    if !coins.is_finite() || coins < 0.0 {
        return None;
    }
    Some((coins * SATS_PER_COIN).round() as u64)
}

#[derive(Debug, Deserialize)]
struct SmartFee {
    #[serde(default)]
    feerate: Option<f64>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Fee data from a full node's `estimatesmartfee` and `getnetworkinfo`.
#[derive(Debug)]
pub struct SmartFeeSource {
    client: Arc<JsonRpcClient>,
    mode: EstimateMode,
}

impl SmartFeeSource {
    /// Source using `mode` for every estimate.
    #[must_use]
    pub const fn new(client: Arc<JsonRpcClient>, mode: EstimateMode) -> Self {
        Self { client, mode }
    }
}

#[async_trait]
impl FeeRateSource for SmartFeeSource {
    async fn estimate_fee(&self, conf_target: u32) -> Result<Option<SatPerKVByte>, Error> {
        let value = self
            .client
            .raw_request(
                "estimatesmartfee",
                &[json!(conf_target), json!(self.mode.as_str())],
            )
            .await?;
        let reply: SmartFee = serde_json::from_value(value)
            .map_err(|e| Error::connection_with("estimatesmartfee: unexpected reply", e))?;
        if !reply.errors.is_empty() {
            tracing::debug!(conf_target, errors = ?reply.errors, "node has no fee estimate");
        }
        Ok(reply.feerate.and_then(coins_to_sats).map(SatPerKVByte))
    }

    async fn min_relay_fee(&self) -> Result<SatPerKVByte, Error> {
        let info = network_info(&self.client).await?;
        coins_to_sats(info.relayfee).map(SatPerKVByte).ok_or_else(|| {
            Error::connection(format!("getnetworkinfo: invalid relay fee {}", info.relayfee))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testutil::{StubRequest, StubResponse, serve};

    fn reply(result: &Value) -> StubResponse {
        StubResponse::ok(json!({"result": result, "error": null, "id": 1}).to_string())
    }

    async fn node(version: u64) -> Arc<JsonRpcClient> {
        let addr = serve(move |req: StubRequest| match req.rpc_method().as_deref() {
            Some("getnetworkinfo") => reply(&json!({"version": version, "relayfee": 0.00001})),
            Some("uptime") => reply(&json!(3600)),
            Some("getblockchaininfo") => reply(&json!({"blocks": 100})),
            Some("estimatesmartfee") => {
                let params: Value = serde_json::from_str(&req.body).unwrap();
                if params["params"][0] == json!(1) {
                    reply(&json!({"errors": ["Insufficient data or no feerate found"], "blocks": 0}))
                } else {
                    reply(&json!({"feerate": 0.0002, "blocks": 2}))
                }
            }
            _ => StubResponse::status(
                500,
                json!({"result": null, "error": {"code": -32601, "message": "Method not found"}, "id": 1})
                    .to_string(),
            ),
        })
        .await;
        Arc::new(JsonRpcClient::new(&addr.to_string(), "user", "pass").unwrap())
    }

    #[tokio::test]
    async fn modern_nodes_are_probed_with_uptime() {
        let client = node(210_000).await;
        assert_eq!(health_check_method(&client).await.unwrap(), "uptime");
    }

    #[tokio::test]
    async fn old_nodes_are_probed_with_blockchain_info() {
        let client = node(140_100).await;
        let method = health_check_method(&client).await.unwrap();
        assert_eq!(method, "getblockchaininfo");
        RpcCommandProbe::new(client, method).check().await.unwrap();
    }

    #[tokio::test]
    async fn rpc_errors_surface_as_connection_errors() {
        let client = node(210_000).await;
        let err = client.raw_request("getrawmempool", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("Method not found"), "{err}");

        let probe = RpcCommandProbe::new(client, "getrawmempool");
        assert_eq!(probe.check().await.unwrap_err().kind(), ErrorKind::Probe);
    }

    #[tokio::test]
    async fn rejected_credentials_are_reported() {
        let addr = serve(|_| StubResponse::status(401, "")).await;
        let client = JsonRpcClient::new(&addr.to_string(), "user", "wrong").unwrap();
        let err = client.raw_request("uptime", &[]).await.unwrap_err();
        assert!(err.to_string().contains("credentials rejected"), "{err}");
    }

    #[tokio::test]
    async fn smart_fee_converts_coin_rates() {
        let source = SmartFeeSource::new(node(210_000).await, EstimateMode::Economical);
        assert_eq!(
            source.estimate_fee(6).await.unwrap(),
            Some(SatPerKVByte(20_000))
        );
        assert_eq!(source.estimate_fee(1).await.unwrap(), None);
        assert_eq!(source.min_relay_fee().await.unwrap(), SatPerKVByte(1_000));
    }

    #[test]
    fn coin_conversion_rejects_invalid_values() {
        assert_eq!(coins_to_sats(0.00025), Some(25_000));
        assert_eq!(coins_to_sats(-1.0), None);
        assert_eq!(coins_to_sats(f64::NAN), None);
    }
}
