use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

use super::{FEE_PER_KW_FLOOR, FeeEstimator, SatPerKVByte, SatPerKWeight, check_conf_target};
use crate::error::Error;
use crate::service::Service;

/// How often cached fees are refreshed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body of a sparse confirmation-target fee source.
///
/// Keys are confirmation targets in blocks, values are sat/kvB.
#[derive(Debug, Deserialize)]
struct FeeResponse {
    fee_by_block_target: BTreeMap<String, u64>,
}

type FeeTable = BTreeMap<u32, SatPerKVByte>;

/// Fee estimator that queries an external HTTP fee source.
///
/// With caching enabled `start` loads the table once and a background task
/// refreshes it until `stop`. Without caching every estimate is fetched.
#[derive(Debug)]
pub struct WebApiEstimator {
    url: Url,
    client: reqwest::Client,
    no_cache: bool,
    refresh_interval: Duration,
    cache: Arc<RwLock<Option<FeeTable>>>,
    cancellation_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl WebApiEstimator {
    /// Creates an estimator for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(url: Url, no_cache: bool) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::connection_with("failed to build fee source client", e))?;
        Ok(Self {
            url,
            client,
            no_cache,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cache: Arc::new(RwLock::new(None)),
            cancellation_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        })
    }

    /// Overrides the cache refresh interval.
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// The fee source URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Whether responses are cached between estimates.
    #[must_use]
    pub const fn caches(&self) -> bool {
        !self.no_cache
    }

    async fn table(&self) -> Result<FeeTable, Error> {
        if !self.no_cache {
            let cached = self.cache.read().clone();
            if let Some(table) = cached {
                return Ok(table);
            }
        }
        fetch_fees(&self.client, &self.url).await
    }
}

async fn fetch_fees(client: &reqwest::Client, url: &Url) -> Result<FeeTable, Error> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| Error::connection_with(format!("fee source {url} unreachable"), e))?;
    let body: FeeResponse = response
        .json()
        .await
        .map_err(|e| Error::connection_with(format!("fee source {url} returned bad data"), e))?;

    let table = body
        .fee_by_block_target
        .into_iter()
        .filter_map(|(target, fee)| match target.parse::<u32>() {
            Ok(target) => Some((target, SatPerKVByte(fee))),
            Err(_) => {
                tracing::warn!(%target, "ignoring non-numeric confirmation target");
                None
            }
        })
        .collect::<FeeTable>();
    if table.is_empty() {
        return Err(Error::connection(format!(
            "fee source {url} returned no estimates"
        )));
    }
    Ok(table)
}

/// Fee for `conf_target`, or for the closest lower target present.
fn lookup_fee(table: &FeeTable, conf_target: u32) -> Option<SatPerKVByte> {
    table
        .range(..=conf_target)
        .next_back()
        .map(|(_, fee)| *fee)
}

#[async_trait]
impl Service for WebApiEstimator {
    async fn start(&self) -> Result<(), Error> {
        if self.no_cache {
            tracing::info!(url = %self.url, "web fee estimator started without cache");
            return Ok(());
        }

        let table = fetch_fees(&self.client, &self.url).await?;
        *self.cache.write() = Some(table);

        let client = self.client.clone();
        let url = self.url.clone();
        let cache = Arc::clone(&self.cache);
        let token = self.cancellation_token.clone();
        let interval = self.refresh_interval;
        self.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        match fetch_fees(&client, &url).await {
                            Ok(table) => *cache.write() = Some(table),
                            Err(err) => tracing::warn!(%url, %err, "fee refresh failed, keeping cached fees"),
                        }
                    }
                }
            }
        });
        tracing::info!(url = %self.url, refresh = ?interval, "web fee estimator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        Ok(())
    }
}

#[async_trait]
impl FeeEstimator for WebApiEstimator {
    async fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<SatPerKWeight, Error> {
        check_conf_target(conf_target)?;
        let table = self.table().await?;
        let fee = lookup_fee(&table, conf_target).ok_or_else(|| {
            Error::connection(format!(
                "fee source {} has no estimate at or below {conf_target} blocks",
                self.url
            ))
        })?;
        Ok(fee.fee_per_kw().max(FEE_PER_KW_FLOOR))
    }

    fn relay_fee_per_kw(&self) -> SatPerKWeight {
        FEE_PER_KW_FLOOR
    }
}
