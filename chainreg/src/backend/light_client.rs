//! Compact-filter light client (`neutrino`).

use std::sync::Arc;

use url::Url;

use super::{
    BackendContext, BackendParts, BestBlockProbe, ChainNotifier, ChainSource, FilteredChainView,
};
use crate::chain::NetworkParams;
use crate::error::Error;
use crate::hint_cache::HeightHintCache;

/// A running light client that chain clients can be layered on.
pub trait LightClientService: Send + Sync {
    /// Block notifier backed by the light client.
    fn notifier(&self, hints: Arc<HeightHintCache>) -> Arc<dyn ChainNotifier>;

    /// Filtered chain view driven by compact filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter database cannot be opened.
    fn filtered_view(&self) -> Result<Arc<dyn FilteredChainView>, Error>;

    /// Wallet chain source for `params`.
    fn chain_source(&self, params: &'static NetworkParams) -> Arc<dyn ChainSource>;
}

/// Folds the deprecated light-client fee URL into the general one.
///
/// # Errors
///
/// Returns [`Error::Config`] when both are set.
pub fn merge_fee_url(general: Option<Url>, legacy: Option<&Url>) -> Result<Option<Url>, Error> {
    match (general, legacy) {
        (Some(_), Some(_)) => Err(Error::config(
            "feeurl and neutrino.feeurl are mutually exclusive",
        )),
        (None, Some(legacy)) => {
            tracing::warn!(url = %legacy, "neutrino.feeurl is deprecated, use feeurl");
            Ok(Some(legacy.clone()))
        }
        (general, None) => Ok(general),
    }
}

pub(super) fn build(ctx: &mut BackendContext<'_>) -> Result<BackendParts, Error> {
    let client = ctx
        .connectors
        .light_client
        .as_ref()
        .ok_or_else(|| Error::config("node type neutrino requires a running light client"))?;

    let notifier = client.notifier(Arc::clone(&ctx.hints));
    let view = client.filtered_view()?;
    ctx.fee_url = merge_fee_url(ctx.fee_url.take(), ctx.settings.neutrino.fee_url.as_ref())?;
    let source = client.chain_source(ctx.params);

    Ok(BackendParts {
        notifier,
        view,
        probe: Arc::new(BestBlockProbe(Arc::clone(&source))),
        source,
        fee_source: None,
    })
}
