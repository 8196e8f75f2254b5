//! Settlement-chain backend selection and registry for a payment-channel
//! node.
//!
//! For each configured chain this crate picks a backend (light client, full
//! node over JSON-RPC and pub/sub, full node over TLS websockets, or none),
//! builds the clients the node needs from it, chooses a fee estimator, and
//! hands the result back as a chain control. Chain controls are kept in a
//! [`ChainRegistry`] that the rest of the node reads concurrently.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chainreg::{ChainControlConfig, ChainRegistry, PartialChainControl, config};
//!
//! # async fn example() -> Result<(), chainreg::Error> {
//! let settings = config::load_config("config.toml".as_ref())?;
//! let (result, cleanup) =
//!     chainreg::new_partial_chain_control(&ChainControlConfig::new(settings)).await;
//! let partial = match result {
//!     Ok(partial) => partial,
//!     Err(err) => {
//!         cleanup.run().await;
//!         return Err(err);
//!     }
//! };
//! let registry: ChainRegistry<PartialChainControl> = ChainRegistry::new();
//! registry.register_chain(partial.chain, Arc::new(partial));
//! # cleanup.run().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod chain;
pub mod config;
pub mod control;
pub mod error;
pub mod fee;
pub mod hint_cache;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testutil;

pub use control::{
    ChainControl, ChainControlConfig, PartialChainControl, Wallet, new_partial_chain_control,
};
pub use error::{Error, ErrorKind};
pub use registry::ChainRegistry;
pub use service::{Cleanup, Service};
