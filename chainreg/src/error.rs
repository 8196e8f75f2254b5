//! Unified error types for chain backend construction and supervision.

use std::fmt;

use thiserror::Error;

use crate::chain::ChainCode;

/// Boxed source error carried by resource and connection failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the chain registry.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory configuration. Never retried.
    #[error("config: {0}")]
    Config(String),

    /// A local resource (certificate file, encoded credential) could not be
    /// read or decoded.
    #[error("resource: {context}: {source}")]
    Resource {
        /// What was being acquired.
        context: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// RPC, websocket or publish/subscribe connection failure.
    #[error("connection: {0}")]
    Connection(String),

    /// A liveness probe reported the backend unhealthy.
    #[error("probe: {0}")]
    Probe(String),

    /// A construction step failed for a specific chain.
    #[error("chain {chain}: {step}: {source}")]
    Construction {
        /// Chain being constructed.
        chain: ChainCode,
        /// Step that failed.
        step: Step,
        /// Underlying failure.
        #[source]
        source: Box<Self>,
    },
}

/// Coarse classification of an [`Error`], independent of context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Config`].
    Config,
    /// See [`Error::Resource`].
    Resource,
    /// See [`Error::Connection`].
    Connection,
    /// See [`Error::Probe`].
    Probe,
}

/// Chain control construction steps, used as error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Selecting the default forwarding policy.
    RoutingPolicy,
    /// Opening the height-hint cache.
    HeightHintCache,
    /// Building the backend-specific clients.
    Backend,
    /// Selecting the fee estimator.
    FeePolicy,
    /// Starting the selected fee estimator.
    FeeEstimatorStart,
    /// Starting the wallet on top of a partial chain control.
    Wallet,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoutingPolicy => "routing policy",
            Self::HeightHintCache => "height hint cache",
            Self::Backend => "backend",
            Self::FeePolicy => "fee policy",
            Self::FeeEstimatorStart => "fee estimator start",
            Self::Wallet => "wallet",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Shorthand for [`Error::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for [`Error::Connection`].
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Connection failure with the underlying error folded into the message.
    pub fn connection_with(msg: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Connection(format!("{msg}: {err}"))
    }

    /// Shorthand for [`Error::Probe`].
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Resource acquisition failure wrapping its source.
    pub fn resource_with(
        context: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Resource {
            context: context.into(),
            source: Box::new(err),
        }
    }

    /// Attaches chain and step context.
    #[must_use]
    pub fn during(self, chain: ChainCode, step: Step) -> Self {
        Self::Construction {
            chain,
            step,
            source: Box::new(self),
        }
    }

    /// Classifies the error, looking through any construction context.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Resource { .. } => ErrorKind::Resource,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Probe(_) => ErrorKind::Probe,
            Self::Construction { source, .. } => source.kind(),
        }
    }

    /// The step a construction error was raised in, if any.
    #[must_use]
    pub const fn step(&self) -> Option<Step> {
        match self {
            Self::Construction { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Attaches construction context to a fallible result.
pub(crate) trait ResultExt<T> {
    fn during(self, chain: ChainCode, step: Step) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn during(self, chain: ChainCode, step: Step) -> Result<T, Error> {
        self.map_err(|e| e.during(chain, step))
    }
}
