//! Start/stop lifecycle shared by backend clients, fee estimators and
//! wallets, and the [`Cleanup`] action that releases them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

/// A long-running component with an explicit lifecycle.
///
/// `stop` must be safe to call on a component that was never started.
#[async_trait]
pub trait Service: Send + Sync {
    /// Starts the component.
    async fn start(&self) -> Result<(), Error>;

    /// Stops the component and releases what `start` acquired.
    async fn stop(&self) -> Result<(), Error>;
}

#[async_trait]
trait StopAction: Send + Sync {
    async fn run(&self) -> Result<(), Error>;
}

struct StopService<S: ?Sized>(Arc<S>);

#[async_trait]
impl<S: Service + ?Sized> StopAction for StopService<S> {
    async fn run(&self) -> Result<(), Error> {
        self.0.stop().await
    }
}

/// Release action returned alongside every construction result.
///
/// Holds the stop actions of everything construction started, in the order
/// they were acquired. [`Cleanup::run`] consumes the value, so each action
/// runs exactly once. An empty cleanup does nothing and is always safe to run.
#[derive(Default)]
#[must_use = "a cleanup action must be run to release started services"]
pub struct Cleanup {
    actions: Vec<(String, Box<dyn StopAction>)>,
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|(label, _)| label))
            .finish()
    }
}

impl Cleanup {
    /// Creates an empty cleanup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` to be stopped when the cleanup runs.
    pub fn push<S>(&mut self, label: impl Into<String>, service: Arc<S>)
    where
        S: Service + ?Sized + 'static,
    {
        self.actions
            .push((label.into(), Box::new(StopService(service))));
    }

    /// Appends all actions of `other`; they run before this cleanup's own.
    pub fn extend(&mut self, other: Self) {
        self.actions.extend(other.actions);
    }

    /// Number of registered stop actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether there is nothing to release.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Stops every registered service, most recently acquired first.
    ///
    /// Failures are logged and do not prevent the remaining stops.
    pub async fn run(self) {
        for (label, action) in self.actions.into_iter().rev() {
            match action.run().await {
                Ok(()) => tracing::debug!(service = %label, "stopped"),
                Err(err) => tracing::error!(service = %label, %err, "failed to stop"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Records start/stop calls, optionally failing them.
    #[derive(Debug, Default)]
    pub(crate) struct CountingService {
        pub(crate) starts: AtomicUsize,
        pub(crate) stops: AtomicUsize,
        pub(crate) fail_start: bool,
        pub(crate) fail_stop: bool,
    }

    #[async_trait]
    impl Service for CountingService {
        async fn start(&self) -> Result<(), Error> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(Error::connection("refused"));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), Error> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(Error::connection("already closed"));
            }
            Ok(())
        }
    }

    struct Ordered {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Service for Ordered {
        async fn start(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), Error> {
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_cleanup_is_a_no_op() {
        let cleanup = Cleanup::new();
        assert!(cleanup.is_empty());
        cleanup.run().await;
    }

    #[tokio::test]
    async fn stops_in_reverse_order_and_survives_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = Arc::new(CountingService {
            fail_stop: true,
            ..CountingService::default()
        });

        let mut cleanup = Cleanup::new();
        cleanup.push(
            "first",
            Arc::new(Ordered {
                name: "first",
                log: Arc::clone(&log),
            }),
        );
        cleanup.push("failing", Arc::clone(&failing));
        cleanup.push(
            "last",
            Arc::new(Ordered {
                name: "last",
                log: Arc::clone(&log),
            }),
        );
        assert_eq!(cleanup.len(), 3);
        cleanup.run().await;

        assert_eq!(*log.lock(), vec!["last", "first"]);
        assert_eq!(failing.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trait_objects_can_be_registered() {
        let service = Arc::new(CountingService::default());
        let as_dyn: Arc<dyn Service> = Arc::clone(&service) as Arc<dyn Service>;
        let mut cleanup = Cleanup::new();
        cleanup.push("dyn", as_dyn);
        cleanup.run().await;
        assert_eq!(service.stops.load(Ordering::SeqCst), 1);
    }
}
