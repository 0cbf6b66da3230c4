//! Delivery records and completion tracking
//!
//! Every route selected by a call receives a [`Record`] and an [`Ack`].
//! The call's completion callback runs once, after every ack of that call
//! has been answered, with the failures of all routes collected.

use super::error::{LoggerError, Result};
use super::metrics::DispatchMetrics;
use super::scope::ScopeChain;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Completion callback of a log call
pub type Completion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// One rendered message on its way to one route
#[derive(Debug, Clone)]
pub struct Record {
    /// Output of the route's format
    pub text: String,
    /// Rank of the call; `None` for tag and event dispatch
    pub level: Option<usize>,
    pub level_name: Option<String>,
    pub tag: Option<String>,
    pub route: String,
    /// Resolved language of the route
    pub lang: String,
    /// Variables the text was rendered from
    pub chain: Arc<ScopeChain>,
}

/// Aggregates the acknowledgements of one call
pub(crate) struct FanOut {
    pending: AtomicUsize,
    errors: Mutex<Vec<LoggerError>>,
    callback: Mutex<Option<Completion>>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl FanOut {
    /// Track `count` deliveries; with nothing to wait for the callback runs now
    pub(crate) fn new(
        count: usize,
        callback: Option<Completion>,
        metrics: Option<Arc<DispatchMetrics>>,
    ) -> Arc<Self> {
        let fanout = Arc::new(Self {
            pending: AtomicUsize::new(count),
            errors: Mutex::new(Vec::new()),
            callback: Mutex::new(callback),
            metrics,
        });
        if count == 0 {
            fanout.finish();
        }
        fanout
    }

    fn complete(&self, result: Result<()>) {
        match result {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_delivered();
                }
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failed();
                }
                self.errors.lock().push(err);
            }
        }
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let callback = self.callback.lock().take();
        let errors = std::mem::take(&mut *self.errors.lock());
        if let Some(callback) = callback {
            callback(LoggerError::collapse(errors));
        }
    }
}

/// Completion token of one delivery
///
/// Answer it with [`Ack::ok`], [`Ack::fail`] or [`Ack::complete`]. An ack
/// dropped without an answer reports [`LoggerError::RouteAbandoned`].
pub struct Ack {
    route: String,
    fanout: Option<Arc<FanOut>>,
}

impl Ack {
    pub(crate) fn new(route: impl Into<String>, fanout: Arc<FanOut>) -> Self {
        Self {
            route: route.into(),
            fanout: Some(fanout),
        }
    }

    /// Standalone ack calling `callback` when answered
    pub fn with_callback<F>(route: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self::new(route, FanOut::new(1, Some(Box::new(callback)), None))
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn ok(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, err: LoggerError) {
        self.complete(Err(err));
    }

    pub fn complete(mut self, result: Result<()>) {
        if let Some(fanout) = self.fanout.take() {
            fanout.complete(result);
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.take() {
            fanout.complete(Err(LoggerError::RouteAbandoned {
                route: self.route.clone(),
            }));
        }
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack")
            .field("route", &self.route)
            .field("answered", &self.fanout.is_none())
            .finish()
    }
}
