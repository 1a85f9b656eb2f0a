//! Client-side handles for remote transfer objects.
//!
//! A handle owns one object path, one [`CallGateway`] bound to it and one
//! subscription plus [`EventAdapter`] per signal kind. Its lifetime is:
//!
//! ```text
//! constructing ──(all filters registered)──> active ──release()/close()/drop──> released
//!      │
//!      └──(any filter rejected)──> already registered filters cancelled, error returned
//! ```
//!
//! Receiving `finished` or `canceled` does not release a handle; that is up
//! to the owner.

mod download;
mod upload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zbus::zvariant::OwnedObjectPath;

use crate::bus::{MethodCaller, SignalFilter, SignalWatcher, Subscription};
use crate::error::{Error, Result};
use crate::events::{EventAdapter, EventStream, SignalDecoder};
use crate::gateway::CallGateway;
use crate::names::SignalKind;

pub use download::Download;
pub use upload::Upload;

/// State shared by download and upload handles.
pub(crate) struct RemoteObject {
    gateway: CallGateway,
    /// Registered but not yet attached to an adapter.
    pending: Vec<(SignalKind, Arc<Subscription>)>,
    adapters: Vec<EventAdapter>,
    capacity: usize,
    released: AtomicBool,
}

impl RemoteObject {
    /// Register a filter for every kind in `kinds`, in order.
    ///
    /// If one registration fails, the ones already made are cancelled before
    /// the error is returned.
    pub(crate) async fn connect(
        caller: Arc<dyn MethodCaller>,
        watcher: &dyn SignalWatcher,
        service: &'static str,
        interface: &'static str,
        path: OwnedObjectPath,
        kinds: &[SignalKind],
        capacity: usize,
    ) -> Result<Self> {
        let mut pending = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let filter = SignalFilter::new(service, interface, kind.member(), path.as_str());
            match watcher.subscribe(&filter).await {
                Ok(subscription) => pending.push((kind, Arc::new(subscription))),
                Err(e) => {
                    warn!(
                        "Could not connect to '{}' signal on {}: {}",
                        kind,
                        path.as_str(),
                        e
                    );
                    for (registered, subscription) in &pending {
                        if let Err(e) = subscription.cancel() {
                            warn!("Rollback of '{}' subscription failed: {}", registered, e);
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!(
            "Registered {} signal filters on {}",
            pending.len(),
            path.as_str()
        );

        Ok(Self {
            gateway: CallGateway::new(caller, service, interface, path),
            pending,
            adapters: Vec::with_capacity(kinds.len()),
            capacity,
            released: AtomicBool::new(false),
        })
    }

    /// Start forwarding the subscription for `kind` through `decoder`.
    pub(crate) fn attach<T, D>(&mut self, kind: SignalKind, decoder: D) -> Result<EventStream<T>>
    where
        T: Send + 'static,
        D: SignalDecoder<T>,
    {
        let index = self
            .pending
            .iter()
            .position(|(pending_kind, _)| *pending_kind == kind)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "no '{}' subscription on {}",
                    kind,
                    self.gateway.path().as_str()
                ))
            })?;
        let (_, subscription) = self.pending.swap_remove(index);

        let (adapter, events) = EventAdapter::spawn(kind, subscription, decoder, self.capacity);
        self.adapters.push(adapter);
        Ok(events)
    }

    pub(crate) fn gateway(&self) -> &CallGateway {
        &self.gateway
    }

    pub(crate) fn path(&self) -> &OwnedObjectPath {
        self.gateway.path()
    }

    /// Cancel every owned subscription.
    ///
    /// Returns `true` for the call that performed the release and `false`
    /// for every later one.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        for adapter in &self.adapters {
            if let Err(e) = adapter.cancel() {
                warn!("Failed to cancel '{}' subscription: {}", adapter.kind(), e);
            }
        }
        for (kind, subscription) in &self.pending {
            if let Err(e) = subscription.cancel() {
                warn!("Failed to cancel '{}' subscription: {}", kind, e);
            }
        }
        info!("Released transfer {}", self.path().as_str());
        true
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release and wait until every forwarding task has stopped.
    pub(crate) async fn close(&mut self) {
        self.release();
        for adapter in &mut self.adapters {
            adapter.join().await;
        }
    }

    /// Filters of every subscription this object owns.
    pub(crate) fn filters(&self) -> Vec<SignalFilter> {
        self.adapters
            .iter()
            .map(|adapter| adapter.subscription().filter().clone())
            .chain(
                self.pending
                    .iter()
                    .map(|(_, subscription)| subscription.filter().clone()),
            )
            .collect()
    }
}

impl Drop for RemoteObject {
    fn drop(&mut self) {
        if self.release() {
            debug!(
                "Transfer {} released on drop",
                self.gateway.path().as_str()
            );
        }
    }
}
