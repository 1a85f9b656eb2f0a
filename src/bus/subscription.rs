//! Cancellable signal subscriptions.

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use futures_util::FutureExt;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;
use zbus::Message;

use super::SignalFilter;
use crate::error::Result;

/// A registered signal filter and its inbound messages.
///
/// The message sequence is handed out once by [`messages`](Self::messages).
/// [`cancel`](Self::cancel) terminates it locally without waiting on the
/// daemon; the underlying registration goes away when the sequence is dropped.
pub struct Subscription {
    filter: SignalFilter,
    messages: Mutex<Option<BoxStream<'static, Message>>>,
    cancel_tx: watch::Sender<bool>,
}

impl Subscription {
    /// Wrap an inbound message stream that belongs to `filter`.
    pub fn new<S>(filter: SignalFilter, messages: S) -> Self
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            filter,
            messages: Mutex::new(Some(messages.boxed())),
            cancel_tx,
        }
    }

    pub fn filter(&self) -> &SignalFilter {
        &self.filter
    }

    /// Take the message sequence.
    ///
    /// The sequence ends when the bus stops delivering, or once the
    /// subscription is cancelled and the messages that had already arrived
    /// have been handed out. It cannot be restarted: later calls, or calls
    /// after cancellation, get an empty sequence.
    pub fn messages(&self) -> BoxStream<'static, Message> {
        let taken = self.lock_messages().take();
        match taken {
            Some(messages) => stream::unfold(
                (messages, self.cancellation()),
                |(mut messages, mut cancellation)| async move {
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => {}
                        msg = messages.next() => {
                            return msg.map(|msg| (msg, (messages, cancellation)));
                        }
                    }
                    // Cancelled: only what is already queued, no more waiting.
                    match messages.next().now_or_never() {
                        Some(Some(msg)) => Some((msg, (messages, cancellation))),
                        _ => None,
                    }
                },
            )
            .boxed(),
            None => {
                debug!("Message sequence for {} already taken", self.filter);
                stream::empty().boxed()
            }
        }
    }

    /// Cancel the subscription.
    ///
    /// Only the first call has an effect; later calls return `Ok` without
    /// touching anything.
    pub fn cancel(&self) -> Result<()> {
        if self.cancel_tx.send_replace(true) {
            return Ok(());
        }
        // Not taken yet: drop it now so the registration goes away with it.
        drop(self.lock_messages().take());
        debug!(
            "Cancelled '{}' subscription on {}",
            self.filter.member(),
            self.filter.path()
        );
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// A waiter that resolves once this subscription is cancelled or dropped.
    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            rx: self.cancel_tx.subscribe(),
        }
    }

    fn lock_messages(&self) -> MutexGuard<'_, Option<BoxStream<'static, Message>>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("filter", &self.filter)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Observes cancellation of one [`Subscription`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the subscription is cancelled.
    ///
    /// Also resolves when the subscription itself is dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
