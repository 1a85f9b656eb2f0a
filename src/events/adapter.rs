//! Forwarding task from one subscription to one event stream.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EventStream, SignalDecoder};
use crate::bus::Subscription;
use crate::error::Result;
use crate::names::SignalKind;

/// Forwards decoded signals of one kind into an [`EventStream`].
///
/// The task stops when the subscription ends or is cancelled, or when every
/// consumer is gone. On cancellation, signals that had already arrived are
/// still forwarded as long as the buffer has room. Stopping drops the sender,
/// so consumers see the end of the stream instead of waiting forever. A
/// message that fails to decode is logged and skipped; the following ones
/// are still forwarded.
pub struct EventAdapter {
    kind: SignalKind,
    subscription: Arc<Subscription>,
    task: Option<JoinHandle<()>>,
}

impl EventAdapter {
    /// Start forwarding `subscription` through `decoder`.
    ///
    /// `capacity` bounds how many decoded events wait for a consumer; a full
    /// buffer holds the task back rather than dropping events.
    pub fn spawn<T, D>(
        kind: SignalKind,
        subscription: Arc<Subscription>,
        decoder: D,
        capacity: usize,
    ) -> (Self, EventStream<T>)
    where
        T: Send + 'static,
        D: SignalDecoder<T>,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut messages = subscription.messages();
        let mut cancellation = subscription.cancellation();
        let path = subscription.filter().path().to_string();

        let task = tokio::spawn(async move {
            while let Some(msg) = messages.next().await {
                let event = match decoder.decode(&msg) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Dropping malformed '{}' signal on {}: {}", kind, path, e);
                        continue;
                    }
                };

                tokio::select! {
                    biased;
                    permit = tx.reserve() => match permit {
                        Ok(permit) => permit.send(event),
                        Err(_) => {
                            debug!("No consumers left for '{}' on {}", kind, path);
                            break;
                        }
                    },
                    _ = cancellation.cancelled() => match tx.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!("Buffer for '{}' on {} full after cancellation", kind, path);
                            break;
                        }
                        Err(TrySendError::Closed(_)) => break,
                    },
                }
            }
            debug!("Event adapter for '{}' on {} stopped", kind, path);
        });

        let adapter = Self {
            kind,
            subscription,
            task: Some(task),
        };
        (adapter, EventStream::new(rx))
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Cancel the underlying subscription. Safe to call more than once.
    pub fn cancel(&self) -> Result<()> {
        self.subscription.cancel()
    }

    /// Whether the forwarding task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the forwarding task to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Event adapter for '{}' panicked: {}", self.kind, e);
            }
        }
    }
}

impl std::fmt::Debug for EventAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAdapter")
            .field("kind", &self.kind)
            .field("subscription", &self.subscription)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{FakeBus, SignalFilter, SignalWatcher};
    use crate::events::{decode_flag, decode_progress, Progress};
    use std::time::Duration;

    const PATH: &str = "/downloads/1";

    fn origin(kind: SignalKind) -> SignalFilter {
        SignalFilter::new(
            "com.canonical.applications.Downloader",
            "com.canonical.applications.Download",
            kind.member(),
            PATH,
        )
    }

    async fn subscribe(bus: &FakeBus, kind: SignalKind) -> Arc<Subscription> {
        Arc::new(bus.subscribe(&origin(kind)).await.unwrap())
    }

    #[tokio::test]
    async fn test_forwards_n_events_in_order_then_closes() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Progress).await;
        let (mut adapter, events) =
            EventAdapter::spawn(SignalKind::Progress, sub, decode_progress, 4);

        for n in 1..=10u64 {
            bus.emit(&origin(SignalKind::Progress), &(n * 10, 100u64)).unwrap();
        }
        for n in 1..=10u64 {
            assert_eq!(
                events.recv().await,
                Some(Progress {
                    received: n * 10,
                    total: 100
                })
            );
        }

        adapter.cancel().unwrap();
        let end = tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .unwrap();
        assert_eq!(end, None);
        adapter.join().await;
        assert!(adapter.is_finished());
        assert!(!bus.is_subscribed(PATH, "progress"));
    }

    #[tokio::test]
    async fn test_cancel_before_reading_delivers_queued_events() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Progress).await;
        let (mut adapter, events) =
            EventAdapter::spawn(SignalKind::Progress, sub, decode_progress, 16);

        for n in 1..=5u64 {
            assert_eq!(bus.emit(&origin(SignalKind::Progress), &(n, 5u64)).unwrap(), 1);
        }
        adapter.cancel().unwrap();
        tokio::time::timeout(Duration::from_millis(200), adapter.join())
            .await
            .expect("adapter should stop after draining");

        for n in 1..=5u64 {
            assert_eq!(
                events.recv().await,
                Some(Progress {
                    received: n,
                    total: 5
                })
            );
        }
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_natural_end_closes_stream() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Started).await;
        let (_adapter, events) = EventAdapter::spawn(SignalKind::Started, sub, decode_flag, 1);

        bus.emit(&origin(SignalKind::Started), &(true,)).unwrap();
        bus.end_subscriptions(PATH, "started");

        assert_eq!(events.recv().await, Some(true));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_stop_forwarding() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Progress).await;
        let (_adapter, events) =
            EventAdapter::spawn(SignalKind::Progress, sub, decode_progress, 4);

        bus.emit(&origin(SignalKind::Progress), &("garbage",)).unwrap();
        bus.emit(&origin(SignalKind::Progress), &(500u64, 100u64)).unwrap();
        bus.emit(&origin(SignalKind::Progress), &(50u64, 100u64)).unwrap();

        assert_eq!(
            events.recv().await,
            Some(Progress {
                received: 50,
                total: 100
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_unblocks_adapter_waiting_on_full_buffer() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Started).await;
        let (mut adapter, events) =
            EventAdapter::spawn(SignalKind::Started, sub, decode_flag, 1);

        // Nobody reads: the first event fills the buffer, the second blocks.
        bus.emit(&origin(SignalKind::Started), &(true,)).unwrap();
        bus.emit(&origin(SignalKind::Started), &(false,)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        adapter.cancel().unwrap();
        tokio::time::timeout(Duration::from_millis(200), adapter.join())
            .await
            .expect("adapter should stop after cancellation");

        assert_eq!(events.recv().await, Some(true));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_adapter_stops_when_consumers_are_gone() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Started).await;
        let (mut adapter, events) =
            EventAdapter::spawn(SignalKind::Started, sub, decode_flag, 1);
        drop(events);

        bus.emit(&origin(SignalKind::Started), &(true,)).unwrap();
        tokio::time::timeout(Duration::from_millis(200), adapter.join())
            .await
            .expect("adapter should stop without consumers");
    }

    #[tokio::test]
    async fn test_injected_decoder() {
        let bus = FakeBus::new();
        let sub = subscribe(&bus, SignalKind::Started).await;
        let decoder = |_: &zbus::Message| -> Result<&'static str> { Ok("seen") };
        let (_adapter, events) = EventAdapter::spawn(SignalKind::Started, sub, decoder, 1);

        bus.emit(&origin(SignalKind::Started), &(true,)).unwrap();
        assert_eq!(events.recv().await, Some("seen"));
    }
}
