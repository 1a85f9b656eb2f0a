//! Typed event streams fed by bus signals.
//!
//! Each signal kind of a transfer object gets its own [`EventAdapter`] task
//! and its own [`EventStream`]. Order is preserved within one stream; across
//! streams of the same handle nothing is guaranteed.

mod adapter;

use futures_util::stream::{self, Stream};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use zbus::Message;

use crate::error::{Error, Result};

pub use adapter::EventAdapter;

/// Default number of undelivered events buffered per stream.
pub const DEFAULT_BUFFER: usize = 16;

/// Bytes transferred so far out of the expected total.
///
/// `total` is zero until the daemon knows the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub received: u64,
    pub total: u64,
}

impl Progress {
    /// Build a progress report, rejecting `received > total` once `total` is known.
    pub fn new(received: u64, total: u64) -> Result<Self> {
        if total > 0 && received > total {
            return Err(Error::Decode(format!(
                "progress {} exceeds total size {}",
                received, total
            )));
        }
        Ok(Self { received, total })
    }

    /// Completed fraction in `0.0..=1.0`, or `None` while the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.received as f64 / self.total as f64)
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fraction() {
            Some(fraction) => write!(
                f,
                "{}/{} bytes ({:.1}%)",
                self.received,
                self.total,
                fraction * 100.0
            ),
            None => write!(f, "{} bytes", self.received),
        }
    }
}

/// Reason reported by an `error` signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransferFailure(pub String);

/// Decodes one raw signal into an event.
pub trait SignalDecoder<T>: Send + 'static {
    fn decode(&self, msg: &Message) -> Result<T>;
}

impl<T, F> SignalDecoder<T> for F
where
    F: Fn(&Message) -> Result<T> + Send + 'static,
{
    fn decode(&self, msg: &Message) -> Result<T> {
        self(msg)
    }
}

/// `started`, `paused`, `resumed` and `canceled` carry a success flag.
pub fn decode_flag(msg: &Message) -> Result<bool> {
    msg.body()
        .deserialize::<bool>()
        .map_err(|e| Error::Decode(format!("expected a flag: {}", e)))
}

/// `finished` carries the local path of the transferred file.
pub fn decode_path(msg: &Message) -> Result<String> {
    msg.body()
        .deserialize::<String>()
        .map_err(|e| Error::Decode(format!("expected a path: {}", e)))
}

/// `error` carries a human readable reason.
pub fn decode_failure(msg: &Message) -> Result<TransferFailure> {
    msg.body()
        .deserialize::<String>()
        .map(TransferFailure)
        .map_err(|e| Error::Decode(format!("expected an error reason: {}", e)))
}

/// `progress` carries `(received, total)`.
pub fn decode_progress(msg: &Message) -> Result<Progress> {
    let (received, total) = msg
        .body()
        .deserialize::<(u64, u64)>()
        .map_err(|e| Error::Decode(format!("expected (received, total): {}", e)))?;
    Progress::new(received, total)
}

/// Consumer end of one event kind.
///
/// Clones share the same queue, so each event goes to exactly one of them.
/// `recv` returns `None` once the producing adapter has stopped and the
/// buffered events are drained.
pub struct EventStream<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> EventStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next event.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Take an already buffered event without waiting.
    ///
    /// Returns `None` when nothing is buffered or another consumer is
    /// currently waiting on this stream.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Adapt into a `Stream` that ends when the adapter stops.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static {
        stream::unfold(self, |events| async move {
            let next = events.recv().await;
            next.map(|event| (event, events))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal<B>(member: &str, body: &B) -> Message
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        Message::signal("/downloads/1", "com.canonical.applications.Download", member)
            .unwrap()
            .build(body)
            .unwrap()
    }

    #[test]
    fn test_progress_rejects_overflow() {
        assert!(Progress::new(10, 5).is_err());
        assert!(Progress::new(5, 5).is_ok());
        // Unknown size never fails.
        assert!(Progress::new(1024, 0).is_ok());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(Progress::new(0, 0).unwrap().fraction(), None);
        let half = Progress::new(50, 100).unwrap();
        assert!((half.fraction().unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(half.to_string(), "50/100 bytes (50.0%)");
    }

    #[test]
    fn test_decode_flag() {
        assert!(decode_flag(&signal("started", &(true,))).unwrap());
        assert!(decode_flag(&signal("started", &("yes",))).is_err());
    }

    #[test]
    fn test_decode_progress() {
        let progress = decode_progress(&signal("progress", &(10u64, 100u64))).unwrap();
        assert_eq!(progress, Progress { received: 10, total: 100 });

        let err = decode_progress(&signal("progress", &(200u64, 100u64))).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        assert!(decode_progress(&signal("progress", &(10u64,))).is_err());
    }

    #[test]
    fn test_decode_path_and_failure() {
        assert_eq!(
            decode_path(&signal("finished", &("/tmp/f.bin",))).unwrap(),
            "/tmp/f.bin"
        );
        assert_eq!(
            decode_failure(&signal("error", &("hash mismatch",))).unwrap(),
            TransferFailure("hash mismatch".to_string())
        );
    }

    #[tokio::test]
    async fn test_event_stream_clones_share_queue() {
        let (tx, rx) = mpsc::channel(4);
        let events = EventStream::new(rx);
        let other = events.clone();

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(events.recv().await, Some(1));
        assert_eq!(other.recv().await, Some(2));
        assert_eq!(events.recv().await, None);
        assert_eq!(other.try_recv(), None);
    }
}
