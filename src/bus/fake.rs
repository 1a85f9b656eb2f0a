//! In-process bus double.
//!
//! `FakeBus` implements both capabilities without a daemon. Replies are
//! scripted per method member, calls are recorded, and signals are pushed
//! into whichever subscriptions match the emitting service, interface, path
//! and member. A
//! subscription counts as live until its message sequence is dropped, which
//! mirrors how a real match rule is removed.

use async_trait::async_trait;
use futures_util::stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use zbus::zvariant::{DynamicType, Type};
use zbus::Message;

use super::{MethodCaller, SignalFilter, SignalWatcher, Subscription};
use crate::error::{Error, Result};

#[derive(Clone)]
enum Scripted {
    Reply(Message),
    Disconnected,
}

#[derive(Default)]
struct FakeState {
    replies: HashMap<String, Scripted>,
    calls: Vec<RecordedCall>,
    subscriptions: Vec<(SignalFilter, mpsc::UnboundedSender<Message>)>,
    rejected: HashSet<String>,
}

/// A call observed by [`FakeBus`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub destination: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub message: Message,
}

impl RecordedCall {
    /// Decode the call arguments.
    pub fn args<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Type,
    {
        self.message
            .body()
            .deserialize::<T>()
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Scriptable stand-in for the daemon and the bus.
#[derive(Default)]
pub struct FakeBus {
    state: Mutex<FakeState>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls to `method` with a successful reply carrying `body`.
    pub fn reply<B>(&self, method: &str, body: &B) -> Result<()>
    where
        B: Serialize + DynamicType,
    {
        let call = template_call(method)?;
        let reply = Message::method_return(&call.header())
            .and_then(|builder| builder.build(body))
            .map_err(invalid)?;
        self.script(method, Scripted::Reply(reply));
        Ok(())
    }

    /// Answer calls to `method` with an error reply named `name`.
    pub fn reply_error(&self, method: &str, name: &str, message: &str) -> Result<()> {
        let call = template_call(method)?;
        let reply = Message::error(&call.header(), name)
            .and_then(|builder| builder.build(&(message,)))
            .map_err(invalid)?;
        self.script(method, Scripted::Reply(reply));
        Ok(())
    }

    /// Make calls to `method` fail as if the bus connection dropped.
    pub fn disconnect(&self, method: &str) {
        self.script(method, Scripted::Disconnected);
    }

    /// Refuse to register filters for `member`.
    pub fn reject_subscriptions(&self, member: &str) {
        self.lock().rejected.insert(member.to_string());
    }

    /// Every call seen so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.lock().calls.last().cloned()
    }

    /// Deliver a signal from `origin` to every live subscription whose
    /// filter matches it on all four fields.
    ///
    /// Returns how many subscriptions received it.
    pub fn emit<B>(&self, origin: &SignalFilter, body: &B) -> Result<usize>
    where
        B: Serialize + DynamicType,
    {
        let msg = Message::signal(origin.path(), origin.interface(), origin.member())
            .and_then(|builder| builder.build(body))
            .map_err(invalid)?;

        let state = self.lock();
        let delivered = state
            .subscriptions
            .iter()
            .filter(|(filter, _)| filter == origin)
            .filter(|(_, tx)| tx.send(msg.clone()).is_ok())
            .count();
        Ok(delivered)
    }

    /// End the matching subscriptions from the bus side.
    pub fn end_subscriptions(&self, path: &str, member: &str) {
        self.lock()
            .subscriptions
            .retain(|(filter, _)| !(filter.path() == path && filter.member() == member));
    }

    /// Whether a live subscription exists for `path` and `member`.
    pub fn is_subscribed(&self, path: &str, member: &str) -> bool {
        self.lock().subscriptions.iter().any(|(filter, tx)| {
            filter.path() == path && filter.member() == member && !tx.is_closed()
        })
    }

    /// Filters of all live subscriptions.
    pub fn active_filters(&self) -> Vec<SignalFilter> {
        self.lock()
            .subscriptions
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active_filters().len()
    }

    fn script(&self, method: &str, scripted: Scripted) {
        self.lock().replies.insert(method.to_string(), scripted);
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MethodCaller for FakeBus {
    async fn call(&self, call: Message) -> Result<Message> {
        let scripted = {
            let header = call.header();
            let member = header.member().map(|m| m.to_string());
            let recorded = RecordedCall {
                destination: header.destination().map(|d| d.to_string()),
                path: header.path().map(|p| p.to_string()),
                interface: header.interface().map(|i| i.to_string()),
                member: member.clone(),
                message: call.clone(),
            };

            let mut state = self.lock();
            state.calls.push(recorded);
            member.and_then(|m| state.replies.get(&m).cloned())
        };

        match scripted {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Disconnected) => Err(Error::Transport(zbus::Error::from(
                io::Error::new(io::ErrorKind::NotConnected, "fake bus disconnected"),
            ))),
            None => Message::method_return(&call.header())
                .and_then(|builder| builder.build(&()))
                .map_err(invalid),
        }
    }
}

#[async_trait]
impl SignalWatcher for FakeBus {
    async fn subscribe(&self, filter: &SignalFilter) -> Result<Subscription> {
        let rx = {
            let mut state = self.lock();
            if state.rejected.contains(filter.member()) {
                return Err(Error::Subscription {
                    member: filter.member().to_string(),
                    path: filter.path().to_string(),
                    source: zbus::Error::from(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "match rule rejected",
                    )),
                });
            }
            let (tx, rx) = mpsc::unbounded_channel();
            state.subscriptions.push((filter.clone(), tx));
            rx
        };

        let messages = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Subscription::new(filter.clone(), messages))
    }
}

fn template_call(method: &str) -> Result<Message> {
    Message::method_call("/", method)
        .and_then(|builder| builder.build(&()))
        .map_err(invalid)
}

fn invalid(e: zbus::Error) -> Error {
    Error::InvalidArgument(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn call(method: &str) -> Message {
        Message::method_call("/downloads/1", method)
            .unwrap()
            .destination("com.canonical.applications.Downloader")
            .unwrap()
            .interface("com.canonical.applications.Download")
            .unwrap()
            .build(&(9u64,))
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_calls() {
        let bus = FakeBus::new();
        bus.call(call("setThrottle")).await.unwrap();

        let recorded = bus.last_call().unwrap();
        assert_eq!(recorded.member.as_deref(), Some("setThrottle"));
        assert_eq!(recorded.path.as_deref(), Some("/downloads/1"));
        assert_eq!(
            recorded.interface.as_deref(),
            Some("com.canonical.applications.Download")
        );
        assert_eq!(recorded.args::<u64>().unwrap(), 9);
    }

    #[tokio::test]
    async fn test_scripted_error_reply() {
        let bus = FakeBus::new();
        bus.reply_error("setThrottle", "com.testing.udm", "nope")
            .unwrap();
        let reply = bus.call(call("setThrottle")).await.unwrap();
        assert_eq!(reply.message_type(), zbus::message::Type::Error);
    }

    #[tokio::test]
    async fn test_disconnected_method() {
        let bus = FakeBus::new();
        bus.disconnect("start");
        let err = bus.call(call("start")).await.unwrap_err();
        assert!(err.is_transport());
    }

    fn origin(service: &str, interface: &str, path: &str) -> SignalFilter {
        SignalFilter::new(service, interface, "finished", path)
    }

    #[tokio::test]
    async fn test_emit_reaches_matching_subscription_only() {
        let bus = FakeBus::new();
        let filter = origin("org.example.Transfers", "org.example.Transfer", "/downloads/1");
        let sub = bus.subscribe(&filter).await.unwrap();

        let other_path = origin("org.example.Transfers", "org.example.Transfer", "/downloads/2");
        assert_eq!(bus.emit(&other_path, &("x",)).unwrap(), 0);
        assert_eq!(bus.emit(&filter, &("/tmp/f",)).unwrap(), 1);

        let msg = sub.messages().next().await.unwrap();
        assert_eq!(msg.body().deserialize::<String>().unwrap(), "/tmp/f");
    }

    #[tokio::test]
    async fn test_emit_requires_same_interface_and_service() {
        let bus = FakeBus::new();
        let filter = origin("org.example.Transfers", "org.example.Transfer", "/downloads/1");
        let _sub = bus.subscribe(&filter).await.unwrap();

        let other_interface = origin("org.example.Transfers", "org.example.Upload", "/downloads/1");
        assert_eq!(bus.emit(&other_interface, &("x",)).unwrap(), 0);

        let other_service = origin("org.example.Uploads", "org.example.Transfer", "/downloads/1");
        assert_eq!(bus.emit(&other_service, &("x",)).unwrap(), 0);

        assert_eq!(bus.emit(&filter, &("x",)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscription_goes_away_with_its_sequence() {
        let bus = FakeBus::new();
        let filter = SignalFilter::new(
            "org.example.Transfers",
            "org.example.Transfer",
            "started",
            "/downloads/1",
        );
        let sub = bus.subscribe(&filter).await.unwrap();
        assert!(bus.is_subscribed("/downloads/1", "started"));

        sub.cancel().unwrap();
        assert!(!bus.is_subscribed("/downloads/1", "started"));
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_rejected_subscription() {
        let bus = FakeBus::new();
        bus.reject_subscriptions("progress");
        let filter = SignalFilter::new(
            "org.example.Transfers",
            "org.example.Transfer",
            "progress",
            "/downloads/1",
        );
        let err = bus.subscribe(&filter).await.unwrap_err();
        assert!(matches!(err, Error::Subscription { ref member, .. } if member == "progress"));
        assert_eq!(bus.active_subscriptions(), 0);
    }
}
