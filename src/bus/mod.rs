//! Bus capabilities used by the rest of the crate.
//!
//! Handles never talk to `zbus` directly. They go through two narrow
//! capabilities so that the real session bus and the in-process [`FakeBus`]
//! are interchangeable:
//!
//! ```text
//! ┌──────────────┐   MethodCaller    ┌───────────┐
//! │ CallGateway  │──────────────────>│  ZbusBus  │──> session bus ──> daemon
//! └──────────────┘                   │    or     │
//! ┌──────────────┐   SignalWatcher   │  FakeBus  │
//! │ EventAdapter │<──────────────────│           │
//! └──────────────┘                   └───────────┘
//! ```

mod connection;
mod fake;
mod subscription;

use async_trait::async_trait;
use std::fmt;
use zbus::Message;

use crate::error::Result;

pub use connection::ZbusBus;
pub use fake::{FakeBus, RecordedCall};
pub use subscription::{Cancellation, Subscription};

/// Sends method calls and returns the raw reply.
///
/// An error-tagged reply from the daemon is still `Ok`: classifying it is the
/// job of the [`CallGateway`](crate::gateway::CallGateway). Only failures to
/// deliver the call or receive a reply are `Err`.
#[async_trait]
pub trait MethodCaller: Send + Sync {
    async fn call(&self, call: Message) -> Result<Message>;
}

/// Registers signal filters on the bus.
#[async_trait]
pub trait SignalWatcher: Send + Sync {
    /// Register `filter` and return a live subscription.
    ///
    /// A rejected filter is reported here and never yields a partially-live
    /// subscription.
    async fn subscribe(&self, filter: &SignalFilter) -> Result<Subscription>;
}

/// Identifies one signal kind on one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalFilter {
    service: String,
    interface: String,
    member: String,
    path: String,
}

impl SignalFilter {
    pub fn new(
        service: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            interface: interface.into(),
            member: member.into(),
            path: path.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Renders the filter as a D-Bus match rule.
impl fmt::Display for SignalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type='signal',sender='{}',interface='{}',member='{}',path='{}'",
            self.service, self.interface, self.member, self.path
        )
    }
}
