//! Capabilities backed by a real `zbus` connection.
//!
//! Calls and signal streams both go through [`zbus::Proxy`], so reply
//! correlation, timeouts and tracking of the service's unique owner are
//! handled by zbus itself.

use async_trait::async_trait;
use tracing::{debug, info};
use zbus::connection::Builder;
use zbus::proxy::{self, CacheProperties};
use zbus::zvariant::{OwnedStructure, Structure};
use zbus::{Connection, Message, Proxy};

use super::{MethodCaller, SignalFilter, SignalWatcher, Subscription};
use crate::config::{BusConfig, BusKind};
use crate::error::{Error, Result};

/// Bus access over a shared `zbus` connection.
///
/// Every handle created from one manager shares this connection; nothing
/// here is mutated after construction.
#[derive(Debug, Clone)]
pub struct ZbusBus {
    connection: Connection,
}

impl ZbusBus {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Open the bus selected by `config`.
    ///
    /// An explicit address wins over the bus kind.
    pub async fn open(config: &BusConfig) -> Result<Self> {
        let builder = match (&config.address, config.kind) {
            (Some(address), _) => Builder::address(address.as_str()),
            (None, BusKind::Session) => Builder::session(),
            (None, BusKind::System) => Builder::system(),
        }
        .map_err(Error::Transport)?;

        let connection = builder.build().await.map_err(Error::Transport)?;
        info!(
            "Connected to {} bus as {}",
            config.kind,
            connection
                .unique_name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "<anonymous>".to_string())
        );
        Ok(Self { connection })
    }

    /// Get a reference to the connection for advanced usage.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Proxy for one object; the daemon exports no properties worth caching.
    async fn proxy(
        &self,
        service: &str,
        path: &str,
        interface: &str,
    ) -> zbus::Result<Proxy<'static>> {
        proxy::Builder::<Proxy<'static>>::new(&self.connection)
            .destination(service.to_string())?
            .path(path.to_string())?
            .interface(interface.to_string())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
    }
}

/// Map a zbus failure onto the crate taxonomy.
///
/// Error replies from the daemon become [`Error::Remote`]; everything else
/// means the call never completed.
pub(crate) fn from_zbus(e: zbus::Error) -> Error {
    match e {
        zbus::Error::MethodError(name, message, _) => Error::Remote {
            name: name.to_string(),
            message,
        },
        other => Error::Transport(other),
    }
}

/// Arguments of a built call, re-read as one structure.
///
/// `None` for calls without arguments.
pub(crate) fn call_args(call: &Message) -> Result<Option<Structure<'static>>> {
    let body = call.body();
    if body.is_empty() {
        return Ok(None);
    }
    body.deserialize::<OwnedStructure>()
        .map(|args| Some(args.0))
        .map_err(|e| Error::InvalidArgument(format!("cannot re-encode call arguments: {}", e)))
}

#[async_trait]
impl MethodCaller for ZbusBus {
    async fn call(&self, call: Message) -> Result<Message> {
        let header = call.header();
        let missing = |field: &str| Error::InvalidArgument(format!("method call without {}", field));
        let service = header.destination().ok_or_else(|| missing("destination"))?;
        let path = header.path().ok_or_else(|| missing("path"))?;
        let interface = header.interface().ok_or_else(|| missing("interface"))?;
        let member = header.member().ok_or_else(|| missing("member"))?;

        let proxy = self
            .proxy(service.as_str(), path.as_str(), interface.as_str())
            .await
            .map_err(Error::Transport)?;

        match call_args(&call)? {
            Some(args) => proxy.call_method(member.as_str(), &args).await,
            None => proxy.call_method(member.as_str(), &()).await,
        }
        .map_err(from_zbus)
    }
}

#[async_trait]
impl SignalWatcher for ZbusBus {
    async fn subscribe(&self, filter: &SignalFilter) -> Result<Subscription> {
        let fail = |source: zbus::Error| Error::Subscription {
            member: filter.member().to_string(),
            path: filter.path().to_string(),
            source,
        };

        let proxy = self
            .proxy(filter.service(), filter.path(), filter.interface())
            .await
            .map_err(fail)?;
        let signals = proxy
            .receive_signal(filter.member().to_string())
            .await
            .map_err(fail)?;
        debug!("Registered match rule {}", filter);

        Ok(Subscription::new(filter.clone(), signals))
    }
}
