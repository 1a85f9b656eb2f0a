//! Remote calls on one object, classified into typed results.
//!
//! Every reply ends up as exactly one of: a decoded value, [`Error::Transport`]
//! (the call never completed), [`Error::Remote`] (the daemon answered with an
//! error reply) or [`Error::Decode`] (the reply did not have the shape the
//! call site asked for). Error replies are never decoded as data.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{DynamicType, OwnedObjectPath, OwnedValue, Type, Value};
use zbus::Message;

use crate::bus::MethodCaller;
use crate::error::{Error, Result};

/// Error name used when an error reply carries none.
const FALLBACK_ERROR_NAME: &str = "org.freedesktop.DBus.Error.Failed";

/// Issues calls on one interface of one remote object.
#[derive(Clone)]
pub struct CallGateway {
    caller: Arc<dyn MethodCaller>,
    service: &'static str,
    interface: &'static str,
    path: OwnedObjectPath,
}

impl CallGateway {
    pub fn new(
        caller: Arc<dyn MethodCaller>,
        service: &'static str,
        interface: &'static str,
        path: OwnedObjectPath,
    ) -> Self {
        Self {
            caller,
            service,
            interface,
            path,
        }
    }

    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Call `method` and return the successful reply undecoded.
    pub async fn invoke<B>(&self, method: &str, args: &B) -> Result<Message>
    where
        B: Serialize + DynamicType + Sync,
    {
        let call = Message::method_call(self.path.as_str(), method)
            .and_then(|builder| builder.destination(self.service))
            .and_then(|builder| builder.interface(self.interface))
            .and_then(|builder| builder.build(args))
            .map_err(|e| Error::InvalidArgument(format!("cannot encode {}: {}", method, e)))?;

        debug!("Calling {}.{} on {}", self.interface, method, self.path.as_str());
        let reply = match self.caller.call(call).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("FAILED: {} on {}: {}", method, self.path.as_str(), e);
                return Err(e);
            }
        };

        classify(reply).inspect_err(|e| {
            warn!("FAILED: {} on {}: {}", method, self.path.as_str(), e);
        })
    }

    /// Call `method` and decode the reply as `R`.
    pub async fn call<B, R>(&self, method: &str, args: &B) -> Result<R>
    where
        B: Serialize + DynamicType + Sync,
        R: DeserializeOwned + Type,
    {
        self.call_with(method, args, decode_body::<R>).await
    }

    /// Call `method` and decode the reply with `decode`.
    pub async fn call_with<B, R, D>(&self, method: &str, args: &B, decode: D) -> Result<R>
    where
        B: Serialize + DynamicType + Sync,
        D: FnOnce(&Message) -> Result<R> + Send,
    {
        let reply = self.invoke(method, args).await?;
        decode(&reply).inspect_err(|e| {
            warn!("FAILED: decoding {} reply: {}", method, e);
        })
    }

    /// Call `method` for its side effect, ignoring any reply body.
    pub async fn call_unit<B>(&self, method: &str, args: &B) -> Result<()>
    where
        B: Serialize + DynamicType + Sync,
    {
        self.invoke(method, args).await.map(|_| ())
    }
}

impl std::fmt::Debug for CallGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGateway")
            .field("service", &self.service)
            .field("interface", &self.interface)
            .field("path", &self.path.as_str())
            .finish()
    }
}

/// Turn an error-tagged reply into [`Error::Remote`].
fn classify(reply: Message) -> Result<Message> {
    if reply.message_type() != MessageType::Error {
        return Ok(reply);
    }

    let name = reply
        .header()
        .error_name()
        .map(|name| name.to_string())
        .unwrap_or_else(|| FALLBACK_ERROR_NAME.to_string());
    let message = reply.body().deserialize::<String>().ok();
    Err(Error::Remote { name, message })
}

/// Decode a reply body as `T`.
pub fn decode_body<T>(reply: &Message) -> Result<T>
where
    T: DeserializeOwned + Type,
{
    reply.body().deserialize::<T>().map_err(|e| {
        Error::Decode(format!(
            "expected {}: {}",
            std::any::type_name::<T>(),
            e
        ))
    })
}

/// Decode a string map that the daemon may send as `a{ss}` or `a{sv}`.
///
/// Variant values must hold strings; anything else is a decode error.
pub fn decode_string_map(reply: &Message) -> Result<HashMap<String, String>> {
    let body = reply.body();
    if let Ok(map) = body.deserialize::<HashMap<String, String>>() {
        return Ok(map);
    }

    let map = body
        .deserialize::<HashMap<String, OwnedValue>>()
        .map_err(|e| Error::Decode(format!("expected a string map: {}", e)))?;

    map.into_iter()
        .map(|(key, value)| match &*value {
            Value::Str(text) => Ok((key, text.to_string())),
            other => Err(Error::Decode(format!(
                "value for '{}' is not a string: {:?}",
                key, other
            ))),
        })
        .collect()
}
