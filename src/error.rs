//! Error taxonomy shared by calls, subscriptions and event decoding.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The bus or the daemon could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[source] zbus::Error),

    /// The daemon answered the call with an error reply.
    #[error("Remote error {name}: {}", .message.as_deref().unwrap_or("no message"))]
    Remote {
        name: String,
        message: Option<String>,
    },

    /// A reply or signal payload did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A signal filter could not be registered on the bus.
    #[error("Failed to subscribe to '{member}' on {path}: {source}")]
    Subscription {
        member: String,
        path: String,
        #[source]
        source: zbus::Error,
    },

    /// A caller-supplied value cannot be encoded for the bus.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the daemon explicitly rejected the call.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote { .. })
    }

    /// Whether the failure happened below the daemon, on the bus itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Symbolic error name reported by the daemon, if any.
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            Error::Remote { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = Error::Remote {
            name: "com.canonical.applications.Download.Error".to_string(),
            message: Some("invalid url".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Remote error com.canonical.applications.Download.Error: invalid url"
        );
        assert!(err.is_remote());
        assert!(!err.is_transport());
        assert_eq!(
            err.remote_name(),
            Some("com.canonical.applications.Download.Error")
        );
    }

    #[test]
    fn test_remote_error_without_message() {
        let err = Error::Remote {
            name: "com.testing.udm".to_string(),
            message: None,
        };
        assert!(err.to_string().ends_with("no message"));
    }

    #[test]
    fn test_transport_error_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::NotConnected, "bus gone");
        let err = Error::Transport(zbus::Error::from(io));
        assert!(err.is_transport());
        assert_eq!(err.remote_name(), None);
    }
}
