//! Data contracts for the FaaS async invocation queue.
//!
//! This crate holds the records exchanged between the gateway, the queue
//! publisher and the queue worker. None of these types perform I/O; the
//! publisher lives in `faasq-client`.

mod function;
mod handler;
mod logs;
mod report;
mod request;

pub use function::{
    DeleteFunctionRequest, FunctionDeployment, FunctionDescription, FunctionResources,
    FunctionStatus, InfoResponse, ProviderVersion, ScaleServiceRequest, Secret,
};
pub use handler::{HandlerContext, HandlerError, HandlerRequest, HandlerResponse, ModuleHandler};
pub use logs::{LogMessage, LogRequest};
pub use report::AsyncReport;
pub use request::{Header, InvocationRequest};

/// Publisher connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Before any connect. A manager never reports this: it exists only once
    /// its first connect has begun, in [`Connecting`](Self::Connecting).
    #[default]
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// A live session is installed.
    Connected,
    /// The session dropped; `attempt` is the 1-based attempt in flight.
    Reconnecting { attempt: u32 },
    /// Every reconnect attempt failed. Terminal for the owning manager.
    ExhaustedRetries,
}

impl ConnectionState {
    /// Whether the manager will never leave this state on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExhaustedRetries)
    }

    /// Whether publishes are expected to reach the backend.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Serde adapters shared by the contract types.
mod serde_util {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Byte fields travel as base64 strings; `null` decodes to empty.
    pub mod base64_bytes {
        use super::*;

        pub fn serialize<T, S>(bytes: &T, s: S) -> Result<S::Ok, S::Error>
        where
            T: AsRef<[u8]>,
            S: Serializer,
        {
            s.serialize_str(&STANDARD.encode(bytes.as_ref()))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(encoded) => STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(serde::de::Error::custom),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Accept `null` wherever the default value is meant.
    pub fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }
}
