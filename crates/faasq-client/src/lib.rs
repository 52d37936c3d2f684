//! Client-side publisher for asynchronous function invocations.
//!
//! [`QueuePublisher`] serializes [`InvocationRequest`]s and publishes them to
//! a messaging backend through a [`ConnectionManager`], which keeps one live
//! session and reconnects on its own when that session drops.
//!
//! ```ignore
//! use faasq_client::{NatsBackend, QueueConfig, QueuePublisher};
//! use faasq_core::InvocationRequest;
//!
//! let config = QueueConfig::from_env()?;
//! let publisher = QueuePublisher::connect(config, NatsBackend::new()).await?;
//! publisher.queue(&InvocationRequest::new("figlet", "hello")).await?;
//! ```

mod config;
mod error;
mod manager;
pub mod memory;
mod nats;
mod proto;
mod publisher;
mod transport;

pub use config::{
    DEFAULT_MAX_RECONNECT, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY, DEFAULT_TOPIC, QueueConfig,
};
pub use error::{QueueError, Result};
pub use manager::ConnectionManager;
pub use nats::{NatsBackend, NatsSession};
pub use proto::{ProtocolError, validate_subject};
pub use publisher::QueuePublisher;
pub use transport::{Backend, DisconnectNotice, DisconnectSender, Established, Session};

pub use faasq_core::{AsyncReport, ConnectionState, InvocationRequest};
