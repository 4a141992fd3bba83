//! Cloud Synchronization Module
//!
//! Resilient delivery of fatigue telemetry to the fleet collector:
//! - STOMP frames over a WebSocket link
//! - Multi-host connect with exponential backoff
//! - Bounded in-memory queue while connected
//! - Durable JSONL log while offline, replayed on reconnect

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod queue;
pub mod transport;

pub use backoff::Backoff;
pub use config::CloudConfig;
pub use connection::{CloudSync, ConnectionManager, StopSignal};
pub use error::{CloudError, FailureKind};
pub use frame::{Command, Frame};
pub use queue::{ConnectionState, Delivery, DurableQueue, OfflineLog, QueueStats, QUEUE_CAPACITY};
pub use transport::{Connector, Link, WsConnector, WsLink, STOMP_SUBPROTOCOLS};
