// zwjs-api: Async Rust client for the Z-Wave JS Server WebSocket protocol

pub mod client;
pub mod codec;
pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use client::{Client, ClientConfig, ConnectionState};
pub use codec::{DecodeError, EventMessage, InboundMessage, ResultMessage, VersionInfo};
pub use commands::ValueId;
pub use dispatcher::{EventDispatcher, EventListener};
pub use error::Error;
pub use registry::{CorrelationRegistry, PendingRequest};
