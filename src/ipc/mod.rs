//! Inter-process communication between host and component processes
//!
//! Unix domain sockets, length-delimited frames, bincode messages.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{
    remote_components, ComponentIpcClient, HandshakeAck, RemoteComponent,
    DEFAULT_LIFECYCLE_TIMEOUT,
};
pub use protocol::{ComponentMessage, RequestPayload, ResponsePayload};
pub use server::ComponentServer;
