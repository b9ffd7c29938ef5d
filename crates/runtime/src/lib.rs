//! pwire runtime - transport, connection and object registry.
//!
//! This crate provides the protocol/concurrency layer for driving a remote
//! automation engine over its object-graph RPC protocol:
//!
//! - **Transport**: length-prefixed frames over pipes, or WebSocket text frames
//! - **Connection**: request/response correlation and event dispatch
//! - **Object registry**: one [`ChannelOwner`] handle per remote guid
//! - **Promise**: the single-resolution future every wait is built on
//! - **Waiter**: first-of-N event race with deterministic teardown
//! - **Driver**: locating and launching the engine process
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    pwire    │  Typed handles, route chains
//! └──────┬──────┘
//!        │ implements ObjectFactory
//! ┌──────▼──────┐
//! │pwire-runtime│  This crate
//! │  ┌────────┐ │
//! │  │ Conn   │ │  Correlation + dispatch
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Trans  │ │  Pipe/WebSocket transport
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Driver │ │  Process management
//! │  └────────┘ │
//! └─────────────┘
//! ```
//!
//! The `Connection` builds handles through the [`ObjectFactory`] trait, so
//! this crate never depends on the concrete handle types.

pub mod channel;
pub mod channel_owner;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod payload;
pub mod promise;
pub mod server;
pub mod transport;
pub mod waiter;

#[cfg(test)]
mod test_support;

pub use channel::Channel;
pub use channel_owner::{
	ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, adopt, private,
};
pub use connection::{AsyncResult, Connection, ConnectionLike, ObjectFactory, ObjectStore};
pub use driver::{DriverPaths, DriverSource, discover};
pub use error::{Error, Result};
pub use events::{Listener, ListenerId, Publisher};
pub use payload::Payload;
pub use promise::Promise;
pub use server::DriverProcess;
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts,
	TransportReceiver, WebSocketTransport,
};
pub use waiter::Waiter;
