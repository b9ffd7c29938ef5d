//! Wire types for the pwire protocol.
//!
//! This crate contains the serde-serializable types exchanged with the remote
//! automation engine. These types represent the "protocol layer": the shapes
//! of data as they appear on the wire, one JSON document per frame.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **1:1 with protocol**: Field names follow the engine's camelCase schema
//! - **Stable**: Changes only when the wire protocol changes
//!
//! The dispatch loop, object registry and futures live in `pwire-runtime`.

pub mod message;
pub mod route;

pub use message::*;
pub use route::*;

/// Default timeout in milliseconds for remote operations and waits.
pub const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;
