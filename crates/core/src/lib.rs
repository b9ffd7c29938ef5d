//! pwire: typed handles and network interception on top of `pwire-runtime`.
//!
//! # Example
//!
//! ```ignore
//! use pwire::{Client, ClientConfig, FulfillOptions};
//!
//! #[tokio::main]
//! async fn main() -> pwire::Result<()> {
//!     let client = Client::launch(ClientConfig::from_env()?).await?;
//!     let page: std::sync::Arc<pwire::Page> = client.object_as("page@1")?;
//!
//!     // Newest handler runs first; falling back hands the request to the next one.
//!     page.route("**/*", |route| async move { route.fallback() }).await?;
//!     page.route("**/*.png", |route| async move {
//!         route.fulfill(FulfillOptions::new().status(404)).await
//!     })
//!     .await?;
//!
//!     client.stop().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod handlers;
pub mod object_factory;
pub mod objects;
pub mod routing;

pub use client::Client;
pub use config::ClientConfig;
pub use handlers::{HandlerId, RouteMatcher};
pub use object_factory::{Constructor, TypeRegistry};
pub use objects::{BrowserContext, Page, RemoteObject, Request, Root, Route};
pub use pwire_protocol::{ContinueOverrides, FulfillOptions, HeaderEntry};
pub use pwire_runtime::{ChannelOwner, DriverPaths, Error, Payload, Result, Waiter};
pub use routing::{ChainOutcome, RouteAction, RouteChain, RouteContext};
