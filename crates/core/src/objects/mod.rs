//! Typed handles for the remote classes the client gives behavior to.

mod browser_context;
mod network;
mod page;
mod remote;
mod request;
mod root;
mod route;

pub use browser_context::BrowserContext;
pub use page::Page;
pub use remote::RemoteObject;
pub use request::Request;
pub use root::{ROOT_GUID, ROOT_TYPE, Root};
pub use route::{DEFAULT_ABORT_CODE, Route};
