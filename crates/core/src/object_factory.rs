//! Type-tag registry: maps remote class tags to handle constructors.
//!
//! When the engine sends `__create__`, the connection asks the registry for a
//! handle of the announced type. The table is plain data populated up front;
//! callers may add tags before the connection starts.

use std::collections::HashMap;
use std::sync::Arc;

use pwire_runtime::{ChannelOwner, Error, ObjectFactory, Result};
use serde_json::Value;

use crate::objects::{BrowserContext, Page, RemoteObject, Request, Route};

/// Builds a handle under `parent` for the given tag, guid and initializer.
pub type Constructor =
	fn(Arc<dyn ChannelOwner>, &str, Arc<str>, Value) -> Result<Arc<dyn ChannelOwner>>;

/// Remote classes handled by [`RemoteObject`].
pub const GENERIC_TYPES: &[&str] = &[
	"APIRequestContext",
	"Android",
	"AndroidDevice",
	"Artifact",
	"BindingCall",
	"Browser",
	"BrowserType",
	"CDPSession",
	"Dialog",
	"Electron",
	"ElectronApplication",
	"ElementHandle",
	"EventTarget",
	"Frame",
	"JSHandle",
	"JsonPipe",
	"LocalUtils",
	"Playwright",
	"Response",
	"Selectors",
	"SocksSupport",
	"Stream",
	"Tracing",
	"WebSocket",
	"WebSocketRoute",
	"WritableStream",
	"Worker",
];

fn remote_object(
	parent: Arc<dyn ChannelOwner>,
	type_name: &str,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	Ok(Arc::new(RemoteObject::new(parent, type_name, guid, initializer)))
}

fn request(
	parent: Arc<dyn ChannelOwner>,
	type_name: &str,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	Ok(Arc::new(Request::new(parent, type_name, guid, initializer)))
}

fn route(
	parent: Arc<dyn ChannelOwner>,
	type_name: &str,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	Ok(Arc::new(Route::new(parent, type_name, guid, initializer)?))
}

fn page(
	parent: Arc<dyn ChannelOwner>,
	type_name: &str,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	Ok(Page::new(parent, type_name, guid, initializer))
}

fn browser_context(
	parent: Arc<dyn ChannelOwner>,
	type_name: &str,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	Ok(BrowserContext::new(parent, type_name, guid, initializer))
}

/// Maps class tags to constructors. Unknown tags are a protocol violation.
#[derive(Clone)]
pub struct TypeRegistry {
	constructors: HashMap<String, Constructor>,
}

impl Default for TypeRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl TypeRegistry {
	/// Registry with every built-in tag.
	pub fn new() -> Self {
		let mut registry = Self::empty();
		registry
			.register("BrowserContext", browser_context)
			.register("Page", page)
			.register("Request", request)
			.register("Route", route);
		for tag in GENERIC_TYPES {
			registry.register(tag, remote_object);
		}
		registry
	}

	/// Registry that knows no tags.
	pub fn empty() -> Self {
		Self {
			constructors: HashMap::new(),
		}
	}

	/// Adds or replaces the constructor for `tag`.
	pub fn register(&mut self, tag: &str, constructor: Constructor) -> &mut Self {
		self.constructors.insert(tag.to_string(), constructor);
		self
	}

	/// Handles `tag` with a plain [`RemoteObject`].
	pub fn register_generic(&mut self, tag: &str) -> &mut Self {
		self.register(tag, remote_object)
	}

	pub fn contains(&self, tag: &str) -> bool {
		self.constructors.contains_key(tag)
	}

	/// Known tags, sorted.
	pub fn tags(&self) -> Vec<&str> {
		let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
		tags.sort_unstable();
		tags
	}
}

impl ObjectFactory for TypeRegistry {
	fn create_object(
		&self,
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn ChannelOwner>> {
		let constructor = self
			.constructors
			.get(type_name)
			.ok_or_else(|| Error::UnknownObjectType(type_name.to_string()))?;
		constructor(parent, type_name, guid, initializer)
	}
}

impl std::fmt::Debug for TypeRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TypeRegistry")
			.field("tags", &self.constructors.len())
			.finish()
	}
}
