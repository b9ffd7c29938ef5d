//! Request handle: one network request seen by the engine.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pwire_protocol::HeaderEntry;
use pwire_runtime::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, private};
use serde_json::Value;

/// A network request.
///
/// Everything exposed here comes from the initializer snapshot, so reading it
/// never needs a round trip.
pub struct Request {
	base: ChannelOwnerImpl,
	url: String,
	method: String,
}

impl Request {
	pub fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		let url = initializer
			.get("url")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let method = initializer
			.get("method")
			.and_then(Value::as_str)
			.unwrap_or("GET")
			.to_string();

		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name.to_string(),
				guid,
				initializer,
			),
			url,
			method,
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn method(&self) -> &str {
		&self.method
	}

	pub fn resource_type(&self) -> Option<&str> {
		self.initializer().get("resourceType").and_then(Value::as_str)
	}

	pub fn is_navigation_request(&self) -> bool {
		self.initializer()
			.get("isNavigationRequest")
			.and_then(Value::as_bool)
			.unwrap_or(false)
	}

	/// Request headers as sent, in wire order.
	pub fn headers(&self) -> Vec<HeaderEntry> {
		self.initializer()
			.get("headers")
			.cloned()
			.and_then(|headers| serde_json::from_value(headers).ok())
			.unwrap_or_default()
	}

	/// Decoded request body. `None` when there is no body or it is not valid base64.
	pub fn post_data(&self) -> Option<Vec<u8>> {
		let encoded = self.initializer().get("postData")?.as_str()?;
		STANDARD.decode(encoded).ok()
	}
}

impl private::Sealed for Request {}

impl ChannelOwner for Request {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for Request {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Request")
			.field("guid", &self.guid())
			.field("method", &self.method)
			.field("url", &self.url)
			.finish()
	}
}
