//! Root object: the implicit parent of every top-level handle.

use std::sync::Arc;
use std::time::Duration;

use pwire_protocol::InitializeParams;
use pwire_runtime::{
	ChannelOwner, ChannelOwnerImpl, ConnectionLike, Error, ParentOrConnection, Result, private,
};
use serde_json::Value;

/// Guid the engine uses for the root object.
pub const ROOT_GUID: &str = "";

/// Remote class tag of the root object.
pub const ROOT_TYPE: &str = "Root";

/// The root of the handle tree. It exists before any `__create__` arrives and
/// is registered under the empty guid.
pub struct Root {
	base: ChannelOwnerImpl,
}

impl Root {
	/// Creates the root and registers it with `connection`.
	pub fn new(connection: Arc<dyn ConnectionLike>) -> Arc<Self> {
		let root = Arc::new(Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Connection(Arc::clone(&connection)),
				ROOT_TYPE.to_string(),
				Arc::from(ROOT_GUID),
				Value::Null,
			),
		});
		connection.register_object(Arc::from(ROOT_GUID), root.clone());
		root
	}

	/// Performs the `initialize` handshake and returns the `playwright` handle.
	///
	/// A zero `timeout` waits indefinitely.
	pub async fn initialize(
		&self,
		sdk_language: &str,
		timeout: Duration,
	) -> Result<Arc<dyn ChannelOwner>> {
		let params = InitializeParams {
			sdk_language: sdk_language.to_string(),
		};
		let call = self.channel().call("initialize", params);
		let result = if timeout.is_zero() {
			call.await?
		} else {
			tokio::time::timeout(timeout, call).await.map_err(|_| {
				Error::Timeout(format!(
					"Timeout {}ms exceeded while initializing",
					timeout.as_millis()
				))
			})??
		};

		let playwright = result.require_object("playwright")?;
		tracing::debug!(guid = playwright.guid(), "initialized");
		Ok(playwright)
	}
}

impl private::Sealed for Root {}

impl ChannelOwner for Root {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for Root {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Root")
			.field("children", &self.children().len())
			.finish()
	}
}
