//! Route handle: an intercepted request awaiting a local decision.

use std::sync::Arc;

use pwire_protocol::{AbortParams, ContinueOverrides, FulfillOptions, ObjectRef};
use pwire_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result, private};
use serde_json::Value;

use super::Request;

/// Error code sent by [`Route::abort`] when none is given.
pub const DEFAULT_ABORT_CODE: &str = "failed";

/// An intercepted request.
///
/// The initializer references the [`Request`] by guid; it is resolved when the
/// route is created, since the engine always creates the request first.
pub struct Route {
	base: ChannelOwnerImpl,
	request: Arc<Request>,
}

impl Route {
	pub fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Self> {
		let request_guid = initializer
			.get("request")
			.and_then(ObjectRef::guid_of)
			.ok_or_else(|| {
				Error::ProtocolError(format!("Route {guid} has no request reference"))
			})?;
		let request = parent
			.connection()
			.get_object(request_guid)?
			.downcast_arc::<Request>()
			.map_err(|_| {
				Error::ProtocolError(format!(
					"Route {guid} references {request_guid}, which is not a Request"
				))
			})?;

		Ok(Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name.to_string(),
				guid,
				initializer,
			),
			request,
		})
	}

	pub fn request(&self) -> &Arc<Request> {
		&self.request
	}

	pub fn request_url(&self) -> &str {
		self.request.url()
	}

	/// Answers the request with a synthetic response.
	pub async fn fulfill(&self, options: &FulfillOptions) -> Result<()> {
		self.channel()
			.send_no_result("fulfill", options.to_params())
			.await
	}

	/// Fails the request with `error_code` (`"failed"` if `None`).
	pub async fn abort(&self, error_code: Option<&str>) -> Result<()> {
		let params = AbortParams {
			error_code: error_code.unwrap_or(DEFAULT_ABORT_CODE).to_string(),
		};
		self.channel().send_no_result("abort", params).await
	}

	/// Sends the request to the network with optional overrides.
	pub async fn continue_(&self, overrides: &ContinueOverrides) -> Result<()> {
		self.channel()
			.send_no_result("continue", overrides.to_params(false))
			.await
	}

	/// Hands the request back to the engine after every local handler fell back.
	pub async fn continue_fallback(&self) -> Result<()> {
		self.channel()
			.send_no_result("continue", ContinueOverrides::default().to_params(true))
			.await
	}
}

impl private::Sealed for Route {}

impl ChannelOwner for Route {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for Route {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Route")
			.field("guid", &self.guid())
			.field("url", &self.request_url())
			.finish()
	}
}
