use std::sync::Arc;

use pwire_runtime::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, private};
use serde_json::Value;

/// Handle for remote classes with no client-side behavior of their own.
///
/// Calls go through [`ChannelOwner::channel`] and events through
/// [`ChannelOwner::events`].
pub struct RemoteObject {
	base: ChannelOwnerImpl,
}

impl RemoteObject {
	pub fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name.to_string(),
				guid,
				initializer,
			),
		}
	}
}

impl private::Sealed for RemoteObject {}

impl ChannelOwner for RemoteObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.guid())
			.field("type_name", &self.type_name())
			.finish()
	}
}
