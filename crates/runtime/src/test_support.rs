//! Handles and connection doubles shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, private};
use crate::connection::{AsyncResult, ConnectionLike, ObjectFactory, ObjectStore};
use crate::error::{Error, Result};
use crate::payload::Payload;

/// Minimal handle type with no behavior of its own.
pub(crate) struct TestObject {
	base: ChannelOwnerImpl,
}

impl private::Sealed for TestObject {}

impl ChannelOwner for TestObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl TestObject {
	/// Creates a parentless handle and registers it.
	pub(crate) fn root<C: ConnectionLike + 'static>(conn: &Arc<C>, guid: &str) -> Arc<Self> {
		let connection: Arc<dyn ConnectionLike> = conn.clone();
		let object = Arc::new(Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Connection(Arc::clone(&connection)),
				"Root".to_string(),
				Arc::from(guid),
				Value::Null,
			),
		});
		connection.register_object(Arc::from(guid), object.clone());
		object
	}

	/// Creates a handle under `parent`, registering and attaching it.
	pub(crate) fn child(parent: &Arc<TestObject>, guid: &str) -> Arc<Self> {
		let parent_dyn: Arc<dyn ChannelOwner> = parent.clone();
		let object = Arc::new(Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(Arc::clone(&parent_dyn)),
				"Test".to_string(),
				Arc::from(guid),
				Value::Null,
			),
		});
		parent_dyn
			.connection()
			.register_object(Arc::from(guid), object.clone());
		parent_dyn.add_child(Arc::from(guid), object.clone());
		object
	}
}

/// Builds a [`TestObject`] for every tag except `"Mystery"`.
pub(crate) struct TestFactory;

impl ObjectFactory for TestFactory {
	fn create_object(
		&self,
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn ChannelOwner>> {
		if type_name == "Mystery" {
			return Err(Error::UnknownObjectType(type_name.to_string()));
		}
		Ok(Arc::new(TestObject {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name.to_string(),
				guid,
				initializer,
			),
		}))
	}
}

/// Connection double that records calls and unregistrations.
#[derive(Default)]
pub(crate) struct RecordingConnection {
	objects: ObjectStore,
	unregistered: Mutex<Vec<String>>,
	sent: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingConnection {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn unregistered(&self) -> Vec<String> {
		self.unregistered.lock().clone()
	}

	pub(crate) fn sent(&self) -> Vec<(String, String, Value)> {
		self.sent.lock().clone()
	}
}

impl ConnectionLike for RecordingConnection {
	fn send_message(&self, guid: &str, method: &str, params: Value) -> AsyncResult<'_, Payload> {
		self.sent
			.lock()
			.push((guid.to_string(), method.to_string(), params));
		Box::pin(async { Ok(Payload::new(json!({}))) })
	}

	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) {
		self.objects.insert(guid, object);
	}

	fn unregister_object(&self, guid: &str) {
		self.unregistered.lock().push(guid.to_string());
		self.objects.remove(guid);
	}

	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.objects.try_get(guid).ok_or_else(|| Error::ObjectNotFound {
			guid: guid.to_string(),
			expected: None,
		})
	}

	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> AsyncResult<'_, Arc<dyn ChannelOwner>> {
		let guid = guid.to_string();
		Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
	}
}
