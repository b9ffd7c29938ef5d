//! ChannelOwner - Base trait for all remote object handles.
//!
//! Every remote object has exactly one local handle implementing ChannelOwner, which:
//! - Represents the remote object via its GUID
//! - Owns its children, mirroring remote parent/child ownership
//! - Holds a weak back-reference to its parent (never used for reachability)
//! - Re-emits forwarded domain events through its [`Publisher`]
//! - Communicates via its [`Channel`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use pwire_protocol::ObjectRef;
use serde_json::Value;

use crate::channel::Channel;
use crate::connection::ConnectionLike;
use crate::events::Publisher;
use crate::payload::Payload;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `ChannelOwner`.
	pub trait Sealed {}
}

type ChildrenRegistry = HashMap<Arc<str>, Arc<dyn ChannelOwner>>;

/// Reason why an object was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// Object was closed on the remote side or by its parent.
	Closed,
	/// Object was garbage collected by the engine.
	GarbageCollected,
}

/// Parent can be either another ChannelOwner or the root Connection.
pub enum ParentOrConnection {
	Parent(Arc<dyn ChannelOwner>),
	Connection(Arc<dyn ConnectionLike>),
}

/// Base trait for all remote object handles.
///
/// Implementors embed a [`ChannelOwnerImpl`] and expose it through
/// [`base`](Self::base); every other method has a default that delegates to it.
/// Types that react to domain events override [`on_event`](Self::on_event).
pub trait ChannelOwner: private::Sealed + DowncastSync {
	fn base(&self) -> &ChannelOwnerImpl;

	fn guid(&self) -> &str {
		self.base().guid()
	}

	/// Returns the remote class tag (e.g., "Page", "Route").
	fn type_name(&self) -> &str {
		self.base().type_name()
	}

	fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.base().parent()
	}

	fn connection(&self) -> Arc<dyn ConnectionLike> {
		self.base().connection()
	}

	/// Returns the immutable initializer snapshot captured at creation.
	fn initializer(&self) -> &Value {
		self.base().initializer()
	}

	fn channel(&self) -> &Channel {
		self.base().channel()
	}

	fn events(&self) -> &Publisher {
		self.base().events()
	}

	fn children(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.base().children()
	}

	fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
		self.base().add_child(guid, child)
	}

	fn remove_child(&self, guid: &str) {
		self.base().remove_child(guid)
	}

	/// Disposes this object and all its children. Idempotent.
	fn dispose(&self, reason: DisposeReason) {
		self.base().dispose(reason)
	}

	/// Handles a domain event forwarded by the connection.
	fn on_event(&self, method: &str, params: Payload) {
		self.base().on_event(method, params)
	}

	fn is_disposed(&self) -> bool {
		self.base().is_disposed()
	}

	fn was_collected(&self) -> bool {
		self.base().was_collected()
	}

	/// Returns the `{"guid": ...}` reference used to pass this object as a parameter.
	fn to_ref(&self) -> ObjectRef {
		ObjectRef::new(self.guid())
	}
}

impl_downcast!(sync ChannelOwner);

/// Base implementation of ChannelOwner embedded in every handle type.
pub struct ChannelOwnerImpl {
	guid: Arc<str>,
	type_name: String,
	parent: Mutex<Option<Weak<dyn ChannelOwner>>>,
	connection: Arc<dyn ConnectionLike>,
	children: Mutex<ChildrenRegistry>,
	channel: Channel,
	events: Publisher,
	initializer: Value,
	was_collected: AtomicBool,
}

impl ChannelOwnerImpl {
	pub fn new(
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		let (connection, parent_opt) = match parent {
			ParentOrConnection::Parent(p) => {
				let conn = p.connection();
				(conn, Some(Arc::downgrade(&p)))
			}
			ParentOrConnection::Connection(c) => (c, None),
		};

		let channel = Channel::new(Arc::clone(&guid), connection.clone());

		Self {
			guid,
			type_name,
			parent: Mutex::new(parent_opt),
			connection,
			children: Mutex::new(HashMap::new()),
			channel,
			events: Publisher::new(),
			initializer,
			was_collected: AtomicBool::new(false),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.parent.lock().as_ref().and_then(Weak::upgrade)
	}

	pub(crate) fn set_parent(&self, parent: &Arc<dyn ChannelOwner>) {
		*self.parent.lock() = Some(Arc::downgrade(parent));
	}

	pub fn connection(&self) -> Arc<dyn ConnectionLike> {
		self.connection.clone()
	}

	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	pub fn events(&self) -> &Publisher {
		&self.events
	}

	/// Detaches from the parent, unregisters, then disposes every descendant.
	///
	/// Only the first call has any effect.
	pub fn dispose(&self, reason: DisposeReason) {
		if !self.channel.mark_disposed() {
			return;
		}
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}

		if let Some(parent) = self.parent() {
			parent.remove_child(&self.guid);
		}

		self.connection.unregister_object(&self.guid);

		let children: Vec<_> = self.children.lock().drain().map(|(_, c)| c).collect();
		for child in children {
			child.dispose(reason);
		}

		tracing::debug!(guid = %self.guid, type_name = %self.type_name, ?reason, "disposed");
	}

	pub fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
		self.children.lock().insert(guid, child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	pub fn children(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.children.lock().values().cloned().collect()
	}

	/// Re-emits the event to local subscribers.
	pub fn on_event(&self, method: &str, params: Payload) {
		let delivered = self.events.emit(method, &params);
		tracing::trace!(guid = %self.guid, method, delivered, "event");
	}

	pub fn is_disposed(&self) -> bool {
		self.channel.is_disposed()
	}

	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}
}

/// Moves `child` under `new_parent`, detaching it from its previous parent.
pub fn adopt(new_parent: &Arc<dyn ChannelOwner>, child: &Arc<dyn ChannelOwner>) {
	if let Some(old_parent) = child.parent() {
		old_parent.remove_child(child.guid());
	}
	child.base().set_parent(new_parent);
	new_parent.add_child(Arc::from(child.guid()), Arc::clone(child));
}

impl std::fmt::Debug for ChannelOwnerImpl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelOwnerImpl")
			.field("guid", &self.guid)
			.field("type_name", &self.type_name)
			.field("children", &self.children.lock().len())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
