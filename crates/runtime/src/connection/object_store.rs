//! Thread-safe object registry with per-GUID waiters.
//!
//! Uses [`DashMap`] for concurrent access from the reader task and caller
//! tasks. A caller waiting for a guid that has been promised but not yet
//! created parks a [`Promise`] keyed by that guid; [`ObjectStore::insert`]
//! fulfills it. [`ObjectStore::wait_for_guid`] re-checks after parking so an
//! insert racing with the park is never lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};
use crate::promise::Promise;

type ObjectWait = Promise<Arc<dyn ChannelOwner>>;

/// Thread-safe registry of protocol objects by GUID.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Arc<dyn ChannelOwner>>,
	waiters: DashMap<Arc<str>, ObjectWait>,
	closed: Mutex<Option<Error>>,
}

impl Default for ObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ObjectStore {
	pub fn new() -> Self {
		Self {
			objects: DashMap::new(),
			waiters: DashMap::new(),
			closed: Mutex::new(None),
		}
	}

	/// Inserts an object and fulfills any parked wait for this GUID.
	pub fn insert(&self, guid: Arc<str>, obj: Arc<dyn ChannelOwner>) {
		self.objects.insert(Arc::clone(&guid), Arc::clone(&obj));
		if let Some((_, wait)) = self.waiters.remove(&guid) {
			let _ = wait.fulfill(obj);
		}
	}

	pub fn remove(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.remove(guid).map(|(_, obj)| obj)
	}

	pub fn contains(&self, guid: &str) -> bool {
		self.objects.contains_key(guid)
	}

	/// Synchronous lookup.
	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.get(guid).map(|r| r.value().clone())
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Snapshot of every registered object.
	pub fn all(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.objects.iter().map(|r| r.value().clone()).collect()
	}

	/// Returns a promise for `guid`, already fulfilled if the object is registered.
	pub fn wait_for_guid(&self, guid: &str) -> ObjectWait {
		if let Some(obj) = self.try_get(guid) {
			return Promise::fulfilled(obj);
		}

		let wait = self
			.waiters
			.entry(Arc::from(guid))
			.or_insert_with(Promise::new)
			.clone();

		// Parked first, then re-checked: an insert in between is observed here.
		if let Some(obj) = self.try_get(guid) {
			let _ = wait.fulfill(obj);
			self.waiters.remove(guid);
		} else if let Some(reason) = self.closed.lock().clone() {
			let _ = wait.reject(reason);
			self.waiters.remove(guid);
		}
		wait
	}

	/// Waits for an object to be registered, with timeout.
	pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn ChannelOwner>> {
		self.wait_for_guid(guid)
			.wait_timeout(timeout)
			.await
			.map_err(|err| match err {
				Error::Timeout(_) => Self::timeout_error(guid, timeout),
				other => other,
			})
	}

	/// Rejects every parked wait, and every later one, with `reason`.
	pub fn reject_all(&self, reason: Error) {
		*self.closed.lock() = Some(reason.clone());
		let parked: Vec<Arc<str>> = self.waiters.iter().map(|r| r.key().clone()).collect();
		for guid in parked {
			if let Some((_, wait)) = self.waiters.remove(&guid) {
				let _ = wait.reject(reason.clone());
			}
		}
	}

	pub fn pending_waits(&self) -> usize {
		self.waiters.len()
	}

	fn timeout_error(guid: &str, timeout: Duration) -> Error {
		let ms = timeout.as_millis();
		match guid.split_once('@').map(|(prefix, _)| prefix) {
			Some(prefix) if !prefix.is_empty() => Error::Timeout(format!(
				"Timeout {ms}ms exceeded waiting for {prefix} object: {guid}"
			)),
			_ => Error::Timeout(format!("Timeout {ms}ms exceeded waiting for object: {guid}")),
		}
	}
}

impl std::fmt::Debug for ObjectStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObjectStore")
			.field("objects", &self.objects.len())
			.field("waiters", &self.waiters.len())
			.finish()
	}
}
