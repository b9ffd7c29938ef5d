//! Inbound JSON with object references resolved against the registry.
//!
//! Results and event params arrive as plain JSON in which remote objects are
//! encoded as `{"guid": "..."}`. At dispatch time every such reference whose
//! guid is registered is captured as a live handle, so a consumer can turn the
//! reference back into the object even if it is disposed later.

use std::collections::HashMap;
use std::sync::Arc;

use pwire_protocol::ObjectRef;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

/// JSON value plus a snapshot of the handles it references.
#[derive(Clone, Default)]
pub struct Payload {
	value: Value,
	objects: HashMap<Arc<str>, Arc<dyn ChannelOwner>>,
}

impl Payload {
	/// Wraps a value without resolving any references.
	pub fn new(value: Value) -> Self {
		Self {
			value,
			objects: HashMap::new(),
		}
	}

	/// Walks `value` and captures every `{"guid": ...}` reference that `lookup` knows.
	pub fn resolve<F>(value: Value, lookup: F) -> Self
	where
		F: Fn(&str) -> Option<Arc<dyn ChannelOwner>>,
	{
		let mut objects = HashMap::new();
		collect_refs(&value, &lookup, &mut objects);
		Self { value, objects }
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	pub fn into_value(self) -> Value {
		self.value
	}

	/// Returns `value[key]`, if present.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.value.get(key)
	}

	/// Resolves the handle referenced by `value[key]`.
	pub fn object(&self, key: &str) -> Option<Arc<dyn ChannelOwner>> {
		let guid = ObjectRef::guid_of(self.value.get(key)?)?;
		self.object_by_guid(guid)
	}

	/// Resolves the handle referenced by `value[key]`, failing if it is absent.
	pub fn require_object(&self, key: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.object(key).ok_or_else(|| {
			Error::ProtocolError(format!("expected object reference at '{key}' in {}", self.value))
		})
	}

	pub fn object_by_guid(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.get(guid).cloned()
	}

	/// Iterates over every resolved handle.
	pub fn objects(&self) -> impl Iterator<Item = &Arc<dyn ChannelOwner>> {
		self.objects.values()
	}

	pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
		serde_json::from_value(self.value.clone()).map_err(Into::into)
	}
}

fn collect_refs<F>(
	value: &Value,
	lookup: &F,
	objects: &mut HashMap<Arc<str>, Arc<dyn ChannelOwner>>,
) where
	F: Fn(&str) -> Option<Arc<dyn ChannelOwner>>,
{
	match value {
		Value::Object(map) => {
			if let Some(guid) = ObjectRef::guid_of(value) {
				if let Some(object) = lookup(guid) {
					objects.insert(Arc::from(guid), object);
					return;
				}
			}
			for child in map.values() {
				collect_refs(child, lookup, objects);
			}
		}
		Value::Array(items) => {
			for child in items {
				collect_refs(child, lookup, objects);
			}
		}
		_ => {}
	}
}

impl From<Value> for Payload {
	fn from(value: Value) -> Self {
		Self::new(value)
	}
}

impl std::fmt::Debug for Payload {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut guids: Vec<&str> = self.objects.keys().map(|g| g.as_ref()).collect();
		guids.sort_unstable();
		f.debug_struct("Payload")
			.field("value", &self.value)
			.field("objects", &guids)
			.finish()
	}
}
