//! Message envelopes exchanged with the remote engine.
//!
//! Every frame carries exactly one of:
//! - a [`Request`] (client to engine, always has `id`, `guid` and `method`)
//! - a [`Response`] (engine to client, has `id` and either `result` or `error`)
//! - an [`Event`] (engine to client, no `id`; includes the reserved
//!   lifecycle methods [`CREATE_METHOD`], [`DISPOSE_METHOD`] and [`ADOPT_METHOD`])

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle event announcing a new remote object.
pub const CREATE_METHOD: &str = "__create__";
/// Lifecycle event announcing that a remote object (and its subtree) is gone.
pub const DISPOSE_METHOD: &str = "__dispose__";
/// Lifecycle event moving an existing object under a new parent.
pub const ADOPT_METHOD: &str = "__adopt__";

/// Metadata attached to every request.
///
/// Contains timing information and optional location data for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	#[serde(rename = "wallTime")]
	pub wall_time: i64,
	/// Whether this is an internal call (not user-facing API)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
	/// Source location where the API was called
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<Location>,
	/// Optional title for the operation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

/// Source code location for a protocol call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
	pub file: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column: Option<i32>,
}

impl Metadata {
	/// Creates minimal metadata stamped with the current wall time.
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or_default();
		Self {
			wall_time,
			internal: Some(false),
			location: None,
			title: None,
		}
	}
}

/// Method call sent to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating responses; never reused in a session
	pub id: u64,
	/// GUID of the target object
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	pub method: String,
	/// Method parameters, with object handles encoded as [`ObjectRef`]
	pub params: Value,
	pub metadata: Metadata,
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Response to a previously sent [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u64,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

/// Wrapper for the error payload (`{"error": {"error": {...}}}` on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Error details reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	/// Error type name (e.g., "TimeoutError", "TargetClosedError")
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Out-of-band notification addressed to one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// GUID of the object the event is addressed to
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (no `id` field)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}

/// Parameters of a [`CREATE_METHOD`] event. The event's own `guid` names the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
	/// Remote class tag, e.g. "Page" or "Route"
	#[serde(rename = "type")]
	pub type_name: String,
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	#[serde(default)]
	pub initializer: Value,
}

/// Parameters of a [`DISPOSE_METHOD`] event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisposeParams {
	/// `"gc"` when the engine collected the object rather than closing it
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

/// Parameters of an [`ADOPT_METHOD`] event. The event's own `guid` names the new parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptParams {
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
}

/// Reference to a remote object inside params or results: `{"guid": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
}

impl ObjectRef {
	pub fn new(guid: impl Into<Arc<str>>) -> Self {
		Self { guid: guid.into() }
	}

	/// Returns the referenced guid if `value` has the `{"guid": "..."}` shape.
	pub fn guid_of(value: &Value) -> Option<&str> {
		value.as_object()?.get("guid")?.as_str()
	}
}

/// Parameters of the `initialize` handshake sent to the root object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
	pub sdk_language: String,
}
