//! Channel - RPC communication proxy for ChannelOwner objects.
//!
//! The Channel provides a typed interface for sending method calls to the
//! engine on behalf of one remote object. Once the owning handle is disposed
//! the channel refuses calls locally, without a round trip.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionLike;
use crate::error::{Error, Result};
use crate::payload::Payload;

/// Channel provides RPC communication for a ChannelOwner.
#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: Arc<dyn ConnectionLike>,
	disposed: Arc<AtomicBool>,
}

impl Channel {
	/// Creates a new Channel for the given object GUID.
	pub fn new(guid: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
		Self {
			guid,
			connection,
			disposed: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Sends a method call and returns the result with object references resolved.
	pub async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<Payload> {
		if self.is_disposed() {
			return Err(Error::ObjectDisposed {
				guid: self.guid.to_string(),
				method: method.to_string(),
			});
		}
		let params_value = serde_json::to_value(params)?;
		self.connection
			.send_message(&self.guid, method, params_value)
			.await
	}

	/// Sends a method call and deserializes the raw result.
	pub async fn send<P: Serialize, R: DeserializeOwned>(
		&self,
		method: &str,
		params: P,
	) -> Result<R> {
		self.call(method, params).await?.deserialize()
	}

	/// Sends a method call with no parameters.
	pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
		self.send(method, Value::Null).await
	}

	/// Sends a method call that returns no result (void).
	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		self.call(method, params).await.map(|_| ())
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// Marks the channel disposed. Returns true only for the first call.
	pub(crate) fn mark_disposed(&self) -> bool {
		!self.disposed.swap(true, Ordering::SeqCst)
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("guid", &self.guid)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
