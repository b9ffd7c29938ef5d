//! Connection - request/response correlation and object-graph dispatch.
//!
//! The connection owns the transport halves, the object registry and the
//! table of in-flight calls. One reader task feeds [`Connection::run`], which
//! classifies every inbound message:
//!
//! - a response (`id`) settles exactly one pending [`Promise`]
//! - `__create__` / `__dispose__` / `__adopt__` mutate the object tree
//! - anything else is a domain event forwarded to the target handle
//!
//! Every inconsistency in the object graph (unknown guid, unmatched response
//! id, unknown remote type) terminates the whole connection: pending calls and
//! parked object waits are rejected and further sends fail locally.

mod object_store;


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use object_store::ObjectStore;
use parking_lot::Mutex;
use pwire_protocol::{
	ADOPT_METHOD, AdoptParams, CREATE_METHOD, CreateParams, DISPOSE_METHOD, DisposeParams,
	ErrorPayload, Event, Message, Metadata, Request, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Notify, mpsc};

use crate::channel_owner::{ChannelOwner, DisposeReason, adopt};
use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::promise::Promise;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Boxed future returned by the object-safe connection traits.
pub type AsyncResult<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The surface of [`Connection`] that handles and channels depend on.
pub trait ConnectionLike: Send + Sync {
	/// Sends a call to the object `guid` and waits for its response.
	fn send_message(&self, guid: &str, method: &str, params: Value) -> AsyncResult<'_, Payload>;

	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>);

	fn unregister_object(&self, guid: &str);

	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>>;

	/// Resolves once `guid` is registered, or fails after `timeout`.
	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> AsyncResult<'_, Arc<dyn ChannelOwner>>;
}

/// Constructs typed handles for `__create__` events.
pub trait ObjectFactory: Send + Sync {
	/// Builds the handle for `type_name`. The connection registers it and
	/// attaches it to `parent` afterwards.
	fn create_object(
		&self,
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn ChannelOwner>>;
}

#[derive(Default)]
struct PendingCalls {
	calls: HashMap<u64, Promise<Payload>>,
	closed: Option<Error>,
}

/// Client side of one protocol session.
pub struct Connection {
	last_id: AtomicU64,
	// `closed` shares the lock with `calls` so a send never registers after close drained the table.
	pending: Mutex<PendingCalls>,
	sender: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
	receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	objects: ObjectStore,
	factory: Option<Arc<dyn ObjectFactory>>,
	closed: Promise<Error>,
	shutdown: Notify,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		Self {
			last_id: AtomicU64::new(0),
			pending: Mutex::new(PendingCalls::default()),
			sender: tokio::sync::Mutex::new(Some(sender)),
			receiver: Mutex::new(Some(receiver)),
			message_rx: Mutex::new(Some(message_rx)),
			objects: ObjectStore::new(),
			factory: None,
			closed: Promise::new(),
			shutdown: Notify::new(),
		}
	}

	/// Installs the type-tag registry used for `__create__`.
	pub fn with_factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
		self.factory = Some(factory);
		self
	}

	/// Allocates an id, registers its promise, then transmits the request.
	///
	/// A synchronous send failure removes the pending entry and rejects it
	/// before returning the error.
	pub async fn send_request(&self, guid: &str, method: &str, params: Value) -> Result<Promise<Payload>> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let params = if params.is_null() {
			Value::Object(Default::default())
		} else {
			params
		};
		let request = Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
			metadata: Metadata::now(),
		};
		let frame = serde_json::to_value(&request)?;

		let promise = Promise::new();
		{
			let mut pending = self.pending.lock();
			if let Some(reason) = &pending.closed {
				return Err(reason.clone());
			}
			pending.calls.insert(id, promise.clone());
		}

		tracing::debug!(id, guid, method, "send");

		let sent = match self.sender.lock().await.as_mut() {
			Some(transport) => transport.send(frame).await,
			None => Err(Error::ChannelClosed),
		};

		if let Err(err) = sent {
			tracing::debug!(id, error = %err, "send failed");
			if let Some(promise) = self.pending.lock().calls.remove(&id) {
				let _ = promise.reject(err.clone());
			}
			return Err(err);
		}

		Ok(promise)
	}

	/// Sends a request and waits for its response.
	pub async fn call(&self, guid: &str, method: &str, params: Value) -> Result<Payload> {
		self.send_request(guid, method, params).await?.wait().await
	}

	/// Sends a request and deserializes the raw result.
	pub async fn call_as<R: DeserializeOwned>(&self, guid: &str, method: &str, params: Value) -> Result<R> {
		self.call(guid, method, params).await?.deserialize()
	}

	/// Routes one inbound message. An `Err` is fatal for the connection.
	pub fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => self.dispatch_response(response),
			Message::Event(event) => self.dispatch_event(event),
			Message::Unknown(value) => {
				tracing::debug!(message = %value, "ignoring unrecognized message");
				Ok(())
			}
		}
	}

	fn dispatch_response(&self, response: Response) -> Result<()> {
		let promise = self
			.pending
			.lock()
			.calls
			.remove(&response.id)
			.ok_or_else(|| {
				Error::ProtocolError(format!("Cannot find command to respond: {}", response.id))
			})?;

		let outcome = match response.error {
			Some(wrapper) => Err(parse_protocol_error(wrapper.error)),
			None => Ok(self.resolve_payload(response.result.unwrap_or(Value::Null))),
		};
		tracing::debug!(id = response.id, ok = outcome.is_ok(), "response");

		if promise.settle(outcome).is_err() {
			tracing::warn!(id = response.id, "response for an already settled call");
		}
		Ok(())
	}

	fn dispatch_event(self: &Arc<Self>, event: Event) -> Result<()> {
		let Event { guid, method, params } = event;

		match method.as_str() {
			CREATE_METHOD => {
				let params: CreateParams = lifecycle_params(&method, params)?;
				let parent = self.objects.try_get(&guid).ok_or_else(|| {
					Error::ProtocolError(format!(
						"Cannot find parent object {guid} to create {}",
						params.guid
					))
				})?;
				if self.objects.contains(&params.guid) {
					return Err(Error::ProtocolError(format!(
						"Object {} is already registered",
						params.guid
					)));
				}
				let factory = self.factory.as_ref().ok_or_else(|| {
					Error::ProtocolError(format!(
						"No object factory installed; cannot create {} {}",
						params.type_name, params.guid
					))
				})?;

				let object = factory.create_object(
					Arc::clone(&parent),
					&params.type_name,
					Arc::clone(&params.guid),
					params.initializer,
				)?;
				self.objects.insert(Arc::clone(&params.guid), Arc::clone(&object));
				parent.add_child(Arc::clone(&params.guid), Arc::clone(&object));
				// A local dispose of the parent may have drained its children
				// between the lookup and the attach.
				if parent.is_disposed() {
					tracing::debug!(parent = %guid, guid = %params.guid, "parent disposed during create");
					object.dispose(DisposeReason::Closed);
					return Ok(());
				}
				tracing::debug!(parent = %guid, guid = %params.guid, type_name = %params.type_name, "created");
				Ok(())
			}
			DISPOSE_METHOD => {
				let params: DisposeParams = lifecycle_params(&method, params)?;
				let object = self.objects.try_get(&guid).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find object to dispose: {guid}"))
				})?;
				let reason = match params.reason.as_deref() {
					Some("gc") => DisposeReason::GarbageCollected,
					_ => DisposeReason::Closed,
				};
				object.dispose(reason);
				Ok(())
			}
			ADOPT_METHOD => {
				let params: AdoptParams = lifecycle_params(&method, params)?;
				let parent = self.objects.try_get(&guid).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find parent object {guid} to adopt {}", params.guid))
				})?;
				let child = self.objects.try_get(&params.guid).ok_or_else(|| {
					Error::ProtocolError(format!("Unknown new child: {}", params.guid))
				})?;
				adopt(&parent, &child);
				Ok(())
			}
			_ => {
				let object = self.objects.try_get(&guid).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find object to emit \"{method}\": {guid}"))
				})?;
				let payload = self.resolve_payload(params);
				tracing::trace!(%guid, %method, "event");
				object.on_event(&method, payload);
				Ok(())
			}
		}
	}

	fn resolve_payload(&self, value: Value) -> Payload {
		Payload::resolve(value, |guid| self.objects.try_get(guid))
	}

	/// Drives the read loop until the transport ends, a protocol violation
	/// occurs, or [`stop`](Self::stop) is called. Returns the close reason.
	pub async fn run(self: &Arc<Self>) -> Error {
		let receiver = self.receiver.lock().take();
		let message_rx = self.message_rx.lock().take();
		let (Some(receiver), Some(mut message_rx)) = (receiver, message_rx) else {
			tracing::warn!("connection is already running");
			return self.wait_closed().await;
		};

		let mut reader = tokio::spawn(receiver.run());

		let reason = loop {
			tokio::select! {
				biased;
				_ = self.shutdown.notified() => {
					reader.abort();
					break self.close_reason().unwrap_or(Error::ChannelClosed);
				}
				next = message_rx.recv() => match next {
					Some(value) => {
						let outcome = serde_json::from_value::<Message>(value)
							.map_err(|e| Error::ProtocolError(format!("malformed message: {e}")))
							.and_then(|message| self.dispatch(message));
						if let Err(err) = outcome {
							tracing::error!(error = %err, "dispatch failed; terminating connection");
							reader.abort();
							break err;
						}
					}
					None => {
						break match (&mut reader).await {
							Ok(Ok(())) => Error::DriverCrashed("transport closed".to_string()),
							Ok(Err(err)) if err.is_protocol_violation() => err,
							Ok(Err(err)) => Error::DriverCrashed(err.to_string()),
							Err(join) => Error::DriverCrashed(format!("reader task failed: {join}")),
						};
					}
				}
			}
		};

		self.close(reason);
		self.close_transport().await;
		self.wait_closed().await
	}

	/// Closes the connection locally. Pending calls fail with [`Error::ChannelClosed`].
	pub async fn stop(&self) {
		self.close(Error::ChannelClosed);
		self.close_transport().await;
	}

	/// Marks the connection closed and rejects everything still waiting.
	///
	/// Only the first call has any effect; returns whether this call closed it.
	fn close(&self, reason: Error) -> bool {
		let calls = {
			let mut pending = self.pending.lock();
			if pending.closed.is_some() {
				return false;
			}
			pending.closed = Some(reason.clone());
			std::mem::take(&mut pending.calls)
		};

		if reason.is_disconnected() {
			tracing::debug!(reason = %reason, pending = calls.len(), "connection closed");
		} else {
			tracing::error!(reason = %reason, pending = calls.len(), "connection closed");
		}

		for (_, promise) in calls {
			let _ = promise.reject(reason.clone());
		}
		self.objects.reject_all(reason.clone());
		let _ = self.closed.fulfill(reason);
		self.shutdown.notify_one();
		true
	}

	async fn close_transport(&self) {
		let transport = self.sender.lock().await.take();
		if let Some(mut transport) = transport {
			if let Err(err) = transport.close().await {
				tracing::debug!(error = %err, "transport close failed");
			}
		}
	}

	/// Resolves with the close reason once the connection has closed.
	pub async fn wait_closed(&self) -> Error {
		match self.closed.wait().await {
			Ok(reason) | Err(reason) => reason,
		}
	}

	pub fn close_reason(&self) -> Option<Error> {
		self.closed.peek().map(|outcome| match outcome {
			Ok(reason) | Err(reason) => reason,
		})
	}

	pub fn is_closed(&self) -> bool {
		self.closed.is_settled()
	}

	/// Returns a promise for `guid`, fulfilled when its `__create__` is dispatched.
	pub fn wait_for_guid(&self, guid: &str) -> Promise<Arc<dyn ChannelOwner>> {
		self.objects.wait_for_guid(guid)
	}

	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}

	pub fn pending_calls(&self) -> usize {
		self.pending.lock().calls.len()
	}
}

impl ConnectionLike for Connection {
	fn send_message(&self, guid: &str, method: &str, params: Value) -> AsyncResult<'_, Payload> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move { self.call(&guid, &method, params).await })
	}

	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) {
		self.objects.insert(guid, object);
	}

	fn unregister_object(&self, guid: &str) {
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

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("objects", &self.objects)
			.field("pending_calls", &self.pending_calls())
			.field("closed", &self.is_closed())
			.finish()
	}
}

fn lifecycle_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
	serde_json::from_value(params)
		.map_err(|e| Error::ProtocolError(format!("malformed {method} params: {e}")))
}

/// Converts an engine error payload into a typed error.
pub(crate) fn parse_protocol_error(error: ErrorPayload) -> Error {
	match error.name.as_deref() {
		Some("TimeoutError") => Error::Timeout(error.message),
		_ => Error::Remote {
			name: error.name.unwrap_or_else(|| "Error".to_string()),
			message: error.message,
			stack: error.stack,
		},
	}
}
