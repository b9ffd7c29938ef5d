//! Waiter - first-of-N event race settled into one [`Promise`].
//!
//! A waiter subscribes to any number of events on any number of
//! [`Publisher`]s, plus an optional deadline. The first trigger to fire
//! settles the shared promise; right after, every subscription is removed,
//! including those on emitters that never fired, and the deadline task is
//! aborted.
//!
//! Dropping every clone of a pending waiter rejects its [`Waiter::result`]
//! with [`Error::Cancelled`].
//!
//! Settlement is idempotent: a trigger firing after the race was decided is
//! a no-op, which is what makes a listener racing the timeout safe without a
//! lock spanning both paths.
//!
//! # Example
//!
//! ```ignore
//! let request = Waiter::new()
//!     .wait_for_event_with(page.events(), "request", |p| p.get("url").is_some())
//!     .fail_on_event(page.events(), "close", Error::TargetClosed { .. })
//!     .fail_on_timeout(Duration::from_secs(30), "waiting for request")
//!     .wait()
//!     .await?;
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::events::{ListenerId, Publisher};
use crate::payload::Payload;
use crate::promise::Promise;

struct Subscription {
	emitter: Publisher,
	event: String,
	id: ListenerId,
}

struct Inner<T> {
	result: Promise<T>,
	subscriptions: Mutex<Vec<Subscription>>,
	timeout: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Inner<T> {
	fn teardown(&self) {
		let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
		for sub in subscriptions {
			sub.emitter.off(&sub.event, sub.id);
		}
		if let Some(task) = self.timeout.lock().take() {
			task.abort();
		}
	}
}

impl<T: Clone + Send + 'static> Inner<T> {
	fn settle(&self, outcome: Result<T>) -> bool {
		let won = self.result.settle(outcome).is_ok();
		if won {
			self.teardown();
		}
		won
	}

	fn track(&self, emitter: &Publisher, event: &str, id: ListenerId) {
		self.subscriptions.lock().push(Subscription {
			emitter: emitter.clone(),
			event: event.to_string(),
			id,
		});
		// A trigger may have settled the race before this subscription was tracked.
		if self.result.is_settled() {
			self.teardown();
		}
	}
}

impl<T> Drop for Inner<T> {
	fn drop(&mut self) {
		self.teardown();
		// Listeners and the deadline only hold weak references, so nothing can
		// settle the result after this point.
		let _ = self
			.result
			.reject(Error::Cancelled("waiter dropped before it settled".to_string()));
	}
}

/// Composite wait that settles on whichever trigger fires first.
pub struct Waiter<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for Waiter<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Clone + Send + Sync + 'static> Default for Waiter<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone + Send + Sync + 'static> Waiter<T> {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				result: Promise::new(),
				subscriptions: Mutex::new(Vec::new()),
				timeout: Mutex::new(None),
			}),
		}
	}

	fn weak(&self) -> Weak<Inner<T>> {
		Arc::downgrade(&self.inner)
	}

	/// Fulfills with `map(payload)` on the first `event` for which it returns `Some`.
	pub fn wait_for_event_map<F>(self, emitter: &Publisher, event: &str, map: F) -> Self
	where
		F: Fn(&Payload) -> Option<T> + Send + Sync + 'static,
	{
		let weak = self.weak();
		let id = emitter.on(event, move |payload| {
			let Some(inner) = weak.upgrade() else { return };
			if let Some(value) = map(payload) {
				inner.settle(Ok(value));
			}
		});
		self.inner.track(emitter, event, id);
		self
	}

	/// Rejects with `error(payload)` on the first `event` for which it returns `Some`.
	pub fn fail_on<F>(self, emitter: &Publisher, event: &str, error: F) -> Self
	where
		F: Fn(&Payload) -> Option<Error> + Send + Sync + 'static,
	{
		let weak = self.weak();
		let id = emitter.on(event, move |payload| {
			let Some(inner) = weak.upgrade() else { return };
			if let Some(err) = error(payload) {
				inner.settle(Err(err));
			}
		});
		self.inner.track(emitter, event, id);
		self
	}

	/// Rejects with a fixed error whenever `event` fires.
	pub fn fail_on_event(self, emitter: &Publisher, event: &str, error: Error) -> Self {
		self.fail_on(emitter, event, move |_| Some(error.clone()))
	}

	/// Rejects with [`Error::Timeout`] unless settled within `timeout`.
	///
	/// A zero duration means no deadline. Requires a tokio runtime; outside
	/// one the deadline is skipped with a warning.
	pub fn fail_on_timeout(self, timeout: Duration, message: impl Into<String>) -> Self {
		if timeout.is_zero() {
			return self;
		}
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			tracing::warn!("no tokio runtime; waiter deadline ignored");
			return self;
		};

		let weak = self.weak();
		let message = format!("Timeout {}ms exceeded while {}", timeout.as_millis(), message.into());
		let task = handle.spawn(async move {
			tokio::time::sleep(timeout).await;
			if let Some(inner) = weak.upgrade() {
				inner.settle(Err(Error::Timeout(message)));
			}
		});

		let previous = self.inner.timeout.lock().replace(task);
		if let Some(previous) = previous {
			previous.abort();
		}
		if self.inner.result.is_settled() {
			self.inner.teardown();
		}
		self
	}

	/// Settles with `value` if still pending. Returns whether this call won.
	pub fn fulfill(&self, value: T) -> bool {
		self.inner.settle(Ok(value))
	}

	/// Settles with `error` if still pending. Returns whether this call won.
	pub fn reject(&self, error: Error) -> bool {
		self.inner.settle(Err(error))
	}

	pub fn result(&self) -> Promise<T> {
		self.inner.result.clone()
	}

	pub fn is_settled(&self) -> bool {
		self.inner.result.is_settled()
	}

	pub async fn wait(&self) -> Result<T> {
		self.inner.result.wait().await
	}

	/// Number of event subscriptions still registered.
	pub fn listener_count(&self) -> usize {
		self.inner.subscriptions.lock().len()
	}
}

impl Waiter<Payload> {
	/// Fulfills with the payload of the first `event`.
	pub fn wait_for_event(self, emitter: &Publisher, event: &str) -> Self {
		self.wait_for_event_map(emitter, event, |p| Some(p.clone()))
	}

	/// Fulfills with the payload of the first `event` accepted by `predicate`.
	pub fn wait_for_event_with<P>(self, emitter: &Publisher, event: &str, predicate: P) -> Self
	where
		P: Fn(&Payload) -> bool + Send + Sync + 'static,
	{
		self.wait_for_event_map(emitter, event, move |p| predicate(p).then(|| p.clone()))
	}
}

impl<T> std::fmt::Debug for Waiter<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Waiter")
			.field("result", &self.inner.result)
			.field("subscriptions", &self.inner.subscriptions.lock().len())
			.finish()
	}
}
