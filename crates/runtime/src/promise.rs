//! Single-assignment future shared between a producer and any number of observers.
//!
//! A [`Promise`] is settled (fulfilled or rejected) at most once. Settlement is
//! compare-and-swap style: the first `fulfill`/`reject` wins and every later
//! attempt returns [`Error::AlreadySettled`] without touching the stored value.
//!
//! Observers may wait asynchronously ([`Promise::wait`], or `.await` directly)
//! or block the current thread ([`Promise::wait_blocking`]). Both paths are
//! woken exactly once, on settlement, and never poll.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::{Error, Result};

struct Shared<T> {
	slot: Mutex<Option<Result<T>>>,
	settled: Condvar,
	notify: Notify,
}

/// Single-resolution future. Cloning yields another handle to the same slot.
pub struct Promise<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> Promise<T> {
	/// Fulfills the promise. Fails with [`Error::AlreadySettled`] if it was settled before.
	pub fn fulfill(&self, value: T) -> Result<()> {
		self.settle(Ok(value))
	}

	/// Rejects the promise. Fails with [`Error::AlreadySettled`] if it was settled before.
	pub fn reject(&self, error: Error) -> Result<()> {
		self.settle(Err(error))
	}

	/// Stores `outcome` if the promise is still pending, then wakes all waiters.
	pub fn settle(&self, outcome: Result<T>) -> Result<()> {
		{
			let mut slot = self.shared.slot.lock();
			if slot.is_some() {
				return Err(Error::AlreadySettled);
			}
			*slot = Some(outcome);
		}
		self.shared.settled.notify_all();
		self.shared.notify.notify_waiters();
		Ok(())
	}

	pub fn is_settled(&self) -> bool {
		self.shared.slot.lock().is_some()
	}
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone + Send + 'static> Promise<T> {
	/// Creates a pending promise.
	pub fn new() -> Self {
		Self {
			shared: Arc::new(Shared {
				slot: Mutex::new(None),
				settled: Condvar::new(),
				notify: Notify::new(),
			}),
		}
	}

	/// Creates a promise that is already fulfilled.
	pub fn fulfilled(value: T) -> Self {
		let promise = Self::new();
		*promise.shared.slot.lock() = Some(Ok(value));
		promise
	}

	/// Returns the outcome without waiting, if settled.
	pub fn peek(&self) -> Option<Result<T>> {
		self.shared.slot.lock().clone()
	}

	/// Waits asynchronously for settlement.
	pub async fn wait(&self) -> Result<T> {
		loop {
			let notified = self.shared.notify.notified();
			tokio::pin!(notified);
			// Register before checking so a settlement in between is not lost.
			notified.as_mut().enable();

			if let Some(outcome) = self.peek() {
				return outcome;
			}
			notified.await;
		}
	}

	/// Waits asynchronously, failing with [`Error::Timeout`] after `timeout`.
	///
	/// The promise itself stays pending; only this wait gives up.
	pub async fn wait_timeout(&self, timeout: Duration) -> Result<T> {
		tokio::time::timeout(timeout, self.wait())
			.await
			.map_err(|_| Error::Timeout(format!("Timeout {}ms exceeded", timeout.as_millis())))?
	}

	/// Blocks the calling thread until settlement.
	///
	/// Must not be called from inside an async task driving the settling side.
	pub fn wait_blocking(&self) -> Result<T> {
		let mut slot = self.shared.slot.lock();
		loop {
			if let Some(outcome) = slot.as_ref() {
				return outcome.clone();
			}
			self.shared.settled.wait(&mut slot);
		}
	}

	/// Blocks for at most `timeout`; returns `None` if still pending afterwards.
	pub fn wait_blocking_timeout(&self, timeout: Duration) -> Option<Result<T>> {
		let deadline = std::time::Instant::now() + timeout;
		let mut slot = self.shared.slot.lock();
		loop {
			if let Some(outcome) = slot.as_ref() {
				return Some(outcome.clone());
			}
			if self
				.shared
				.settled
				.wait_until(&mut slot, deadline)
				.timed_out()
			{
				return slot.clone();
			}
		}
	}
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for Promise<T> {
	type Output = Result<T>;
	type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(async move { self.wait().await })
	}
}

impl<T> std::fmt::Debug for Promise<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = match self.shared.slot.lock().as_ref() {
			None => "pending",
			Some(Ok(_)) => "fulfilled",
			Some(Err(_)) => "rejected",
		};
		f.debug_struct("Promise").field("state", &state).finish()
	}
}
