//! In-process publish/subscribe for handle events.
//!
//! Every handle holds a [`Publisher`] by composition. Domain events forwarded by
//! the connection are re-emitted here under their wire method name; waiters and
//! route chains subscribe with [`Publisher::on`] and unsubscribe with
//! [`Publisher::off`]. Nothing in this module is visible on the wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::payload::Payload;

/// Identifier returned by [`Publisher::on`], used to unsubscribe.
pub type ListenerId = u64;

/// Event listener callback.
pub type Listener = Arc<dyn Fn(&Payload) + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
	NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

type ListenerTable = HashMap<String, Vec<(ListenerId, Listener)>>;

/// Named-event fan-out. Cloning yields another handle to the same listener table.
#[derive(Clone, Default)]
pub struct Publisher {
	listeners: Arc<Mutex<ListenerTable>>,
}

impl Publisher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` for `event`; listeners run in registration order.
	pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
	where
		F: Fn(&Payload) + Send + Sync + 'static,
	{
		let id = next_listener_id();
		self.listeners
			.lock()
			.entry(event.to_string())
			.or_default()
			.push((id, Arc::new(listener)));
		id
	}

	/// Removes one listener. Returns false if it was not registered.
	pub fn off(&self, event: &str, id: ListenerId) -> bool {
		let mut table = self.listeners.lock();
		let Some(list) = table.get_mut(event) else {
			return false;
		};
		let before = list.len();
		list.retain(|(lid, _)| *lid != id);
		let removed = list.len() != before;
		if list.is_empty() {
			table.remove(event);
		}
		removed
	}

	/// Invokes every listener currently registered for `event`.
	///
	/// The listener list is snapshotted first, so listeners may call
	/// [`off`](Self::off) or [`on`](Self::on) while being invoked. Returns the
	/// number of listeners called.
	pub fn emit(&self, event: &str, payload: &Payload) -> usize {
		let snapshot: Vec<Listener> = match self.listeners.lock().get(event) {
			Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
			None => return 0,
		};
		for listener in &snapshot {
			listener(payload);
		}
		snapshot.len()
	}

	pub fn listener_count(&self, event: &str) -> usize {
		self.listeners.lock().get(event).map_or(0, Vec::len)
	}

	pub fn total_listeners(&self) -> usize {
		self.listeners.lock().values().map(Vec::len).sum()
	}

	pub fn clear(&self) {
		self.listeners.lock().clear();
	}
}

impl std::fmt::Debug for Publisher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Publisher")
			.field("listeners", &self.total_listeners())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use serde_json::json;

	use super::*;

	#[test]
	fn emit_reaches_listeners_in_order() {
		let publisher = Publisher::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		for tag in ["a", "b"] {
			let seen = Arc::clone(&seen);
			publisher.on("console", move |p| {
				seen.lock().push(format!("{tag}:{}", p.value()["text"]));
			});
		}

		let called = publisher.emit("console", &Payload::new(json!({"text": "hi"})));
		assert_eq!(called, 2);
		assert_eq!(*seen.lock(), vec![r#"a:"hi""#, r#"b:"hi""#]);
		assert_eq!(publisher.emit("close", &Payload::default()), 0);
	}

	#[test]
	fn off_removes_only_the_named_listener() {
		let publisher = Publisher::new();
		let a = publisher.on("close", |_| {});
		let _b = publisher.on("close", |_| {});

		assert!(publisher.off("close", a));
		assert!(!publisher.off("close", a));
		assert_eq!(publisher.listener_count("close"), 1);
	}

	#[test]
	fn listener_may_unsubscribe_itself_during_emit() {
		let publisher = Publisher::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let id = Arc::new(Mutex::new(0));

		let registered = {
			let publisher = publisher.clone();
			let calls = Arc::clone(&calls);
			let id = Arc::clone(&id);
			publisher.clone().on("request", move |_| {
				calls.fetch_add(1, Ordering::SeqCst);
				publisher.off("request", *id.lock());
			})
		};
		*id.lock() = registered;

		publisher.emit("request", &Payload::default());
		publisher.emit("request", &Payload::default());

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(publisher.total_listeners(), 0);
	}
}
