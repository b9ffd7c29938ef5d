//! Generic handler infrastructure.
//!
//! Handlers are stored as [`HandlerEntry<E, M>`] in an [`IndexMap`], giving
//! O(1) removal by [`HandlerId`] with stable registration order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a registered handler. Handler identity is this id.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Boxed async handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = pwire_runtime::Result<()>> + Send>>;

/// Handler function: `E` to async `Result<()>`.
pub type HandlerFn<E> = Arc<dyn Fn(E) -> HandlerFuture + Send + Sync>;

/// Wraps a closure returning any `Send` future into a [`HandlerFn`].
pub fn handler_fn<E, F, Fut>(handler: F) -> HandlerFn<E>
where
	F: Fn(E) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = pwire_runtime::Result<()>> + Send + 'static,
{
	Arc::new(move |event: E| -> HandlerFuture { Box::pin(handler(event)) })
}

/// Handler entry with metadata `M`.
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: HandlerFn<E>,
}

impl<E, M: Clone> Clone for HandlerEntry<E, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			handler: Arc::clone(&self.handler),
		}
	}
}

/// Handler storage in registration order.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Compiled URL pattern.
///
/// Compiles once at registration; invalid globs fall back to exact matching.
#[derive(Clone, Debug)]
pub struct RouteMatcher {
	source: String,
	glob: Option<glob::Pattern>,
}

impl RouteMatcher {
	pub fn new(pattern: &str) -> Self {
		let glob = match glob::Pattern::new(pattern) {
			Ok(glob) => Some(glob),
			Err(err) => {
				tracing::debug!(pattern, error = %err, "invalid glob; matching exactly");
				None
			}
		};
		Self {
			source: pattern.to_string(),
			glob,
		}
	}

	pub fn is_match(&self, url: &str) -> bool {
		match &self.glob {
			Some(glob) => glob.matches(url),
			None => self.source == url,
		}
	}

	/// Returns the pattern as registered.
	pub fn as_str(&self) -> &str {
		&self.source
	}
}
