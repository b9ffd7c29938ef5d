//! Route chains: ordered network interceptors.
//!
//! A [`RouteChain`] holds `(matcher, handler, remaining invocations)` entries.
//! A route event is offered to matching entries most-recently-registered
//! first. Each handler receives a [`RouteContext`] and decides exactly once:
//!
//! - `fulfill` / `abort` / `continue_` end the dispatch
//! - `fallback` (or returning `Ok` without deciding) passes the route to the
//!   next older entry, and past the oldest entry to whatever the caller falls
//!   back to
//!
//! A handler returning `Err` before deciding fails the dispatch; older
//! entries are not consulted.
//!
//! The decision is observed through a [`Waiter`] that also fails if the host
//! (page or context) emits `close`, so a handler may do its own round trips
//! before deciding.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pwire_protocol::{ContinueOverrides, FulfillOptions, InterceptionPattern};
use pwire_runtime::{ChannelOwner, Error, Result, Waiter};

use crate::handlers::{
	HandlerEntry, HandlerFn, HandlerId, HandlerMap, RouteMatcher, handler_fn, next_handler_id,
};
use crate::objects::{Request, Route};

/// How a single handler invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
	Fulfilled,
	Aborted,
	Continued,
	Fallback,
}

impl RouteAction {
	pub fn is_terminal(self) -> bool {
		!matches!(self, RouteAction::Fallback)
	}
}

/// Per-entry metadata.
#[derive(Clone, Debug)]
pub struct RouteMeta {
	pub matcher: RouteMatcher,
	/// `None` means unlimited.
	pub remaining: Option<u32>,
}

/// Result of offering one route event to a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainOutcome {
	/// Terminal action taken, or `None` if every entry fell back.
	pub action: Option<RouteAction>,
	/// Number of handlers invoked.
	pub invoked: usize,
	/// Number of entries pruned because their invocations ran out.
	pub expired: usize,
}

impl ChainOutcome {
	pub fn is_handled(&self) -> bool {
		self.action.is_some()
	}
}

/// Ordered list of route handlers for one page or browser context.
#[derive(Clone)]
pub struct RouteChain {
	handlers: HandlerMap<RouteContext, RouteMeta>,
}

impl Default for RouteChain {
	fn default() -> Self {
		Self::new()
	}
}

impl RouteChain {
	pub fn new() -> Self {
		Self {
			handlers: Arc::new(Mutex::new(IndexMap::new())),
		}
	}

	/// Registers `handler` in front of every existing entry.
	///
	/// `times` limits how often it runs; `None` is unlimited.
	pub fn register<F, Fut>(&self, pattern: &str, handler: F, times: Option<u32>) -> HandlerId
	where
		F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.register_fn(RouteMatcher::new(pattern), handler_fn(handler), times)
	}

	pub fn register_fn(
		&self,
		matcher: RouteMatcher,
		handler: HandlerFn<RouteContext>,
		times: Option<u32>,
	) -> HandlerId {
		let id = next_handler_id();
		self.handlers.lock().insert(
			id,
			HandlerEntry {
				id,
				meta: RouteMeta {
					matcher,
					remaining: times,
				},
				handler,
			},
		);
		id
	}

	/// Removes entries registered with `pattern`, or only entry `id` if given.
	/// Returns how many were removed.
	pub fn unregister(&self, pattern: &str, id: Option<HandlerId>) -> usize {
		let mut handlers = self.handlers.lock();
		let before = handlers.len();
		handlers.retain(|entry_id, entry| {
			let same_pattern = entry.meta.matcher.as_str() == pattern;
			let same_handler = id.is_none_or(|id| id == *entry_id);
			!(same_pattern && same_handler)
		});
		before - handlers.len()
	}

	pub fn clear(&self) {
		self.handlers.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.handlers.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.lock().is_empty()
	}

	pub fn contains(&self, id: HandlerId) -> bool {
		self.handlers.lock().contains_key(&id)
	}

	/// Patterns to install remotely, most recent first. Empty disables interception.
	pub fn patterns(&self) -> Vec<InterceptionPattern> {
		self.handlers
			.lock()
			.values()
			.rev()
			.map(|entry| InterceptionPattern {
				glob: entry.meta.matcher.as_str().to_string(),
			})
			.collect()
	}

	/// Offers `route` to matching entries, newest first, until one decides.
	///
	/// Entries registered while the dispatch runs are not consulted; entries
	/// removed while it runs are skipped.
	pub async fn dispatch(&self, route: Arc<Route>, host: &dyn ChannelOwner) -> Result<ChainOutcome> {
		let url = route.request_url().to_string();
		let candidates: Vec<HandlerId> = self
			.handlers
			.lock()
			.values()
			.rev()
			.filter(|entry| entry.meta.matcher.is_match(&url))
			.map(|entry| entry.id)
			.collect();

		let mut outcome = ChainOutcome::default();
		for id in candidates {
			let Some(handler) = self.claim_invocation(id) else {
				continue;
			};

			let target_type = host.type_name().to_string();
			let waiter = Waiter::new().fail_on(host.events(), "close", move |_| {
				Some(Error::TargetClosed {
					target_type: target_type.clone(),
					context: "route handler was waiting when the target closed".to_string(),
				})
			});
			let context = RouteContext::new(Arc::clone(&route), waiter.clone());
			let returned = HandlerReturn {
				state: Arc::clone(&context.state),
				waiter: waiter.clone(),
			};

			// The handler runs detached so it may keep working after it decides.
			tokio::spawn(async move {
				let result = handler(context).await;
				returned.finish(result);
			});

			let action = waiter.wait().await;
			outcome.invoked += 1;
			outcome.expired += self.prune_expired();

			let action = action?;
			tracing::debug!(url = %url, handler = id, ?action, "route handler decided");
			if action.is_terminal() {
				outcome.action = Some(action);
				break;
			}
		}
		Ok(outcome)
	}

	/// Decrements the entry's counter and returns its handler, if it may still run.
	fn claim_invocation(&self, id: HandlerId) -> Option<HandlerFn<RouteContext>> {
		let mut handlers = self.handlers.lock();
		let entry = handlers.get_mut(&id)?;
		match entry.meta.remaining.as_mut() {
			Some(0) => return None,
			Some(n) => *n -= 1,
			None => {}
		}
		Some(Arc::clone(&entry.handler))
	}

	fn prune_expired(&self) -> usize {
		let mut handlers = self.handlers.lock();
		let before = handlers.len();
		handlers.retain(|_, entry| entry.meta.remaining != Some(0));
		before - handlers.len()
	}
}

impl std::fmt::Debug for RouteChain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let patterns: Vec<String> = self.patterns().into_iter().map(|p| p.glob).collect();
		f.debug_struct("RouteChain").field("patterns", &patterns).finish()
	}
}

/// Decision bookkeeping shared by a context and the task running its handler.
#[derive(Default)]
struct DecisionState {
	claimed: bool,
	/// The context was dropped.
	dropped: bool,
	/// The handler future completed (or unwound).
	returned: bool,
}

/// Settles the decision once the handler future is done.
///
/// An `Err` rejects the decision unless the handler already decided. An `Ok`
/// without a decision falls back, but only once the context itself is gone:
/// a handler may hand its context to another task that decides later.
struct HandlerReturn {
	state: Arc<Mutex<DecisionState>>,
	waiter: Waiter<RouteAction>,
}

impl HandlerReturn {
	fn finish(self, result: Result<()>) {
		if let Err(err) = result {
			if !self.waiter.reject(err.clone()) {
				tracing::debug!(error = %err, "route handler failed after the route was settled");
			}
		}
	}
}

impl Drop for HandlerReturn {
	fn drop(&mut self) {
		let mut state = self.state.lock();
		state.returned = true;
		if state.dropped && !state.claimed {
			self.waiter.fulfill(RouteAction::Fallback);
		}
	}
}

/// One handler's view of an intercepted request. Exactly one decision is allowed.
pub struct RouteContext {
	route: Arc<Route>,
	waiter: Waiter<RouteAction>,
	state: Arc<Mutex<DecisionState>>,
}

impl RouteContext {
	fn new(route: Arc<Route>, waiter: Waiter<RouteAction>) -> Self {
		Self {
			route,
			waiter,
			state: Arc::new(Mutex::new(DecisionState::default())),
		}
	}

	pub fn route(&self) -> &Arc<Route> {
		&self.route
	}

	pub fn request(&self) -> &Arc<Request> {
		self.route.request()
	}

	pub fn url(&self) -> &str {
		self.route.request_url()
	}

	fn claim(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.claimed {
			return Err(Error::RouteAlreadyHandled);
		}
		state.claimed = true;
		Ok(())
	}

	fn settle(&self, action: RouteAction, sent: Result<()>) -> Result<()> {
		match sent {
			Ok(()) => {
				self.waiter.fulfill(action);
				Ok(())
			}
			Err(err) => {
				self.waiter.reject(err.clone());
				Err(err)
			}
		}
	}

	/// Answers the request with a synthetic response.
	pub async fn fulfill(&self, options: FulfillOptions) -> Result<()> {
		self.claim()?;
		let sent = self.route.fulfill(&options).await;
		self.settle(RouteAction::Fulfilled, sent)
	}

	/// Fails the request. `error_code` defaults to `"failed"`.
	pub async fn abort(&self, error_code: Option<&str>) -> Result<()> {
		self.claim()?;
		let sent = self.route.abort(error_code).await;
		self.settle(RouteAction::Aborted, sent)
	}

	/// Sends the request to the network, skipping every older handler.
	pub async fn continue_(&self, overrides: ContinueOverrides) -> Result<()> {
		self.claim()?;
		let sent = self.route.continue_(&overrides).await;
		self.settle(RouteAction::Continued, sent)
	}

	/// Passes the request to the next older handler.
	pub fn fallback(&self) -> Result<()> {
		self.claim()?;
		self.waiter.fulfill(RouteAction::Fallback);
		Ok(())
	}

	pub fn is_handled(&self) -> bool {
		self.state.lock().claimed
	}
}

impl Drop for RouteContext {
	fn drop(&mut self) {
		let mut state = self.state.lock();
		state.dropped = true;
		if !state.claimed {
			// While the handler is still running, its return value decides.
			if state.returned {
				self.waiter.fulfill(RouteAction::Fallback);
			}
		} else if !self.waiter.is_settled() {
			// A decision was started but its call was cancelled.
			self.waiter.reject(Error::Cancelled(
				"route action was dropped before it completed".to_string(),
			));
		}
	}
}

impl std::fmt::Debug for RouteContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RouteContext")
			.field("url", &self.url())
			.field("handled", &self.is_handled())
			.finish()
	}
}
