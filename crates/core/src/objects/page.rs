//! Page handle and its route chain.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use pwire_runtime::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, Payload, Result, private};
use serde_json::{Value, json};

use super::BrowserContext;
use super::network;
use crate::handlers::{HandlerId, handler_fn};
use crate::routing::{RouteChain, RouteContext};

/// A page inside a [`BrowserContext`].
///
/// Route events are offered to the page's own chain first, then to the
/// context's chain, and finally handed back to the engine.
pub struct Page {
	base: ChannelOwnerImpl,
	routes: RouteChain,
	closed: AtomicBool,
	me: Weak<Page>,
}

impl Page {
	pub fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Arc<Self> {
		Arc::new_cyclic(|me| Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name.to_string(),
				guid,
				initializer,
			),
			routes: RouteChain::new(),
			closed: AtomicBool::new(false),
			me: me.clone(),
		})
	}

	/// The owning context, if the parent is one.
	pub fn context(&self) -> Option<Arc<BrowserContext>> {
		self.parent()?.downcast_arc::<BrowserContext>().ok()
	}

	pub fn routes(&self) -> &RouteChain {
		&self.routes
	}

	/// Intercepts requests matching `pattern` until unrouted.
	pub async fn route<F, Fut>(&self, pattern: &str, handler: F) -> Result<HandlerId>
	where
		F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		network::add_route(self, &self.routes, pattern, handler_fn(handler), None).await
	}

	/// Intercepts at most `times` requests matching `pattern`.
	pub async fn route_times<F, Fut>(&self, pattern: &str, times: u32, handler: F) -> Result<HandlerId>
	where
		F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		network::add_route(self, &self.routes, pattern, handler_fn(handler), Some(times)).await
	}

	/// Removes handlers for `pattern`; only handler `id` when given.
	pub async fn unroute(&self, pattern: &str, id: Option<HandlerId>) -> Result<usize> {
		network::remove_route(self, &self.routes, pattern, id).await
	}

	pub async fn unroute_all(&self) -> Result<()> {
		self.routes.clear();
		network::sync_patterns(self, &self.routes).await
	}

	pub async fn close(&self) -> Result<()> {
		self.channel().send_no_result("close", json!({})).await
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	async fn handle_route_event(&self, params: Payload) -> Result<()> {
		let route = network::route_from_event(&params)?;
		if network::run_chain(self, &self.routes, &route).await?.is_handled() {
			return Ok(());
		}
		if let Some(context) = self.context() {
			if context.handle_route(&route).await?.is_handled() {
				return Ok(());
			}
		}
		route.continue_fallback().await
	}
}

impl private::Sealed for Page {}

impl ChannelOwner for Page {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}

	fn on_event(&self, method: &str, params: Payload) {
		match method {
			"close" => self.closed.store(true, Ordering::SeqCst),
			"route" => {
				if let Some(page) = self.me.upgrade() {
					let params = params.clone();
					tokio::spawn(async move {
						if let Err(err) = page.handle_route_event(params).await {
							network::report_route_error(page.guid(), &err);
						}
					});
				}
			}
			_ => {}
		}
		self.base.on_event(method, params);
	}
}

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Page")
			.field("guid", &self.guid())
			.field("routes", &self.routes)
			.field("closed", &self.is_closed())
			.finish()
	}
}
