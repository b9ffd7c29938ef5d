//! BrowserContext handle and its route chain.

use std::future::Future;
use std::sync::{Arc, Weak};

use pwire_runtime::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, Payload, Result, private};
use serde_json::{Value, json};

use super::network;
use super::{Page, Route};
use crate::handlers::{HandlerId, handler_fn};
use crate::routing::{ChainOutcome, RouteChain, RouteContext};

/// An isolated browser session owning pages.
///
/// Its route chain applies to every page in the context, after the page's own
/// chain has fallen back.
pub struct BrowserContext {
	base: ChannelOwnerImpl,
	routes: RouteChain,
	me: Weak<BrowserContext>,
}

impl BrowserContext {
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
			me: me.clone(),
		})
	}

	/// Live pages, in no particular order.
	pub fn pages(&self) -> Vec<Arc<Page>> {
		self.children()
			.into_iter()
			.filter_map(|child| child.downcast_arc::<Page>().ok())
			.collect()
	}

	pub fn routes(&self) -> &RouteChain {
		&self.routes
	}

	/// Intercepts requests from every page matching `pattern` until unrouted.
	pub async fn route<F, Fut>(&self, pattern: &str, handler: F) -> Result<HandlerId>
	where
		F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		network::add_route(self, &self.routes, pattern, handler_fn(handler), None).await
	}

	pub async fn route_times<F, Fut>(&self, pattern: &str, times: u32, handler: F) -> Result<HandlerId>
	where
		F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		network::add_route(self, &self.routes, pattern, handler_fn(handler), Some(times)).await
	}

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

	/// Offers a route that every page handler fell back on.
	pub(crate) async fn handle_route(&self, route: &Arc<Route>) -> Result<ChainOutcome> {
		network::run_chain(self, &self.routes, route).await
	}

	async fn handle_route_event(&self, params: Payload) -> Result<()> {
		let route = network::route_from_event(&params)?;
		if self.handle_route(&route).await?.is_handled() {
			return Ok(());
		}
		route.continue_fallback().await
	}
}

impl private::Sealed for BrowserContext {}

impl ChannelOwner for BrowserContext {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}

	fn on_event(&self, method: &str, params: Payload) {
		if method == "route" {
			if let Some(context) = self.me.upgrade() {
				let params = params.clone();
				tokio::spawn(async move {
					if let Err(err) = context.handle_route_event(params).await {
						network::report_route_error(context.guid(), &err);
					}
				});
			}
		}
		self.base.on_event(method, params);
	}
}

impl std::fmt::Debug for BrowserContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserContext")
			.field("guid", &self.guid())
			.field("routes", &self.routes)
			.finish()
	}
}
