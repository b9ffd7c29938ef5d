//! Interception plumbing shared by [`Page`](super::Page) and
//! [`BrowserContext`](super::BrowserContext).

use std::sync::Arc;

use pwire_protocol::InterceptionPatterns;
use pwire_runtime::{ChannelOwner, Error, Payload, Result};

use super::Route;
use crate::handlers::{HandlerFn, HandlerId, RouteMatcher};
use crate::routing::{ChainOutcome, RouteChain, RouteContext};

pub(crate) const SET_PATTERNS_METHOD: &str = "setNetworkInterceptionPatterns";

/// Extracts the `Route` handle referenced by a `route` event.
pub(crate) fn route_from_event(params: &Payload) -> Result<Arc<Route>> {
	params
		.require_object("route")?
		.downcast_arc::<Route>()
		.map_err(|other| {
			Error::ProtocolError(format!(
				"route event referenced {} {} instead of a Route",
				other.type_name(),
				other.guid()
			))
		})
}

/// Installs the chain's current patterns on the remote side.
pub(crate) async fn sync_patterns(owner: &dyn ChannelOwner, chain: &RouteChain) -> Result<()> {
	let params = InterceptionPatterns {
		patterns: chain.patterns(),
	};
	owner.channel().send_no_result(SET_PATTERNS_METHOD, params).await
}

/// Registers a handler and installs the new pattern list. The entry is removed
/// again if the install fails.
pub(crate) async fn add_route(
	owner: &dyn ChannelOwner,
	chain: &RouteChain,
	pattern: &str,
	handler: HandlerFn<RouteContext>,
	times: Option<u32>,
) -> Result<HandlerId> {
	let id = chain.register_fn(RouteMatcher::new(pattern), handler, times);
	if let Err(err) = sync_patterns(owner, chain).await {
		chain.unregister(pattern, Some(id));
		return Err(err);
	}
	tracing::debug!(owner = owner.guid(), pattern, handler = id, ?times, "route registered");
	Ok(id)
}

/// Removes matching entries and re-installs the pattern list if anything changed.
pub(crate) async fn remove_route(
	owner: &dyn ChannelOwner,
	chain: &RouteChain,
	pattern: &str,
	id: Option<HandlerId>,
) -> Result<usize> {
	let removed = chain.unregister(pattern, id);
	if removed > 0 {
		sync_patterns(owner, chain).await?;
	}
	Ok(removed)
}

/// Offers `route` to `chain`, then turns interception off if expiry emptied it.
pub(crate) async fn run_chain(
	owner: &dyn ChannelOwner,
	chain: &RouteChain,
	route: &Arc<Route>,
) -> Result<ChainOutcome> {
	let outcome = chain.dispatch(Arc::clone(route), owner).await?;
	if outcome.expired > 0 && chain.is_empty() {
		sync_patterns(owner, chain).await?;
	}
	Ok(outcome)
}

/// Logs a failed route dispatch. A closed host is expected and only traced.
pub(crate) fn report_route_error(owner: &str, err: &Error) {
	if err.is_target_closed() || err.is_disconnected() {
		tracing::debug!(owner, error = %err, "route dispatch abandoned");
	} else {
		tracing::warn!(owner, error = %err, "route dispatch failed");
	}
}
