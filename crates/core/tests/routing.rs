mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pwire::{ContinueOverrides, FulfillOptions, HeaderEntry};
use serde_json::json;

use common::{open_page, start};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

#[tokio::test]
async fn newest_handler_runs_first_and_abort_stops_the_chain() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;
	let seen = log();

	let a = Arc::clone(&seen);
	let (id, patterns) = tokio::join!(
		page.route("**/*", move |route| {
			let a = Arc::clone(&a);
			async move {
				a.lock().push("A".into());
				route.continue_(ContinueOverrides::default()).await
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();
	assert_eq!(patterns, json!({"patterns": [{"glob": "**/*"}]}));

	let b = Arc::clone(&seen);
	let (id, _) = tokio::join!(
		page.route("**/api/*", move |route| {
			let b = Arc::clone(&b);
			async move {
				b.lock().push("B".into());
				route.abort(None).await
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let c = Arc::clone(&seen);
	let (id, patterns) = tokio::join!(
		page.route("**/*", move |route| {
			let c = Arc::clone(&c);
			async move {
				c.lock().push("C".into());
				route.fallback()
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();
	assert_eq!(
		patterns,
		json!({"patterns": [{"glob": "**/*"}, {"glob": "**/api/*"}, {"glob": "**/*"}]})
	);

	let route = driver
		.intercept("page@1", 1, "https://example.com/api/users")
		.await;
	let params = driver.answer(&route, "abort").await;
	assert_eq!(params, json!({"errorCode": "failed"}));
	assert_eq!(*seen.lock(), vec!["C", "B"]);

	// A non-matching pattern skips B and reaches A.
	let route = driver
		.intercept("page@1", 2, "https://example.com/logo.png")
		.await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(params, json!({"isFallback": false}));
	assert_eq!(*seen.lock(), vec!["C", "B", "C", "A"]);
}

#[tokio::test]
async fn limited_handler_expires_and_interception_is_turned_off() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;
	let seen = log();

	let hits = Arc::clone(&seen);
	let (id, _) = tokio::join!(
		page.route_times("**/*", 2, move |route| {
			let hits = Arc::clone(&hits);
			async move {
				hits.lock().push(route.url().to_string());
				route
					.fulfill(FulfillOptions::new().status(201).body("ok"))
					.await
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	let id = id.unwrap();

	let route = driver.intercept("page@1", 1, "https://a.test/1").await;
	let params = driver.answer(&route, "fulfill").await;
	assert_eq!(params["status"], 201);
	assert_eq!(params["body"], "b2s=");
	assert_eq!(params["isBase64"], true);
	assert!(page.routes().contains(id));

	// The second invocation used up the entry; the empty list disables
	// interception. The first dispatch may still be pruning, so the sync can
	// overtake the fulfill.
	let route = driver.intercept("page@1", 2, "https://a.test/2").await;
	let params = driver
		.answer_each(&[
			(route.as_str(), "fulfill"),
			("page@1", "setNetworkInterceptionPatterns"),
		])
		.await;
	assert_eq!(params[0]["status"], 201);
	assert_eq!(params[1], json!({"patterns": []}));
	assert!(page.routes().is_empty());

	let route = driver.intercept("page@1", 3, "https://a.test/3").await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(params, json!({"isFallback": true}));
	assert_eq!(*seen.lock(), vec!["https://a.test/1", "https://a.test/2"]);
}

#[tokio::test]
async fn page_falls_through_to_context_handlers() {
	let (client, mut driver) = start().await;
	let (context, page) = open_page(&client, &mut driver).await;
	let seen = log();

	let ctx_log = Arc::clone(&seen);
	let (id, _) = tokio::join!(
		context.route("**/*.png", move |route| {
			let ctx_log = Arc::clone(&ctx_log);
			async move {
				ctx_log.lock().push("context".into());
				route
					.fulfill(
						FulfillOptions::new()
							.content_type("image/png")
							.header("x-cache", "hit"),
					)
					.await
			}
		}),
		driver.answer("context@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let page_log = Arc::clone(&seen);
	let (id, _) = tokio::join!(
		page.route("**/*", move |route| {
			let page_log = Arc::clone(&page_log);
			async move {
				page_log.lock().push("page".into());
				route.fallback()
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let route = driver
		.intercept("page@1", 1, "https://example.com/cat.png")
		.await;
	let params = driver.answer(&route, "fulfill").await;
	assert_eq!(params["status"], 200);
	assert_eq!(
		params["headers"],
		json!([
			{"name": "x-cache", "value": "hit"},
			{"name": "content-type", "value": "image/png"},
		])
	);
	assert_eq!(*seen.lock(), vec!["page", "context"]);

	// Neither chain matches: handed back to the engine.
	let route = driver
		.intercept("page@1", 2, "https://example.com/index.html")
		.await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(params, json!({"isFallback": true}));
	assert_eq!(*seen.lock(), vec!["page", "context", "page"]);
}

#[tokio::test]
async fn context_route_events_use_the_context_chain() {
	let (client, mut driver) = start().await;
	let (context, _page) = open_page(&client, &mut driver).await;

	let (id, _) = tokio::join!(
		context.route("**/*", |route| async move {
			route
				.continue_(ContinueOverrides {
					headers: Some(vec![HeaderEntry::new("x-test", "1")]),
					..Default::default()
				})
				.await
		}),
		driver.answer("context@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let route = driver
		.intercept("context@1", 1, "https://example.com/")
		.await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(
		params,
		json!({"headers": [{"name": "x-test", "value": "1"}], "isFallback": false})
	);
}

#[tokio::test]
async fn second_decision_is_rejected() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;
	let errors = log();

	let sink = Arc::clone(&errors);
	let (id, _) = tokio::join!(
		page.route("**/*", move |route| {
			let sink = Arc::clone(&sink);
			async move {
				route.fallback()?;
				if let Err(err) = route.abort(None).await {
					sink.lock().push(format!("{err:?}"));
				}
				Ok(())
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let route = driver.intercept("page@1", 1, "https://example.com/").await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(params, json!({"isFallback": true}));
	assert_eq!(errors.lock().len(), 1);
	assert_eq!(errors.lock()[0], "RouteAlreadyHandled");
}

#[tokio::test]
async fn handler_without_decision_falls_back() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;

	let (id, _) = tokio::join!(
		page.route("**/*", |_route| async { Ok(()) }),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let route = driver.intercept("page@1", 1, "https://example.com/").await;
	let params = driver.answer(&route, "continue").await;
	assert_eq!(params, json!({"isFallback": true}));
}

#[tokio::test]
async fn handler_error_stops_the_chain() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;
	let seen = log();

	let older = Arc::clone(&seen);
	let (id, _) = tokio::join!(
		page.route("**/*", move |route| {
			let older = Arc::clone(&older);
			async move {
				older.lock().push("older".into());
				route.abort(None).await
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();
	let (id, _) = tokio::join!(
		page.route("**/*", |_route| async {
			Err::<(), _>(pwire::Error::InvalidArgument("bad header".into()))
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	driver.intercept("page@1", 1, "https://example.com/").await;

	// The failure is reported locally; neither the older handler nor the
	// network fallback runs.
	assert!(driver.try_recv(Duration::from_millis(200)).await.is_none());
	assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn handed_off_context_decides_after_the_handler_returns() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;

	let (id, _) = tokio::join!(
		page.route("**/*", |route| async move {
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(20)).await;
				let _ = route.abort(Some("timedout")).await;
			});
			Ok(())
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	let route = driver.intercept("page@1", 1, "https://example.com/").await;
	let params = driver.answer(&route, "abort").await;
	assert_eq!(params, json!({"errorCode": "timedout"}));
}

#[tokio::test]
async fn unroute_removes_one_handler_and_reinstalls_patterns() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;

	let (first, _) = tokio::join!(
		page.route("**/*.js", |route| async move { route.abort(Some("blockedbyclient")).await }),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	let (second, _) = tokio::join!(
		page.route("**/*.js", |route| async move { route.fallback() }),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	let (first, second) = (first.unwrap(), second.unwrap());

	let (removed, patterns) = tokio::join!(
		page.unroute("**/*.js", Some(second)),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	assert_eq!(removed.unwrap(), 1);
	assert_eq!(patterns, json!({"patterns": [{"glob": "**/*.js"}]}));
	assert!(page.routes().contains(first));

	let route = driver
		.intercept("page@1", 1, "https://example.com/app.js")
		.await;
	let params = driver.answer(&route, "abort").await;
	assert_eq!(params, json!({"errorCode": "blockedbyclient"}));

	// Nothing left to remove: no round trip.
	assert_eq!(page.unroute("**/*.css", None).await.unwrap(), 0);
	assert!(driver.try_recv(Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn failed_install_removes_the_entry() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;

	let fail = async {
		let request = driver
			.expect_call("page@1", "setNetworkInterceptionPatterns")
			.await;
		driver
			.send(json!({
				"id": request["id"],
				"error": {"error": {"name": "Error", "message": "Target page has been closed"}},
			}))
			.await;
	};
	let (result, ()) = tokio::join!(page.route("**/*", |route| async move { route.fallback() }), fail);

	let err = result.unwrap_err();
	assert!(err.to_string().contains("Target page has been closed"));
	assert!(page.routes().is_empty());
}

#[tokio::test]
async fn page_close_event_fails_a_pending_handler() {
	let (client, mut driver) = start().await;
	let (_context, page) = open_page(&client, &mut driver).await;
	let (tx, rx) = tokio::sync::oneshot::channel::<()>();
	let tx = Arc::new(Mutex::new(Some(tx)));

	let (id, _) = tokio::join!(
		page.route("**/*", move |route| {
			let tx = Arc::clone(&tx);
			async move {
				if let Some(tx) = tx.lock().take() {
					let _ = tx.send(());
				}
				// Never decides; holds the context until the test ends.
				tokio::time::sleep(Duration::from_secs(60)).await;
				drop(route);
				Ok(())
			}
		}),
		driver.answer("page@1", "setNetworkInterceptionPatterns")
	);
	id.unwrap();

	driver.intercept("page@1", 1, "https://example.com/").await;
	rx.await.unwrap();
	driver.event("page@1", "close", json!({})).await;

	// The dispatch gives up: nothing is sent for the route.
	assert!(driver.try_recv(Duration::from_millis(100)).await.is_none());
	assert!(page.is_closed());
}
