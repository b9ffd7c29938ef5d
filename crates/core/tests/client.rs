mod common;

use std::time::Duration;

use pwire::{ChannelOwner, Client, ClientConfig, Error, RemoteObject, TypeRegistry};
use serde_json::json;

use common::{FakeDriver, open_page, start, start_with};

#[tokio::test]
async fn handshake_reports_sdk_language_and_yields_playwright() {
	let (mut driver, parts) = FakeDriver::new();
	let handshake = async {
		let init = driver.expect_call("", "initialize").await;
		assert_eq!(init["id"], 0);
		assert_eq!(init["params"], json!({"sdkLanguage": "python"}));
		assert!(init["metadata"]["wallTime"].is_i64());
		driver
			.create("", "Playwright", "playwright", json!({"chromium": null}))
			.await;
		driver
			.respond(&init["id"], json!({"playwright": {"guid": "playwright"}}))
			.await;
	};
	let config = ClientConfig::new().sdk_language("python");
	let (client, ()) = tokio::join!(Client::from_parts(parts, config), handshake);
	let client = client.unwrap();

	assert_eq!(client.playwright().guid(), "playwright");
	assert_eq!(client.playwright().type_name(), "Playwright");
	assert!(client.playwright().clone().downcast_arc::<RemoteObject>().is_ok());
	assert_eq!(client.root().children().len(), 1);
}

#[tokio::test]
async fn silent_driver_times_out_the_handshake() {
	let (mut driver, parts) = FakeDriver::new();
	let config = ClientConfig::new().init_timeout(Duration::from_millis(50));

	let err = Client::from_parts(parts, config).await.unwrap_err();
	assert!(err.is_timeout(), "unexpected: {err:?}");
	assert!(err.to_string().contains("50ms"));

	// The request went out before the deadline.
	driver.expect_call("", "initialize").await;
}

#[tokio::test]
async fn calls_resolve_object_references() {
	let (client, mut driver) = start().await;
	let (context, _page) = open_page(&client, &mut driver).await;

	let call = context.channel().call("newPage", json!({}));
	let serve = async {
		let request = driver.expect_call("context@1", "newPage").await;
		driver
			.create("context@1", "Page", "page@2", json!({}))
			.await;
		driver
			.respond(&request["id"], json!({"page": {"guid": "page@2"}}))
			.await;
	};
	let (result, ()) = tokio::join!(call, serve);
	let result = result.unwrap();

	let page = result.require_object("page").unwrap();
	assert_eq!(page.type_name(), "Page");
	assert_eq!(context.pages().len(), 2);
}

#[tokio::test]
async fn remote_errors_reach_the_caller() {
	let (client, mut driver) = start().await;

	let call = client.playwright().channel().call("explode", json!({}));
	let serve = async {
		let request = driver.expect_call("playwright", "explode").await;
		driver
			.send(json!({
				"id": request["id"],
				"error": {"error": {"name": "TypeError", "message": "boom", "stack": "at x"}},
			}))
			.await;
	};
	let (result, ()) = tokio::join!(call, serve);

	match result.unwrap_err() {
		Error::Remote {
			name,
			message,
			stack,
		} => {
			assert_eq!(name, "TypeError");
			assert_eq!(message, "boom");
			assert_eq!(stack.as_deref(), Some("at x"));
		}
		other => panic!("unexpected: {other:?}"),
	}
	assert!(!client.is_closed());
}

#[tokio::test]
async fn dispose_cascades_through_the_tree() {
	let (client, mut driver) = start().await;
	let (context, page) = open_page(&client, &mut driver).await;

	driver
		.event("context@1", "__dispose__", json!({"reason": "gc"}))
		.await;
	tokio::time::timeout(Duration::from_secs(1), async {
		while !page.is_disposed() {
			tokio::time::sleep(Duration::from_millis(1)).await;
		}
	})
	.await
	.unwrap();

	assert!(context.is_disposed());
	assert!(page.is_disposed());
	assert!(page.was_collected());
	assert!(client.object("page@1").is_err());

	let err = page.close().await.unwrap_err();
	assert!(matches!(err, Error::ObjectDisposed { .. }));
}

#[tokio::test]
async fn unknown_type_terminates_the_session() {
	let (client, mut driver) = start().await;
	driver
		.create("playwright", "Mystery", "mystery@1", json!({}))
		.await;

	let reason = client.wait_closed().await;
	assert!(matches!(reason, Error::UnknownObjectType(ref tag) if tag == "Mystery"));
	assert!(reason.is_protocol_violation());

	let err = client
		.playwright()
		.channel()
		.call("anything", json!({}))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::UnknownObjectType(_)));
}

#[tokio::test]
async fn custom_tags_can_be_registered() {
	let (mut driver, parts) = FakeDriver::new();
	let mut registry = TypeRegistry::new();
	registry.register_generic("Mystery");

	let handshake = async {
		let init = driver.expect_call("", "initialize").await;
		driver.create("", "Playwright", "playwright", json!({})).await;
		driver
			.create("playwright", "Mystery", "mystery@1", json!({}))
			.await;
		driver
			.respond(&init["id"], json!({"playwright": {"guid": "playwright"}}))
			.await;
	};
	let (client, ()) = tokio::join!(
		Client::from_parts_with_registry(parts, ClientConfig::default(), registry),
		handshake
	);
	let client = client.unwrap();

	let object = client.object("mystery@1").unwrap();
	assert_eq!(object.type_name(), "Mystery");
	assert_eq!(object.parent().unwrap().guid(), "playwright");
}

#[tokio::test]
async fn driver_hang_up_rejects_pending_calls() {
	let (client, mut driver) = start().await;

	let call = client.playwright().channel().call("slow", json!({}));
	let hang_up = async move {
		driver.expect_call("playwright", "slow").await;
		driver.hang_up();
	};
	let (result, ()) = tokio::join!(call, hang_up);

	let err = result.unwrap_err();
	assert!(matches!(err, Error::DriverCrashed(_)), "unexpected: {err:?}");
	assert!(client.wait_closed().await.is_disconnected());
}

#[tokio::test]
async fn stop_closes_the_session() {
	let (client, _driver) = start_with(ClientConfig::default()).await;

	client.stop().await.unwrap();
	assert!(client.is_closed());
	assert!(matches!(client.wait_closed().await, Error::ChannelClosed));

	let err = client
		.playwright()
		.channel()
		.call("anything", json!({}))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::ChannelClosed));

	// Stopping twice is harmless.
	client.stop().await.unwrap();
}

#[tokio::test]
async fn object_as_checks_the_handle_type() {
	let (client, mut driver) = start().await;
	open_page(&client, &mut driver).await;

	assert!(client.object_as::<pwire::Page>("page@1").is_ok());
	let err = client.object_as::<pwire::Page>("context@1").unwrap_err();
	assert!(matches!(err, Error::ObjectNotFound { .. }));
}
