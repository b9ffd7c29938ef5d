//! Scripted stand-in for the driver, speaking length-prefixed frames over
//! in-memory pipes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pwire::{BrowserContext, Client, ClientConfig, Page};
use pwire_runtime::PipeTransport;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeDriver {
	/// What the client wrote.
	input: DuplexStream,
	/// Frames for the client.
	output: DuplexStream,
}

impl FakeDriver {
	/// Builds a driver and the client-side transport wired to it.
	pub fn new() -> (Self, pwire_runtime::TransportParts) {
		let (input, client_out) = duplex(256 * 1024);
		let (client_in, output) = duplex(256 * 1024);
		let (transport, message_rx) = PipeTransport::new(client_out, client_in);
		(Self { input, output }, transport.into_transport_parts(message_rx))
	}

	pub async fn recv(&mut self) -> Value {
		tokio::time::timeout(RECV_TIMEOUT, async {
			let mut len_buf = [0u8; 4];
			self.input.read_exact(&mut len_buf).await.unwrap();
			let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
			self.input.read_exact(&mut body).await.unwrap();
			serde_json::from_slice::<Value>(&body).unwrap()
		})
		.await
		.expect("client sent nothing")
	}

	/// Like [`recv`](Self::recv), but `None` if nothing arrives within `wait`.
	pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
		let mut len_buf = [0u8; 4];
		tokio::time::timeout(wait, self.input.read_exact(&mut len_buf))
			.await
			.ok()?
			.ok()?;
		let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
		self.input.read_exact(&mut body).await.unwrap();
		Some(serde_json::from_slice(&body).unwrap())
	}

	pub async fn send(&mut self, message: Value) {
		let body = serde_json::to_vec(&message).unwrap();
		self.output
			.write_all(&(body.len() as u32).to_le_bytes())
			.await
			.unwrap();
		self.output.write_all(&body).await.unwrap();
		self.output.flush().await.unwrap();
	}

	pub async fn create(&mut self, parent: &str, type_name: &str, guid: &str, initializer: Value) {
		self.send(json!({
			"guid": parent,
			"method": "__create__",
			"params": {"type": type_name, "guid": guid, "initializer": initializer},
		}))
		.await;
	}

	pub async fn event(&mut self, guid: &str, method: &str, params: Value) {
		self.send(json!({"guid": guid, "method": method, "params": params}))
			.await;
	}

	pub async fn respond(&mut self, id: &Value, result: Value) {
		self.send(json!({"id": id, "result": result})).await;
	}

	/// Receives the next call, checks its target and method, and returns it.
	pub async fn expect_call(&mut self, guid: &str, method: &str) -> Value {
		let request = self.recv().await;
		assert_eq!(request["guid"], guid, "unexpected call: {request}");
		assert_eq!(request["method"], method, "unexpected call: {request}");
		request
	}

	/// Receives the next call, answers it with `{}` and returns its params.
	pub async fn answer(&mut self, guid: &str, method: &str) -> Value {
		let request = self.expect_call(guid, method).await;
		self.respond(&request["id"], json!({})).await;
		request["params"].clone()
	}

	/// Answers one call per `(guid, method)` pair, accepting them in any order.
	/// Returns their params in the order of `calls`.
	pub async fn answer_each(&mut self, calls: &[(&str, &str)]) -> Vec<Value> {
		let mut params = vec![Value::Null; calls.len()];
		for _ in calls {
			let request = self.recv().await;
			let slot = calls
				.iter()
				.enumerate()
				.position(|(i, (guid, method))| {
					params[i].is_null() && request["guid"] == *guid && request["method"] == *method
				})
				.unwrap_or_else(|| panic!("unexpected call: {request}"));
			self.respond(&request["id"], json!({})).await;
			params[slot] = request["params"].clone();
		}
		params
	}

	/// Announces a request and a route for it, then fires `route` at `target`.
	pub async fn intercept(&mut self, target: &str, n: u32, url: &str) -> String {
		let request = format!("request@{n}");
		let route = format!("route@{n}");
		self.create(target, "Request", &request, json!({"url": url, "method": "GET"}))
			.await;
		self.create(target, "Route", &route, json!({"request": {"guid": request}}))
			.await;
		self.event(target, "route", json!({"route": {"guid": route}}))
			.await;
		route
	}

	/// Closes both pipes, as a crashed driver would.
	pub fn hang_up(self) {
		drop(self);
	}
}

/// Starts a client against a fresh fake driver, completing the handshake.
pub async fn start() -> (Client, FakeDriver) {
	start_with(ClientConfig::default()).await
}

pub async fn start_with(config: ClientConfig) -> (Client, FakeDriver) {
	let (mut driver, parts) = FakeDriver::new();
	let handshake = async {
		let init = driver.expect_call("", "initialize").await;
		driver.create("", "Playwright", "playwright", json!({})).await;
		driver
			.respond(&init["id"], json!({"playwright": {"guid": "playwright"}}))
			.await;
	};
	let (client, ()) = tokio::join!(Client::from_parts(parts, config), handshake);
	(client.unwrap(), driver)
}

/// Creates `context@1` with `page@1` inside it and returns both handles.
pub async fn open_page(client: &Client, driver: &mut FakeDriver) -> (Arc<BrowserContext>, Arc<Page>) {
	driver
		.create("playwright", "BrowserContext", "context@1", json!({}))
		.await;
	driver
		.create("context@1", "Page", "page@1", json!({"mainFrame": null}))
		.await;
	client.wait_for_object("page@1").await.unwrap();
	let context = client.object_as::<BrowserContext>("context@1").unwrap();
	let page = client.object_as::<Page>("page@1").unwrap();
	(context, page)
}
