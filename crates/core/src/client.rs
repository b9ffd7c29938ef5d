//! Client entry point: start a session, hand out handles, stop it.

use std::sync::Arc;

use parking_lot::Mutex;
use pwire_runtime::{
	ChannelOwner, Connection, ConnectionLike, DriverProcess, Error, Result, TransportParts,
	WebSocketTransport, discover,
};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::object_factory::TypeRegistry;
use crate::objects::Root;

/// A running protocol session.
///
/// Starting a client creates the root object, spawns the connection's read
/// loop and performs the `initialize` handshake. [`stop`](Self::stop) tears
/// all of that down again, including a driver process the client launched.
pub struct Client {
	connection: Arc<Connection>,
	root: Arc<Root>,
	playwright: Arc<dyn ChannelOwner>,
	config: ClientConfig,
	run_task: Mutex<Option<JoinHandle<Error>>>,
	driver: Mutex<Option<DriverProcess>>,
}

impl Client {
	/// Locates the driver, spawns it and talks to it over its stdio.
	pub async fn launch(config: ClientConfig) -> Result<Self> {
		let paths = discover(config.driver.as_ref())?;
		let mut driver = DriverProcess::launch(&paths).await?;
		let parts = match driver.take_transport() {
			Ok(parts) => parts,
			Err(err) => {
				let _ = driver.shutdown().await;
				return Err(err);
			}
		};
		Self::start(parts, config, TypeRegistry::new(), Some(driver)).await
	}

	/// Connects to a driver already listening on `ws_url`.
	pub async fn connect(ws_url: &str, config: ClientConfig) -> Result<Self> {
		tracing::debug!(ws_url, "connecting");
		let parts = WebSocketTransport::connect(ws_url).await?;
		Self::start(parts, config, TypeRegistry::new(), None).await
	}

	/// Starts a session over an already-built transport.
	pub async fn from_parts(parts: TransportParts, config: ClientConfig) -> Result<Self> {
		Self::start(parts, config, TypeRegistry::new(), None).await
	}

	/// Like [`from_parts`](Self::from_parts) with a custom type registry.
	pub async fn from_parts_with_registry(
		parts: TransportParts,
		config: ClientConfig,
		registry: TypeRegistry,
	) -> Result<Self> {
		Self::start(parts, config, registry, None).await
	}

	async fn start(
		parts: TransportParts,
		config: ClientConfig,
		registry: TypeRegistry,
		driver: Option<DriverProcess>,
	) -> Result<Self> {
		let connection = Arc::new(Connection::new(parts).with_factory(Arc::new(registry)));
		let root = Root::new(connection.clone());

		let runner = Arc::clone(&connection);
		let run_task = tokio::spawn(async move {
			let reason = runner.run().await;
			tracing::debug!(reason = %reason, "connection closed");
			reason
		});

		let playwright = match root.initialize(&config.sdk_language, config.init_timeout).await {
			Ok(playwright) => playwright,
			Err(err) => {
				connection.stop().await;
				let _ = run_task.await;
				if let Some(driver) = driver {
					if let Err(shutdown_err) = driver.shutdown().await {
						tracing::warn!(error = %shutdown_err, "driver shutdown failed");
					}
				}
				return Err(err);
			}
		};

		Ok(Self {
			connection,
			root,
			playwright,
			config,
			run_task: Mutex::new(Some(run_task)),
			driver: Mutex::new(driver),
		})
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	pub fn root(&self) -> &Arc<Root> {
		&self.root
	}

	/// The handle returned by the `initialize` handshake.
	pub fn playwright(&self) -> &Arc<dyn ChannelOwner> {
		&self.playwright
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Looks up a registered handle.
	pub fn object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.connection.get_object(guid)
	}

	/// Looks up a registered handle and downcasts it.
	pub fn object_as<T: ChannelOwner>(&self, guid: &str) -> Result<Arc<T>> {
		self.object(guid)?
			.downcast_arc::<T>()
			.map_err(|other| {
				tracing::debug!(guid, found = other.type_name(), "handle has another type");
				Error::ObjectNotFound {
					guid: guid.to_string(),
					expected: Some(std::any::type_name::<T>()),
				}
			})
	}

	/// Waits for `guid` to be created, up to the configured default timeout.
	pub async fn wait_for_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.connection
			.wait_for_object(guid, self.config.default_timeout)
			.await
	}

	pub fn is_closed(&self) -> bool {
		self.connection.is_closed()
	}

	/// Resolves with the reason once the session has ended.
	pub async fn wait_closed(&self) -> Error {
		self.connection.wait_closed().await
	}

	/// Stops the connection and the driver process, if this client launched one.
	pub async fn stop(&self) -> Result<()> {
		self.connection.stop().await;

		let run_task = self.run_task.lock().take();
		if let Some(task) = run_task {
			if let Err(join) = task.await {
				tracing::warn!(error = %join, "connection task failed");
			}
		}

		let driver = self.driver.lock().take();
		if let Some(driver) = driver {
			driver.shutdown().await?;
		}
		Ok(())
	}
}

impl std::fmt::Debug for Client {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Client")
			.field("connection", &self.connection)
			.field("playwright", &self.playwright.guid())
			.finish()
	}
}
