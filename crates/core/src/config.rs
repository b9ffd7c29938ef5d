//! Client configuration.

use std::time::Duration;

use pwire_protocol::DEFAULT_TIMEOUT_MS;
use pwire_runtime::{DriverPaths, Error, Result};

/// Language reported in the `initialize` handshake.
pub const DEFAULT_SDK_LANGUAGE: &str = "rust";

pub const INIT_TIMEOUT_ENV: &str = "PWIRE_INIT_TIMEOUT_MS";
pub const DEFAULT_TIMEOUT_ENV: &str = "PWIRE_DEFAULT_TIMEOUT_MS";
pub const SDK_LANGUAGE_ENV: &str = "PWIRE_SDK_LANGUAGE";

/// Settings for [`Client`](crate::Client).
///
/// Driver paths left unset are discovered at launch, which also honours the
/// `PLAYWRIGHT_NODE_EXE`, `PLAYWRIGHT_CLI_JS` and `PLAYWRIGHT_DRIVER_PATH`
/// variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub sdk_language: String,
	/// Deadline for the `initialize` handshake. Zero waits indefinitely.
	pub init_timeout: Duration,
	/// Deadline used by waits that are not given one explicitly.
	pub default_timeout: Duration,
	pub driver: Option<DriverPaths>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		let default_timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS as u64);
		Self {
			sdk_language: DEFAULT_SDK_LANGUAGE.to_string(),
			init_timeout: default_timeout,
			default_timeout,
			driver: None,
		}
	}
}

impl ClientConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults overridden by `PWIRE_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Like [`from_env`](Self::from_env), reading variables through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = Self::default();
		if let Some(language) = lookup(SDK_LANGUAGE_ENV).filter(|v| !v.trim().is_empty()) {
			config.sdk_language = language.trim().to_string();
		}
		if let Some(raw) = lookup(INIT_TIMEOUT_ENV) {
			config.init_timeout = parse_millis(INIT_TIMEOUT_ENV, &raw)?;
		}
		if let Some(raw) = lookup(DEFAULT_TIMEOUT_ENV) {
			config.default_timeout = parse_millis(DEFAULT_TIMEOUT_ENV, &raw)?;
		}
		Ok(config)
	}

	pub fn sdk_language(mut self, language: impl Into<String>) -> Self {
		self.sdk_language = language.into();
		self
	}

	pub fn init_timeout(mut self, timeout: Duration) -> Self {
		self.init_timeout = timeout;
		self
	}

	pub fn default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout = timeout;
		self
	}

	pub fn driver(mut self, paths: DriverPaths) -> Self {
		self.driver = Some(paths);
		self
	}
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
	raw.trim()
		.parse::<u64>()
		.map(Duration::from_millis)
		.map_err(|e| Error::InvalidArgument(format!("{key}={raw:?} is not a millisecond count: {e}")))
}
