//! Driver process lifecycle.
//!
//! [`DriverProcess`] wraps the `node cli.js run-driver` child. Its stdin and
//! stdout are the two directions of a [`PipeTransport`]; stderr is inherited
//! so engine diagnostics reach the terminal.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::driver::DriverPaths;
use crate::error::{Error, Result};
use crate::transport::{PipeTransport, TransportParts};

/// Name reported to the engine as the client language.
pub const LANG_NAME: &str = "rust";

/// A running driver child process.
#[derive(Debug)]
pub struct DriverProcess {
	child: Child,
}

impl DriverProcess {
	/// Spawns `node cli.js run-driver` with piped stdio.
	///
	/// # Errors
	///
	/// Returns [`Error::LaunchFailed`] if the process cannot be spawned or
	/// exits right away.
	pub async fn launch(paths: &DriverPaths) -> Result<Self> {
		let mut cmd = Command::new(&paths.node);
		cmd.arg(&paths.cli_js)
			.arg("run-driver")
			.env("PW_LANG_NAME", LANG_NAME)
			.env("PW_LANG_NAME_VERSION", env!("CARGO_PKG_RUST_VERSION"))
			.env("PW_CLI_DISPLAY_VERSION", env!("CARGO_PKG_VERSION"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("Failed to spawn {}: {e}", paths.node.display())))?;

		// A driver that cannot load cli.js dies immediately; surface that here
		// instead of as a crashed transport.
		tokio::time::sleep(Duration::from_millis(100)).await;
		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(Error::LaunchFailed(format!(
					"Driver process exited immediately with status: {status}"
				)));
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!("Failed to check process status: {e}")));
			}
		}

		tracing::debug!(pid = child.id(), node = %paths.node.display(), "driver launched");
		Ok(Self { child })
	}

	/// Takes the child's stdio and builds a pipe transport over it.
	pub fn take_transport(&mut self) -> Result<TransportParts> {
		let stdin: ChildStdin = self
			.child
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdin already taken".to_string()))?;
		let stdout: ChildStdout = self
			.child
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdout already taken".to_string()))?;

		let (transport, message_rx) = PipeTransport::new(stdin, stdout);
		Ok(transport.into_transport_parts(message_rx))
	}

	pub fn id(&self) -> Option<u32> {
		self.child.id()
	}

	/// Kills the driver and waits up to five seconds for it to be reaped.
	pub async fn shutdown(mut self) -> Result<()> {
		// Closing the pipes first avoids a hang on Windows, where child stdio
		// runs on a blocking pool.
		drop(self.child.stdin.take());
		drop(self.child.stdout.take());

		if let Err(e) = self.child.kill().await {
			if e.kind() != std::io::ErrorKind::InvalidInput {
				return Err(Error::LaunchFailed(format!("Failed to kill driver: {e}")));
			}
		}

		match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
			Ok(Ok(status)) => {
				tracing::debug!(%status, "driver exited");
				Ok(())
			}
			Ok(Err(e)) => Err(Error::LaunchFailed(format!("Failed to wait for driver: {e}"))),
			Err(_) => {
				let _ = self.child.start_kill();
				Err(Error::LaunchFailed(
					"Driver shutdown timeout after 5 seconds".to_string(),
				))
			}
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use std::fs;
	use std::os::unix::fs::PermissionsExt;
	use std::path::Path;

	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	fn write_script(path: &Path, body: &str) {
		fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
		let mut perms = fs::metadata(path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(path, perms).unwrap();
	}

	#[tokio::test]
	async fn immediate_exit_is_launch_failure() {
		let temp = TempDir::new().unwrap();
		let node = temp.path().join("node");
		let cli_js = temp.path().join("cli.js");
		write_script(&node, "exit 3");
		fs::write(&cli_js, "").unwrap();

		let err = DriverProcess::launch(&DriverPaths::new(node, cli_js))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::LaunchFailed(_)), "unexpected: {err:?}");
	}

	#[tokio::test]
	async fn echoing_driver_round_trips_frames() {
		let temp = TempDir::new().unwrap();
		let node = temp.path().join("node");
		let cli_js = temp.path().join("cli.js");
		// `cat` echoes every frame back verbatim.
		write_script(&node, "exec cat");
		fs::write(&cli_js, "").unwrap();

		let mut driver = DriverProcess::launch(&DriverPaths::new(node, cli_js))
			.await
			.unwrap();
		let mut parts = driver.take_transport().unwrap();
		assert!(driver.take_transport().is_err());

		let reader = tokio::spawn(parts.receiver.run());
		let message = json!({"guid": "", "method": "ping", "params": {}});
		parts.sender.send(message.clone()).await.unwrap();
		assert_eq!(parts.message_rx.recv().await.unwrap(), message);

		driver.shutdown().await.unwrap();
		assert!(reader.await.unwrap().is_err());
	}
}
