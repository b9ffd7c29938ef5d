use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pwire::{ClientConfig, DriverPaths};

use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "pwire")]
#[command(about = "Inspect and drive an automation engine over its object protocol")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Connect to a driver listening on this WebSocket URL instead of launching one
	#[arg(long, global = true, value_name = "URL", conflicts_with_all = ["node", "cli_js"])]
	pub ws: Option<String>,

	/// Node.js executable used to run the driver
	#[arg(long, global = true, value_name = "PATH", requires = "cli_js")]
	pub node: Option<PathBuf>,

	/// Driver entry script (cli.js)
	#[arg(long, global = true, value_name = "PATH", requires = "node")]
	pub cli_js: Option<PathBuf>,

	/// Language reported in the handshake
	#[arg(long, global = true, value_name = "NAME")]
	pub sdk_language: Option<String>,

	/// Handshake deadline in milliseconds (0 waits forever)
	#[arg(long, global = true, value_name = "MS")]
	pub init_timeout_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the mirrored object tree
	Objects,

	/// Call one method on one object and print the result
	Call(CallArgs),

	/// Wait for one event on one object and print its params
	Wait(WaitArgs),
}

#[derive(Args, Debug)]
pub struct CallArgs {
	/// Target object guid ("" is the root)
	pub guid: String,

	/// Method name
	pub method: String,

	/// Parameters as a JSON object
	#[arg(default_value = "{}")]
	pub params: String,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
	/// Object guid to watch
	pub guid: String,

	/// Event name
	pub event: String,

	/// Give up after this many milliseconds (0 waits forever)
	#[arg(long, default_value_t = 30_000)]
	pub timeout_ms: u64,
}

impl WaitArgs {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

impl Cli {
	/// Environment settings overridden by command-line flags.
	pub fn client_config(&self) -> pwire::Result<ClientConfig> {
		let mut config = ClientConfig::from_env()?;
		if let Some(language) = &self.sdk_language {
			config.sdk_language = language.clone();
		}
		if let Some(ms) = self.init_timeout_ms {
			config.init_timeout = Duration::from_millis(ms);
		}
		if let (Some(node), Some(cli_js)) = (&self.node, &self.cli_js) {
			config.driver = Some(DriverPaths::new(node, cli_js));
		}
		Ok(config)
	}
}

#[cfg(test)]
mod tests;
