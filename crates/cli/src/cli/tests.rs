use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::*;

#[test]
fn parse_objects_command() {
	let cli = Cli::try_parse_from(["pwire", "objects"]).unwrap();
	assert!(matches!(cli.command, Commands::Objects));
	assert_eq!(cli.verbose, 0);
	assert!(cli.ws.is_none());
}

#[test]
fn parse_call_with_default_params() {
	let cli = Cli::try_parse_from(["pwire", "call", "browser@1", "version"]).unwrap();

	match cli.command {
		Commands::Call(args) => {
			assert_eq!(args.guid, "browser@1");
			assert_eq!(args.method, "version");
			assert_eq!(args.params, "{}");
		}
		_ => panic!("Expected Call command"),
	}
}

#[test]
fn parse_call_on_root_with_params() {
	let cli = Cli::try_parse_from(["pwire", "call", "", "initialize", r#"{"sdkLanguage":"rust"}"#])
		.unwrap();

	match cli.command {
		Commands::Call(args) => {
			assert_eq!(args.guid, "");
			assert_eq!(args.params, r#"{"sdkLanguage":"rust"}"#);
		}
		_ => panic!("Expected Call command"),
	}
}

#[test]
fn parse_wait_with_timeout() {
	let cli = Cli::try_parse_from(["pwire", "-vv", "wait", "page@1", "load", "--timeout-ms", "250"])
		.unwrap();
	assert_eq!(cli.verbose, 2);

	match cli.command {
		Commands::Wait(args) => {
			assert_eq!(args.guid, "page@1");
			assert_eq!(args.event, "load");
			assert_eq!(args.timeout(), Duration::from_millis(250));
		}
		_ => panic!("Expected Wait command"),
	}
}

#[test]
fn wait_timeout_defaults_to_thirty_seconds() {
	let cli = Cli::try_parse_from(["pwire", "wait", "page@1", "close"]).unwrap();
	match cli.command {
		Commands::Wait(args) => assert_eq!(args.timeout(), Duration::from_secs(30)),
		_ => panic!("Expected Wait command"),
	}
}

#[test]
fn driver_paths_map_onto_config() {
	let cli = Cli::try_parse_from([
		"pwire",
		"--node",
		"/opt/node/bin/node",
		"--cli-js",
		"/opt/driver/package/cli.js",
		"--sdk-language",
		"javascript",
		"--init-timeout-ms",
		"0",
		"objects",
	])
	.unwrap();

	let config = cli.client_config().unwrap();
	let driver = config.driver.unwrap();
	assert_eq!(driver.node, PathBuf::from("/opt/node/bin/node"));
	assert_eq!(driver.cli_js, PathBuf::from("/opt/driver/package/cli.js"));
	assert_eq!(config.sdk_language, "javascript");
	assert!(config.init_timeout.is_zero());
}

#[test]
fn node_requires_cli_js() {
	assert!(Cli::try_parse_from(["pwire", "--node", "/usr/bin/node", "objects"]).is_err());
}

#[test]
fn ws_conflicts_with_driver_paths() {
	let args = [
		"pwire",
		"--ws",
		"ws://127.0.0.1:9000",
		"--node",
		"/usr/bin/node",
		"--cli-js",
		"/tmp/cli.js",
		"objects",
	];
	assert!(Cli::try_parse_from(args).is_err());
}
