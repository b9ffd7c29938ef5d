//! Driver discovery.
//!
//! The engine is a Node.js program started as `node cli.js run-driver`.
//! [`discover`] probes the known locations in order and returns the first
//! pair whose node binary actually runs:
//!
//! 1. explicit paths handed in by the caller
//! 2. `PLAYWRIGHT_NODE_EXE` + `PLAYWRIGHT_CLI_JS`
//! 3. `PLAYWRIGHT_DRIVER_PATH` (a directory holding `node` and `package/cli.js`)
//! 4. the global npm root (`npm root -g`)
//! 5. the local npm root (`npm root`)
//!
//! A candidate whose node binary fails `--version` (e.g. a dynamically
//! linked node on NixOS) is retried with the node found on `PATH`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

pub const NODE_EXE_ENV: &str = "PLAYWRIGHT_NODE_EXE";
pub const CLI_JS_ENV: &str = "PLAYWRIGHT_CLI_JS";
pub const DRIVER_PATH_ENV: &str = "PLAYWRIGHT_DRIVER_PATH";

/// Node binary plus the driver entry point it should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPaths {
	pub node: PathBuf,
	pub cli_js: PathBuf,
}

impl DriverPaths {
	pub fn new(node: impl Into<PathBuf>, cli_js: impl Into<PathBuf>) -> Self {
		Self {
			node: node.into(),
			cli_js: cli_js.into(),
		}
	}

	/// Layout of an unpacked driver directory: `<dir>/node` and `<dir>/package/cli.js`.
	pub fn in_driver_dir(dir: &Path) -> Self {
		let node = if cfg!(windows) {
			dir.join("node.exe")
		} else {
			dir.join("node")
		};
		Self::new(node, dir.join("package").join("cli.js"))
	}

	fn exists(&self) -> bool {
		self.node.exists() && self.cli_js.exists()
	}
}

/// Where a driver candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSource {
	Explicit,
	NodeCliEnv,
	DriverPathEnv,
	NpmGlobal,
	NpmLocal,
}

impl fmt::Display for DriverSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			DriverSource::Explicit => "explicit paths",
			DriverSource::NodeCliEnv => "PLAYWRIGHT_NODE_EXE/PLAYWRIGHT_CLI_JS",
			DriverSource::DriverPathEnv => "PLAYWRIGHT_DRIVER_PATH",
			DriverSource::NpmGlobal => "npm global",
			DriverSource::NpmLocal => "npm local",
		};
		f.write_str(label)
	}
}

const SEARCH_ORDER: [DriverSource; 4] = [
	DriverSource::NodeCliEnv,
	DriverSource::DriverPathEnv,
	DriverSource::NpmGlobal,
	DriverSource::NpmLocal,
];

/// Locates a runnable driver.
///
/// # Errors
///
/// Returns [`Error::ServerNotFound`] if no location yields a runnable pair.
pub fn discover(explicit: Option<&DriverPaths>) -> Result<DriverPaths> {
	if let Some(paths) = explicit {
		if paths.exists() {
			if let Some(found) =
				resolve_with_fallback(DriverSource::Explicit, paths.clone(), find_node_executable)
			{
				return Ok(found);
			}
		} else {
			tracing::warn!(
				node = %paths.node.display(),
				cli_js = %paths.cli_js.display(),
				"explicit driver paths do not exist; searching defaults"
			);
		}
	}

	for source in SEARCH_ORDER {
		let Some(candidate) = locate(source) else {
			continue;
		};
		if let Some(found) = resolve_with_fallback(source, candidate, find_node_executable) {
			tracing::debug!(%source, node = %found.node.display(), cli_js = %found.cli_js.display(), "driver found");
			return Ok(found);
		}
	}

	Err(Error::ServerNotFound)
}

fn locate(source: DriverSource) -> Option<DriverPaths> {
	match source {
		DriverSource::Explicit => None,
		DriverSource::NodeCliEnv => {
			let node = std::env::var_os(NODE_EXE_ENV)?;
			let cli_js = std::env::var_os(CLI_JS_ENV)?;
			Some(DriverPaths::new(node, cli_js)).filter(DriverPaths::exists)
		}
		DriverSource::DriverPathEnv => {
			let dir = PathBuf::from(std::env::var_os(DRIVER_PATH_ENV)?);
			Some(DriverPaths::in_driver_dir(&dir)).filter(DriverPaths::exists)
		}
		DriverSource::NpmGlobal => npm_root(&["root", "-g"]).and_then(|root| in_node_modules(&root)),
		DriverSource::NpmLocal => npm_root(&["root"]).and_then(|root| in_node_modules(&root)),
	}
}

fn resolve_with_fallback<F>(source: DriverSource, candidate: DriverPaths, find_node: F) -> Option<DriverPaths>
where
	F: Fn() -> Result<PathBuf>,
{
	if node_is_usable(&candidate.node) {
		return Some(candidate);
	}

	tracing::warn!(
		%source,
		node = %candidate.node.display(),
		"driver candidate node is not runnable; trying fallback node"
	);

	let fallback = find_node().ok()?;
	if fallback == candidate.node || !node_is_usable(&fallback) {
		return None;
	}

	tracing::warn!(%source, node = %fallback.display(), "using fallback node executable");
	Some(DriverPaths::new(fallback, candidate.cli_js))
}

fn npm_root(args: &[&str]) -> Option<PathBuf> {
	let output = Command::new("npm").args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
	root.exists().then_some(root)
}

/// Finds the driver entry point of an installed `playwright` package.
fn in_node_modules(node_modules: &Path) -> Option<DriverPaths> {
	let cli_js = [
		node_modules.join("playwright").join("cli.js"),
		node_modules.join("playwright-core").join("cli.js"),
		node_modules.join("@playwright").join("test").join("cli.js"),
	]
	.into_iter()
	.find(|p| p.exists())?;

	let node = find_node_executable().ok()?;
	Some(DriverPaths::new(node, cli_js))
}

fn node_is_usable(node: &Path) -> bool {
	Command::new(node)
		.arg("--version")
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

/// Finds `node` on `PATH` or in common install locations.
pub fn find_node_executable() -> Result<PathBuf> {
	find_node_in(std::env::var_os("PATH"))
}

/// Like [`find_node_executable`], searching `search_path` instead of `PATH`.
fn find_node_in(search_path: Option<OsString>) -> Result<PathBuf> {
	let cwd = std::env::current_dir().unwrap_or_default();
	match which::which_in("node", search_path, cwd) {
		Ok(path) => return Ok(path),
		Err(err) => tracing::debug!(error = %err, "node not found on search path"),
	}

	let common: &[&str] = if cfg!(windows) {
		&[
			"C:\\Program Files\\nodejs\\node.exe",
			"C:\\Program Files (x86)\\nodejs\\node.exe",
		]
	} else {
		&[
			"/usr/local/bin/node",
			"/usr/bin/node",
			"/opt/homebrew/bin/node",
			"/opt/local/bin/node",
		]
	};

	common
		.iter()
		.map(PathBuf::from)
		.find(|p| p.exists())
		.ok_or_else(|| {
			Error::LaunchFailed(format!(
				"Node.js executable not found. Install Node.js or set {NODE_EXE_ENV}."
			))
		})
}
