//! Driver executable resolution.
//!
//! Locates a Node.js executable and the Playwright driver `cli.js`. This is
//! configuration surface only; nothing here speaks the protocol.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::config::DriverOptions;
use crate::error::{Error, Result};

/// Resolved driver entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPaths {
	/// Node.js executable.
	pub node_exe: PathBuf,
	/// Driver CLI script.
	pub cli_js: PathBuf,
}

/// Resolves the driver for `options`, preferring explicit paths.
pub fn resolve_driver(options: &DriverOptions) -> Result<DriverPaths> {
	match (&options.node_exe, &options.cli_js) {
		(Some(node_exe), Some(cli_js)) => Ok(DriverPaths {
			node_exe: node_exe.clone(),
			cli_js: cli_js.clone(),
		}),
		(None, Some(cli_js)) => Ok(DriverPaths {
			node_exe: find_node_executable()?,
			cli_js: cli_js.clone(),
		}),
		_ => get_driver_executable(),
	}
}

/// Locates the Playwright driver.
///
/// Search order:
/// 1. `PLAYWRIGHT_NODE_EXE` and `PLAYWRIGHT_CLI_JS` environment variables
/// 2. `PLAYWRIGHT_DRIVER_PATH` environment variable (a driver directory)
/// 3. Driver directory baked in at compile time (`PLAYWRIGHT_DRIVER_DIR`)
/// 4. Global npm installation (`npm root -g`)
/// 5. Local npm installation (`npm root`)
///
/// # Errors
///
/// Returns [`Error::ServerNotFound`] if no candidate has a runnable node.
pub fn get_driver_executable() -> Result<DriverPaths> {
	let candidates: [(&str, fn() -> Option<DriverPaths>); 5] = [
		("PLAYWRIGHT_NODE_EXE/PLAYWRIGHT_CLI_JS", try_node_cli_env),
		("PLAYWRIGHT_DRIVER_PATH", try_driver_path_env),
		("bundled driver", try_bundled_driver),
		("npm global", || try_npm_root(&["root", "-g"])),
		("npm local", || try_npm_root(&["root"])),
	];

	for (label, probe) in candidates {
		if let Some(paths) = probe() {
			if let Some(paths) = resolve_candidate_with_fallback(label, paths, find_node_executable)
			{
				return Ok(paths);
			}
		}
	}

	Err(Error::ServerNotFound)
}

/// Platform-specific file name of the node binary inside a driver directory.
pub fn node_binary_name() -> &'static str {
	if cfg!(windows) { "node.exe" } else { "node" }
}

/// Driver layout: `<dir>/node` next to `<dir>/package/cli.js`.
fn driver_dir_paths(driver_dir: &Path) -> Option<DriverPaths> {
	let node_exe = driver_dir.join(node_binary_name());
	let cli_js = driver_dir.join("package").join("cli.js");
	(node_exe.exists() && cli_js.exists()).then_some(DriverPaths { node_exe, cli_js })
}

fn resolve_candidate_with_fallback<F>(
	label: &str,
	paths: DriverPaths,
	find_node: F,
) -> Option<DriverPaths>
where
	F: Fn() -> Result<PathBuf>,
{
	let usable = node_is_usable(&paths.node_exe);
	debug!(
		target = "pw",
		source = label,
		node = %paths.node_exe.display(),
		cli = %paths.cli_js.display(),
		usable,
		"driver candidate"
	);
	if usable {
		return Some(paths);
	}

	warn!(
		target = "pw",
		source = label,
		node = %paths.node_exe.display(),
		"Driver candidate node is not runnable; trying fallback node"
	);

	let fallback_node = find_node().ok()?;
	if fallback_node == paths.node_exe || !node_is_usable(&fallback_node) {
		return None;
	}

	Some(DriverPaths {
		node_exe: fallback_node,
		cli_js: paths.cli_js,
	})
}

fn try_bundled_driver() -> Option<DriverPaths> {
	driver_dir_paths(Path::new(option_env!("PLAYWRIGHT_DRIVER_DIR")?))
}

fn try_driver_path_env() -> Option<DriverPaths> {
	let driver_path = std::env::var_os("PLAYWRIGHT_DRIVER_PATH")?;
	driver_dir_paths(Path::new(&driver_path))
}

fn try_node_cli_env() -> Option<DriverPaths> {
	let node_exe = PathBuf::from(std::env::var_os("PLAYWRIGHT_NODE_EXE")?);
	let cli_js = PathBuf::from(std::env::var_os("PLAYWRIGHT_CLI_JS")?);
	(node_exe.exists() && cli_js.exists()).then_some(DriverPaths { node_exe, cli_js })
}

fn try_npm_root(args: &[&str]) -> Option<DriverPaths> {
	let output = Command::new("npm").args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let npm_root = String::from_utf8_lossy(&output.stdout).trim().to_string();
	let node_modules = PathBuf::from(npm_root);
	if !node_modules.exists() {
		return None;
	}
	find_playwright_in_node_modules(&node_modules)
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

fn find_playwright_in_node_modules(node_modules: &Path) -> Option<DriverPaths> {
	let playwright_dirs = [
		node_modules.join("playwright-core"),
		node_modules.join("playwright"),
		node_modules.join("@playwright").join("test"),
	];

	let cli_js = playwright_dirs
		.iter()
		.map(|dir| dir.join("cli.js"))
		.find(|cli_js| cli_js.exists())?;

	Some(DriverPaths {
		node_exe: find_node_executable().ok()?,
		cli_js,
	})
}

/// Finds the node executable in PATH or common locations.
fn find_node_executable() -> Result<PathBuf> {
	#[cfg(not(windows))]
	let which_cmd = "which";
	#[cfg(windows)]
	let which_cmd = "where";

	if let Ok(output) = Command::new(which_cmd).arg("node").output() {
		if output.status.success() {
			let stdout = String::from_utf8_lossy(&output.stdout);
			if let Some(first) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
				let path = PathBuf::from(first);
				if path.exists() {
					return Ok(path);
				}
			}
		}
	}

	#[cfg(not(windows))]
	let common_locations = [
		"/usr/local/bin/node",
		"/usr/bin/node",
		"/opt/homebrew/bin/node",
		"/opt/local/bin/node",
	];

	#[cfg(windows)]
	let common_locations = [
		"C:\\Program Files\\nodejs\\node.exe",
		"C:\\Program Files (x86)\\nodejs\\node.exe",
	];

	common_locations
		.iter()
		.map(PathBuf::from)
		.find(|path| path.exists())
		.ok_or_else(|| {
			Error::LaunchFailed(
				"Node.js executable not found. Please install Node.js or set PLAYWRIGHT_NODE_EXE."
					.to_string(),
			)
		})
}
