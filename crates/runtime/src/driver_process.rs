//! Driver subprocess lifecycle.
//!
//! Spawns `<node> <cli.js> run-driver` with piped stdin/stdout. The child is
//! killed when [`DriverProcess`] is dropped, so an owning
//! [`Connection`](crate::Connection) never leaks it.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::DriverOptions;
use crate::driver::resolve_driver;
use crate::error::{Error, Result};

/// Environment variables forwarded to the driver when set.
const PASSTHROUGH_ENV: &[&str] = &["PLAYWRIGHT_BROWSERS_PATH", "PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD"];

/// Binding identification the driver reports in its user agent.
fn driver_env(options: &DriverOptions) -> [(&'static str, String); 3] {
	[
		("PW_LANG_NAME", options.client_name.clone()),
		("PW_LANG_NAME_VERSION", env!("CARGO_PKG_VERSION").to_string()),
		("PW_CLI_DISPLAY_VERSION", env!("CARGO_PKG_VERSION").to_string()),
	]
}

/// A running driver process.
#[derive(Debug)]
pub struct DriverProcess {
	child: Child,
}

impl DriverProcess {
	/// Spawns the driver and returns it with its stdio pipes.
	///
	/// # Errors
	///
	/// Returns [`Error::ServerNotFound`] if the driver cannot be located and
	/// [`Error::LaunchFailed`] if the process cannot be started or exits
	/// immediately.
	pub async fn launch(options: &DriverOptions) -> Result<(Self, ChildStdin, ChildStdout)> {
		let paths = resolve_driver(options)?;

		let mut cmd = Command::new(&paths.node_exe);
		cmd.arg(&paths.cli_js)
			.arg(&options.launch_arg)
			.envs(driver_env(options))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		for key in PASSTHROUGH_ENV {
			if let Ok(value) = std::env::var(key) {
				cmd.env(key, value);
			}
		}
		for (key, value) in &options.env {
			cmd.env(key, value);
		}
		if let Some(cwd) = &options.cwd {
			cmd.current_dir(cwd);
		}

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("Failed to spawn process: {e}")))?;

		tokio::time::sleep(Duration::from_millis(100)).await;

		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(Error::LaunchFailed(format!(
					"Driver process exited immediately with status: {status}"
				)));
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!(
					"Failed to check process status: {e}"
				)));
			}
		}

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("Driver stdin was not piped".to_string()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("Driver stdout was not piped".to_string()))?;

		debug!(
			target = "pw",
			pid = child.id(),
			node = %paths.node_exe.display(),
			"driver launched"
		);

		Ok((Self { child }, stdin, stdout))
	}

	/// OS process id, if the child is still running.
	pub fn id(&self) -> Option<u32> {
		self.child.id()
	}

	/// Requests termination without waiting for the child to exit.
	pub fn start_kill(&mut self) {
		if let Err(e) = self.child.start_kill() {
			debug!(target = "pw", error = %e, "driver already exited");
		}
	}

	/// Kills the child and reaps it.
	///
	/// On Windows the wait is bounded because tokio services child stdio on a
	/// blocking pool that can stall process cleanup.
	pub async fn shutdown(mut self) -> Result<()> {
		self.start_kill();

		let wait_limit = if cfg!(windows) {
			Duration::from_secs(5)
		} else {
			Duration::from_secs(2)
		};

		match tokio::time::timeout(wait_limit, self.child.wait()).await {
			Ok(Ok(status)) => {
				debug!(target = "pw", %status, "driver exited");
				Ok(())
			}
			Ok(Err(e)) => Err(Error::Io(format!("Failed to wait for driver: {e}"))),
			Err(_) => Err(Error::Timeout(format!(
				"Driver did not exit within {}ms",
				wait_limit.as_millis()
			))),
		}
	}
}
