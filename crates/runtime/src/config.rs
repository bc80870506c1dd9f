//! Connection and driver configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default time to wait for an object the driver has not announced yet.
pub const DEFAULT_OBJECT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Launch argument that puts the driver CLI into RPC-server mode.
pub const RUN_DRIVER_ARG: &str = "run-driver";

/// Language reported in `initialize`. The driver only accepts the languages it
/// ships client libraries for.
pub const DEFAULT_SDK_LANGUAGE: &str = "javascript";

/// Tunables for a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
	/// Timeout applied by [`Channel`](crate::Channel) calls; `None` waits until
	/// the driver answers or the connection closes.
	pub call_timeout: Option<Duration>,
	/// How long result decoding waits for a referenced guid to be created.
	pub object_wait_timeout: Duration,
	/// `sdkLanguage` sent with `initialize`.
	pub sdk_language: String,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			call_timeout: None,
			object_wait_timeout: DEFAULT_OBJECT_WAIT_TIMEOUT,
			sdk_language: DEFAULT_SDK_LANGUAGE.to_string(),
		}
	}
}

impl ConnectionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = Some(timeout);
		self
	}

	pub fn object_wait_timeout(mut self, timeout: Duration) -> Self {
		self.object_wait_timeout = timeout;
		self
	}

	pub fn sdk_language(mut self, language: impl Into<String>) -> Self {
		self.sdk_language = language.into();
		self
	}
}

/// How to start the driver subprocess.
///
/// Unset paths are resolved with [`get_driver_executable`](crate::driver::get_driver_executable).
#[derive(Debug, Clone)]
pub struct DriverOptions {
	/// Node.js executable.
	pub node_exe: Option<PathBuf>,
	/// Driver `cli.js` entry point.
	pub cli_js: Option<PathBuf>,
	/// Argument selecting RPC-server mode.
	pub launch_arg: String,
	/// Value reported to the driver as `PW_LANG_NAME`.
	pub client_name: String,
	/// Extra environment for the child.
	pub env: Vec<(String, String)>,
	/// Working directory for the child.
	pub cwd: Option<PathBuf>,
}

impl Default for DriverOptions {
	fn default() -> Self {
		Self {
			node_exe: None,
			cli_js: None,
			launch_arg: RUN_DRIVER_ARG.to_string(),
			client_name: "rust".to_string(),
			env: Vec::new(),
			cwd: None,
		}
	}
}

impl DriverOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses an explicit node executable and driver entry point.
	pub fn executable(mut self, node_exe: impl Into<PathBuf>, cli_js: impl Into<PathBuf>) -> Self {
		self.node_exe = Some(node_exe.into());
		self.cli_js = Some(cli_js.into());
		self
	}

	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.push((key.into(), value.into()));
		self
	}

	pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let options = ConnectionOptions::default();
		assert_eq!(options.call_timeout, None);
		assert_eq!(options.object_wait_timeout, DEFAULT_OBJECT_WAIT_TIMEOUT);
		assert_eq!(options.sdk_language, "javascript");

		let driver = DriverOptions::default();
		assert_eq!(driver.launch_arg, "run-driver");
		assert_eq!(driver.client_name, "rust");
	}

	#[test]
	fn test_builders() {
		let options = ConnectionOptions::new()
			.call_timeout(Duration::from_secs(5))
			.object_wait_timeout(Duration::from_millis(250));
		assert_eq!(options.call_timeout, Some(Duration::from_secs(5)));
		assert_eq!(options.object_wait_timeout, Duration::from_millis(250));

		let driver = DriverOptions::new()
			.executable("/usr/bin/node", "/opt/driver/package/cli.js")
			.env("DEBUG", "pw:protocol");
		assert_eq!(driver.node_exe, Some(PathBuf::from("/usr/bin/node")));
		assert_eq!(driver.env, vec![("DEBUG".to_string(), "pw:protocol".to_string())]);
	}
}
