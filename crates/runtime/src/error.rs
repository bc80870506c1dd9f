//! Error types for the Playwright runtime.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Playwright runtime.
///
/// `Clone` so a single closure reason can be handed to every outstanding
/// request and waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Playwright driver was not found.
	#[error("Playwright driver not found. Install with: npm install playwright")]
	ServerNotFound,

	/// Failed to launch the driver process.
	#[error("Failed to launch Playwright driver: {0}. Check that Node.js is installed.")]
	LaunchFailed(String),

	/// Frame-level I/O failure or EOF on the driver pipes.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Malformed or unexpected message from the driver.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// Generic application failure reported by the driver.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g., "Error")
		name: String,
		/// Human-readable message, possibly with rewritten hints
		message: String,
		/// JavaScript stack trace from the driver (if available)
		stack: Option<String>,
		/// Raw thrown value when the driver reported no message
		value: Option<Value>,
	},

	/// Operation timed out, either in the driver or while waiting locally.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Browser, context or page the call targeted has been closed.
	#[error("Target closed: {0}")]
	TargetClosed(String),

	/// Navigation failed in the browser.
	#[error("Navigation failed: {0}")]
	Navigation(String),

	/// Argument graph contains itself.
	#[error("Argument is a circular structure at '{path}'")]
	CircularStructure {
		/// Path from the argument root to the repeated object
		path: String,
	},

	/// Invalid argument provided to a call.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Connection has been closed; `reason` is the first recorded cause.
	#[error("Connection closed: {reason}")]
	ConnectionClosed {
		reason: Arc<str>,
	},

	/// Object not found in the registry.
	#[error("Object not found: {guid}")]
	ObjectNotFound {
		guid: String,
	},

	/// I/O error outside the framed stream (process management, filesystem).
	#[error("I/O error: {0}")]
	Io(String),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(String),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Io(err.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(err.to_string())
	}
}

impl From<pw_protocol::FrameError> for Error {
	fn from(err: pw_protocol::FrameError) -> Self {
		Error::Transport(err.to_string())
	}
}

impl Error {
	/// Closure failure carrying `reason`.
	pub fn closed(reason: impl Into<Arc<str>>) -> Self {
		Error::ConnectionClosed {
			reason: reason.into(),
		}
	}

	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the target or the whole connection is gone.
	pub fn is_target_closed(&self) -> bool {
		matches!(self, Error::TargetClosed(_) | Error::ConnectionClosed { .. })
	}

	/// Returns true if this is a navigation failure.
	pub fn is_navigation(&self) -> bool {
		matches!(self, Error::Navigation(_))
	}

	/// Returns true if this failure came from connection closure.
	pub fn is_connection_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed { .. })
	}
}
