//! Error types for the pwire runtime.
//!
//! [`Error`] is `Clone` because a settled rejection is observed by every
//! waiter of the same [`Promise`](crate::Promise).

use std::sync::Arc;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the pwire runtime.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Driver executable was not found.
	#[error("Driver not found. Install with: npm install playwright, or set PLAYWRIGHT_DRIVER_PATH")]
	ServerNotFound,

	/// Failed to launch the driver process.
	#[error("Failed to launch driver: {0}. Check that Node.js is installed.")]
	LaunchFailed(String),

	/// Failed to establish a connection with the driver.
	#[error("Failed to connect to driver: {0}")]
	ConnectionFailed(String),

	/// Transport-level failure other than a gone peer.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// The object graph is desynchronized (unknown guid, unmatched response id,
	/// malformed lifecycle event). The connection is terminated.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The remote engine reported a failure for a specific call.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g., "Error", "TargetClosedError")
		name: String,
		message: String,
		/// Engine-side stack trace (if available)
		stack: Option<String>,
	},

	#[error("I/O error: {0}")]
	Io(Arc<std::io::Error>),

	#[error("JSON error: {0}")]
	Json(Arc<serde_json::Error>),

	/// Deadline exceeded, either reported by the engine or raised by a local waiter.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The transport died while calls were outstanding.
	#[error("Driver crashed: {0}")]
	DriverCrashed(String),

	/// The peer is already gone; writes cannot be delivered.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// A call was issued on a handle that has been disposed.
	#[error("Object disposed: cannot call '{method}' on {guid}")]
	ObjectDisposed { guid: String, method: String },

	/// A target went away while something was waiting on it.
	#[error("Target closed: Cannot perform operation on closed {target_type}. {context}")]
	TargetClosed {
		target_type: String,
		context: String,
	},

	/// Object not found in the connection registry.
	#[error("Object not found: {guid}{}", expected.map(|t| format!(" (expected {})", t)).unwrap_or_default())]
	ObjectNotFound {
		guid: String,
		expected: Option<&'static str>,
	},

	/// The engine announced a remote class this client build does not know.
	#[error("Unknown protocol object type: {0}")]
	UnknownObjectType(String),

	/// A second settlement was attempted on a promise.
	#[error("Promise already settled")]
	AlreadySettled,

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// A second decision was attempted on an intercepted route.
	#[error("Route is already handled!")]
	RouteAlreadyHandled,

	/// A wait was abandoned before anything settled it.
	#[error("Cancelled: {0}")]
	Cancelled(String),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Io(Arc::new(err))
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(Arc::new(err))
	}
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			Error::Timeout(_) => Some("TimeoutError"),
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
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed { .. } => true,
			Error::Remote { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}

	/// Returns true when the peer is gone, so the failure is expected during teardown.
	pub fn is_disconnected(&self) -> bool {
		matches!(self, Error::ChannelClosed | Error::DriverCrashed(_))
	}

	/// Returns true when a wait or route decision was abandoned rather than failed.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled(_))
	}

	/// Returns true for failures that mean the local object graph can no longer be trusted.
	pub fn is_protocol_violation(&self) -> bool {
		matches!(self, Error::ProtocolError(_) | Error::UnknownObjectType(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remote_timeout_is_timeout() {
		let err = Error::Remote {
			name: "TimeoutError".to_string(),
			message: "late".to_string(),
			stack: None,
		};
		assert!(err.is_timeout());
		assert!(!err.is_disconnected());
	}

	#[test]
	fn disconnected_classification() {
		assert!(Error::ChannelClosed.is_disconnected());
		assert!(Error::DriverCrashed("eof".to_string()).is_disconnected());
		assert!(!Error::Timeout("x".to_string()).is_disconnected());
	}

	#[test]
	fn io_errors_convert_and_clone() {
		let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
		let copy = err.clone();
		assert_eq!(err.to_string(), copy.to_string());
		assert!(err.to_string().contains("boom"));
	}

	#[test]
	fn object_not_found_message_includes_expected_type() {
		let err = Error::ObjectNotFound {
			guid: "page@1".to_string(),
			expected: Some("Page"),
		};
		assert_eq!(err.to_string(), "Object not found: page@1 (expected Page)");
	}

	#[test]
	fn route_decision_errors_are_distinct() {
		assert_eq!(Error::RouteAlreadyHandled.to_string(), "Route is already handled!");
		assert!(!Error::RouteAlreadyHandled.is_cancelled());

		let cancelled = Error::Cancelled("route action dropped".to_string());
		assert!(cancelled.is_cancelled());
		assert!(!cancelled.is_disconnected());
		assert!(!cancelled.is_timeout());
	}
}
