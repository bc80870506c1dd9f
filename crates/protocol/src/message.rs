//! Message envelope exchanged with the driver.
//!
//! Outbound traffic is always a [`Request`]. Inbound traffic is a [`Message`]:
//! a [`Response`] when an `id` is present, an [`Event`] otherwise.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to every request.
///
/// Contains timing information and optional location data for debugging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	#[serde(rename = "wallTime")]
	pub wall_time: i64,
	/// Whether this is an internal call (not user-facing API)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
	/// Source location where the API was called
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<Location>,
	/// Optional title for the operation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

/// Source code location for a protocol call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
	/// Source file path
	pub file: String,
	/// Line number (1-indexed)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<i32>,
	/// Column number (1-indexed)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column: Option<i32>,
}

impl Metadata {
	/// Creates minimal metadata stamped with the current wall clock.
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or_default();
		Self {
			wall_time,
			internal: Some(false),
			location: None,
			title: None,
		}
	}

	/// Marks the call as internal (not user-facing).
	pub fn internal(mut self) -> Self {
		self.internal = Some(true);
		self
	}

	/// Attaches a human-readable title.
	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = Some(title.into());
		self
	}
}

/// Request sent to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Request id, strictly increasing per connection
	pub id: u32,
	/// Guid of the target object (empty for the root)
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Method name to invoke
	pub method: String,
	/// Method parameters (object or null)
	pub params: Value,
	/// Timing and location information
	pub metadata: Metadata,
}

/// Serde helper for `Arc<str>` serialization.
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

/// Serde helper for `Arc<str>` deserialization.
pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Response to a previously sent [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request this response answers
	pub id: u32,
	/// Success result (mutually exclusive with error)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Structured failure (mutually exclusive with result)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

/// Envelope around a driver-reported failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Driver-reported failure details.
///
/// Every field is optional on the wire; the runtime falls back to the raw
/// `value` when no message is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error type name (e.g. "TimeoutError", "TargetClosedError")
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Human-readable message
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// JavaScript stack trace
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
	/// Raw thrown value when the failure was not an `Error` instance
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
}

impl ErrorPayload {
	/// Payload carrying only a message.
	pub fn message(message: impl Into<String>) -> Self {
		Self {
			message: Some(message.into()),
			..Self::default()
		}
	}

	/// Payload carrying a name and a message.
	pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			message: Some(message.into()),
			..Self::default()
		}
	}
}

/// Event emitted by the driver for the object identified by `guid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// Guid of the object the event targets
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Event method name
	pub method: String,
	/// Event parameters (object or null)
	#[serde(default)]
	pub params: Value,
}

/// Inbound message, discriminated by the presence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (no `id` field)
	Event(Event),
	/// Anything else; the runtime treats this as a protocol failure
	Unknown(Value),
}

/// Params of the `__create__` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
	/// Protocol type tag (e.g. "Browser", "Page")
	#[serde(rename = "type")]
	pub type_name: String,
	/// Guid of the new object
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Initial state of the object
	#[serde(default)]
	pub initializer: Value,
}

/// Params of the `__dispose__` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisposeParams {
	/// `"gc"` when the driver collected the object, absent on close
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

/// Params of the `__adopt__` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptParams {
	/// Guid of the child moving to the event's target
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
}
