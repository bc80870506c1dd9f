//! Classification of driver-reported failures.
//!
//! The driver's error channel is free text in the general case, so this is an
//! ordered substring classifier rather than a code lookup. First match wins:
//!
//! 1. no message: generic [`Error::Remote`] carrying the raw value
//! 2. `name == "TimeoutError"`: [`Error::Timeout`]
//! 3. a "closed" phrase (or `TargetClosedError`): [`Error::TargetClosed`]
//! 4. the navigation marker: [`Error::Navigation`]
//! 5. anything else: [`Error::Remote`] with install/API hints rewritten

use pw_protocol::ErrorPayload;
use serde_json::Value;

use crate::error::Error;

const TIMEOUT_ERROR_NAME: &str = "TimeoutError";
const TARGET_CLOSED_ERROR_NAME: &str = "TargetClosedError";

const TARGET_CLOSED_MARKERS: &[&str] = &[
	"Target closed",
	"Target page, context or browser has been closed",
	"Browser has been closed",
	"Browser closed",
	"Context closed",
	"Page closed",
	"browser has disconnected",
];

const NAVIGATION_FAILED_MARKER: &str = "Navigation failed because";

/// Hint text rewritten for Rust callers. Never changes the error kind.
const HINT_REWRITES: &[(&str, &str)] = &[
	(
		"npx playwright install",
		"npx playwright install (or set PLAYWRIGHT_DRIVER_PATH to an installed driver)",
	),
	("page.waitForLoadState", "page.wait_for_load_state"),
	("page.setDefaultTimeout", "page.set_default_timeout"),
	("locator.waitFor", "locator.wait_for"),
	("{ force: true }", "force(true)"),
];

/// Translates a structured driver error into a typed failure.
pub fn translate_error(payload: ErrorPayload) -> Error {
	let ErrorPayload {
		name,
		message,
		stack,
		value,
	} = payload;

	let message = match message {
		Some(message) if !message.is_empty() => message,
		_ => {
			return Error::Remote {
				name: name.unwrap_or_else(|| "Error".to_string()),
				message: value.as_ref().map(render_raw).unwrap_or_default(),
				stack,
				value,
			};
		}
	};

	if name.as_deref() == Some(TIMEOUT_ERROR_NAME) {
		return Error::Timeout(message);
	}

	if name.as_deref() == Some(TARGET_CLOSED_ERROR_NAME)
		|| TARGET_CLOSED_MARKERS
			.iter()
			.any(|marker| message.contains(marker))
	{
		return Error::TargetClosed(message);
	}

	if message.contains(NAVIGATION_FAILED_MARKER) {
		return Error::Navigation(message);
	}

	Error::Remote {
		name: name.unwrap_or_else(|| "Error".to_string()),
		message: rewrite_hints(&message),
		stack,
		value,
	}
}

/// Translates a bare message string.
pub fn translate_message(message: &str) -> Error {
	translate_error(ErrorPayload::message(message))
}

/// Translates the `error` field found inside an otherwise successful result.
///
/// The field is either a bare string or an object shaped like
/// [`ErrorPayload`]; anything else is carried as the raw value.
pub fn translate_result_error(error: &Value) -> Error {
	match error {
		Value::String(message) => translate_message(message),
		Value::Object(_) => {
			let mut payload =
				serde_json::from_value::<ErrorPayload>(error.clone()).unwrap_or_default();
			if payload.message.is_none() && payload.value.is_none() {
				payload.value = Some(error.clone());
			}
			translate_error(payload)
		}
		other => translate_error(ErrorPayload {
			value: Some(other.clone()),
			..ErrorPayload::default()
		}),
	}
}

fn rewrite_hints(message: &str) -> String {
	HINT_REWRITES
		.iter()
		.fold(message.to_string(), |text, (from, to)| {
			if text.contains(from) {
				text.replace(from, to)
			} else {
				text
			}
		})
}

fn render_raw(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
