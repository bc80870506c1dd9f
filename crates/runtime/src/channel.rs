//! RPC proxy for one remote object.
//!
//! A [`Channel`] sends method calls addressed to its object's guid. It holds
//! the connection weakly: objects live inside the connection's registry, so
//! a strong reference would keep the connection alive forever.

use std::sync::{Arc, Weak};
use std::time::Duration;

use pw_protocol::{HandleRef, SerializedValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::codec::{self, FromValueTree, JsValue, ToValueTree};
use crate::connection::{Connection, ConnectionLike, ResponseMode};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: Weak<dyn ConnectionLike>,
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel").field("guid", &self.guid).finish()
	}
}

impl Channel {
	pub fn new(guid: Arc<str>, connection: Weak<dyn ConnectionLike>) -> Self {
		Self { guid, connection }
	}

	/// A channel with no connection; every call fails as closed.
	pub fn detached(guid: Arc<str>) -> Self {
		let connection: Weak<dyn ConnectionLike> = Weak::<Connection>::new();
		Self { guid, connection }
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn connection(&self) -> Result<Arc<dyn ConnectionLike>> {
		self.connection
			.upgrade()
			.ok_or_else(|| Error::closed("connection dropped"))
	}

	/// Sends a call with raw JSON params and returns the raw result.
	///
	/// The connection's default call timeout applies when one is configured.
	pub async fn send_raw(&self, method: &str, params: Value, mode: ResponseMode) -> Result<Value> {
		let connection = self.connection()?;
		let call = connection.send_message(&self.guid, method, params, mode);
		match connection.options().call_timeout {
			Some(timeout) => tokio::time::timeout(timeout, call)
				.await
				.map_err(|_| timeout_error(&self.guid, method, timeout))?,
			None => call.await,
		}
	}

	/// Sends a call with serde params and deserializes the result.
	pub async fn send<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
		let params = serde_json::to_value(params)?;
		let result = self.send_raw(method, params, ResponseMode::Envelope).await?;
		serde_json::from_value(result).map_err(Into::into)
	}

	pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
		self.send(method, json!({})).await
	}

	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		let _: Value = self.send(method, params).await?;
		Ok(())
	}

	/// Sends a call and resolves every `{"guid": ..}` in the result to the
	/// registered object, waiting for creations that have not arrived yet.
	pub async fn send_resolved<P: Serialize>(&self, method: &str, params: P) -> Result<JsValue> {
		let params = serde_json::to_value(params)?;
		let result = self.send_raw(method, params, ResponseMode::Envelope).await?;
		self.resolve_result(result).await
	}

	/// Encodes `arg` as a value tree, sends it as `{"arg": ..}`, and decodes
	/// the result into `R`.
	///
	/// A result carrying `value` is read as a value tree; anything else is
	/// resolved as plain JSON.
	pub async fn call<A, R>(&self, method: &str, arg: &A) -> Result<R>
	where
		A: ToValueTree + ?Sized,
		R: FromValueTree,
	{
		let arg = codec::serialize_argument(arg)?;
		let params = json!({ "arg": serde_json::to_value(&arg)? });
		let result = self.send_raw(method, params, ResponseMode::Envelope).await?;
		self.decode_result(result).await
	}

	async fn decode_result<R: FromValueTree>(&self, mut result: Value) -> Result<R> {
		let tree = match result.as_object_mut().and_then(|map| map.remove("value")) {
			Some(tree) => tree,
			None => return R::from_value_tree(self.resolve_result(result).await?),
		};

		let value = SerializedValue::from_json(&tree);
		let handles: Vec<HandleRef> = match result.get("handles") {
			Some(handles) => serde_json::from_value(handles.clone())?,
			None => Vec::new(),
		};

		let connection = self.connection()?;
		let timeout = connection.options().object_wait_timeout;
		for handle in &handles {
			if connection.get_object(&handle.guid).is_none() {
				connection.wait_for_object(&handle.guid, timeout).await?;
			}
		}
		codec::parse_result(&value, &handles, &*connection)
	}

	async fn resolve_result(&self, result: Value) -> Result<JsValue> {
		let connection = self.connection()?;
		let timeout = connection.options().object_wait_timeout;

		let mut guids = Vec::new();
		codec::collect_guid_refs(&result, &mut guids);
		for guid in &guids {
			if connection.get_object(guid).is_none() {
				connection.wait_for_object(guid, timeout).await?;
			}
		}
		codec::resolve_guid_refs(result, &*connection)
	}
}

pub(crate) fn timeout_error(guid: &str, method: &str, timeout: Duration) -> Error {
	Error::Timeout(format!(
		"{method} on {guid} exceeded {}ms",
		timeout.as_millis()
	))
}
