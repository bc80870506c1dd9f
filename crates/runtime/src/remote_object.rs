//! Local proxy for one driver-side object.
//!
//! Every object the driver announces with `__create__` becomes a
//! [`RemoteObject`]: its guid, type tag, initializer, a [`Channel`] for calls,
//! and its place in the ownership tree. Objects hold strong references to
//! their children and weak references to their parent, so the tree hangs off
//! the connection's root and disposing a node releases its whole subtree.
//!
//! Per-type behavior lives above this crate. Higher layers look objects up by
//! guid, read [`RemoteObject::initializer`] and install an event handler.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::connection::ObjectStore;
use crate::error::{Error, Result};
use crate::object_type::ObjectType;

/// Why an object left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// The driver closed the object, or the connection closed.
	Closed,
	/// The driver garbage-collected the object (`reason: "gc"`).
	GarbageCollected,
}

impl DisposeReason {
	pub fn from_wire(reason: Option<&str>) -> Self {
		match reason {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		}
	}
}

/// Synchronous per-object event handler.
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Event delivered to [`RemoteObject::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
	pub method: String,
	pub params: Value,
}

pub struct RemoteObject {
	guid: Arc<str>,
	object_type: ObjectType,
	parent: Mutex<Option<Weak<RemoteObject>>>,
	children: Mutex<IndexMap<Arc<str>, Arc<RemoteObject>>>,
	initializer: Value,
	channel: Channel,
	handler: Mutex<Option<EventHandler>>,
	subscribers: Mutex<Vec<mpsc::UnboundedSender<ObjectEvent>>>,
	disposed: AtomicBool,
	was_collected: AtomicBool,
}

impl RemoteObject {
	pub(crate) fn new(
		guid: Arc<str>,
		object_type: ObjectType,
		parent: Option<&Arc<RemoteObject>>,
		initializer: Value,
		channel: Channel,
	) -> Arc<Self> {
		Arc::new(Self {
			guid,
			object_type,
			parent: Mutex::new(parent.map(Arc::downgrade)),
			children: Mutex::new(IndexMap::new()),
			initializer,
			channel,
			handler: Mutex::new(None),
			subscribers: Mutex::new(Vec::new()),
			disposed: AtomicBool::new(false),
			was_collected: AtomicBool::new(false),
		})
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub(crate) fn guid_arc(&self) -> &Arc<str> {
		&self.guid
	}

	pub fn object_type(&self) -> &ObjectType {
		&self.object_type
	}

	/// The driver's type tag, e.g. `"Page"`.
	pub fn type_name(&self) -> &str {
		self.object_type.as_str()
	}

	/// The owning object; `None` for the root and for disposed objects whose
	/// parent is gone.
	pub fn parent(&self) -> Option<Arc<RemoteObject>> {
		self.parent.lock().as_ref().and_then(Weak::upgrade)
	}

	/// Direct children in creation order.
	pub fn children(&self) -> Vec<Arc<RemoteObject>> {
		self.children.lock().values().cloned().collect()
	}

	pub fn child(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.children.lock().get(guid).cloned()
	}

	/// Initial state as sent with `__create__`.
	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	/// Deserializes the initializer into a typed shape.
	pub fn initializer_as<T: DeserializeOwned>(&self) -> Result<T> {
		T::deserialize(&self.initializer).map_err(|e| {
			Error::Protocol(format!(
				"Invalid {} initializer for {}: {e}",
				self.type_name(),
				self.guid
			))
		})
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// True if the driver disposed this object with reason `gc`.
	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}

	/// Installs the handler every event for this object is delivered to,
	/// replacing any previous one.
	pub fn set_event_handler<F>(&self, handler: F)
	where
		F: Fn(&str, &Value) + Send + Sync + 'static,
	{
		*self.handler.lock() = Some(Arc::new(handler));
	}

	pub fn clear_event_handler(&self) {
		*self.handler.lock() = None;
	}

	/// Streams this object's events. The receiver ends when the object is
	/// disposed.
	pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ObjectEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		if !self.is_disposed() {
			self.subscribers.lock().push(tx);
		}
		rx
	}

	pub(crate) fn add_child(&self, child: Arc<RemoteObject>) {
		self.children.lock().insert(Arc::clone(&child.guid), child);
	}

	pub(crate) fn remove_child(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.children.lock().shift_remove(guid)
	}

	/// Moves `child` under `self`.
	///
	/// Fails if `self` is `child` or one of its descendants, since the move
	/// would detach a cycle from the tree.
	pub(crate) fn adopt(self: &Arc<Self>, child: &Arc<RemoteObject>) -> Result<()> {
		let mut cursor = Some(Arc::clone(self));
		while let Some(node) = cursor {
			if Arc::ptr_eq(&node, child) {
				return Err(Error::Protocol(format!(
					"Cannot adopt {} into its own subtree at {}",
					child.guid, self.guid
				)));
			}
			cursor = node.parent();
		}

		if let Some(old_parent) = child.parent() {
			old_parent.remove_child(&child.guid);
		}
		*child.parent.lock() = Some(Arc::downgrade(self));
		self.add_child(Arc::clone(child));

		debug!(target = "pw", child = %child.guid, parent = %self.guid, "adopted");
		Ok(())
	}

	/// Disposes children depth-first, then removes `self` from `store` and
	/// from its parent. Repeated calls do nothing.
	pub(crate) fn dispose(&self, reason: DisposeReason, store: &ObjectStore) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}

		let children: Vec<_> = std::mem::take(&mut *self.children.lock())
			.into_values()
			.collect();
		for child in children {
			child.dispose(reason, store);
		}

		store.remove(&self.guid);
		if let Some(parent) = self.parent() {
			parent.remove_child(&self.guid);
		}

		self.handler.lock().take();
		self.subscribers.lock().clear();

		trace!(target = "pw", guid = %self.guid, ?reason, "disposed");
	}

	/// Hands an event to the installed handler and to subscribers.
	///
	/// A panicking handler is reported as a protocol failure.
	pub(crate) fn deliver_event(&self, method: &str, params: Value) -> Result<()> {
		let handler = self.handler.lock().clone();
		let mut delivered = false;

		if let Some(handler) = handler {
			delivered = true;
			catch_unwind(AssertUnwindSafe(|| handler(method, &params))).map_err(|_| {
				Error::Protocol(format!(
					"Event handler for {} panicked on '{method}'",
					self.guid
				))
			})?;
		}

		let mut subscribers = self.subscribers.lock();
		if !subscribers.is_empty() {
			delivered = true;
			subscribers.retain(|tx| {
				tx.send(ObjectEvent {
					method: method.to_string(),
					params: params.clone(),
				})
				.is_ok()
			});
		}

		if !delivered {
			trace!(target = "pw", guid = %self.guid, method, "event without handler");
		}
		Ok(())
	}
}

impl fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.guid)
			.field("type", &self.object_type.as_str())
			.field("children", &self.children.lock().len())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
