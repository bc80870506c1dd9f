//! Request/response correlation and event dispatch.
//!
//! A [`Connection`] owns three tasks, spawned at construction:
//!
//! - the **reader** runs the transport's read loop and forwards raw frames;
//! - the **writer** drains the outbound queue into the transport, so frames
//!   from concurrent callers never interleave and are written in admission
//!   order;
//! - the **dispatcher** parses each inbound frame and handles it completely
//!   before reading the next one.
//!
//! # Message flow
//!
//! 1. A caller invokes [`Connection::send_message`] with guid, method and params
//! 2. The connection allocates the next id and registers a pending request
//! 3. The request frame is queued for the writer
//! 4. The dispatcher matches the response by id and completes the request
//!
//! Any transport failure, malformed message or failing event handler closes
//! the connection. Closing fails every pending request and every
//! [`wait_for_object`](Connection::wait_for_object) waiter with
//! [`Error::ConnectionClosed`] carrying the first recorded reason.

pub(crate) mod closure;
mod object_store;


use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use pw_protocol::{
	AdoptParams, CreateParams, DisposeParams, Event, Message, Metadata, Request, Response,
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use self::closure::CloseSignal;
pub use self::object_store::ObjectStore;
use crate::channel::{Channel, timeout_error};
use crate::config::{ConnectionOptions, DriverOptions};
use crate::driver_process::DriverProcess;
use crate::error::{Error, Result};
use crate::error_translator::{translate_error, translate_result_error};
use crate::object_type::{ObjectType, TypeRegistry};
use crate::remote_object::{DisposeReason, RemoteObject};
use crate::transport::{PipeTransport, TransportParts};

/// Where a response's failure may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
	/// Only the envelope's `error` member fails the request.
	#[default]
	Envelope,
	/// An `error` member inside the result fails the request as well.
	ResultErrorField,
}

/// What [`RemoteObject`]s and [`Channel`]s need from their connection.
pub trait ConnectionLike: Send + Sync {
	/// Sends a request and resolves with its raw result.
	fn send_message(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		mode: ResponseMode,
	) -> BoxFuture<'_, Result<Value>>;

	/// Synchronous registry lookup.
	fn get_object(&self, guid: &str) -> Option<Arc<RemoteObject>>;

	/// Waits for `guid` to be created.
	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> BoxFuture<'_, Result<Arc<RemoteObject>>>;

	fn options(&self) -> &ConnectionOptions;
}

struct PendingRequest {
	tx: oneshot::Sender<Result<Value>>,
	mode: ResponseMode,
}

/// Connection to a Playwright driver.
pub struct Connection {
	last_id: AtomicU32,
	pending: Mutex<HashMap<u32, PendingRequest>>,
	outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
	objects: ObjectStore,
	root: Arc<RemoteObject>,
	registry: TypeRegistry,
	close: Arc<CloseSignal>,
	options: ConnectionOptions,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	process: Mutex<Option<DriverProcess>>,
	self_ref: Weak<Connection>,
}

impl Connection {
	/// Starts a connection over `parts` with every known object type.
	///
	/// Must be called inside a Tokio runtime.
	pub fn new(parts: TransportParts, options: ConnectionOptions) -> Arc<Self> {
		Self::with_registry(parts, options, TypeRegistry::default())
	}

	/// Starts a connection that creates objects per `registry`.
	///
	/// Must be called inside a Tokio runtime.
	pub fn with_registry(
		parts: TransportParts,
		options: ConnectionOptions,
		registry: TypeRegistry,
	) -> Arc<Self> {
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
		} = parts;
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
		let close = Arc::new(CloseSignal::default());

		let connection = Arc::new_cyclic(|weak: &Weak<Connection>| {
			let link: Weak<dyn ConnectionLike> = weak.clone();
			let root_guid: Arc<str> = Arc::from("");
			let root = RemoteObject::new(
				Arc::clone(&root_guid),
				ObjectType::Root,
				None,
				Value::Null,
				Channel::new(root_guid, link),
			);
			let objects = ObjectStore::new(Arc::clone(&close));
			objects.insert(Arc::clone(&root));

			Connection {
				last_id: AtomicU32::new(0),
				pending: Mutex::new(HashMap::new()),
				outbound_tx,
				objects,
				root,
				registry,
				close,
				options,
				tasks: Mutex::new(Vec::new()),
				process: Mutex::new(None),
				self_ref: weak.clone(),
			}
		});

		let (reason_tx, reason_rx) = oneshot::channel::<String>();
		let reader = tokio::spawn(async move {
			let reason = match receiver.run().await {
				Ok(()) => "Transport closed".to_string(),
				Err(e) => e.to_string(),
			};
			debug!(target = "pw", %reason, "read loop finished");
			let _ = reason_tx.send(reason);
		});

		let weak = Arc::downgrade(&connection);
		let writer = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				if let Err(e) = sender.send(&frame).await {
					if let Some(connection) = weak.upgrade() {
						connection.shutdown(&e.to_string());
					}
					return;
				}
			}
			if let Err(e) = sender.close().await {
				debug!(target = "pw", error = %e, "closing transport writer");
			}
		});

		let weak = Arc::downgrade(&connection);
		let dispatcher = tokio::spawn(async move {
			while let Some(frame) = message_rx.recv().await {
				let Some(connection) = weak.upgrade() else {
					return;
				};
				if let Err(e) = connection.dispatch_frame(&frame) {
					warn!(target = "pw", error = %e, "fatal dispatch error");
					connection.shutdown(&e.to_string());
					return;
				}
			}
			let reason = reason_rx
				.await
				.unwrap_or_else(|_| "Transport closed".to_string());
			if let Some(connection) = weak.upgrade() {
				connection.shutdown(&reason);
			}
		});

		connection.tasks.lock().extend([reader, writer, dispatcher]);
		connection
	}

	/// Launches the driver subprocess and connects to it over its stdio.
	pub async fn launch(driver: &DriverOptions, options: ConnectionOptions) -> Result<Arc<Self>> {
		let (process, stdin, stdout) = DriverProcess::launch(driver).await?;
		let (transport, message_rx) = PipeTransport::new(stdin, stdout);
		let connection = Self::new(transport.into_transport_parts(message_rx), options);
		*connection.process.lock() = Some(process);
		Ok(connection)
	}

	/// Sends `initialize` to the root and returns the `Playwright` object.
	pub async fn initialize(&self) -> Result<Arc<RemoteObject>> {
		let result = self
			.send_message(
				"",
				"initialize",
				json!({ "sdkLanguage": self.options.sdk_language }),
				ResponseMode::Envelope,
			)
			.await?;
		let guid = result
			.pointer("/playwright/guid")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::Protocol(format!("initialize returned no playwright guid: {result}")))?;
		self.wait_for_object(guid, self.options.object_wait_timeout)
			.await
	}

	/// Sends a request and waits for its response.
	///
	/// Fails immediately if the connection is closed. The request stays
	/// pending until its response arrives or the connection closes.
	pub async fn send_message(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		mode: ResponseMode,
	) -> Result<Value> {
		self.send_with_metadata(guid, method, params, mode, Metadata::now())
			.await
	}

	/// [`send_message`](Self::send_message) with caller-supplied metadata.
	pub async fn send_with_metadata(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		mode: ResponseMode,
		metadata: Metadata,
	) -> Result<Value> {
		if let Some(err) = self.close.error() {
			return Err(err);
		}

		let id = self.next_id();
		let request = Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
			metadata,
		};
		let frame = serde_json::to_vec(&request)?;

		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, PendingRequest { tx, mode });

		// Closure drains `pending` after setting the flag, so an insert that
		// raced it is caught here.
		if let Some(err) = self.close.error() {
			self.pending.lock().remove(&id);
			return Err(err);
		}

		trace!(target = "pw", id, guid, method, "send");
		if self.outbound_tx.send(frame).is_err() {
			self.pending.lock().remove(&id);
			return Err(self.closed_error("Writer stopped"));
		}

		match rx.await {
			Ok(result) => result,
			Err(_) => Err(self.closed_error("Request abandoned")),
		}
	}

	/// Sends a request, failing with [`Error::Timeout`] after `timeout`.
	///
	/// On timeout the request stays registered; a late response is dropped.
	pub async fn send_with_timeout(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		mode: ResponseMode,
		timeout: Duration,
	) -> Result<Value> {
		tokio::time::timeout(timeout, self.send_message(guid, method, params, mode))
			.await
			.map_err(|_| timeout_error(guid, method, timeout))?
	}

	/// Waits until `guid` has been created.
	pub async fn wait_for_object(&self, guid: &str, timeout: Duration) -> Result<Arc<RemoteObject>> {
		self.objects.wait_for(guid, timeout).await
	}

	pub fn get_object(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.objects.try_get(guid)
	}

	/// The synthetic root every top-level object hangs off.
	pub fn root(&self) -> &Arc<RemoteObject> {
		&self.root
	}

	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}

	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	pub fn is_closed(&self) -> bool {
		self.close.is_closed()
	}

	/// The first recorded closure reason.
	pub fn close_reason(&self) -> Option<Arc<str>> {
		self.close.reason()
	}

	/// Resolves once the connection is closed, with the reason.
	pub async fn closed(&self) -> Arc<str> {
		self.close.closed().await
	}

	/// Number of requests awaiting a response.
	pub fn pending_count(&self) -> usize {
		self.pending.lock().len()
	}

	/// Closes the connection and waits for the driver process to exit.
	pub async fn close(&self, reason: &str) -> Result<()> {
		self.shutdown(reason);
		let process = self.process.lock().take();
		match process {
			Some(process) => process.shutdown().await,
			None => Ok(()),
		}
	}

	/// Closes the connection without waiting. Only the first reason is kept;
	/// later calls do nothing.
	pub fn shutdown(&self, reason: &str) {
		if !self.close.close(reason) {
			return;
		}
		info!(target = "pw", reason, "connection closed");

		let reason: Arc<str> = Arc::from(reason);
		let pending: Vec<_> = self.pending.lock().drain().collect();
		for (id, request) in pending {
			trace!(target = "pw", id, "failing pending request");
			let _ = request.tx.send(Err(Error::closed(Arc::clone(&reason))));
		}

		self.root.dispose(DisposeReason::Closed, &self.objects);

		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
		if let Some(process) = self.process.lock().as_mut() {
			process.start_kill();
		}
	}

	fn next_id(&self) -> u32 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	fn closed_error(&self, fallback: &str) -> Error {
		self.close
			.error()
			.unwrap_or_else(|| Error::closed(fallback))
	}

	fn dispatch_frame(&self, frame: &[u8]) -> Result<()> {
		let message: Message = serde_json::from_slice(frame)
			.map_err(|e| Error::Protocol(format!("Malformed message: {e}")))?;
		self.dispatch(message)
	}

	pub(crate) fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				self.complete(response);
				Ok(())
			}
			Message::Event(event) => match event.method.as_str() {
				"__create__" => self.handle_create(event),
				"__dispose__" => self.handle_dispose(event),
				"__adopt__" => self.handle_adopt(event),
				_ => self.deliver(event),
			},
			Message::Unknown(value) => Err(Error::Protocol(format!(
				"Unrecognized message: {value}"
			))),
		}
	}

	fn complete(&self, response: Response) {
		let id = response.id;
		let Some(request) = self.pending.lock().remove(&id) else {
			debug!(target = "pw", id, "response for unknown request ignored");
			return;
		};

		let result = match response.error {
			Some(wrapper) => Err(translate_error(wrapper.error)),
			None => {
				let result = response.result.unwrap_or(Value::Null);
				match result.get("error") {
					Some(error)
						if request.mode == ResponseMode::ResultErrorField && !error.is_null() =>
					{
						Err(translate_result_error(error))
					}
					_ => Ok(result),
				}
			}
		};

		trace!(target = "pw", id, ok = result.is_ok(), "response");
		if request.tx.send(result).is_err() {
			debug!(target = "pw", id, "response arrived after caller gave up");
		}
	}

	fn handle_create(&self, event: Event) -> Result<()> {
		let params: CreateParams = serde_json::from_value(event.params)
			.map_err(|e| Error::Protocol(format!("Malformed __create__: {e}")))?;

		let parent = self.objects.try_get(&event.guid).ok_or_else(|| {
			Error::Protocol(format!(
				"Parent object not found: '{}' for {}",
				event.guid, params.guid
			))
		})?;
		if self.objects.contains(&params.guid) {
			return Err(Error::Protocol(format!(
				"Duplicate guid in __create__: {}",
				params.guid
			)));
		}

		let kind = ObjectType::parse(&params.type_name);
		let hook = match self.registry.hook(&kind) {
			Some(hook) if kind.is_known() => Arc::clone(hook),
			_ => {
				warn!(
					target = "pw",
					type_name = %params.type_name,
					guid = %params.guid,
					"skipping object of unregistered type"
				);
				return Ok(());
			}
		};

		let link: Weak<dyn ConnectionLike> = self.self_ref.clone();
		let object = RemoteObject::new(
			Arc::clone(&params.guid),
			kind,
			Some(&parent),
			params.initializer,
			Channel::new(Arc::clone(&params.guid), link),
		);
		hook(&object)?;

		parent.add_child(Arc::clone(&object));
		self.objects.insert(object);

		debug!(
			target = "pw",
			type_name = %params.type_name,
			guid = %params.guid,
			parent = %event.guid,
			"created"
		);
		Ok(())
	}

	fn handle_dispose(&self, event: Event) -> Result<()> {
		let params: DisposeParams = serde_json::from_value(event.params).unwrap_or_default();
		let reason = DisposeReason::from_wire(params.reason.as_deref());

		match self.objects.try_get(&event.guid) {
			Some(object) => {
				object.dispose(reason, &self.objects);
				debug!(target = "pw", guid = %event.guid, ?reason, "disposed");
			}
			None => debug!(target = "pw", guid = %event.guid, "dispose for unknown object ignored"),
		}
		Ok(())
	}

	fn handle_adopt(&self, event: Event) -> Result<()> {
		let params: AdoptParams = serde_json::from_value(event.params)
			.map_err(|e| Error::Protocol(format!("Malformed __adopt__: {e}")))?;

		let parent = self
			.objects
			.try_get(&event.guid)
			.ok_or_else(|| Error::Protocol(format!("Adopting parent not found: {}", event.guid)))?;
		let child = self
			.objects
			.try_get(&params.guid)
			.ok_or_else(|| Error::Protocol(format!("Adopted child not found: {}", params.guid)))?;

		parent.adopt(&child)
	}

	fn deliver(&self, event: Event) -> Result<()> {
		match self.objects.try_get(&event.guid) {
			Some(object) => {
				trace!(target = "pw", guid = %event.guid, method = %event.method, "event");
				object.deliver_event(&event.method, event.params)
			}
			None => {
				debug!(
					target = "pw",
					guid = %event.guid,
					method = %event.method,
					"event for unknown object ignored"
				);
				Ok(())
			}
		}
	}
}

impl ConnectionLike for Connection {
	fn send_message(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		mode: ResponseMode,
	) -> BoxFuture<'_, Result<Value>> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move { Connection::send_message(self, &guid, &method, params, mode).await })
	}

	fn get_object(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		Connection::get_object(self, guid)
	}

	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> BoxFuture<'_, Result<Arc<RemoteObject>>> {
		let guid = guid.to_string();
		Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
	}

	fn options(&self) -> &ConnectionOptions {
		&self.options
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		for task in self.tasks.get_mut().drain(..) {
			task.abort();
		}
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("objects", &self.objects.len())
			.field("pending", &self.pending_count())
			.field("closed", &self.close.reason())
			.finish()
	}
}
