//! Guid registry with per-guid notification.
//!
//! Uses [`DashMap`] for concurrent access from callers while the dispatch
//! task is the only writer. Per-guid [`Notify`] wakes only the relevant
//! waiters, and [`ObjectStore::wait_for`] registers its waiter before checking
//! so a creation racing the check is never lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use super::closure::CloseSignal;
use crate::error::{Error, Result};
use crate::remote_object::RemoteObject;

/// Registry of live remote objects by guid.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Arc<RemoteObject>>,
	waiters: DashMap<Arc<str>, Arc<Notify>>,
	close: Arc<CloseSignal>,
}

impl ObjectStore {
	pub(crate) fn new(close: Arc<CloseSignal>) -> Self {
		Self {
			objects: DashMap::new(),
			waiters: DashMap::new(),
			close,
		}
	}

	/// Registers `object` under its guid and wakes anyone waiting for it.
	pub(crate) fn insert(&self, object: Arc<RemoteObject>) {
		let guid = Arc::clone(object.guid_arc());
		self.objects.insert(Arc::clone(&guid), object);
		if let Some((_, notify)) = self.waiters.remove(&guid) {
			notify.notify_waiters();
		}
	}

	pub(crate) fn remove(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.objects.remove(guid).map(|(_, object)| object)
	}

	/// O(1) lookup.
	pub fn try_get(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.objects.get(guid).map(|r| Arc::clone(r.value()))
	}

	pub fn contains(&self, guid: &str) -> bool {
		self.objects.contains_key(guid)
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Guids currently registered, in no particular order.
	pub fn guids(&self) -> Vec<Arc<str>> {
		self.objects.iter().map(|r| Arc::clone(r.key())).collect()
	}

	/// Waits until `guid` is registered.
	///
	/// # Errors
	///
	/// [`Error::Timeout`] once `timeout` elapses, [`Error::ConnectionClosed`]
	/// when the connection closes first.
	pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<RemoteObject>> {
		if let Some(obj) = self.try_get(guid) {
			return Ok(obj);
		}

		let g: Arc<str> = Arc::from(guid);
		let deadline = tokio::time::Instant::now() + timeout;
		let _guard = WaiterGuard {
			waiters: &self.waiters,
			guid: Arc::clone(&g),
		};

		loop {
			let notify = self
				.waiters
				.entry(Arc::clone(&g))
				.or_insert_with(|| Arc::new(Notify::new()))
				.clone();
			let notified = notify.notified();

			if let Some(obj) = self.objects.get(&g) {
				return Ok(Arc::clone(obj.value()));
			}
			if let Some(err) = self.close.error() {
				return Err(err);
			}

			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			if remaining.is_zero() {
				return Err(Self::timeout_error(&g));
			}

			tokio::select! {
				biased;
				_ = notified => {}
				reason = self.close.closed() => {
					return Err(Error::closed(reason));
				}
				_ = tokio::time::sleep(remaining) => {
					return Err(Self::timeout_error(&g));
				}
			}
		}
	}

	fn timeout_error(guid: &str) -> Error {
		match guid.split_once('@') {
			Some((kind, _)) if !kind.is_empty() => {
				Error::Timeout(format!("Timeout waiting for {kind} object: {guid}"))
			}
			_ => Error::Timeout(format!("Timeout waiting for object: {guid}")),
		}
	}
}

/// Drops the guid's [`Notify`] once no other waiter holds it. Runs on every
/// exit from [`ObjectStore::wait_for`], cancellation included.
struct WaiterGuard<'a> {
	waiters: &'a DashMap<Arc<str>, Arc<Notify>>,
	guid: Arc<str>,
}

impl Drop for WaiterGuard<'_> {
	fn drop(&mut self) {
		self.waiters
			.remove_if(&self.guid, |_, notify| Arc::strong_count(notify) == 1);
	}
}
