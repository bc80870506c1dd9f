//! One-shot, first-writer-wins closure flag shared by the connection, its
//! registry and everything waiting on either.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Error;

#[derive(Debug)]
pub(crate) struct CloseSignal {
	tx: watch::Sender<Option<Arc<str>>>,
}

impl Default for CloseSignal {
	fn default() -> Self {
		let (tx, _rx) = watch::channel(None);
		Self { tx }
	}
}

impl CloseSignal {
	/// Records `reason` if no reason was recorded yet. Returns `true` for the
	/// call that actually closed.
	pub(crate) fn close(&self, reason: &str) -> bool {
		self.tx.send_if_modified(|current| {
			if current.is_some() {
				return false;
			}
			*current = Some(Arc::from(reason));
			true
		})
	}

	pub(crate) fn reason(&self) -> Option<Arc<str>> {
		self.tx.borrow().clone()
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.tx.borrow().is_some()
	}

	/// The closure failure, if closed.
	pub(crate) fn error(&self) -> Option<Error> {
		self.reason().map(Error::closed)
	}

	/// Resolves with the recorded reason once closed.
	pub(crate) async fn closed(&self) -> Arc<str> {
		let mut rx = self.tx.subscribe();
		loop {
			if let Some(reason) = rx.borrow_and_update().clone() {
				return reason;
			}
			if rx.changed().await.is_err() {
				return Arc::from("connection dropped");
			}
		}
	}
}
