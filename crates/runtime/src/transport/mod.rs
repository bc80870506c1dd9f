//! Framed transport over a pair of byte streams.
//!
//! Frames are a 4-byte little-endian length followed by the payload. The
//! transport treats payloads as opaque bytes; parsing happens in
//! [`Connection`](crate::Connection).
//!
//! A transport is split into two halves so reading and writing never block
//! each other:
//!
//! - [`TransportSender`] writes whole frames. It takes `&mut self`, so exactly
//!   one task owns it and frames can never interleave.
//! - [`TransportReceiver`] runs the read loop and forwards each payload on an
//!   unbounded channel. It returns an error when the stream ends, even
//!   cleanly, since the driver never closes its side voluntarily.

use futures_util::future::BoxFuture;
use pw_protocol::{FRAME_HEADER_LEN, MAX_FRAME_LEN, decode_frame_len, encode_frame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};

#[cfg(test)]
mod tests;

/// Write half of a transport.
pub trait TransportSender: Send {
	/// Writes one complete frame carrying `payload`.
	fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<()>>;

	/// Flushes and closes the write side.
	fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Read half of a transport.
pub trait TransportReceiver: Send {
	/// Runs the read loop until the stream ends or fails.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Both halves plus the channel inbound payloads arrive on.
pub struct TransportParts {
	pub sender: Box<dyn TransportSender>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Transport over a subprocess's stdin (write) and stdout (read).
pub struct PipeTransport<W, R> {
	sender: PipeTransportSender<W>,
	receiver: PipeTransportReceiver<R>,
}

/// Write half of [`PipeTransport`].
pub struct PipeTransportSender<W> {
	stdin: W,
}

/// Read half of [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	stdout: R,
	message_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport and the receiver its inbound payloads arrive on.
	pub fn new(stdin: W, stdout: R) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let transport = Self {
			sender: PipeTransportSender { stdin },
			receiver: PipeTransportReceiver { stdout, message_tx },
		};
		(transport, message_rx)
	}

	/// Splits into independently owned halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	/// Splits into the boxed form [`Connection`](crate::Connection) consumes.
	pub fn into_transport_parts(
		self,
		message_rx: mpsc::UnboundedReceiver<Vec<u8>>,
	) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}

	/// Sends one frame without splitting the transport.
	pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
		self.sender.write_frame(payload).await
	}

	/// Runs the read loop without splitting the transport.
	pub async fn run(&mut self) -> Result<()> {
		self.receiver.read_loop().await
	}
}

impl<W> PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
		let frame = encode_frame(payload)?;
		trace!(target = "pw", bytes = payload.len(), "frame out");
		self.stdin
			.write_all(&frame)
			.await
			.map_err(|e| Error::Transport(format!("Failed to write frame: {e}")))?;
		self.stdin
			.flush()
			.await
			.map_err(|e| Error::Transport(format!("Failed to flush frame: {e}")))
	}
}

impl<W> TransportSender for PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.write_frame(payload))
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.stdin
				.shutdown()
				.await
				.map_err(|e| Error::Transport(format!("Failed to close stdin: {e}")))
		})
	}
}

impl<R> PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	async fn read_loop(&mut self) -> Result<()> {
		loop {
			let mut header = [0u8; FRAME_HEADER_LEN];
			self.stdout
				.read_exact(&mut header)
				.await
				.map_err(|e| Error::Transport(format!("Failed to read length prefix: {e}")))?;

			let len = decode_frame_len(header);
			if len > MAX_FRAME_LEN {
				return Err(Error::Transport(format!(
					"Frame length {len} exceeds limit of {MAX_FRAME_LEN} bytes"
				)));
			}
			let mut payload = vec![0u8; len];
			self.stdout.read_exact(&mut payload).await.map_err(|e| {
				Error::Transport(format!("Failed to read frame body of {len} bytes: {e}"))
			})?;

			trace!(target = "pw", bytes = len, "frame in");

			if self.message_tx.send(payload).is_err() {
				debug!(target = "pw", "inbound channel closed, stopping read loop");
				return Ok(());
			}
		}
	}
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move { self.read_loop().await })
	}
}
