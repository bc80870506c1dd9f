//! Shared harness for connection tests: a scripted driver over in-memory pipes.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use pw_runtime::pw_protocol::encode_frame;
use pw_runtime::{Connection, ConnectionOptions, PipeTransport};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

static TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_test_tracing() {
	TRACING.call_once(|| {
		let filter = tracing_subscriber::EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pw=warn"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.try_init();
	});
}

pub struct ScriptedDriver {
	requests: DuplexStream,
	frames: DuplexStream,
}

impl ScriptedDriver {
	/// Reads the next request frame the client wrote.
	pub async fn next_request(&mut self) -> Value {
		let mut header = [0u8; 4];
		self.requests.read_exact(&mut header).await.unwrap();
		let mut body = vec![0u8; u32::from_le_bytes(header) as usize];
		self.requests.read_exact(&mut body).await.unwrap();
		serde_json::from_slice(&body).unwrap()
	}

	pub async fn send(&mut self, message: Value) {
		let frame = encode_frame(&serde_json::to_vec(&message).unwrap()).unwrap();
		self.frames.write_all(&frame).await.unwrap();
		self.frames.flush().await.unwrap();
	}

	pub async fn respond(&mut self, id: u64, result: Value) {
		self.send(json!({ "id": id, "result": result })).await;
	}

	pub async fn create(&mut self, parent: &str, type_name: &str, guid: &str, initializer: Value) {
		self.send(json!({
			"guid": parent,
			"method": "__create__",
			"params": { "type": type_name, "guid": guid, "initializer": initializer }
		}))
		.await;
	}

	pub async fn dispose(&mut self, guid: &str) {
		self.send(json!({ "guid": guid, "method": "__dispose__", "params": {} }))
			.await;
	}
}

pub fn connect() -> (Arc<Connection>, ScriptedDriver) {
	connect_with(ConnectionOptions::default())
}

pub fn connect_with(options: ConnectionOptions) -> (Arc<Connection>, ScriptedDriver) {
	init_test_tracing();

	let (requests, stdin_write) = duplex(256 * 1024);
	let (stdout_read, frames) = duplex(256 * 1024);
	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let connection = Connection::new(transport.into_transport_parts(message_rx), options);

	(connection, ScriptedDriver { requests, frames })
}
