use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) {
	writer
		.write_all(&(payload.len() as u32).to_le_bytes())
		.await
		.unwrap();
	writer.write_all(payload).await.unwrap();
	writer.flush().await.unwrap();
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
	let mut len_buf = [0u8; 4];
	reader.read_exact(&mut len_buf).await.unwrap();
	let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
	reader.read_exact(&mut payload).await.unwrap();
	payload
}

#[tokio::test]
async fn test_send_message() {
	// Transport writes into stdin_write; the test plays the driver and reads stdin_read.
	let (mut stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, _stdout_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	let (mut sender, _receiver) = transport.into_parts();

	let payload = br#"{"id":1,"method":"test","params":{"foo":"bar"}}"#;
	TransportSender::send(&mut sender, payload).await.unwrap();

	assert_eq!(read_frame(&mut stdin_read).await, payload.to_vec());
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(4096);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages: [&[u8]; 3] = [
		br#"{"id":1,"method":"first"}"#,
		br#"{"id":2,"method":"second"}"#,
		br#"{"id":3,"method":"third"}"#,
	];

	for msg in messages {
		write_frame(&mut stdout_write, msg).await;
	}

	for expected in messages {
		assert_eq!(rx.recv().await.unwrap(), expected.to_vec());
	}

	drop(stdout_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_large_message() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024 * 1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024 * 1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let large = serde_json::to_vec(&serde_json::json!({
		"id": 1,
		"data": "x".repeat(100_000)
	}))
	.unwrap();
	assert!(large.len() > 32_768);

	write_frame(&mut stdout_write, &large).await;
	assert_eq!(rx.recv().await.unwrap(), large);

	drop(stdout_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_malformed_length_prefix() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(stdin_write, stdout_read);

	// Two bytes of a four byte prefix, then EOF.
	stdout_write.write_all(&[0x01, 0x02]).await.unwrap();
	stdout_write.flush().await.unwrap();
	drop(stdout_write);

	let err = transport.run().await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)));
	assert!(err.to_string().contains("Failed to read length prefix"));
}

#[tokio::test]
async fn test_oversized_length_prefix_is_rejected() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);

	// A header claiming ~4 GiB with no body behind it.
	stdout_write.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
	stdout_write.flush().await.unwrap();

	let err = transport.run().await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)));
	assert!(err.to_string().contains("exceeds limit"));
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_short_frame_body() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);

	// Header promises 100 bytes, only 10 arrive.
	stdout_write.write_all(&100u32.to_le_bytes()).await.unwrap();
	stdout_write.write_all(&[b'x'; 10]).await.unwrap();
	drop(stdout_write);

	let err = transport.run().await.unwrap_err();
	assert!(err.to_string().contains("Failed to read frame body of 100 bytes"));
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_broken_pipe() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, stdout_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	let (_sender, receiver) = transport.into_parts();
	drop(stdout_write);

	let result = Box::new(receiver).run().await;
	assert!(result.is_err());
}

#[tokio::test]
async fn test_receiver_dropped_stops_loop() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, rx) = PipeTransport::new(stdin_write, stdout_read);
	drop(rx);

	write_frame(&mut stdout_write, b"{}").await;

	// The frame is read, forwarding fails, the loop ends cleanly.
	transport.run().await.unwrap();
}

#[tokio::test]
async fn test_write_to_closed_pipe_fails() {
	let (stdin_read, stdin_write) = tokio::io::duplex(64);
	let (stdout_read, _stdout_write) = tokio::io::duplex(64);

	let (mut transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	drop(stdin_read);

	let err = transport.send(b"{}").await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)));
}
