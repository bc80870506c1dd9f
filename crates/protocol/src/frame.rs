//! Length-prefixed framing.
//!
//! A frame is `u32` little-endian payload length followed by exactly that many
//! bytes. There is no checksum and no compression.

use thiserror::Error;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a reader accepts. Headers above this are treated as a
/// corrupt stream rather than allocated.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Errors produced while building a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
	/// Payload does not fit in a `u32` length prefix.
	#[error("Frame payload of {0} bytes exceeds the u32 length prefix")]
	TooLarge(usize),
}

/// Builds one frame: length prefix followed by `payload`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
	let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;
	let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
	frame.extend_from_slice(&len.to_le_bytes());
	frame.extend_from_slice(payload);
	Ok(frame)
}

/// Decodes the payload length from a frame header.
pub fn decode_frame_len(header: [u8; FRAME_HEADER_LEN]) -> usize {
	u32::from_le_bytes(header) as usize
}
