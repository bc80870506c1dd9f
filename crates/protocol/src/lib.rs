//! Wire types for the Playwright driver protocol.
//!
//! Everything in this crate is plain data: no I/O, no async. The runtime crate
//! owns transport and dispatch and uses these types to encode and decode what
//! crosses the process boundary.
//!
//! # Main Types
//!
//! - [`Message`] - Inbound envelope, either a [`Response`] or an [`Event`]
//! - [`Request`] - Outbound call addressed to a remote object by guid
//! - [`SerializedValue`] - Tagged value tree used for call arguments and results
//! - [`SerializedArgument`] - A value tree plus its side list of handle guids
//!
//! Frames on the wire are a 4-byte little-endian length followed by the JSON
//! payload, see [`frame`].

pub mod frame;
pub mod message;
pub mod value;

pub use frame::{FRAME_HEADER_LEN, FrameError, MAX_FRAME_LEN, decode_frame_len, encode_frame};
pub use message::{
	AdoptParams, CreateParams, DisposeParams, ErrorPayload, ErrorWrapper, Event, Location,
	Message, Metadata, Request, Response,
};
pub use value::{HandleRef, SerializedArgument, SerializedValue, SpecialValue};
