//! Playwright Runtime - Driver lifecycle, connection, and object registry
//!
//! This crate is the client core that talks to the Playwright driver:
//!
//! - **Driver management**: Locating and launching the driver subprocess
//! - **Transport**: Length-prefixed frames over the driver's stdio
//! - **Connection**: Request/response correlation and event dispatch
//! - **Object registry**: Remote objects by guid, arranged in an ownership tree
//! - **Codec**: The tagged value tree used for call arguments and results
//! - **Errors**: Driver failures translated into typed [`Error`]s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Playwright API  │  Browser, Page, ... (built on RemoteObject)
//! └────────┬─────────┘
//!          │ TypeRegistry hooks, Channel calls
//! ┌────────▼─────────┐
//! │    pw-runtime    │  This crate
//! │  ┌────────────┐  │
//! │  │ Connection │  │  ids, pending requests, __create__/__dispose__/__adopt__
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Transport  │  │  4-byte LE length + JSON
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │   Driver   │  │  node cli.js run-driver
//! │  └────────────┘  │
//! └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pw_runtime::{Connection, ConnectionOptions, DriverOptions};
//!
//! # async fn run() -> pw_runtime::Result<()> {
//! let connection = Connection::launch(&DriverOptions::default(), ConnectionOptions::default()).await?;
//! let playwright = connection.initialize().await?;
//! println!("{:#}", playwright.initializer());
//! connection.close("done").await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod driver;
pub mod driver_process;
pub mod error;
pub mod error_translator;
pub mod object_type;
pub mod remote_object;
pub mod transport;

pub use channel::Channel;
pub use codec::{
	Decoder, Encoder, FromValueTree, JsObject, JsValue, ObjectLookup, ToValueTree, parse_result,
	serialize_argument, serialize_value,
};
pub use config::{ConnectionOptions, DriverOptions};
pub use connection::{Connection, ConnectionLike, ObjectStore, ResponseMode};
pub use driver::{DriverPaths, get_driver_executable, resolve_driver};
pub use driver_process::DriverProcess;
pub use error::{Error, Result};
pub use error_translator::{translate_error, translate_result_error};
pub use object_type::{ObjectHook, ObjectType, TypeRegistry};
pub use pw_protocol;
pub use pw_protocol::{HandleRef, Metadata, SerializedArgument, SerializedValue};
pub use remote_object::{DisposeReason, EventHandler, ObjectEvent, RemoteObject};
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, TransportParts, TransportReceiver,
	TransportSender,
};
