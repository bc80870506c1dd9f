//! Remote object type tags and the creation table.
//!
//! The driver names the type of every object it creates with a string tag.
//! [`ObjectType`] is the closed set of tags this runtime knows; anything else
//! parses to [`ObjectType::Unknown`] and is skipped at creation time.
//!
//! [`TypeRegistry`] is built once before the connection starts and maps each
//! type to an [`ObjectHook`] that runs right after the object is constructed.
//! Higher layers use hooks to validate initializers or install event handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::remote_object::RemoteObject;

/// Callback run for each newly created object of a registered type.
pub type ObjectHook = Arc<dyn Fn(&Arc<RemoteObject>) -> Result<()> + Send + Sync>;

macro_rules! object_types {
	($($variant:ident => $tag:literal),+ $(,)?) => {
		/// Known remote object types.
		#[derive(Debug, Clone, PartialEq, Eq, Hash)]
		pub enum ObjectType {
			$($variant,)+
			/// A tag this runtime does not know.
			Unknown(String),
		}

		impl ObjectType {
			/// Every known type, in declaration order.
			pub const KNOWN: &'static [ObjectType] = &[$(ObjectType::$variant,)+];

			/// Parses a driver type tag.
			pub fn parse(tag: &str) -> Self {
				match tag {
					$($tag => ObjectType::$variant,)+
					other => ObjectType::Unknown(other.to_string()),
				}
			}

			/// The driver's tag for this type.
			pub fn as_str(&self) -> &str {
				match self {
					$(ObjectType::$variant => $tag,)+
					ObjectType::Unknown(tag) => tag,
				}
			}
		}
	};
}

object_types! {
	Root => "Root",
	Playwright => "Playwright",
	LocalUtils => "LocalUtils",
	Selectors => "Selectors",
	BrowserType => "BrowserType",
	Browser => "Browser",
	BrowserContext => "BrowserContext",
	Page => "Page",
	Frame => "Frame",
	Worker => "Worker",
	ElementHandle => "ElementHandle",
	JsHandle => "JSHandle",
	Request => "Request",
	Response => "Response",
	Route => "Route",
	WebSocket => "WebSocket",
	WebSocketRoute => "WebSocketRoute",
	ApiRequestContext => "APIRequestContext",
	Artifact => "Artifact",
	BindingCall => "BindingCall",
	CdpSession => "CDPSession",
	Dialog => "Dialog",
	Stream => "Stream",
	WritableStream => "WritableStream",
	Tracing => "Tracing",
	JsonPipe => "JsonPipe",
	Android => "Android",
	AndroidDevice => "AndroidDevice",
	AndroidSocket => "AndroidSocket",
	Electron => "Electron",
	ElectronApplication => "ElectronApplication",
}

impl ObjectType {
	pub fn is_known(&self) -> bool {
		!matches!(self, ObjectType::Unknown(_))
	}
}

impl fmt::Display for ObjectType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Creation table consulted on every `__create__`.
#[derive(Clone)]
pub struct TypeRegistry {
	hooks: HashMap<ObjectType, ObjectHook>,
}

impl Default for TypeRegistry {
	/// Every known type with a hook that does nothing.
	fn default() -> Self {
		let mut registry = Self::empty();
		let noop: ObjectHook = Arc::new(|_: &Arc<RemoteObject>| -> Result<()> { Ok(()) });
		for kind in ObjectType::KNOWN {
			registry.hooks.insert(kind.clone(), Arc::clone(&noop));
		}
		registry
	}
}

impl fmt::Debug for TypeRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.hooks.keys()).finish()
	}
}

impl TypeRegistry {
	/// A table with no types; every creation is skipped until types are registered.
	pub fn empty() -> Self {
		Self {
			hooks: HashMap::new(),
		}
	}

	/// Registers `hook` for `kind`, replacing any previous one.
	pub fn register<F>(&mut self, kind: ObjectType, hook: F) -> &mut Self
	where
		F: Fn(&Arc<RemoteObject>) -> Result<()> + Send + Sync + 'static,
	{
		self.hooks.insert(kind, Arc::new(hook));
		self
	}

	/// Removes `kind`; objects of that type are skipped from now on.
	pub fn unregister(&mut self, kind: &ObjectType) -> &mut Self {
		self.hooks.remove(kind);
		self
	}

	pub fn hook(&self, kind: &ObjectType) -> Option<&ObjectHook> {
		self.hooks.get(kind)
	}

	pub fn contains(&self, kind: &ObjectType) -> bool {
		self.hooks.contains_key(kind)
	}
}
