use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::BuildHasher;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use pw_protocol::{HandleRef, SerializedArgument, SerializedValue};
use serde_json::Value;

use super::js_value::{JsObject, JsValue};
use crate::error::{Error, Result};
use crate::remote_object::RemoteObject;

/// Largest integer an IEEE double represents exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Conversion into the wire value tree.
pub trait ToValueTree {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue>;
}

#[derive(Debug, Clone)]
enum Segment {
	Key(String),
	Index(usize),
}

/// Encoding state for one argument: the objects on the current path, the
/// path itself for error messages, and the handles collected so far.
#[derive(Debug, Default)]
pub struct Encoder {
	visiting: HashSet<usize>,
	path: Vec<Segment>,
	handles: Vec<HandleRef>,
}

impl Encoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Encodes a shared object identified by `identity`, failing with
	/// [`Error::CircularStructure`] if it is already on the current path.
	pub fn with_object<F>(&mut self, identity: usize, f: F) -> Result<SerializedValue>
	where
		F: FnOnce(&mut Self) -> Result<SerializedValue>,
	{
		if !self.visiting.insert(identity) {
			return Err(Error::CircularStructure {
				path: self.path_string(),
			});
		}
		let result = f(self);
		self.visiting.remove(&identity);
		result
	}

	/// Encodes the member `key` of the object being encoded.
	pub fn field<T: ToValueTree + ?Sized>(&mut self, key: &str, value: &T) -> Result<SerializedValue> {
		self.path.push(Segment::Key(key.to_string()));
		let result = value.to_value_tree(self);
		self.path.pop();
		result
	}

	/// Encodes element `index` of the array being encoded.
	pub fn element<T: ToValueTree + ?Sized>(&mut self, index: usize, value: &T) -> Result<SerializedValue> {
		self.path.push(Segment::Index(index));
		let result = value.to_value_tree(self);
		self.path.pop();
		result
	}

	/// Records `guid` in the side list and returns the leaf pointing at it.
	pub fn handle(&mut self, guid: &Arc<str>) -> SerializedValue {
		let index = match self.handles.iter().position(|h| h.guid == *guid) {
			Some(index) => index,
			None => {
				self.handles.push(HandleRef {
					guid: Arc::clone(guid),
				});
				self.handles.len() - 1
			}
		};
		SerializedValue::Handle(index)
	}

	pub fn handles(&self) -> &[HandleRef] {
		&self.handles
	}

	pub fn finish(self, value: SerializedValue) -> SerializedArgument {
		SerializedArgument {
			value,
			handles: self.handles,
		}
	}

	fn path_string(&self) -> String {
		let mut out = String::from("arg");
		for segment in &self.path {
			match segment {
				Segment::Key(key) if is_identifier(key) => {
					out.push('.');
					out.push_str(key);
				}
				Segment::Key(key) => out.push_str(&format!("[{key:?}]")),
				Segment::Index(index) => out.push_str(&format!("[{index}]")),
			}
		}
		out
	}
}

fn is_identifier(key: &str) -> bool {
	let mut chars = key.chars();
	matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
		&& chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Encodes `value` together with the handles it references.
pub fn serialize_argument<T: ToValueTree + ?Sized>(value: &T) -> Result<SerializedArgument> {
	let mut encoder = Encoder::new();
	let tree = value.to_value_tree(&mut encoder)?;
	Ok(encoder.finish(tree))
}

/// Encodes `value` for a call that takes no handles.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if `value` contains a remote object.
pub fn serialize_value<T: ToValueTree + ?Sized>(value: &T) -> Result<SerializedValue> {
	let arg = serialize_argument(value)?;
	if !arg.handles.is_empty() {
		return Err(Error::InvalidArgument(format!(
			"remote object handles are not accepted here (got {})",
			arg.handles.len()
		)));
	}
	Ok(arg.value)
}

impl<T: ToValueTree + ?Sized> ToValueTree for &T {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		(**self).to_value_tree(encoder)
	}
}

impl<T: ToValueTree + ?Sized> ToValueTree for Box<T> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		(**self).to_value_tree(encoder)
	}
}

impl ToValueTree for () {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::undefined())
	}
}

impl ToValueTree for bool {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::Bool(*self))
	}
}

macro_rules! impl_small_int {
	($($ty:ty),*) => {$(
		impl ToValueTree for $ty {
			fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
				Ok(SerializedValue::Number(f64::from(*self)))
			}
		}
	)*};
}

impl_small_int!(i8, i16, i32, u8, u16, u32);

// Beyond 2^53 a double loses digits, so wide integers switch to bigint.
macro_rules! impl_wide_int {
	($($ty:ty),*) => {$(
		impl ToValueTree for $ty {
			fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
				let n = *self;
				if n.unsigned_abs() as u128 <= u128::from(MAX_SAFE_INTEGER) {
					Ok(SerializedValue::Number(n as f64))
				} else {
					Ok(SerializedValue::BigInt(n.to_string()))
				}
			}
		}
	)*};
}

impl_wide_int!(i64, isize, i128);

macro_rules! impl_wide_uint {
	($($ty:ty),*) => {$(
		impl ToValueTree for $ty {
			fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
				let n = *self;
				if n as u128 <= u128::from(MAX_SAFE_INTEGER) {
					Ok(SerializedValue::Number(n as f64))
				} else {
					Ok(SerializedValue::BigInt(n.to_string()))
				}
			}
		}
	)*};
}

impl_wide_uint!(u64, usize, u128);

impl ToValueTree for f32 {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::number(f64::from(*self)))
	}
}

impl ToValueTree for f64 {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::number(*self))
	}
}

impl ToValueTree for str {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::String(self.to_string()))
	}
}

impl ToValueTree for String {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		self.as_str().to_value_tree(encoder)
	}
}

impl<T: ToValueTree> ToValueTree for Option<T> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		match self {
			Some(value) => value.to_value_tree(encoder),
			None => Ok(SerializedValue::null()),
		}
	}
}

impl<T: ToValueTree> ToValueTree for [T] {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		let items = self
			.iter()
			.enumerate()
			.map(|(index, item)| encoder.element(index, item))
			.collect::<Result<Vec<_>>>()?;
		Ok(SerializedValue::Array(items))
	}
}

impl<T: ToValueTree, const N: usize> ToValueTree for [T; N] {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		self.as_slice().to_value_tree(encoder)
	}
}

impl<T: ToValueTree> ToValueTree for Vec<T> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		self.as_slice().to_value_tree(encoder)
	}
}

fn encode_entries<'a, K, V, I>(entries: I, encoder: &mut Encoder) -> Result<SerializedValue>
where
	K: AsRef<str> + 'a,
	V: ToValueTree + 'a,
	I: IntoIterator<Item = (&'a K, &'a V)>,
{
	let fields = entries
		.into_iter()
		.map(|(k, v)| -> Result<(String, SerializedValue)> {
			Ok((k.as_ref().to_string(), encoder.field(k.as_ref(), v)?))
		})
		.collect::<Result<Vec<_>>>()?;
	Ok(SerializedValue::Object(fields))
}

impl<K: AsRef<str>, V: ToValueTree, S: BuildHasher> ToValueTree for HashMap<K, V, S> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		encode_entries(self, encoder)
	}
}

impl<K: AsRef<str>, V: ToValueTree> ToValueTree for BTreeMap<K, V> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		encode_entries(self, encoder)
	}
}

impl<K: AsRef<str>, V: ToValueTree, S: BuildHasher> ToValueTree for IndexMap<K, V, S> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		encode_entries(self, encoder)
	}
}

impl ToValueTree for DateTime<Utc> {
	fn to_value_tree(&self, _: &mut Encoder) -> Result<SerializedValue> {
		Ok(SerializedValue::Date(
			self.to_rfc3339_opts(SecondsFormat::Millis, true),
		))
	}
}

impl ToValueTree for Value {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		match self {
			Value::Null => Ok(SerializedValue::null()),
			Value::Bool(b) => Ok(SerializedValue::Bool(*b)),
			Value::Number(n) => match (n.as_i64(), n.as_u64()) {
				(Some(i), _) => i.to_value_tree(encoder),
				(None, Some(u)) => u.to_value_tree(encoder),
				_ => Ok(SerializedValue::number(n.as_f64().unwrap_or(f64::NAN))),
			},
			Value::String(s) => Ok(SerializedValue::String(s.clone())),
			Value::Array(items) => items.to_value_tree(encoder),
			Value::Object(map) => encode_entries(map, encoder),
		}
	}
}

impl ToValueTree for JsObject {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		encoder.with_object(self.id(), |encoder| {
			let entries = self.entries();
			let fields = entries
				.iter()
				.map(|(k, v)| -> Result<(String, SerializedValue)> {
					Ok((k.clone(), encoder.field(k, v)?))
				})
				.collect::<Result<Vec<_>>>()?;
			Ok(SerializedValue::Object(fields))
		})
	}
}

impl ToValueTree for JsValue {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		match self {
			JsValue::Null => Ok(SerializedValue::null()),
			JsValue::Undefined => Ok(SerializedValue::undefined()),
			JsValue::Bool(b) => Ok(SerializedValue::Bool(*b)),
			JsValue::Number(n) => Ok(SerializedValue::number(*n)),
			JsValue::BigInt(s) => Ok(SerializedValue::BigInt(s.clone())),
			JsValue::String(s) => Ok(SerializedValue::String(s.clone())),
			JsValue::Date(d) => d.to_value_tree(encoder),
			JsValue::Array(items) => items.to_value_tree(encoder),
			JsValue::Object(obj) => obj.to_value_tree(encoder),
			JsValue::Handle(h) => h.to_value_tree(encoder),
		}
	}
}

impl ToValueTree for RemoteObject {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		Ok(encoder.handle(self.guid_arc()))
	}
}

impl ToValueTree for Arc<RemoteObject> {
	fn to_value_tree(&self, encoder: &mut Encoder) -> Result<SerializedValue> {
		(**self).to_value_tree(encoder)
	}
}
