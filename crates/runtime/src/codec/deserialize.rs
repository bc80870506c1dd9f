use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use pw_protocol::{HandleRef, SerializedValue, SpecialValue};
use serde_json::Value;

use super::js_value::{JsObject, JsValue};
use crate::connection::{Connection, ConnectionLike, ObjectStore};
use crate::error::{Error, Result};
use crate::remote_object::RemoteObject;

/// Guid to object resolution used while decoding handles.
pub trait ObjectLookup {
	fn lookup(&self, guid: &str) -> Option<Arc<RemoteObject>>;
}

impl ObjectLookup for ObjectStore {
	fn lookup(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.try_get(guid)
	}
}

impl ObjectLookup for Connection {
	fn lookup(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.objects().try_get(guid)
	}
}

impl ObjectLookup for dyn ConnectionLike {
	fn lookup(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.get_object(guid)
	}
}

/// Conversion out of a decoded [`JsValue`].
///
/// `null` and `undefined` decode to the target's empty value (`0`, `false`,
/// `""`, `None`, empty collections) so optional members need no special
/// casing.
pub trait FromValueTree: Sized {
	fn from_value_tree(value: JsValue) -> Result<Self>;
}

/// Decodes wire trees into [`JsValue`], resolving handle leaves through a
/// lookup.
pub struct Decoder<'a, L: ?Sized> {
	handles: &'a [HandleRef],
	lookup: &'a L,
}

impl<'a, L: ObjectLookup + ?Sized> Decoder<'a, L> {
	pub fn new(handles: &'a [HandleRef], lookup: &'a L) -> Self {
		Self { handles, lookup }
	}

	pub fn decode(&self, value: &SerializedValue) -> Result<JsValue> {
		Ok(match value {
			SerializedValue::Special(SpecialValue::Null) => JsValue::Null,
			SerializedValue::Special(SpecialValue::Undefined) => JsValue::Undefined,
			SerializedValue::Special(special) => {
				JsValue::Number(special.as_f64().unwrap_or(f64::NAN))
			}
			SerializedValue::Number(n) => JsValue::Number(*n),
			SerializedValue::Bool(b) => JsValue::Bool(*b),
			SerializedValue::String(s) => JsValue::String(s.clone()),
			SerializedValue::Date(s) => match DateTime::parse_from_rfc3339(s) {
				Ok(date) => JsValue::Date(date.with_timezone(&Utc)),
				Err(_) => JsValue::String(s.clone()),
			},
			SerializedValue::BigInt(s) => JsValue::BigInt(s.clone()),
			SerializedValue::Array(items) => JsValue::Array(
				items
					.iter()
					.map(|item| self.decode(item))
					.collect::<Result<_>>()?,
			),
			SerializedValue::Object(fields) => {
				let obj = JsObject::new();
				for (key, field) in fields {
					obj.insert(key.clone(), self.decode(field)?);
				}
				JsValue::Object(obj)
			}
			SerializedValue::Handle(index) => {
				let handle = self.handles.get(*index).ok_or_else(|| {
					Error::Protocol(format!(
						"Handle index {index} out of range ({} handles)",
						self.handles.len()
					))
				})?;
				let object = self.lookup.lookup(&handle.guid).ok_or_else(|| Error::ObjectNotFound {
					guid: handle.guid.to_string(),
				})?;
				JsValue::Handle(object)
			}
			SerializedValue::Raw(raw) => JsValue::from(raw.clone()),
		})
	}
}

/// Decodes a result tree into `T`.
pub fn parse_result<T, L>(value: &SerializedValue, handles: &[HandleRef], lookup: &L) -> Result<T>
where
	T: FromValueTree,
	L: ObjectLookup + ?Sized,
{
	T::from_value_tree(Decoder::new(handles, lookup).decode(value)?)
}

fn guid_ref(map: &serde_json::Map<String, Value>) -> Option<&str> {
	match (map.len(), map.get("guid")) {
		(1, Some(Value::String(guid))) => Some(guid),
		_ => None,
	}
}

/// Appends every guid referenced as `{"guid": ..}` in a plain JSON result.
pub fn collect_guid_refs(value: &Value, out: &mut Vec<Arc<str>>) {
	match value {
		Value::Array(items) => items.iter().for_each(|item| collect_guid_refs(item, out)),
		Value::Object(map) => match guid_ref(map) {
			Some(guid) => out.push(Arc::from(guid)),
			None => map.values().for_each(|item| collect_guid_refs(item, out)),
		},
		_ => {}
	}
}

/// Converts a plain JSON result, turning `{"guid": ..}` references into
/// handles.
///
/// # Errors
///
/// [`Error::ObjectNotFound`] if a referenced guid is not registered.
pub fn resolve_guid_refs<L: ObjectLookup + ?Sized>(value: Value, lookup: &L) -> Result<JsValue> {
	Ok(match value {
		Value::Array(items) => JsValue::Array(
			items
				.into_iter()
				.map(|item| resolve_guid_refs(item, lookup))
				.collect::<Result<_>>()?,
		),
		Value::Object(map) => {
			if let Some(guid) = guid_ref(&map) {
				let object = lookup.lookup(guid).ok_or_else(|| Error::ObjectNotFound {
					guid: guid.to_string(),
				})?;
				return Ok(JsValue::Handle(object));
			}
			let obj = JsObject::new();
			for (key, item) in map {
				obj.insert(key, resolve_guid_refs(item, lookup)?);
			}
			JsValue::Object(obj)
		}
		other => JsValue::from(other),
	})
}

fn mismatch(expected: &str, value: &JsValue) -> Error {
	Error::Protocol(format!("Expected {expected}, got {}", value.kind()))
}

/// Renders a number the way JavaScript's `String(n)` does for the common
/// cases.
fn number_to_string(n: f64) -> String {
	if n.is_nan() {
		"NaN".to_string()
	} else if n.is_infinite() {
		if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
	} else if n == n.trunc() && n.abs() < 1e21 {
		format!("{}", n as i128)
	} else {
		n.to_string()
	}
}

impl FromValueTree for JsValue {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		Ok(value)
	}
}

impl FromValueTree for () {
	fn from_value_tree(_: JsValue) -> Result<Self> {
		Ok(())
	}
}

impl FromValueTree for bool {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Bool(b) => Ok(b),
			JsValue::Null | JsValue::Undefined => Ok(false),
			JsValue::Number(n) => Ok(n != 0.0 && !n.is_nan()),
			JsValue::String(s) => Ok(!s.is_empty()),
			other => Err(mismatch("boolean", &other)),
		}
	}
}

impl FromValueTree for f64 {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Number(n) => Ok(n),
			JsValue::Null | JsValue::Undefined => Ok(0.0),
			JsValue::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
			JsValue::String(ref s) | JsValue::BigInt(ref s) => {
				s.trim().parse().map_err(|_| mismatch("number", &value))
			}
			other => Err(mismatch("number", &other)),
		}
	}
}

impl FromValueTree for f32 {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		f64::from_value_tree(value).map(|n| n as f32)
	}
}

macro_rules! impl_from_int {
	($($ty:ty),*) => {$(
		impl FromValueTree for $ty {
			fn from_value_tree(value: JsValue) -> Result<Self> {
				let expected = stringify!($ty);
				match value {
					JsValue::Null | JsValue::Undefined => Ok(0),
					JsValue::Bool(b) => Ok(<$ty>::from(b)),
					// `MAX as f64` rounds up to 2^BITS for wide types; `MIN` is exact.
					JsValue::Number(n)
						if n.fract() == 0.0
							&& n >= <$ty>::MIN as f64
							&& n < <$ty>::MAX as f64 + 1.0 =>
					{
						Ok(n as $ty)
					}
					JsValue::String(ref s) | JsValue::BigInt(ref s) => {
						s.trim().parse().map_err(|_| mismatch(expected, &value))
					}
					other => Err(mismatch(expected, &other)),
				}
			}
		}
	)*};
}

impl_from_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl FromValueTree for String {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::String(s) | JsValue::BigInt(s) => Ok(s),
			JsValue::Null | JsValue::Undefined => Ok(String::new()),
			JsValue::Bool(b) => Ok(b.to_string()),
			JsValue::Number(n) => Ok(number_to_string(n)),
			JsValue::Date(d) => Ok(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
			other => Err(mismatch("string", &other)),
		}
	}
}

impl<T: FromValueTree> FromValueTree for Option<T> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Null | JsValue::Undefined => Ok(None),
			other => T::from_value_tree(other).map(Some),
		}
	}
}

impl<T: FromValueTree> FromValueTree for Vec<T> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Array(items) => items.into_iter().map(T::from_value_tree).collect(),
			JsValue::Null | JsValue::Undefined => Ok(Vec::new()),
			other => Err(mismatch("array", &other)),
		}
	}
}

fn object_entries(value: JsValue) -> Result<Vec<(String, JsValue)>> {
	match value {
		JsValue::Object(obj) => Ok(obj.entries()),
		JsValue::Null | JsValue::Undefined => Ok(Vec::new()),
		other => Err(mismatch("object", &other)),
	}
}

impl<V: FromValueTree, S: BuildHasher + Default> FromValueTree for HashMap<String, V, S> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		object_entries(value)?
			.into_iter()
			.map(|(k, v)| -> Result<(String, V)> { Ok((k, V::from_value_tree(v)?)) })
			.collect()
	}
}

impl<V: FromValueTree> FromValueTree for BTreeMap<String, V> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		object_entries(value)?
			.into_iter()
			.map(|(k, v)| -> Result<(String, V)> { Ok((k, V::from_value_tree(v)?)) })
			.collect()
	}
}

impl<V: FromValueTree, S: BuildHasher + Default> FromValueTree for IndexMap<String, V, S> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		object_entries(value)?
			.into_iter()
			.map(|(k, v)| -> Result<(String, V)> { Ok((k, V::from_value_tree(v)?)) })
			.collect()
	}
}

impl FromValueTree for JsObject {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Object(obj) => Ok(obj),
			JsValue::Null | JsValue::Undefined => Ok(JsObject::new()),
			other => Err(mismatch("object", &other)),
		}
	}
}

impl FromValueTree for DateTime<Utc> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Date(d) => Ok(d),
			JsValue::Null | JsValue::Undefined => Ok(DateTime::<Utc>::default()),
			JsValue::String(ref s) => DateTime::parse_from_rfc3339(s)
				.map(|d| d.with_timezone(&Utc))
				.map_err(|_| mismatch("date", &value)),
			JsValue::Number(n) if n.is_finite() => {
				DateTime::from_timestamp_millis(n as i64).ok_or_else(|| mismatch("date", &value))
			}
			other => Err(mismatch("date", &other)),
		}
	}
}

impl FromValueTree for Value {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		Ok(value.to_json())
	}
}

impl FromValueTree for Arc<RemoteObject> {
	fn from_value_tree(value: JsValue) -> Result<Self> {
		match value {
			JsValue::Handle(h) => Ok(h),
			other => Err(mismatch("handle", &other)),
		}
	}
}

/// Members of an object value for field-by-field decoding.
#[doc(hidden)]
pub fn object_members(value: JsValue, type_name: &str) -> Result<Vec<(String, JsValue)>> {
	object_entries(value).map_err(|e| Error::Protocol(format!("{type_name}: {e}")))
}

/// Removes and returns the member named `name`, preferring an exact match
/// over a case-insensitive one. Absent members read as `undefined`.
#[doc(hidden)]
pub fn take_member(members: &mut Vec<(String, JsValue)>, name: &str) -> JsValue {
	let position = members
		.iter()
		.position(|(k, _)| k == name)
		.or_else(|| members.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)));
	match position {
		Some(index) => members.swap_remove(index).1,
		None => JsValue::Undefined,
	}
}

/// Prefixes a member decoding failure with its location.
#[doc(hidden)]
pub fn member_error(type_name: &str, member: &str, err: Error) -> Error {
	match err {
		Error::Protocol(message) => Error::Protocol(format!("{type_name}.{member}: {message}")),
		other => other,
	}
}
