use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};

use crate::remote_object::RemoteObject;

/// A dynamically typed value as the browser sees it.
///
/// Equality follows `SameValue`: `NaN` equals itself, `0` and `-0` differ,
/// objects compare by contents (cycles are compared pairwise, so two
/// isomorphic cyclic graphs are equal) and handles compare by guid.
#[derive(Debug, Clone)]
pub enum JsValue {
	Null,
	Undefined,
	Bool(bool),
	Number(f64),
	/// Decimal digits of an arbitrary-precision integer.
	BigInt(String),
	String(String),
	Date(DateTime<Utc>),
	Array(Vec<JsValue>),
	Object(JsObject),
	Handle(Arc<RemoteObject>),
}

/// Shared, mutable, insertion-ordered object.
///
/// Clones share storage, so an object can be inserted into itself. The
/// encoder rejects such graphs.
#[derive(Clone, Default)]
pub struct JsObject(Arc<RwLock<IndexMap<String, JsValue>>>);

impl JsObject {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<JsValue>,
	{
		let map = entries
			.into_iter()
			.map(|(k, v)| (k.into(), v.into()))
			.collect();
		Self(Arc::new(RwLock::new(map)))
	}

	pub fn insert(&self, key: impl Into<String>, value: impl Into<JsValue>) -> Option<JsValue> {
		self.0.write().insert(key.into(), value.into())
	}

	pub fn get(&self, key: &str) -> Option<JsValue> {
		self.0.read().get(key).cloned()
	}

	pub fn remove(&self, key: &str) -> Option<JsValue> {
		self.0.write().shift_remove(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.read().contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	pub fn keys(&self) -> Vec<String> {
		self.0.read().keys().cloned().collect()
	}

	/// Snapshot of the entries; later mutation does not affect it.
	pub fn entries(&self) -> Vec<(String, JsValue)> {
		self.0
			.read()
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	/// True if both refer to the same storage.
	pub fn ptr_eq(&self, other: &JsObject) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Identity of the shared storage, stable for the object's lifetime.
	pub fn id(&self) -> usize {
		Arc::as_ptr(&self.0) as *const () as usize
	}
}

impl fmt::Debug for JsObject {
	// Keys only, so self-containing objects print.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JsObject")
			.field("keys", &self.keys())
			.finish()
	}
}

impl PartialEq for JsObject {
	fn eq(&self, other: &Self) -> bool {
		objects_eq(self, other, &mut Vec::new())
	}
}

impl PartialEq for JsValue {
	fn eq(&self, other: &Self) -> bool {
		values_eq(self, other, &mut Vec::new())
	}
}

fn same_value(a: f64, b: f64) -> bool {
	(a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

fn values_eq(a: &JsValue, b: &JsValue, seen: &mut Vec<(usize, usize)>) -> bool {
	match (a, b) {
		(JsValue::Null, JsValue::Null) | (JsValue::Undefined, JsValue::Undefined) => true,
		(JsValue::Bool(a), JsValue::Bool(b)) => a == b,
		(JsValue::Number(a), JsValue::Number(b)) => same_value(*a, *b),
		(JsValue::BigInt(a), JsValue::BigInt(b)) | (JsValue::String(a), JsValue::String(b)) => {
			a == b
		}
		(JsValue::Date(a), JsValue::Date(b)) => a == b,
		(JsValue::Array(a), JsValue::Array(b)) => {
			a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_eq(a, b, seen))
		}
		(JsValue::Object(a), JsValue::Object(b)) => objects_eq(a, b, seen),
		(JsValue::Handle(a), JsValue::Handle(b)) => a.guid() == b.guid(),
		_ => false,
	}
}

fn objects_eq(a: &JsObject, b: &JsObject, seen: &mut Vec<(usize, usize)>) -> bool {
	if a.ptr_eq(b) {
		return true;
	}
	let pair = (a.id(), b.id());
	if seen.contains(&pair) {
		return true;
	}
	seen.push(pair);

	let (left, right) = (a.entries(), b.entries());
	let equal = left.len() == right.len()
		&& left
			.iter()
			.zip(&right)
			.all(|((ka, va), (kb, vb))| ka == kb && values_eq(va, vb, seen));

	seen.pop();
	equal
}

impl JsValue {
	/// Short name of the variant for error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			JsValue::Null => "null",
			JsValue::Undefined => "undefined",
			JsValue::Bool(_) => "boolean",
			JsValue::Number(_) => "number",
			JsValue::BigInt(_) => "bigint",
			JsValue::String(_) => "string",
			JsValue::Date(_) => "date",
			JsValue::Array(_) => "array",
			JsValue::Object(_) => "object",
			JsValue::Handle(_) => "handle",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, JsValue::Null)
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, JsValue::Undefined)
	}

	/// `null` or `undefined`.
	pub fn is_nullish(&self) -> bool {
		matches!(self, JsValue::Null | JsValue::Undefined)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			JsValue::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			JsValue::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			JsValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_date(&self) -> Option<&DateTime<Utc>> {
		match self {
			JsValue::Date(d) => Some(d),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[JsValue]> {
		match self {
			JsValue::Array(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&JsObject> {
		match self {
			JsValue::Object(obj) => Some(obj),
			_ => None,
		}
	}

	pub fn as_handle(&self) -> Option<&Arc<RemoteObject>> {
		match self {
			JsValue::Handle(h) => Some(h),
			_ => None,
		}
	}

	/// Member lookup on objects; `None` for everything else.
	pub fn get(&self, key: &str) -> Option<JsValue> {
		self.as_object().and_then(|obj| obj.get(key))
	}

	/// Lossy JSON rendering, following `JSON.stringify`: non-finite numbers
	/// and `undefined` become `null`, dates become ISO strings, handles become
	/// `{"guid": ..}` and a repeated object on the current path becomes `null`.
	pub fn to_json(&self) -> Value {
		to_json_inner(self, &mut Vec::new())
	}
}

fn to_json_inner(value: &JsValue, path: &mut Vec<usize>) -> Value {
	match value {
		JsValue::Null | JsValue::Undefined => Value::Null,
		JsValue::Bool(b) => Value::Bool(*b),
		JsValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
		JsValue::BigInt(s) | JsValue::String(s) => Value::String(s.clone()),
		JsValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
		JsValue::Array(items) => {
			Value::Array(items.iter().map(|v| to_json_inner(v, path)).collect())
		}
		JsValue::Object(obj) => {
			let id = obj.id();
			if path.contains(&id) {
				return Value::Null;
			}
			path.push(id);
			let map: Map<String, Value> = obj
				.entries()
				.into_iter()
				.map(|(k, v)| (k, to_json_inner(&v, path)))
				.collect();
			path.pop();
			Value::Object(map)
		}
		JsValue::Handle(h) => serde_json::json!({ "guid": h.guid() }),
	}
}

impl From<Value> for JsValue {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => JsValue::Null,
			Value::Bool(b) => JsValue::Bool(b),
			Value::Number(n) => match n.as_f64() {
				Some(f) => JsValue::Number(f),
				None => JsValue::BigInt(n.to_string()),
			},
			Value::String(s) => JsValue::String(s),
			Value::Array(items) => JsValue::Array(items.into_iter().map(JsValue::from).collect()),
			Value::Object(map) => JsValue::Object(JsObject::from_entries(map)),
		}
	}
}

impl From<bool> for JsValue {
	fn from(b: bool) -> Self {
		JsValue::Bool(b)
	}
}

impl From<f64> for JsValue {
	fn from(n: f64) -> Self {
		JsValue::Number(n)
	}
}

impl From<i32> for JsValue {
	fn from(n: i32) -> Self {
		JsValue::Number(f64::from(n))
	}
}

impl From<&str> for JsValue {
	fn from(s: &str) -> Self {
		JsValue::String(s.to_string())
	}
}

impl From<String> for JsValue {
	fn from(s: String) -> Self {
		JsValue::String(s)
	}
}

impl From<DateTime<Utc>> for JsValue {
	fn from(d: DateTime<Utc>) -> Self {
		JsValue::Date(d)
	}
}

impl From<Vec<JsValue>> for JsValue {
	fn from(items: Vec<JsValue>) -> Self {
		JsValue::Array(items)
	}
}

impl From<JsObject> for JsValue {
	fn from(obj: JsObject) -> Self {
		JsValue::Object(obj)
	}
}

impl From<Arc<RemoteObject>> for JsValue {
	fn from(h: Arc<RemoteObject>) -> Self {
		JsValue::Handle(h)
	}
}
