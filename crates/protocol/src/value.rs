//! Tagged value tree used for call arguments and results.
//!
//! Each node is a single-key JSON object whose key names the leaf kind:
//!
//! | Kind | Wire form |
//! |------|-----------|
//! | null, undefined, NaN, ±Infinity, -0 | `{"v": "null"}`, `{"v": "-0"}`, ... |
//! | number | `{"n": 1.5}` |
//! | boolean | `{"b": true}` |
//! | string | `{"s": "text"}` |
//! | date | `{"d": "2024-01-01T00:00:00.000Z"}` |
//! | bigint | `{"bi": "12345678901234567890"}` |
//! | array | `{"a": [...]}` |
//! | object | `{"o": [{"k": "key", "v": {...}}]}` |
//! | handle | `{"h": 0}` (index into [`SerializedArgument::handles`]) |
//!
//! Anything else is kept verbatim as [`SerializedValue::Raw`] so newer driver
//! leaf kinds pass through instead of failing the whole message.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Values that cannot travel as a plain JSON number or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialValue {
	Null,
	Undefined,
	NaN,
	Infinity,
	NegInfinity,
	NegZero,
}

impl SpecialValue {
	/// Wire spelling of the sentinel.
	pub fn as_str(self) -> &'static str {
		match self {
			SpecialValue::Null => "null",
			SpecialValue::Undefined => "undefined",
			SpecialValue::NaN => "NaN",
			SpecialValue::Infinity => "Infinity",
			SpecialValue::NegInfinity => "-Infinity",
			SpecialValue::NegZero => "-0",
		}
	}

	/// Parses a wire sentinel.
	pub fn parse(s: &str) -> Option<Self> {
		Some(match s {
			"null" => SpecialValue::Null,
			"undefined" => SpecialValue::Undefined,
			"NaN" => SpecialValue::NaN,
			"Infinity" => SpecialValue::Infinity,
			"-Infinity" => SpecialValue::NegInfinity,
			"-0" => SpecialValue::NegZero,
			_ => return None,
		})
	}

	/// Numeric value of the sentinel, `None` for null and undefined.
	pub fn as_f64(self) -> Option<f64> {
		match self {
			SpecialValue::NaN => Some(f64::NAN),
			SpecialValue::Infinity => Some(f64::INFINITY),
			SpecialValue::NegInfinity => Some(f64::NEG_INFINITY),
			SpecialValue::NegZero => Some(-0.0),
			SpecialValue::Null | SpecialValue::Undefined => None,
		}
	}
}

/// One node of the value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedValue {
	Special(SpecialValue),
	/// Always finite and never negative zero; see [`SerializedValue::number`].
	Number(f64),
	Bool(bool),
	String(String),
	Date(String),
	BigInt(String),
	Array(Vec<SerializedValue>),
	/// Entries in insertion order.
	Object(Vec<(String, SerializedValue)>),
	/// Index into the handle side list of the enclosing argument.
	Handle(usize),
	/// Unrecognized leaf, passed through untouched.
	Raw(Value),
}

impl SerializedValue {
	/// Encodes a double, escaping the values JSON numbers cannot represent.
	pub fn number(n: f64) -> Self {
		if n.is_nan() {
			SerializedValue::Special(SpecialValue::NaN)
		} else if n == f64::INFINITY {
			SerializedValue::Special(SpecialValue::Infinity)
		} else if n == f64::NEG_INFINITY {
			SerializedValue::Special(SpecialValue::NegInfinity)
		} else if n == 0.0 && n.is_sign_negative() {
			SerializedValue::Special(SpecialValue::NegZero)
		} else {
			SerializedValue::Number(n)
		}
	}

	pub fn null() -> Self {
		SerializedValue::Special(SpecialValue::Null)
	}

	pub fn undefined() -> Self {
		SerializedValue::Special(SpecialValue::Undefined)
	}

	/// Converts the node into its wire JSON.
	pub fn to_json(&self) -> Value {
		let (key, value) = match self {
			SerializedValue::Special(s) => ("v", Value::String(s.as_str().to_string())),
			SerializedValue::Number(n) => (
				"n",
				Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
			),
			SerializedValue::Bool(b) => ("b", Value::Bool(*b)),
			SerializedValue::String(s) => ("s", Value::String(s.clone())),
			SerializedValue::Date(d) => ("d", Value::String(d.clone())),
			SerializedValue::BigInt(bi) => ("bi", Value::String(bi.clone())),
			SerializedValue::Array(items) => (
				"a",
				Value::Array(items.iter().map(SerializedValue::to_json).collect()),
			),
			SerializedValue::Object(entries) => (
				"o",
				Value::Array(
					entries
						.iter()
						.map(|(k, v)| {
							let mut entry = Map::with_capacity(2);
							entry.insert("k".to_string(), Value::String(k.clone()));
							entry.insert("v".to_string(), v.to_json());
							Value::Object(entry)
						})
						.collect(),
				),
			),
			SerializedValue::Handle(index) => ("h", Value::from(*index)),
			SerializedValue::Raw(raw) => return raw.clone(),
		};
		let mut map = Map::with_capacity(1);
		map.insert(key.to_string(), value);
		Value::Object(map)
	}

	/// Parses a wire node. Never fails: unknown shapes become [`SerializedValue::Raw`].
	pub fn from_json(value: &Value) -> Self {
		let Value::Object(map) = value else {
			return SerializedValue::Raw(value.clone());
		};

		if let Some(v) = map.get("v").and_then(Value::as_str) {
			if let Some(special) = SpecialValue::parse(v) {
				return SerializedValue::Special(special);
			}
		}
		if let Some(n) = map.get("n").and_then(Value::as_f64) {
			return SerializedValue::Number(n);
		}
		if let Some(b) = map.get("b").and_then(Value::as_bool) {
			return SerializedValue::Bool(b);
		}
		if let Some(s) = map.get("s").and_then(Value::as_str) {
			return SerializedValue::String(s.to_string());
		}
		if let Some(d) = map.get("d").and_then(Value::as_str) {
			return SerializedValue::Date(d.to_string());
		}
		if let Some(bi) = map.get("bi").and_then(Value::as_str) {
			return SerializedValue::BigInt(bi.to_string());
		}
		if let Some(items) = map.get("a").and_then(Value::as_array) {
			return SerializedValue::Array(items.iter().map(SerializedValue::from_json).collect());
		}
		if let Some(entries) = map.get("o").and_then(Value::as_array) {
			let entries = entries
				.iter()
				.map(|entry| {
					let key = entry.get("k")?.as_str()?;
					let value = entry.get("v")?;
					Some((key.to_string(), SerializedValue::from_json(value)))
				})
				.collect::<Option<Vec<_>>>();
			// A single malformed entry keeps the whole node opaque.
			return match entries {
				Some(entries) => SerializedValue::Object(entries),
				None => SerializedValue::Raw(value.clone()),
			};
		}
		if let Some(index) = map.get("h").and_then(Value::as_u64) {
			return SerializedValue::Handle(index as usize);
		}

		SerializedValue::Raw(value.clone())
	}
}

impl Serialize for SerializedValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.to_json().serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for SerializedValue {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = Value::deserialize(deserializer)?;
		Ok(SerializedValue::from_json(&value))
	}
}

/// Reference to a remote object inside a [`SerializedArgument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
	#[serde(
		serialize_with = "crate::message::serialize_arc_str",
		deserialize_with = "crate::message::deserialize_arc_str"
	)]
	pub guid: Arc<str>,
}

/// A value tree together with the guids its `{"h": n}` leaves point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedArgument {
	pub value: SerializedValue,
	#[serde(default)]
	pub handles: Vec<HandleRef>,
}
