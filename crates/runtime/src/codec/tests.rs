use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use pw_protocol::{HandleRef, SerializedArgument, SerializedValue, SpecialValue};
use serde_json::json;

use super::*;
use crate::channel::Channel;
use crate::connection::ObjectStore;
use crate::connection::closure::CloseSignal;
use crate::error::Error;
use crate::object_type::ObjectType;
use crate::remote_object::RemoteObject;
use crate::impl_value_tree;

fn empty_store() -> ObjectStore {
	ObjectStore::new(Arc::new(CloseSignal::default()))
}

fn register(store: &ObjectStore, guid: &str, kind: ObjectType) -> Arc<RemoteObject> {
	let guid: Arc<str> = Arc::from(guid);
	let object = RemoteObject::new(
		Arc::clone(&guid),
		kind,
		None,
		json!({}),
		Channel::detached(guid),
	);
	store.insert(Arc::clone(&object));
	object
}

/// Encodes, pushes through wire JSON, and decodes against `store`.
fn round_trip(value: &JsValue, store: &ObjectStore) -> JsValue {
	let arg = serialize_argument(value).unwrap();
	let wire = serde_json::to_value(&arg).unwrap();
	let back: SerializedArgument = serde_json::from_value(wire).unwrap();
	Decoder::new(&back.handles, store).decode(&back.value).unwrap()
}

#[test]
fn test_special_numbers_use_sentinels() {
	let cases = [
		(f64::NAN, SpecialValue::NaN),
		(f64::INFINITY, SpecialValue::Infinity),
		(f64::NEG_INFINITY, SpecialValue::NegInfinity),
		(-0.0, SpecialValue::NegZero),
	];
	for (n, expected) in cases {
		let arg = serialize_argument(&n).unwrap();
		assert_eq!(arg.value, SerializedValue::Special(expected));
	}

	assert_eq!(serialize_argument(&0.0f64).unwrap().value, SerializedValue::Number(0.0));
}

#[test]
fn test_negative_zero_survives_round_trip() {
	let store = empty_store();
	let back = round_trip(&JsValue::Number(-0.0), &store);
	assert_eq!(back, JsValue::Number(-0.0));
	assert_ne!(back, JsValue::Number(0.0));
}

#[test]
fn test_null_and_undefined() {
	assert_eq!(serialize_argument(&()).unwrap().value, SerializedValue::undefined());
	assert_eq!(serialize_argument(&None::<i32>).unwrap().value, SerializedValue::null());
	assert_eq!(
		serialize_argument(&JsValue::Null).unwrap().value.to_json(),
		json!({"v": "null"})
	);
}

#[test]
fn test_wide_integers_become_bigint() {
	let small = serialize_argument(&42u64).unwrap().value;
	assert_eq!(small, SerializedValue::Number(42.0));

	let big = serialize_argument(&u64::MAX).unwrap().value;
	assert_eq!(big, SerializedValue::BigInt(u64::MAX.to_string()));

	let negative = serialize_argument(&i64::MIN).unwrap().value;
	assert_eq!(negative, SerializedValue::BigInt(i64::MIN.to_string()));
}

#[test]
fn test_integer_bounds_are_exact() {
	let two_pow_63 = JsValue::Number(9_223_372_036_854_775_808.0);
	let err = i64::from_value_tree(two_pow_63).unwrap_err();
	assert!(matches!(err, Error::Protocol(_)));
	assert!(err.to_string().contains("i64"));

	let min = i64::from_value_tree(JsValue::Number(-9_223_372_036_854_775_808.0)).unwrap();
	assert_eq!(min, i64::MIN);

	assert!(u64::from_value_tree(JsValue::Number(18_446_744_073_709_551_616.0)).is_err());
	assert!(u8::from_value_tree(JsValue::Number(256.0)).is_err());
	assert_eq!(u8::from_value_tree(JsValue::Number(255.0)).unwrap(), 255);
	assert!(i8::from_value_tree(JsValue::Number(-129.0)).is_err());
	assert_eq!(i8::from_value_tree(JsValue::Number(-128.0)).unwrap(), i8::MIN);
}

#[test]
fn test_date_wire_format() {
	let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
	let arg = serialize_argument(&date).unwrap();
	assert_eq!(arg.value.to_json(), json!({"d": "2024-03-01T12:30:00.000Z"}));

	let store = empty_store();
	assert_eq!(round_trip(&JsValue::Date(date), &store), JsValue::Date(date));
}

#[test]
fn test_unparsable_date_decodes_as_string() {
	let store = empty_store();
	let decoded = Decoder::new(&[], &store)
		.decode(&SerializedValue::Date("yesterday".to_string()))
		.unwrap();
	assert_eq!(decoded, JsValue::String("yesterday".to_string()));
}

#[test]
fn test_maps_keep_order() {
	let mut map = BTreeMap::new();
	map.insert("b", 2);
	map.insert("a", 1);
	let arg = serialize_argument(&map).unwrap();
	assert_eq!(
		arg.value.to_json(),
		json!({"o": [{"k": "a", "v": {"n": 1.0}}, {"k": "b", "v": {"n": 2.0}}]})
	);
}

#[test]
fn test_self_containing_object_is_rejected() {
	let obj = JsObject::new();
	obj.insert("name", "loop");
	obj.insert("self", obj.clone());

	let err = serialize_argument(&JsValue::Object(obj)).unwrap_err();
	match err {
		Error::CircularStructure { path } => assert_eq!(path, "arg.self"),
		other => panic!("expected circular structure, got {other:?}"),
	}
}

#[test]
fn test_transitive_cycle_names_path() {
	let outer = JsObject::new();
	let inner = JsObject::new();
	inner.insert("back", outer.clone());
	outer.insert("items", JsValue::Array(vec![JsValue::Null, inner.into()]));

	let err = serialize_argument(&outer).unwrap_err();
	match err {
		Error::CircularStructure { path } => assert_eq!(path, "arg.items[1].back"),
		other => panic!("expected circular structure, got {other:?}"),
	}
}

#[test]
fn test_shared_but_acyclic_object_is_allowed() {
	let shared = JsObject::from_entries([("x", 1)]);
	let parent = JsObject::new();
	parent.insert("left", shared.clone());
	parent.insert("right", shared);

	assert!(serialize_argument(&parent).is_ok());
}

#[test]
fn test_non_identifier_keys_are_quoted_in_path() {
	let obj = JsObject::new();
	obj.insert("a-b", obj.clone());
	let err = serialize_argument(&obj).unwrap_err();
	assert!(err.to_string().contains(r#"arg["a-b"]"#), "{err}");
}

#[test]
fn test_handles_go_to_side_list() {
	let store = empty_store();
	let page = register(&store, "page@1", ObjectType::Page);
	let frame = register(&store, "frame@1", ObjectType::Frame);

	let value = JsValue::Array(vec![
		JsValue::Handle(Arc::clone(&page)),
		JsValue::Handle(Arc::clone(&frame)),
		JsValue::Handle(Arc::clone(&page)),
	]);
	let arg = serialize_argument(&value).unwrap();

	assert_eq!(
		arg.handles,
		vec![
			HandleRef { guid: Arc::from("page@1") },
			HandleRef { guid: Arc::from("frame@1") },
		]
	);
	assert_eq!(
		arg.value,
		SerializedValue::Array(vec![
			SerializedValue::Handle(0),
			SerializedValue::Handle(1),
			SerializedValue::Handle(0),
		])
	);

	let back = round_trip(&value, &store);
	let items = back.as_array().unwrap();
	assert!(Arc::ptr_eq(items[2].as_handle().unwrap(), &page));
}

#[test]
fn test_serialize_value_rejects_handles() {
	let store = empty_store();
	let page = register(&store, "page@1", ObjectType::Page);
	let err = serialize_value(&page).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
	assert!(serialize_value(&"plain").is_ok());
}

#[test]
fn test_decode_handle_errors() {
	let store = empty_store();
	let out_of_range = Decoder::new(&[], &store).decode(&SerializedValue::Handle(3));
	assert!(matches!(out_of_range, Err(Error::Protocol(_))));

	let handles = [HandleRef { guid: Arc::from("page@gone") }];
	let missing = Decoder::new(&handles, &store).decode(&SerializedValue::Handle(0));
	assert!(matches!(missing, Err(Error::ObjectNotFound { .. })));
}

#[test]
fn test_raw_passes_through() {
	let store = empty_store();
	let tree = SerializedValue::from_json(&json!({"ref": 4}));
	let decoded = Decoder::new(&[], &store).decode(&tree).unwrap();
	assert_eq!(decoded.get("ref"), Some(JsValue::Number(4.0)));
}

#[test]
fn test_shape_defaults_for_nullish() {
	assert_eq!(i32::from_value_tree(JsValue::Undefined).unwrap(), 0);
	assert_eq!(String::from_value_tree(JsValue::Null).unwrap(), "");
	assert!(!bool::from_value_tree(JsValue::Undefined).unwrap());
	assert_eq!(Option::<u8>::from_value_tree(JsValue::Null).unwrap(), None);
	assert!(Vec::<String>::from_value_tree(JsValue::Undefined).unwrap().is_empty());
	assert!(HashMap::<String, f64>::from_value_tree(JsValue::Null).unwrap().is_empty());
}

#[test]
fn test_coercions() {
	assert_eq!(u16::from_value_tree(JsValue::Number(80.0)).unwrap(), 80);
	assert!(u8::from_value_tree(JsValue::Number(300.0)).is_err());
	assert!(i32::from_value_tree(JsValue::Number(1.5)).is_err());
	assert_eq!(i64::from_value_tree(JsValue::BigInt("9007199254740993".into())).unwrap(), 9_007_199_254_740_993);
	assert_eq!(String::from_value_tree(JsValue::Number(3.0)).unwrap(), "3");
	assert_eq!(String::from_value_tree(JsValue::Number(-0.0)).unwrap(), "0");
	assert_eq!(f64::from_value_tree(JsValue::String(" 2.5 ".into())).unwrap(), 2.5);
	assert!(f64::from_value_tree(JsValue::Array(vec![])).is_err());

	let date = DateTime::<Utc>::from_value_tree(JsValue::Number(0.0)).unwrap();
	assert_eq!(date.timestamp_millis(), 0);
}

#[derive(Debug, PartialEq)]
struct Geometry {
	width: u32,
	height: u32,
	label: Option<String>,
	tags: Vec<String>,
}

impl_value_tree!(Geometry {
	width => "width",
	height => "height",
	label => "label",
	tags => "tags",
});

#[test]
fn test_struct_encodes_in_declaration_order() {
	let geometry = Geometry {
		width: 800,
		height: 600,
		label: None,
		tags: vec!["main".to_string()],
	};
	let arg = serialize_argument(&geometry).unwrap();
	assert_eq!(
		arg.value.to_json(),
		json!({"o": [
			{"k": "width", "v": {"n": 800.0}},
			{"k": "height", "v": {"n": 600.0}},
			{"k": "label", "v": {"v": "null"}},
			{"k": "tags", "v": {"a": [{"s": "main"}]}},
		]})
	);
}

#[test]
fn test_struct_decodes_case_insensitively() {
	let obj = JsObject::new();
	obj.insert("WIDTH", 1024);
	obj.insert("Height", 768);
	obj.insert("unrelated", true);

	let geometry = Geometry::from_value_tree(JsValue::Object(obj)).unwrap();
	assert_eq!(
		geometry,
		Geometry {
			width: 1024,
			height: 768,
			label: None,
			tags: Vec::new(),
		}
	);
}

#[test]
fn test_struct_member_error_names_member() {
	let obj = JsObject::from_entries([("width", JsValue::from("wide"))]);
	let err = Geometry::from_value_tree(JsValue::Object(obj)).unwrap_err();
	assert!(err.to_string().contains("Geometry.width"), "{err}");
}

#[test]
fn test_parse_result_into_shape() {
	let store = empty_store();
	let tree = SerializedValue::from_json(&json!({"o": [
		{"k": "width", "v": {"n": 10}},
		{"k": "height", "v": {"n": 20}},
		{"k": "label", "v": {"s": "box"}},
	]}));
	let geometry: Geometry = parse_result(&tree, &[], &store).unwrap();
	assert_eq!(geometry.label.as_deref(), Some("box"));
	assert_eq!((geometry.width, geometry.height), (10, 20));
}

#[test]
fn test_resolve_guid_refs() {
	let store = empty_store();
	let response = register(&store, "response@1", ObjectType::Response);

	let result = json!({"response": {"guid": "response@1"}, "status": 200});
	let mut guids = Vec::new();
	collect_guid_refs(&result, &mut guids);
	assert_eq!(guids, vec![Arc::<str>::from("response@1")]);

	let resolved = resolve_guid_refs(result, &store).unwrap();
	let handle = resolved.get("response").unwrap();
	assert!(Arc::ptr_eq(handle.as_handle().unwrap(), &response));
	assert_eq!(resolved.get("status"), Some(JsValue::Number(200.0)));

	let missing = resolve_guid_refs(json!([{"guid": "page@9"}]), &store);
	assert!(matches!(missing, Err(Error::ObjectNotFound { .. })));
}

#[test]
fn test_guid_with_other_members_is_plain_object() {
	let store = empty_store();
	let resolved = resolve_guid_refs(json!({"guid": "x", "other": 1}), &store).unwrap();
	assert_eq!(resolved.get("guid"), Some(JsValue::String("x".into())));
}

#[test]
fn test_to_json_breaks_cycles() {
	let obj = JsObject::new();
	obj.insert("n", f64::NAN);
	obj.insert("self", obj.clone());
	assert_eq!(JsValue::Object(obj).to_json(), json!({"n": null, "self": null}));
}

fn js_value_strategy() -> impl Strategy<Value = JsValue> {
	let leaf = prop_oneof![
		Just(JsValue::Null),
		Just(JsValue::Undefined),
		any::<bool>().prop_map(JsValue::Bool),
		prop_oneof![
			any::<f64>(),
			Just(f64::NAN),
			Just(f64::INFINITY),
			Just(f64::NEG_INFINITY),
			Just(-0.0),
		]
		.prop_map(JsValue::Number),
		".*".prop_map(JsValue::String),
		// Years 1 through 9999, the range RFC 3339 can spell.
		(-62_135_596_800_000i64..253_402_300_799_000i64).prop_map(|ms| {
			JsValue::Date(DateTime::from_timestamp_millis(ms).unwrap_or_default())
		}),
	];

	leaf.prop_recursive(4, 32, 6, |inner| {
		prop_oneof![
			prop::collection::vec(inner.clone(), 0..6).prop_map(JsValue::Array),
			prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
				.prop_map(|entries| JsValue::Object(JsObject::from_entries(entries))),
		]
	})
}

proptest! {
	#[test]
	fn prop_round_trip(value in js_value_strategy()) {
		let store = empty_store();
		let back = round_trip(&value, &store);
		prop_assert_eq!(back, value);
	}

	#[test]
	fn prop_cycle_always_detected(depth in 1usize..6) {
		let root = JsObject::new();
		let mut cursor = root.clone();
		for level in 0..depth {
			let next = JsObject::new();
			cursor.insert(format!("k{level}"), next.clone());
			cursor = next;
		}
		cursor.insert("back", root.clone());

		let result = serialize_argument(&root);
		prop_assert!(
			matches!(result, Err(Error::CircularStructure { .. })),
			"expected circular structure error"
		);
	}
}
