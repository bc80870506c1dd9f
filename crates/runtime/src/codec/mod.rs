//! Conversion between Rust values and the wire value tree.
//!
//! Arguments go out through [`ToValueTree`], which writes a
//! [`SerializedValue`](pw_protocol::SerializedValue) and collects referenced
//! remote objects into a side list of handles. Results come back through a
//! [`Decoder`] into [`JsValue`], then into the caller's shape with
//! [`FromValueTree`].
//!
//! Only [`JsObject`] can form cycles, since it shares storage between clones.
//! The [`Encoder`] tracks the objects on the current path and fails with
//! [`Error::CircularStructure`](crate::Error::CircularStructure) when one
//! repeats, naming where it happened (`arg.a[0].b`).
//!
//! Plain structs opt in with [`impl_value_tree!`](crate::impl_value_tree):
//!
//! ```
//! use pw_runtime::{impl_value_tree, serialize_argument};
//!
//! struct Viewport {
//!     width: u32,
//!     height: u32,
//! }
//!
//! impl_value_tree!(Viewport {
//!     width => "width",
//!     height => "height",
//! });
//!
//! let arg = serialize_argument(&Viewport { width: 800, height: 600 }).unwrap();
//! assert!(arg.handles.is_empty());
//! ```

mod deserialize;
mod js_value;
mod serialize;

#[cfg(test)]
mod tests;

pub use deserialize::{
	Decoder, FromValueTree, ObjectLookup, collect_guid_refs, parse_result, resolve_guid_refs,
};
#[doc(hidden)]
pub use deserialize::{member_error, object_members, take_member};
pub use js_value::{JsObject, JsValue};
pub use serialize::{Encoder, ToValueTree, serialize_argument, serialize_value};

/// Implements [`ToValueTree`] and [`FromValueTree`] for a struct with named
/// fields, mapping each field to its wire name.
///
/// Decoding matches wire names case-insensitively and reads missing members
/// as `undefined`.
#[macro_export]
macro_rules! impl_value_tree {
	($ty:ident { $($field:ident => $wire:literal),* $(,)? }) => {
		impl $crate::ToValueTree for $ty {
			fn to_value_tree(
				&self,
				encoder: &mut $crate::Encoder,
			) -> $crate::Result<$crate::SerializedValue> {
				#[allow(unused_mut)]
				let mut fields = ::std::vec::Vec::new();
				$(
					fields.push((
						::std::string::String::from($wire),
						encoder.field($wire, &self.$field)?,
					));
				)*
				::std::result::Result::Ok($crate::SerializedValue::Object(fields))
			}
		}

		impl $crate::FromValueTree for $ty {
			fn from_value_tree(value: $crate::JsValue) -> $crate::Result<Self> {
				#[allow(unused_mut, unused_variables)]
				let mut members = $crate::codec::object_members(value, stringify!($ty))?;
				::std::result::Result::Ok(Self {
					$(
						$field: $crate::FromValueTree::from_value_tree(
							$crate::codec::take_member(&mut members, $wire),
						)
						.map_err(|e| $crate::codec::member_error(stringify!($ty), $wire, e))?,
					)*
				})
			}
		}
	};
}
