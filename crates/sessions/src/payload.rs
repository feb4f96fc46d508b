//! Payload codec.
//!
//! Encoding never fails. Caller data goes through [`SafeSerializer`], which
//! builds a JSON value and swaps in a marker string for anything it cannot
//! represent:
//!
//! - a value whose `Serialize` impl errors becomes `"[Throws: <reason>]"`
//! - nesting deeper than [`MAX_DEPTH`] JSON levels becomes [`CIRCULAR_MARKER`]
//!   (a self-referential `Serialize` graph shows up as unbounded depth)
//! - non-finite floats become `null`, non-string map keys their JSON text

use std::fmt;

use {
    serde::{Serialize, Serializer, de::DeserializeOwned, ser},
    serde_json::{Map, Value},
};

/// Substituted for values nested deeper than [`MAX_DEPTH`].
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// Maximum JSON nesting depth before a value is replaced with [`CIRCULAR_MARKER`].
///
/// One below serde_json's parser recursion limit, so every stored payload
/// parses back. `Option`, newtype and smart-pointer layers add no JSON level;
/// they are bounded separately by the same count.
pub const MAX_DEPTH: usize = 127;

/// Serialize caller data into its stored form.
///
/// `None`, and data that serializes to JSON `null`, are stored as no payload.
pub fn encode<T: Serialize + ?Sized>(data: Option<&T>) -> Option<String> {
    match to_safe_value(data?) {
        Value::Null => None,
        value => Some(value.to_string()),
    }
}

/// Decode a stored payload. A missing payload or JSON `null` yields `None`.
pub fn decode<T: DeserializeOwned>(payload: Option<&str>) -> Result<Option<T>, serde_json::Error> {
    let Some(raw) = payload else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Null => Ok(None),
        value => serde_json::from_value(value).map(Some),
    }
}

/// Convert any `Serialize` value to JSON, substituting markers instead of failing.
pub fn to_safe_value<T: Serialize + ?Sized>(data: &T) -> Value {
    capture(data, 0)
}

fn capture<T: Serialize + ?Sized>(value: &T, depth: usize) -> Value {
    capture_with(value, SafeSerializer { depth, wrappers: 0 })
}

fn capture_with<T: Serialize + ?Sized>(value: &T, serializer: SafeSerializer) -> Value {
    if serializer.depth >= MAX_DEPTH || serializer.wrappers >= MAX_DEPTH {
        return Value::String(CIRCULAR_MARKER.to_owned());
    }
    value
        .serialize(serializer)
        .unwrap_or_else(|e| Value::String(format!("[Throws: {e}]")))
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Debug)]
pub struct Unserializable(String);

impl fmt::Display for Unserializable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Unserializable {}

impl ser::Error for Unserializable {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Serializer into [`serde_json::Value`] that isolates failures per value.
///
/// Every nested value is captured separately, so an error only replaces the
/// value that raised it. `depth` counts JSON containers; `wrappers` counts
/// transparent layers since the last container.
pub struct SafeSerializer {
    depth: usize,
    wrappers: usize,
}

impl SafeSerializer {
    fn unwrapped(&self) -> Self {
        Self {
            depth: self.depth,
            wrappers: self.wrappers + 1,
        }
    }
}

impl Serializer for SafeSerializer {
    type Error = Unserializable;
    type Ok = Value;
    type SerializeMap = MapBuilder;
    type SerializeSeq = SeqBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantBuilder<MapBuilder>;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;

    fn serialize_bool(self, v: bool) -> Result<Value, Unserializable> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Unserializable> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, Unserializable> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, Unserializable> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, Unserializable> {
        Ok(Value::Array(v.iter().copied().map(Value::from).collect()))
    }

    fn serialize_none(self) -> Result<Value, Unserializable> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, Unserializable> {
        Ok(capture_with(value, self.unwrapped()))
    }

    fn serialize_unit(self) -> Result<Value, Unserializable> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Unserializable> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Unserializable> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Unserializable> {
        Ok(capture_with(value, self.unwrapped()))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Unserializable> {
        let mut map = Map::new();
        map.insert(variant.to_owned(), capture(value, self.depth + 1));
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, Unserializable> {
        Ok(SeqBuilder {
            depth: self.depth,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, Unserializable> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, Unserializable> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<SeqBuilder>, Unserializable> {
        Ok(VariantBuilder {
            variant,
            inner: SeqBuilder {
                depth: self.depth + 1,
                items: Vec::with_capacity(len),
            },
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, Unserializable> {
        Ok(MapBuilder {
            depth: self.depth,
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<MapBuilder, Unserializable> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<MapBuilder>, Unserializable> {
        Ok(VariantBuilder {
            variant,
            inner: MapBuilder {
                depth: self.depth + 1,
                map: Map::with_capacity(len),
                next_key: None,
            },
        })
    }
}

pub struct SeqBuilder {
    depth: usize,
    items: Vec<Value>,
}

impl SeqBuilder {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) {
        self.items.push(capture(value, self.depth + 1));
    }

    fn finish(self) -> Value {
        Value::Array(self.items)
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unserializable> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unserializable> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unserializable> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(self.finish())
    }
}

pub struct MapBuilder {
    depth: usize,
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl MapBuilder {
    fn insert<T: ?Sized + Serialize>(&mut self, key: String, value: &T) {
        let value = capture(value, self.depth + 1);
        self.map.insert(key, value);
    }

    fn finish(self) -> Value {
        Value::Object(self.map)
    }
}

impl ser::SerializeMap for MapBuilder {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Unserializable> {
        self.next_key = Some(key_string(capture(key, self.depth + 1)));
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unserializable> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| Unserializable("map value without a key".to_owned()))?;
        self.insert(key, value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Unserializable> {
        self.insert(key.to_owned(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(self.finish())
    }
}

/// Externally tagged enum variant: `{ "<variant>": <inner> }`.
pub struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl<B> VariantBuilder<B> {
    fn wrap(variant: &'static str, inner: Value) -> Value {
        let mut map = Map::new();
        map.insert(variant.to_owned(), inner);
        Value::Object(map)
    }
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unserializable> {
        self.inner.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(Self::wrap(self.variant, self.inner.finish()))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<MapBuilder> {
    type Error = Unserializable;
    type Ok = Value;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Unserializable> {
        self.inner.insert(key.to_owned(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, Unserializable> {
        Ok(Self::wrap(self.variant, self.inner.finish()))
    }
}
