//! Tagged structured-value codec.
//!
//! Payloads are trees of self-describing values. A struct is a sequence
//! of (tag, type, value) triples terminated by a zero sentinel; lists,
//! maps and int-lists carry an element count instead and have no
//! sentinel. The packet root is a struct encoded without its trailing
//! sentinel (decode also accepts end-of-buffer as the terminator).

use crate::error::ProtocolError;
use crate::tag::Tag;
use crate::varint::{decode_integer, encode_integer};
use bytes::{Buf, BufMut, BytesMut};

/// Wire type tags for structured values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    String,
    Blob,
    Struct,
    List,
    Map,
    Union,
    IntList,
    Double,
    Triple,
    Float,
}

impl ValueKind {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(ValueKind::Integer),
            1 => Ok(ValueKind::String),
            2 => Ok(ValueKind::Blob),
            3 => Ok(ValueKind::Struct),
            4 => Ok(ValueKind::List),
            5 => Ok(ValueKind::Map),
            6 => Ok(ValueKind::Union),
            7 => Ok(ValueKind::IntList),
            8 => Ok(ValueKind::Double),
            9 => Ok(ValueKind::Triple),
            10 => Ok(ValueKind::Float),
            other => Err(ProtocolError::UnknownValueType(other)),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            ValueKind::Integer => 0,
            ValueKind::String => 1,
            ValueKind::Blob => 2,
            ValueKind::Struct => 3,
            ValueKind::List => 4,
            ValueKind::Map => 5,
            ValueKind::Union => 6,
            ValueKind::IntList => 7,
            ValueKind::Double => 8,
            ValueKind::Triple => 9,
            ValueKind::Float => 10,
        }
    }
}

/// Identity of a struct field: the decompressed tag plus the wire type
/// it was read with. Two fields are equal only when both match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub tag: Tag,
    pub kind: ValueKind,
}

/// Union discriminant marking an empty union.
pub const UNION_EMPTY: u8 = 0x7F;

/// A decoded structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
    Struct(BlazeStruct),
    List {
        kind: ValueKind,
        /// Wire quirk: a struct list may carry a literal 0x02 after its
        /// size byte; it is consumed on decode and re-emitted on encode.
        versioned: bool,
        items: Vec<Value>,
    },
    Map {
        key_kind: ValueKind,
        value_kind: ValueKind,
        entries: Vec<(Value, Value)>,
    },
    Union {
        /// Active member index, [`UNION_EMPTY`] when the union is empty.
        member: u8,
        field: Option<(FieldKey, Box<Value>)>,
    },
    IntList(Vec<i64>),
    Pair([i64; 2]),
    Triple([i64; 3]),
    Float(f32),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Integer,
            Value::Text(_) => ValueKind::String,
            Value::Blob(_) => ValueKind::Blob,
            Value::Struct(_) => ValueKind::Struct,
            Value::List { .. } => ValueKind::List,
            Value::Map { .. } => ValueKind::Map,
            Value::Union { .. } => ValueKind::Union,
            Value::IntList(_) => ValueKind::IntList,
            Value::Pair(_) => ValueKind::Double,
            Value::Triple(_) => ValueKind::Triple,
            Value::Float(_) => ValueKind::Float,
        }
    }

    /// Convenience accessor for integer values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Convenience accessor for string values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// An ordered struct: a sequence of (key, value) fields preserving wire
/// order. Lookups match on the tag name; [`BlazeStruct::get_key`]
/// additionally requires the wire type to match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlazeStruct {
    fields: Vec<(FieldKey, Value)>,
}

impl BlazeStruct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, deriving the wire type from the value.
    pub fn insert(&mut self, tag: Tag, value: Value) {
        let key = FieldKey {
            tag,
            kind: value.kind(),
        };
        self.fields.push((key, value));
    }

    /// Builder-style [`BlazeStruct::insert`].
    pub fn with(mut self, tag: Tag, value: Value) -> Self {
        self.insert(tag, value);
        self
    }

    /// Returns the first field whose tag name matches.
    pub fn get(&self, tag: &str) -> Option<&Value> {
        let tag = Tag::new(tag).ok()?;
        self.fields
            .iter()
            .find(|(key, _)| key.tag == tag)
            .map(|(_, value)| value)
    }

    /// Returns the field matching both tag and wire type.
    pub fn get_key(&self, key: FieldKey) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FieldKey, Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encodes the struct as a packet root: fields only, no trailing
    /// sentinel. Nested struct values remain self-terminating.
    pub fn encode_root(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        encode_fields(self, buf)
    }

    /// Decodes a packet-root struct: fields until a zero sentinel or
    /// the end of the buffer.
    pub fn decode_root(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        decode_struct(buf)
    }
}

fn need(buf: &[u8], n: usize) -> Result<(), ProtocolError> {
    if buf.len() < n {
        Err(ProtocolError::Truncated {
            needed: n - buf.len(),
        })
    } else {
        Ok(())
    }
}

fn decode_length(buf: &mut &[u8]) -> Result<usize, ProtocolError> {
    let n = decode_integer(buf)?;
    if n < 0 {
        return Err(ProtocolError::InvalidLength(n));
    }
    Ok(n as usize)
}

fn decode_struct(buf: &mut &[u8]) -> Result<BlazeStruct, ProtocolError> {
    let mut fields = BlazeStruct::new();
    while let Some(&next) = buf.first() {
        if next == 0 {
            buf.advance(1);
            return Ok(fields);
        }
        need(buf, 4)?;
        let mut raw = [0u8; 3];
        buf.copy_to_slice(&mut raw);
        let tag = Tag::decompress(raw);
        let kind = ValueKind::from_byte(buf.get_u8())?;
        let value = decode_value(kind, buf)?;
        fields.fields.push((FieldKey { tag, kind }, value));
    }
    // End of buffer terminates the root struct.
    Ok(fields)
}

/// Decodes one value of the given wire type from the front of `buf`.
pub fn decode_value(kind: ValueKind, buf: &mut &[u8]) -> Result<Value, ProtocolError> {
    match kind {
        ValueKind::Integer => Ok(Value::Int(decode_integer(buf)?)),
        ValueKind::String => {
            let bytes = decode_terminated_bytes(buf)?;
            let text = String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
            Ok(Value::Text(text))
        }
        ValueKind::Blob => Ok(Value::Blob(decode_terminated_bytes(buf)?)),
        ValueKind::Struct => Ok(Value::Struct(decode_struct(buf)?)),
        ValueKind::List => {
            need(buf, 1)?;
            let elem = ValueKind::from_byte(buf.get_u8())?;
            let size = decode_length(buf)?;
            let versioned = elem == ValueKind::Struct && buf.first() == Some(&2);
            if versioned {
                buf.advance(1);
            }
            let mut items = Vec::with_capacity(size.min(1024));
            for _ in 0..size {
                items.push(decode_value(elem, buf)?);
            }
            Ok(Value::List {
                kind: elem,
                versioned,
                items,
            })
        }
        ValueKind::Map => {
            need(buf, 2)?;
            let key_kind = ValueKind::from_byte(buf.get_u8())?;
            let value_kind = ValueKind::from_byte(buf.get_u8())?;
            let size = decode_length(buf)?;
            let mut entries = Vec::with_capacity(size.min(1024));
            for _ in 0..size {
                let key = decode_value(key_kind, buf)?;
                let value = decode_value(value_kind, buf)?;
                entries.push((key, value));
            }
            Ok(Value::Map {
                key_kind,
                value_kind,
                entries,
            })
        }
        ValueKind::Union => {
            need(buf, 1)?;
            let member = buf.get_u8();
            if member == UNION_EMPTY {
                return Ok(Value::Union {
                    member,
                    field: None,
                });
            }
            need(buf, 4)?;
            let mut raw = [0u8; 3];
            buf.copy_to_slice(&mut raw);
            let tag = Tag::decompress(raw);
            let kind = ValueKind::from_byte(buf.get_u8())?;
            let value = decode_value(kind, buf)?;
            Ok(Value::Union {
                member,
                field: Some((FieldKey { tag, kind }, Box::new(value))),
            })
        }
        ValueKind::IntList => {
            let size = decode_length(buf)?;
            let mut items = Vec::with_capacity(size.min(1024));
            for _ in 0..size {
                items.push(decode_integer(buf)?);
            }
            Ok(Value::IntList(items))
        }
        ValueKind::Double => Ok(Value::Pair([decode_integer(buf)?, decode_integer(buf)?])),
        ValueKind::Triple => Ok(Value::Triple([
            decode_integer(buf)?,
            decode_integer(buf)?,
            decode_integer(buf)?,
        ])),
        ValueKind::Float => {
            need(buf, 4)?;
            Ok(Value::Float(buf.get_f32()))
        }
    }
}

/// Strings and blobs store their length including a trailing NUL byte
/// which is not part of the content. Some peers encode an empty value
/// as a bare zero length with no terminator at all; both spellings
/// decode to empty content.
fn decode_terminated_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = decode_length(buf)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    need(buf, len)?;
    let content = buf[..len - 1].to_vec();
    buf.advance(len);
    Ok(content)
}

fn encode_fields(fields: &BlazeStruct, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    for (key, value) in fields.iter() {
        if value.kind() != key.kind {
            return Err(ProtocolError::KindMismatch {
                expected: key.kind,
                actual: value.kind(),
            });
        }
        buf.put_slice(&key.tag.compress());
        buf.put_u8(key.kind.byte());
        encode_value(value, buf)?;
    }
    Ok(())
}

/// Encodes one value (its type byte is written by the caller).
pub fn encode_value(value: &Value, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    match value {
        Value::Int(n) => encode_integer(*n, buf),
        Value::Text(s) => encode_terminated_bytes(s.as_bytes(), buf),
        Value::Blob(bytes) => encode_terminated_bytes(bytes, buf),
        Value::Struct(fields) => {
            encode_fields(fields, buf)?;
            buf.put_u8(0);
        }
        Value::List {
            kind,
            versioned,
            items,
        } => {
            buf.put_u8(kind.byte());
            encode_integer(items.len() as i64, buf);
            if *versioned {
                buf.put_u8(2);
            }
            for item in items {
                if item.kind() != *kind {
                    return Err(ProtocolError::KindMismatch {
                        expected: *kind,
                        actual: item.kind(),
                    });
                }
                encode_value(item, buf)?;
            }
        }
        Value::Map {
            key_kind,
            value_kind,
            entries,
        } => {
            buf.put_u8(key_kind.byte());
            buf.put_u8(value_kind.byte());
            encode_integer(entries.len() as i64, buf);
            for (key, value) in entries {
                if key.kind() != *key_kind {
                    return Err(ProtocolError::KindMismatch {
                        expected: *key_kind,
                        actual: key.kind(),
                    });
                }
                if value.kind() != *value_kind {
                    return Err(ProtocolError::KindMismatch {
                        expected: *value_kind,
                        actual: value.kind(),
                    });
                }
                encode_value(key, buf)?;
                encode_value(value, buf)?;
            }
        }
        Value::Union { member, field } => match field {
            Some((key, value)) => {
                buf.put_u8(*member);
                buf.put_slice(&key.tag.compress());
                buf.put_u8(key.kind.byte());
                if value.kind() != key.kind {
                    return Err(ProtocolError::KindMismatch {
                        expected: key.kind,
                        actual: value.kind(),
                    });
                }
                encode_value(value, buf)?;
            }
            None => buf.put_u8(UNION_EMPTY),
        },
        Value::IntList(items) => {
            encode_integer(items.len() as i64, buf);
            for n in items {
                encode_integer(*n, buf);
            }
        }
        Value::Pair([a, b]) => {
            encode_integer(*a, buf);
            encode_integer(*b, buf);
        }
        Value::Triple([a, b, c]) => {
            encode_integer(*a, buf);
            encode_integer(*b, buf);
            encode_integer(*c, buf);
        }
        Value::Float(f) => buf.put_f32(*f),
    }
    Ok(())
}

fn encode_terminated_bytes(content: &[u8], buf: &mut BytesMut) {
    encode_integer(content.len() as i64 + 1, buf);
    buf.put_slice(content);
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Tag {
        Tag::new(name).unwrap()
    }

    fn roundtrip(value: Value) -> Value {
        let root = BlazeStruct::new().with(tag("DATA"), value);
        let mut buf = BytesMut::new();
        root.encode_root(&mut buf).unwrap();
        let mut cursor = &buf[..];
        let decoded = BlazeStruct::decode_root(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        decoded.get("DATA").unwrap().clone()
    }

    #[test]
    fn test_integer_roundtrip() {
        for n in [0, 1, -1, 63, 64, -64, 8192, i64::MAX, i64::MIN] {
            assert_eq!(roundtrip(Value::Int(n)), Value::Int(n));
        }
    }

    #[test]
    fn test_string_roundtrip() {
        for s in ["", "x", "hello world", "日本語"] {
            assert_eq!(
                roundtrip(Value::Text(s.to_string())),
                Value::Text(s.to_string())
            );
        }
    }

    #[test]
    fn test_empty_string_shorthand() {
        // An empty string encodes as length 1 plus the NUL terminator.
        let root = BlazeStruct::new().with(tag("TEXT"), Value::Text(String::new()));
        let mut buf = BytesMut::new();
        root.encode_root(&mut buf).unwrap();
        assert_eq!(&buf[buf.len() - 2..], &[0x01, 0x00]);
    }

    #[test]
    fn test_blob_roundtrip() {
        for content in [vec![], vec![0u8], vec![1, 2, 3, 0xFF]] {
            assert_eq!(
                roundtrip(Value::Blob(content.clone())),
                Value::Blob(content)
            );
        }
    }

    #[test]
    fn test_zero_length_blob_decodes_empty() {
        // Some encoders emit an empty blob as a bare zero length with
        // no NUL terminator.
        let mut buf = BytesMut::new();
        buf.put_slice(&tag("BLOB").compress());
        buf.put_u8(ValueKind::Blob.byte());
        buf.put_u8(0x00);
        let mut cursor = &buf[..];
        let decoded = BlazeStruct::decode_root(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        assert_eq!(decoded.get("BLOB"), Some(&Value::Blob(Vec::new())));
    }

    #[test]
    fn test_nested_struct_roundtrip() {
        let inner = BlazeStruct::new()
            .with(tag("NAME"), Value::Text("abc".into()))
            .with(tag("NUM "), Value::Int(-7));
        let value = Value::Struct(inner);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_empty_struct_roundtrip() {
        let value = Value::Struct(BlazeStruct::new());
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_list_roundtrip() {
        let value = Value::List {
            kind: ValueKind::Integer,
            versioned: false,
            items: vec![Value::Int(1), Value::Int(-2), Value::Int(300)],
        };
        assert_eq!(roundtrip(value.clone()), value);

        let empty = Value::List {
            kind: ValueKind::String,
            versioned: false,
            items: vec![],
        };
        assert_eq!(roundtrip(empty.clone()), empty);
    }

    #[test]
    fn test_versioned_struct_list_quirk() {
        let item = Value::Struct(BlazeStruct::new().with(tag("ID  "), Value::Int(9)));
        let value = Value::List {
            kind: ValueKind::Struct,
            versioned: true,
            items: vec![item],
        };
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_map_roundtrip() {
        let value = Value::Map {
            key_kind: ValueKind::String,
            value_kind: ValueKind::Integer,
            entries: vec![
                (Value::Text("a".into()), Value::Int(1)),
                (Value::Text("b".into()), Value::Int(2)),
            ],
        };
        assert_eq!(roundtrip(value.clone()), value);

        let empty = Value::Map {
            key_kind: ValueKind::Integer,
            value_kind: ValueKind::String,
            entries: vec![],
        };
        assert_eq!(roundtrip(empty.clone()), empty);
    }

    #[test]
    fn test_union_roundtrip() {
        let empty = Value::Union {
            member: UNION_EMPTY,
            field: None,
        };
        assert_eq!(roundtrip(empty.clone()), empty);

        let key = FieldKey {
            tag: tag("VALU"),
            kind: ValueKind::Integer,
        };
        let filled = Value::Union {
            member: 2,
            field: Some((key, Box::new(Value::Int(42)))),
        };
        assert_eq!(roundtrip(filled.clone()), filled);
    }

    #[test]
    fn test_int_list_pair_triple_float() {
        let value = Value::IntList(vec![0, -1, 8192]);
        assert_eq!(roundtrip(value.clone()), value);

        let value = Value::Pair([3, -4]);
        assert_eq!(roundtrip(value.clone()), value);

        let value = Value::Triple([1, 2, 3]);
        assert_eq!(roundtrip(value.clone()), value);

        let value = Value::Float(1.5);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_field_key_requires_matching_kind() {
        let root = BlazeStruct::new().with(tag("EXTI"), Value::Int(0));
        let int_key = FieldKey {
            tag: tag("EXTI"),
            kind: ValueKind::Integer,
        };
        let text_key = FieldKey {
            tag: tag("EXTI"),
            kind: ValueKind::String,
        };
        assert!(root.get_key(int_key).is_some());
        assert!(root.get_key(text_key).is_none());
    }

    #[test]
    fn test_unknown_type_tag_is_fatal() {
        // Tag bytes, then type byte 11 which is not a known kind.
        let bytes = [0xD2, 0x5C, 0xF4, 11];
        let mut cursor = &bytes[..];
        assert!(matches!(
            BlazeStruct::decode_root(&mut cursor),
            Err(ProtocolError::UnknownValueType(11))
        ));
    }

    #[test]
    fn test_truncated_value_is_fatal() {
        // String field declaring 5 bytes of content with none present.
        let root = BlazeStruct::new().with(tag("TEXT"), Value::Text("abcd".into()));
        let mut buf = BytesMut::new();
        root.encode_root(&mut buf).unwrap();
        let mut cursor = &buf[..buf.len() - 3];
        assert!(matches!(
            BlazeStruct::decode_root(&mut cursor),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_rejected_on_encode() {
        let value = Value::List {
            kind: ValueKind::Integer,
            versioned: false,
            items: vec![Value::Text("oops".into())],
        };
        let root = BlazeStruct::new().with(tag("LIST"), value);
        let mut buf = BytesMut::new();
        assert!(matches!(
            root.encode_root(&mut buf),
            Err(ProtocolError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_wire_order_preserved() {
        let root = BlazeStruct::new()
            .with(tag("BBBB"), Value::Int(2))
            .with(tag("AAAA"), Value::Int(1));
        let mut buf = BytesMut::new();
        root.encode_root(&mut buf).unwrap();
        let mut cursor = &buf[..];
        let decoded = BlazeStruct::decode_root(&mut cursor).unwrap();
        let tags: Vec<String> = decoded.iter().map(|(k, _)| k.tag.to_string()).collect();
        assert_eq!(tags, vec!["BBBB", "AAAA"]);
    }
}
