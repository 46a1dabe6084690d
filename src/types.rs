use std::fmt;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::base::RecordId;

/// Bytes reserved for the payload of a string field, excluding its length prefix
pub const STRING_LEN: usize = 128;

/// Width of the big-endian length prefix in front of string payloads
const LEN_PREFIX: usize = 4;

/// Fixed-int, big-endian: every int occupies exactly 4 bytes on a page
fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Column types. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Type {
    Int,
    String,
}

impl Type {
    /// Bytes this type occupies inside a tuple slot
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::String => LEN_PREFIX + STRING_LEN,
        }
    }

    /// Decode one field of this type from the front of `bytes`
    pub fn parse(&self, bytes: &[u8]) -> Result<Field> {
        if bytes.len() < self.len() {
            return Err(Error::Codec(format!(
                "{:?} field needs {} bytes, got {}",
                self,
                self.len(),
                bytes.len()
            )));
        }
        match self {
            Type::Int => {
                let (n, _): (i32, usize) = bincode::decode_from_slice(&bytes[..4], codec_config())?;
                Ok(Field::Int(n))
            }
            Type::String => {
                let (len, _): (u32, usize) =
                    bincode::decode_from_slice(&bytes[..LEN_PREFIX], codec_config())?;
                let len = len as usize;
                if len > STRING_LEN {
                    return Err(Error::Codec(format!(
                        "string length {} exceeds {}",
                        len, STRING_LEN
                    )));
                }
                let payload = &bytes[LEN_PREFIX..LEN_PREFIX + len];
                let s = std::str::from_utf8(payload)
                    .map_err(|e| Error::Codec(format!("invalid utf-8 in string field: {}", e)))?;
                Ok(Field::String(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::String => write!(f, "STRING"),
        }
    }
}

/// Comparison operators usable in predicates and selectivity estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Equals,
    GreaterThan,
    LessThan,
    LessThanOrEq,
    GreaterThanOrEq,
    Like,
    NotEquals,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Op::Equals => "=",
            Op::GreaterThan => ">",
            Op::LessThan => "<",
            Op::LessThanOrEq => "<=",
            Op::GreaterThanOrEq => ">=",
            Op::Like => "LIKE",
            Op::NotEquals => "<>",
        };
        write!(f, "{}", symbol)
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::String(_) => Type::String,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::String(s) => Some(s),
            _ => None,
        }
    }

    /// Evaluate `self <op> other`. Values of different types never compare true.
    pub fn compare(&self, op: Op, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => match op {
                Op::Equals | Op::Like => a == b,
                Op::NotEquals => a != b,
                Op::GreaterThan => a > b,
                Op::GreaterThanOrEq => a >= b,
                Op::LessThan => a < b,
                Op::LessThanOrEq => a <= b,
            },
            (Field::String(a), Field::String(b)) => match op {
                Op::Equals => a == b,
                Op::NotEquals => a != b,
                Op::GreaterThan => a > b,
                Op::GreaterThanOrEq => a >= b,
                Op::LessThan => a < b,
                Op::LessThanOrEq => a <= b,
                Op::Like => a.contains(b.as_str()),
            },
            _ => false,
        }
    }

    /// Write the fixed-width encoding into the front of `buf`
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<()> {
        let width = self.field_type().len();
        if buf.len() < width {
            return Err(Error::Codec(format!(
                "{} field needs {} bytes, slot has {}",
                self.field_type(),
                width,
                buf.len()
            )));
        }
        match self {
            Field::Int(n) => {
                bincode::encode_into_slice(*n, &mut buf[..4], codec_config())?;
            }
            Field::String(s) => {
                let payload = truncate_to_boundary(s, STRING_LEN);
                bincode::encode_into_slice(
                    payload.len() as u32,
                    &mut buf[..LEN_PREFIX],
                    codec_config(),
                )?;
                let body = &mut buf[LEN_PREFIX..width];
                body[..payload.len()].copy_from_slice(payload.as_bytes());
                body[payload.len()..].fill(0);
            }
        }
        Ok(())
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(n) => write!(f, "{}", n),
            Field::String(s) => write!(f, "{}", s),
        }
    }
}

/// One named, typed column of a tuple descriptor
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct TdItem {
    pub name: Option<String>,
    pub field_type: Type,
}

/// Ordered column list; defines the fixed byte layout of a tuple.
///
/// Two descriptors are equal when their type sequences match, regardless of
/// column names.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(types: Vec<Type>, names: Vec<String>) -> Self {
        let mut names = names.into_iter();
        let items = types
            .into_iter()
            .map(|field_type| TdItem {
                name: names.next(),
                field_type,
            })
            .collect();
        TupleDesc { items }
    }

    /// Anonymous columns
    pub fn from_types(types: Vec<Type>) -> Self {
        let items = types
            .into_iter()
            .map(|field_type| TdItem {
                name: None,
                field_type,
            })
            .collect();
        TupleDesc { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_name(&self, idx: usize) -> Option<&str> {
        self.items.get(idx).and_then(|item| item.name.as_deref())
    }

    pub fn field_type(&self, idx: usize) -> Option<Type> {
        self.items.get(idx).map(|item| item.field_type)
    }

    /// Position of the first column with this name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    /// Total bytes of one tuple slot
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.len()).sum()
    }

    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.items.iter().map(|item| item.field_type)
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    /// Copy with every column name prefixed by `alias.`
    pub fn with_prefix(&self, alias: &str) -> TupleDesc {
        let items = self
            .items
            .iter()
            .map(|item| TdItem {
                name: Some(format!(
                    "{}.{}",
                    alias,
                    item.name.as_deref().unwrap_or("null")
                )),
                field_type: item.field_type,
            })
            .collect();
        TupleDesc { items }
    }

    /// Decode one tuple from a slot-sized byte range
    pub fn parse_tuple(&self, bytes: &[u8]) -> Result<Tuple> {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(self.items.len());
        for item in &self.items {
            fields.push(item.field_type.parse(&bytes[offset..])?);
            offset += item.field_type.len();
        }
        Ok(Tuple::new(fields))
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .items
            .iter()
            .map(|item| {
                format!(
                    "{}({})",
                    item.field_type,
                    item.name.as_deref().unwrap_or("null")
                )
            })
            .collect();
        write!(f, "{}", cols.join(", "))
    }
}

/// Ordered field values plus the slot they were read from, if any.
///
/// Tuples read from a page are owned copies and stay valid after the page is
/// evicted. Equality compares field values only.
#[derive(Debug, Clone)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Tuple {
            fields,
            record_id: None,
        }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    pub fn with_record_id(mut self, rid: RecordId) -> Self {
        self.record_id = Some(rid);
        self
    }

    /// Field count and every field type line up with `td`
    pub fn conforms_to(&self, td: &TupleDesc) -> bool {
        self.fields.len() == td.num_fields()
            && self
                .fields
                .iter()
                .zip(td.types())
                .all(|(field, ty)| field.field_type() == ty)
    }

    /// Encode all fields back to back into a slot
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        for field in &self.fields {
            field.serialize_into(&mut buf[offset..])?;
            offset += field.field_type().len();
        }
        Ok(())
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", values.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_desc_byte_size() {
        let td = TupleDesc::from_types(vec![Type::Int, Type::String, Type::Int]);
        assert_eq!(td.byte_size(), 4 + 132 + 4);
    }

    #[test]
    fn test_tuple_desc_equality_ignores_names() {
        let a = TupleDesc::new(vec![Type::Int, Type::String], vec!["id".into(), "name".into()]);
        let b = TupleDesc::from_types(vec![Type::Int, Type::String]);
        let c = TupleDesc::from_types(vec![Type::String, Type::Int]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_prefix_names() {
        let td = TupleDesc::new(vec![Type::Int, Type::Int], vec!["a".into()]);
        let prefixed = td.with_prefix("t");
        assert_eq!(prefixed.field_name(0), Some("t.a"));
        assert_eq!(prefixed.field_name(1), Some("t.null"));
        assert_eq!(prefixed.index_of("t.a"), Some(0));
    }

    #[test]
    fn test_int_field_is_big_endian() {
        let mut buf = [0u8; 4];
        Field::Int(258).serialize_into(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 2]);
        assert_eq!(Type::Int.parse(&buf).unwrap(), Field::Int(258));
    }

    #[test]
    fn test_string_field_truncated_and_padded() {
        let long = "x".repeat(STRING_LEN + 10);
        let mut buf = vec![0xffu8; Type::String.len()];
        Field::String(long).serialize_into(&mut buf).unwrap();
        let parsed = Type::String.parse(&buf).unwrap();
        assert_eq!(parsed.as_str().map(str::len), Some(STRING_LEN));

        Field::String("ab".into()).serialize_into(&mut buf).unwrap();
        assert!(buf[LEN_PREFIX + 2..].iter().all(|b| *b == 0));
        assert_eq!(Type::String.parse(&buf).unwrap(), Field::String("ab".into()));
    }

    #[test]
    fn test_field_compare() {
        assert!(Field::Int(3).compare(Op::LessThan, &Field::Int(4)));
        assert!(Field::Int(4).compare(Op::GreaterThanOrEq, &Field::Int(4)));
        assert!(Field::String("hello".into()).compare(Op::Like, &Field::String("ell".into())));
        assert!(!Field::Int(1).compare(Op::Equals, &Field::String("1".into())));
    }

    #[test]
    fn test_tuple_conformance() {
        let td = TupleDesc::from_types(vec![Type::Int, Type::String]);
        assert!(Tuple::new(vec![Field::Int(1), Field::String("a".into())]).conforms_to(&td));
        assert!(!Tuple::new(vec![Field::Int(1)]).conforms_to(&td));
        assert!(!Tuple::new(vec![Field::Int(1), Field::Int(2)]).conforms_to(&td));
    }
}
