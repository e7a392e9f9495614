//! The tagged payload wire format.
//!
//! Every non-JSON payload starts with the transfer marker byte and a
//! sub-type byte, then a sub-type-specific fixed header with 1-byte
//! length fields (names, payloads, and element counts are bounded to
//! 0–255):
//!
//! ```text
//! text:  [0x2A, 0x5E, len]                              + len bytes
//! param: [0x2A, 0x5F, type, name_len, data_len]         + name + data
//! array: [0x2A, 0x60, type, elem_size, name_len, count] + name + count*elem_size bytes
//! ```
//!
//! A buffer opening with `{` and closing with `}` bypasses the tagged
//! format and is handed to the JSON parser whole.

use std::sync::{Arc, OnceLock};

use boardlink_struct::{Layout, ScalarKind, StructValue};
use tracing::trace;

use crate::error::{PacketError, Result};
use crate::types::{DataType, DecodedValue};

/// Leading marker byte of every tagged payload.
pub const MARKER: u8 = 0x2A;
/// Sub-type byte: raw text.
pub const KIND_TEXT: u8 = 0x5E;
/// Sub-type byte: one named typed value.
pub const KIND_PARAM: u8 = 0x5F;
/// Sub-type byte: a named homogeneous array.
pub const KIND_ARRAY: u8 = 0x60;

const JSON_OPEN: u8 = b'{';
const JSON_CLOSE: u8 = b'}';

// The wire headers are packed structs; build them with the same layout
// machinery the device firmware mirrors.
fn text_header() -> &'static Arc<Layout> {
    static LAYOUT: OnceLock<Arc<Layout>> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        Layout::builder()
            .scalar("marker", ScalarKind::Byte)
            .scalar("kind", ScalarKind::Byte)
            .scalar("data_len", ScalarKind::Byte)
            .build()
    })
}

fn param_header() -> &'static Arc<Layout> {
    static LAYOUT: OnceLock<Arc<Layout>> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        Layout::builder()
            .scalar("marker", ScalarKind::Byte)
            .scalar("kind", ScalarKind::Byte)
            .scalar("value_type", ScalarKind::Byte)
            .scalar("name_len", ScalarKind::Byte)
            .scalar("data_len", ScalarKind::Byte)
            .build()
    })
}

fn array_header() -> &'static Arc<Layout> {
    static LAYOUT: OnceLock<Arc<Layout>> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        Layout::builder()
            .scalar("marker", ScalarKind::Byte)
            .scalar("kind", ScalarKind::Byte)
            .scalar("value_type", ScalarKind::Byte)
            .scalar("elem_size", ScalarKind::Byte)
            .scalar("name_len", ScalarKind::Byte)
            .scalar("count", ScalarKind::Byte)
            .build()
    })
}

/// An explicitly typed scalar ready for the wire: tag plus encoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    ty: DataType,
    bytes: Vec<u8>,
}

impl TypedValue {
    pub fn ty(&self) -> DataType {
        self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A string-tagged value.
    pub fn text(value: &str) -> Self {
        Self {
            ty: DataType::String,
            bytes: value.as_bytes().to_vec(),
        }
    }

    /// A null-tagged value with no payload bytes.
    pub fn null() -> Self {
        Self {
            ty: DataType::Null,
            bytes: Vec::new(),
        }
    }

    /// A struct image, tagged opaque.
    pub fn from_struct(value: &StructValue) -> Self {
        Self {
            ty: DataType::Void,
            bytes: value.as_bytes().to_vec(),
        }
    }
}

macro_rules! typed_value_from {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl From<$ty> for TypedValue {
            fn from(v: $ty) -> Self {
                Self {
                    ty: DataType::$tag,
                    bytes: v.to_le_bytes().to_vec(),
                }
            }
        })*
    };
}

typed_value_from! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => Float,
    f64 => Double,
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        Self {
            ty: DataType::Bool,
            bytes: vec![u8::from(v)],
        }
    }
}

/// A homogeneous primitive array; the element tag is inferred from the
/// variant, never from runtime inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarArray {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ScalarArray {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarArray::U8(_) => DataType::U8,
            ScalarArray::I8(_) => DataType::I8,
            ScalarArray::U16(_) => DataType::U16,
            ScalarArray::I16(_) => DataType::I16,
            ScalarArray::U32(_) => DataType::U32,
            ScalarArray::I32(_) => DataType::I32,
            ScalarArray::U64(_) => DataType::U64,
            ScalarArray::I64(_) => DataType::I64,
            ScalarArray::F32(_) => DataType::Float,
            ScalarArray::F64(_) => DataType::Double,
        }
    }

    pub fn elem_size(&self) -> usize {
        match self.data_type() {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::Float => 4,
            _ => 8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScalarArray::U8(v) => v.len(),
            ScalarArray::I8(v) => v.len(),
            ScalarArray::U16(v) => v.len(),
            ScalarArray::I16(v) => v.len(),
            ScalarArray::U32(v) => v.len(),
            ScalarArray::I32(v) => v.len(),
            ScalarArray::U64(v) => v.len(),
            ScalarArray::I64(v) => v.len(),
            ScalarArray::F32(v) => v.len(),
            ScalarArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            ScalarArray::U8(v) => out.extend_from_slice(v),
            ScalarArray::I8(v) => out.extend(v.iter().map(|&x| x as u8)),
            ScalarArray::U16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::U32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::U64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ScalarArray::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
    }
}

/// What to put on the wire. The sub-type is chosen by the variant at the
/// call site — there is no runtime shape inspection.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw text (text sub-type).
    Text(String),
    /// One named, explicitly typed scalar (param sub-type).
    Scalar { name: String, value: TypedValue },
    /// One named struct image (param sub-type, opaque tag).
    Struct { name: String, value: StructValue },
    /// A named homogeneous primitive array (array sub-type).
    Array { name: String, values: ScalarArray },
    /// A named array of equal-sized struct records (array sub-type,
    /// opaque tag, element size = the common struct size).
    StructArray {
        name: String,
        values: Vec<StructValue>,
    },
}

fn bounded(len: usize, what: &'static str) -> Result<u8> {
    u8::try_from(len).map_err(|_| PacketError::TooLong { what, len })
}

fn param_packet(name: &str, ty: DataType, data: &[u8]) -> Result<Vec<u8>> {
    let mut header = StructValue::new(param_header());
    header.set("marker", MARKER)?;
    header.set("kind", KIND_PARAM)?;
    header.set("value_type", ty.tag())?;
    header.set("name_len", bounded(name.len(), "parameter name")?)?;
    header.set("data_len", bounded(data.len(), "parameter data")?)?;

    let mut out = header.into_bytes();
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

fn array_packet(
    name: &str,
    ty: DataType,
    elem_size: usize,
    count: usize,
    data: &[u8],
) -> Result<Vec<u8>> {
    let mut header = StructValue::new(array_header());
    header.set("marker", MARKER)?;
    header.set("kind", KIND_ARRAY)?;
    header.set("value_type", ty.tag())?;
    header.set("elem_size", bounded(elem_size, "array element")?)?;
    header.set("name_len", bounded(name.len(), "parameter name")?)?;
    header.set("count", bounded(count, "array length")?)?;

    let mut out = header.into_bytes();
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Encode a payload into the tagged wire format (without CRC trailer).
pub fn encode(payload: &Payload) -> Result<Vec<u8>> {
    match payload {
        Payload::Text(text) => {
            let mut header = StructValue::new(text_header());
            header.set("marker", MARKER)?;
            header.set("kind", KIND_TEXT)?;
            header.set("data_len", bounded(text.len(), "text payload")?)?;

            let mut out = header.into_bytes();
            out.extend_from_slice(text.as_bytes());
            Ok(out)
        }
        Payload::Scalar { name, value } => param_packet(name, value.ty(), value.bytes()),
        Payload::Struct { name, value } => param_packet(name, DataType::Void, value.as_bytes()),
        Payload::Array { name, values } => {
            let mut data = Vec::with_capacity(values.len() * values.elem_size());
            values.write_le(&mut data);
            array_packet(
                name,
                values.data_type(),
                values.elem_size(),
                values.len(),
                &data,
            )
        }
        Payload::StructArray { name, values } => {
            let Some(first) = values.first() else {
                return Err(PacketError::EmptyStructArray);
            };
            let size = first.size();
            if values.iter().any(|v| v.size() != size) {
                return Err(PacketError::MismatchedStructSizes);
            }
            let mut data = Vec::with_capacity(size * values.len());
            for value in values {
                data.extend_from_slice(value.as_bytes());
            }
            array_packet(name, DataType::Void, size, values.len(), &data)
        }
    }
}

/// A parsed inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPacket {
    /// A raw JSON payload, handed through whole.
    Json(serde_json::Value),
    /// A text payload.
    Text(String),
    /// One named typed value.
    Param { name: String, value: DecodedValue },
    /// A named homogeneous array. With the opaque tag the values are raw
    /// fixed-size struct records.
    Array {
        name: String,
        ty: DataType,
        values: Vec<DecodedValue>,
    },
}

impl ParsedPacket {
    /// The packet's named-value form, used by match predicates.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParsedPacket::Json(value) => value.clone(),
            ParsedPacket::Text(text) => serde_json::Value::from(text.clone()),
            ParsedPacket::Param { name, value } => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), value.to_json());
                serde_json::Value::Object(map)
            }
            ParsedPacket::Array { name, values, .. } => {
                let items: Vec<_> = values.iter().map(DecodedValue::to_json).collect();
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), serde_json::Value::from(items));
                serde_json::Value::Object(map)
            }
        }
    }
}

/// Parse a CRC-validated payload.
pub fn parse(buf: &[u8]) -> Result<ParsedPacket> {
    if buf.first() == Some(&JSON_OPEN) && buf.last() == Some(&JSON_CLOSE) {
        return Ok(ParsedPacket::Json(serde_json::from_slice(buf)?));
    }

    if buf.len() > 2 && buf[0] == MARKER {
        trace!(kind = buf[1], len = buf.len(), "parsing tagged payload");
        return match buf[1] {
            KIND_TEXT => parse_text(buf),
            KIND_PARAM => parse_param(buf),
            KIND_ARRAY => parse_array(buf),
            _ => Err(PacketError::BadMarker),
        };
    }

    Err(PacketError::BadMarker)
}

fn parse_text(buf: &[u8]) -> Result<ParsedPacket> {
    let data_len = usize::from(buf[2]);
    let data = buf
        .get(3..3 + data_len)
        .ok_or(PacketError::Truncated("text payload"))?;
    Ok(ParsedPacket::Text(
        String::from_utf8_lossy(data).into_owned(),
    ))
}

fn parse_param(buf: &[u8]) -> Result<ParsedPacket> {
    if buf.len() < 5 {
        return Err(PacketError::Truncated("param header"));
    }
    let ty = DataType::from_tag(buf[2]).ok_or(PacketError::UnknownType(buf[2]))?;
    let name_len = usize::from(buf[3]);
    let data_len = usize::from(buf[4]);

    let name = buf
        .get(5..5 + name_len)
        .ok_or(PacketError::Truncated("parameter name"))?;
    let data = buf
        .get(5 + name_len..5 + name_len + data_len)
        .ok_or(PacketError::Truncated("parameter data"))?;

    Ok(ParsedPacket::Param {
        name: String::from_utf8_lossy(name).into_owned(),
        value: ty.decode(data)?,
    })
}

fn parse_array(buf: &[u8]) -> Result<ParsedPacket> {
    if buf.len() < 6 {
        return Err(PacketError::Truncated("array header"));
    }
    let ty = DataType::from_tag(buf[2]).ok_or(PacketError::UnknownType(buf[2]))?;
    let elem_size = usize::from(buf[3]);
    let name_len = usize::from(buf[4]);
    let count = usize::from(buf[5]);

    let name = buf
        .get(6..6 + name_len)
        .ok_or(PacketError::Truncated("parameter name"))?;
    let data = buf
        .get(6 + name_len..6 + name_len + elem_size * count)
        .ok_or(PacketError::Truncated("array data"))?;

    let mut values = Vec::with_capacity(count);
    for chunk in 0..count {
        values.push(ty.decode(&data[chunk * elem_size..(chunk + 1) * elem_size])?);
    }

    Ok(ParsedPacket::Array {
        name: String::from_utf8_lossy(name).into_owned(),
        ty,
        values,
    })
}
