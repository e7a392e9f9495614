use bytes::Bytes;

use crate::error::{PacketError, Result};

/// Wire tags for typed values. The table is fixed by the device protocol;
/// both ends index it by the raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// Opaque bytes: a struct image, or a concatenation of fixed-size
    /// struct records in an array payload.
    Void = 0,
    U64 = 1,
    I64 = 2,
    U32 = 3,
    I32 = 4,
    U16 = 5,
    I16 = 6,
    U8 = 7,
    I8 = 8,
    /// Platform `int`; decoded 16- or 32-bit by the declared size.
    Int = 9,
    /// Platform `unsigned int`; decoded 16- or 32-bit by the declared size.
    UInt = 10,
    Float = 11,
    Double = 12,
    Long = 13,
    ULong = 14,
    String = 15,
    Bool = 16,
    Null = 17,
}

impl DataType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => DataType::Void,
            1 => DataType::U64,
            2 => DataType::I64,
            3 => DataType::U32,
            4 => DataType::I32,
            5 => DataType::U16,
            6 => DataType::I16,
            7 => DataType::U8,
            8 => DataType::I8,
            9 => DataType::Int,
            10 => DataType::UInt,
            11 => DataType::Float,
            12 => DataType::Double,
            13 => DataType::Long,
            14 => DataType::ULong,
            15 => DataType::String,
            16 => DataType::Bool,
            17 => DataType::Null,
            _ => return None,
        })
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Per-element wire size; `None` for the variable-size kinds. The
    /// long/ulong entries carry the protocol's historical 4-byte values —
    /// they exist for receive compatibility, the encoder never infers
    /// these tags.
    pub const fn wire_size(self) -> Option<usize> {
        match self {
            DataType::U64 | DataType::I64 | DataType::Double => Some(8),
            DataType::U32
            | DataType::I32
            | DataType::Float
            | DataType::Long
            | DataType::ULong => Some(4),
            DataType::U16 | DataType::I16 => Some(2),
            DataType::U8 | DataType::I8 | DataType::Bool | DataType::Void => Some(1),
            DataType::Null => Some(0),
            DataType::String | DataType::Int | DataType::UInt => None,
        }
    }

    /// Decode one value of this type from its declared window.
    pub fn decode(self, bytes: &[u8]) -> Result<DecodedValue> {
        Ok(match self {
            DataType::U64 => DecodedValue::Unsigned(u64::from_le_bytes(le(bytes)?)),
            DataType::I64 | DataType::Long => {
                DecodedValue::Signed(i64::from_le_bytes(le(bytes)?))
            }
            DataType::ULong => DecodedValue::Unsigned(u64::from_le_bytes(le(bytes)?)),
            DataType::U32 => DecodedValue::Unsigned(u64::from(u32::from_le_bytes(le(bytes)?))),
            DataType::I32 => DecodedValue::Signed(i64::from(i32::from_le_bytes(le(bytes)?))),
            DataType::U16 => DecodedValue::Unsigned(u64::from(u16::from_le_bytes(le(bytes)?))),
            DataType::I16 => DecodedValue::Signed(i64::from(i16::from_le_bytes(le(bytes)?))),
            DataType::U8 => DecodedValue::Unsigned(u64::from(u8::from_le_bytes(le(bytes)?))),
            DataType::I8 => DecodedValue::Signed(i64::from(i8::from_le_bytes(le(bytes)?))),
            DataType::Int => {
                if bytes.len() == 2 {
                    DecodedValue::Signed(i64::from(i16::from_le_bytes(le(bytes)?)))
                } else {
                    DecodedValue::Signed(i64::from(i32::from_le_bytes(le(bytes)?)))
                }
            }
            DataType::UInt => {
                if bytes.len() == 2 {
                    DecodedValue::Unsigned(u64::from(u16::from_le_bytes(le(bytes)?)))
                } else {
                    DecodedValue::Unsigned(u64::from(u32::from_le_bytes(le(bytes)?)))
                }
            }
            DataType::Float => {
                DecodedValue::Float(f64::from(f32::from_le_bytes(le(bytes)?)))
            }
            DataType::Double => DecodedValue::Float(f64::from_le_bytes(le(bytes)?)),
            DataType::String => {
                DecodedValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            DataType::Bool => {
                let [b] = le::<1>(bytes)?;
                DecodedValue::Bool(b != 0)
            }
            DataType::Null => DecodedValue::Null,
            DataType::Void => DecodedValue::Bytes(Bytes::copy_from_slice(bytes)),
        })
    }
}

fn le<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or(PacketError::Truncated("typed value"))
}

/// A decoded typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Opaque struct bytes (Void tag).
    Bytes(Bytes),
    Null,
}

impl DecodedValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DecodedValue::Unsigned(u) => serde_json::Value::from(*u),
            DecodedValue::Signed(i) => serde_json::Value::from(*i),
            DecodedValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DecodedValue::Bool(b) => serde_json::Value::from(*b),
            DecodedValue::Text(s) => serde_json::Value::from(s.clone()),
            DecodedValue::Bytes(b) => serde_json::Value::from(
                b.iter().map(|&v| serde_json::Value::from(v)).collect::<Vec<_>>(),
            ),
            DecodedValue::Null => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip_through_the_table() {
        for tag in 0..=17u8 {
            let ty = DataType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
        assert!(DataType::from_tag(18).is_none());
        assert!(DataType::from_tag(0xFF).is_none());
    }

    #[test]
    fn fixed_width_decode() {
        assert_eq!(
            DataType::U16.decode(&[0x34, 0x12]).unwrap(),
            DecodedValue::Unsigned(0x1234)
        );
        assert_eq!(
            DataType::I8.decode(&[0xFE]).unwrap(),
            DecodedValue::Signed(-2)
        );
        assert_eq!(
            DataType::U64
                .decode(&[1, 0, 0, 0, 0, 0, 0, 0])
                .unwrap(),
            DecodedValue::Unsigned(1)
        );
        assert_eq!(
            DataType::Float.decode(&1.5f32.to_le_bytes()).unwrap(),
            DecodedValue::Float(1.5)
        );
        assert_eq!(
            DataType::Double.decode(&(-0.25f64).to_le_bytes()).unwrap(),
            DecodedValue::Float(-0.25)
        );
    }

    #[test]
    fn int_and_uint_width_follows_declared_size() {
        assert_eq!(
            DataType::Int.decode(&(-3i16).to_le_bytes()).unwrap(),
            DecodedValue::Signed(-3)
        );
        assert_eq!(
            DataType::Int.decode(&(-70000i32).to_le_bytes()).unwrap(),
            DecodedValue::Signed(-70000)
        );
        assert_eq!(
            DataType::UInt.decode(&40000u16.to_le_bytes()).unwrap(),
            DecodedValue::Unsigned(40000)
        );
        assert_eq!(
            DataType::UInt.decode(&80000u32.to_le_bytes()).unwrap(),
            DecodedValue::Unsigned(80000)
        );
    }

    #[test]
    fn long_kinds_decode_as_64_bit() {
        assert_eq!(
            DataType::Long.decode(&(-9i64).to_le_bytes()).unwrap(),
            DecodedValue::Signed(-9)
        );
        assert_eq!(
            DataType::ULong.decode(&9u64.to_le_bytes()).unwrap(),
            DecodedValue::Unsigned(9)
        );
    }

    #[test]
    fn string_bool_null_void() {
        assert_eq!(
            DataType::String.decode(b"ok").unwrap(),
            DecodedValue::Text("ok".to_string())
        );
        assert_eq!(DataType::Bool.decode(&[0]).unwrap(), DecodedValue::Bool(false));
        assert_eq!(DataType::Bool.decode(&[2]).unwrap(), DecodedValue::Bool(true));
        assert_eq!(DataType::Null.decode(&[]).unwrap(), DecodedValue::Null);
        assert_eq!(
            DataType::Void.decode(&[1, 2, 3]).unwrap(),
            DecodedValue::Bytes(Bytes::from_static(&[1, 2, 3]))
        );
    }

    #[test]
    fn truncated_window_fails() {
        assert!(matches!(
            DataType::U32.decode(&[1, 2]).unwrap_err(),
            PacketError::Truncated(_)
        ));
    }

    #[test]
    fn wire_sizes_match_the_protocol_table() {
        assert_eq!(DataType::U64.wire_size(), Some(8));
        assert_eq!(DataType::Float.wire_size(), Some(4));
        assert_eq!(DataType::Long.wire_size(), Some(4));
        assert_eq!(DataType::ULong.wire_size(), Some(4));
        assert_eq!(DataType::String.wire_size(), None);
        assert_eq!(DataType::Bool.wire_size(), Some(1));
        assert_eq!(DataType::Null.wire_size(), Some(0));
        assert_eq!(DataType::Void.wire_size(), Some(1));
    }
}
