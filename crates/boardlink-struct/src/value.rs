use std::sync::Arc;

use serde_json::{Map, Number};

use crate::error::{Result, StructError};
use crate::layout::{ArrayConverter, Field, FieldKind, Layout, ScalarKind};

/// A native value flowing into or out of a struct field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    UnsignedArray(Vec<u64>),
    SignedArray(Vec<i64>),
    FloatArray(Vec<f64>),
    Struct(StructValue),
    StructArray(Vec<StructValue>),
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v as $conv)
            }
        })*
    };
}

value_from! {
    u8 => Unsigned as u64,
    u16 => Unsigned as u64,
    u32 => Unsigned as u64,
    u64 => Unsigned as u64,
    i8 => Signed as i64,
    i16 => Signed as i64,
    i32 => Signed as i64,
    i64 => Signed as i64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u64>> for Value {
    fn from(v: Vec<u64>) -> Self {
        Value::UnsignedArray(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::SignedArray(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatArray(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl From<Vec<StructValue>> for Value {
    fn from(v: Vec<StructValue>) -> Self {
        Value::StructArray(v)
    }
}

fn shape_error(field: &str, expected: &'static str) -> StructError {
    StructError::ValueShape {
        field: field.to_string(),
        expected,
    }
}

/// Encode one scalar into its window, little-endian, native width.
fn write_scalar(kind: ScalarKind, value: &Value, field: &str, window: &mut [u8]) -> Result<()> {
    if kind.is_float() {
        let v = match value {
            Value::Float(f) => *f,
            Value::Unsigned(u) => *u as f64,
            Value::Signed(i) => *i as f64,
            _ => return Err(shape_error(field, "a numeric value")),
        };
        match kind {
            ScalarKind::Float => window.copy_from_slice(&(v as f32).to_le_bytes()),
            _ => window.copy_from_slice(&v.to_le_bytes()),
        }
        return Ok(());
    }

    if kind == ScalarKind::Bool {
        let Value::Bool(b) = value else {
            return Err(shape_error(field, "a boolean"));
        };
        window[0] = u8::from(*b);
        return Ok(());
    }

    // Integer kinds, char/uchar/byte included. Two's complement means the
    // low-order little-endian bytes are identical for signed and unsigned.
    let raw: u64 = match value {
        Value::Unsigned(u) => *u,
        Value::Signed(i) => *i as u64,
        _ => return Err(shape_error(field, "an integer value")),
    };
    window.copy_from_slice(&raw.to_le_bytes()[..kind.size()]);
    Ok(())
}

/// Decode one scalar from its window.
fn read_scalar(kind: ScalarKind, window: &[u8]) -> Value {
    if kind.is_float() {
        return match kind {
            ScalarKind::Float => {
                Value::Float(f32::from_le_bytes([window[0], window[1], window[2], window[3]]) as f64)
            }
            _ => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(window);
                Value::Float(f64::from_le_bytes(buf))
            }
        };
    }

    if kind == ScalarKind::Bool {
        return Value::Bool(window[0] != 0);
    }

    let mut buf = [0u8; 8];
    buf[..window.len()].copy_from_slice(window);
    let raw = u64::from_le_bytes(buf);

    if kind.signed() {
        let shift = 64 - 8 * window.len() as u32;
        Value::Signed(((raw << shift) as i64) >> shift)
    } else {
        Value::Unsigned(raw)
    }
}

fn write_array(
    elem: ScalarKind,
    len: usize,
    value: &Value,
    field: &str,
    window: &mut [u8],
) -> Result<()> {
    // Text and raw bytes fill single-byte-element windows: truncated to
    // the declared length, remainder zero-padded.
    match value {
        Value::Text(s) if elem.size() == 1 => {
            window.fill(0);
            let n = s.len().min(len);
            window[..n].copy_from_slice(&s.as_bytes()[..n]);
            return Ok(());
        }
        Value::Bytes(b) if elem.size() == 1 => {
            window.fill(0);
            let n = b.len().min(len);
            window[..n].copy_from_slice(&b[..n]);
            return Ok(());
        }
        _ => {}
    }

    // Bool arrays travel as raw bytes on the wire.
    let elem = if elem == ScalarKind::Bool {
        ScalarKind::Byte
    } else {
        elem
    };

    let count = match value {
        Value::UnsignedArray(v) => v.len(),
        Value::SignedArray(v) => v.len(),
        Value::FloatArray(v) => v.len(),
        _ => return Err(shape_error(field, "an array of matching element kind")),
    };
    if count != len {
        return Err(StructError::ArrayLength {
            field: field.to_string(),
            expected: len,
            got: count,
        });
    }

    let step = elem.size();
    for i in 0..len {
        let item = match value {
            Value::UnsignedArray(v) => Value::Unsigned(v[i]),
            Value::SignedArray(v) => Value::Signed(v[i]),
            Value::FloatArray(v) => Value::Float(v[i]),
            _ => unreachable!(),
        };
        write_scalar(elem, &item, field, &mut window[i * step..(i + 1) * step])?;
    }
    Ok(())
}

fn read_array(
    elem: ScalarKind,
    len: usize,
    converter: Option<ArrayConverter>,
    window: &[u8],
) -> Value {
    if let Some(ArrayConverter::Utf8Text) = converter {
        let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
        return Value::Text(String::from_utf8_lossy(&window[..end]).into_owned());
    }

    match elem {
        ScalarKind::Char | ScalarKind::UChar => Value::Bytes(window.to_vec()),
        _ => {
            let elem = if elem == ScalarKind::Bool {
                ScalarKind::Byte
            } else {
                elem
            };
            let step = elem.size();
            if elem.is_float() {
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    match read_scalar(elem, &window[i * step..(i + 1) * step]) {
                        Value::Float(f) => out.push(f),
                        _ => unreachable!(),
                    }
                }
                Value::FloatArray(out)
            } else if elem.signed() {
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    match read_scalar(elem, &window[i * step..(i + 1) * step]) {
                        Value::Signed(v) => out.push(v),
                        _ => unreachable!(),
                    }
                }
                Value::SignedArray(out)
            } else {
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    match read_scalar(elem, &window[i * step..(i + 1) * step]) {
                        Value::Unsigned(v) => out.push(v),
                        _ => unreachable!(),
                    }
                }
                Value::UnsignedArray(out)
            }
        }
    }
}

fn encode_field(field: &Field, buf: &mut [u8], value: &Value) -> Result<()> {
    let window = &mut buf[field.offset..field.offset + field.size];
    match &field.kind {
        FieldKind::Scalar(kind) => write_scalar(*kind, value, &field.name, window),
        FieldKind::Array {
            elem,
            len,
            ..
        } => write_array(*elem, *len, value, &field.name, window),
        FieldKind::Struct(_) => {
            let Value::Struct(sv) = value else {
                return Err(shape_error(&field.name, "a struct value"));
            };
            // Truncated to the smaller of the two sizes: a deliberate
            // compatibility affordance, callers ensure sizes match.
            let n = window.len().min(sv.as_bytes().len());
            window[..n].copy_from_slice(&sv.as_bytes()[..n]);
            Ok(())
        }
        FieldKind::StructArray { layout, len } => {
            let Value::StructArray(items) = value else {
                return Err(shape_error(&field.name, "an array of struct values"));
            };
            if items.len() != *len {
                return Err(StructError::ArrayLength {
                    field: field.name.clone(),
                    expected: *len,
                    got: items.len(),
                });
            }
            let slot = layout.size();
            for (i, item) in items.iter().enumerate() {
                let dst = &mut window[i * slot..(i + 1) * slot];
                let n = slot.min(item.as_bytes().len());
                dst[..n].copy_from_slice(&item.as_bytes()[..n]);
            }
            Ok(())
        }
    }
}

fn decode_field(field: &Field, buf: &[u8]) -> Value {
    let window = &buf[field.offset..field.offset + field.size];
    match &field.kind {
        FieldKind::Scalar(kind) => read_scalar(*kind, window),
        FieldKind::Array {
            elem,
            len,
            converter,
        } => read_array(*elem, *len, *converter, window),
        FieldKind::Struct(layout) => Value::Struct(StructValue::from_window(layout, window)),
        FieldKind::StructArray { layout, len } => {
            let slot = layout.size();
            let items = (0..*len)
                .map(|i| StructValue::from_window(layout, &window[i * slot..(i + 1) * slot]))
                .collect();
            Value::StructArray(items)
        }
    }
}

fn lookup<'a>(layout: &'a Layout, name: &str) -> Result<&'a Field> {
    layout
        .field(name)
        .ok_or_else(|| StructError::UnknownField(name.to_string()))
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Unsigned(u) => serde_json::Value::from(*u),
        Value::Signed(i) => serde_json::Value::from(*i),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Bool(b) => serde_json::Value::from(*b),
        Value::Text(s) => serde_json::Value::from(s.clone()),
        Value::Bytes(b) => serde_json::Value::from(
            b.iter().map(|&v| serde_json::Value::from(v)).collect::<Vec<_>>(),
        ),
        Value::UnsignedArray(v) => {
            serde_json::Value::from(v.iter().map(|&x| serde_json::Value::from(x)).collect::<Vec<_>>())
        }
        Value::SignedArray(v) => {
            serde_json::Value::from(v.iter().map(|&x| serde_json::Value::from(x)).collect::<Vec<_>>())
        }
        Value::FloatArray(v) => serde_json::Value::from(
            v.iter()
                .map(|&x| {
                    Number::from_f64(x)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                })
                .collect::<Vec<_>>(),
        ),
        Value::Struct(sv) => sv.to_tree(),
        Value::StructArray(items) => {
            serde_json::Value::from(items.iter().map(StructValue::to_tree).collect::<Vec<_>>())
        }
    }
}

fn export_tree(layout: &Layout, buf: &[u8]) -> serde_json::Value {
    let mut map = Map::with_capacity(layout.fields().len());
    for field in layout.fields() {
        map.insert(field.name.clone(), value_to_json(&decode_field(field, buf)));
    }
    serde_json::Value::Object(map)
}

fn json_to_scalar(kind: ScalarKind, node: &serde_json::Value, field: &str) -> Result<Value> {
    if kind == ScalarKind::Bool {
        return node
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| shape_error(field, "a boolean"));
    }
    if kind.is_float() {
        return node
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| shape_error(field, "a numeric value"));
    }
    if kind.signed() {
        node.as_i64()
            .map(Value::Signed)
            .ok_or_else(|| shape_error(field, "an integer value"))
    } else {
        node.as_u64()
            .map(Value::Unsigned)
            .ok_or_else(|| shape_error(field, "an unsigned integer value"))
    }
}

/// Partial merge: fields absent from the tree keep their current bytes,
/// at every nesting level.
fn merge_tree(layout: &Layout, buf: &mut [u8], tree: &serde_json::Value) -> Result<()> {
    let obj = tree.as_object().ok_or(StructError::TreeRoot)?;
    for field in layout.fields() {
        let Some(node) = obj.get(&field.name) else {
            continue;
        };
        merge_field(field, buf, node)?;
    }
    Ok(())
}

fn merge_field(field: &Field, buf: &mut [u8], node: &serde_json::Value) -> Result<()> {
    let window = &mut buf[field.offset..field.offset + field.size];
    match &field.kind {
        FieldKind::Struct(layout) => merge_tree(layout, window, node),
        FieldKind::StructArray { layout, len } => {
            let items = node
                .as_array()
                .ok_or_else(|| shape_error(&field.name, "an array of objects"))?;
            if items.len() != *len {
                return Err(StructError::ArrayLength {
                    field: field.name.clone(),
                    expected: *len,
                    got: items.len(),
                });
            }
            let slot = layout.size();
            for (i, item) in items.iter().enumerate() {
                merge_tree(layout, &mut window[i * slot..(i + 1) * slot], item)?;
            }
            Ok(())
        }
        FieldKind::Scalar(kind) => {
            let value = json_to_scalar(*kind, node, &field.name)?;
            write_scalar(*kind, &value, &field.name, window)
        }
        FieldKind::Array { elem, len, .. } => {
            let value = match node {
                serde_json::Value::String(s) => Value::Text(s.clone()),
                serde_json::Value::Array(items) => {
                    if elem.is_float() {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(
                                item.as_f64()
                                    .ok_or_else(|| shape_error(&field.name, "a numeric array"))?,
                            );
                        }
                        Value::FloatArray(out)
                    } else if elem.signed() {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(
                                item.as_i64()
                                    .ok_or_else(|| shape_error(&field.name, "an integer array"))?,
                            );
                        }
                        Value::SignedArray(out)
                    } else {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(item.as_u64().ok_or_else(|| {
                                shape_error(&field.name, "an unsigned integer array")
                            })?);
                        }
                        Value::UnsignedArray(out)
                    }
                }
                _ => return Err(shape_error(&field.name, "a string or array")),
            };
            write_array(*elem, *len, &value, &field.name, window)
        }
    }
}

/// A byte-buffer-backed instance of a [`Layout`], owning its buffer.
///
/// The buffer is always exactly `layout.size()` bytes, zero-initialized on
/// construction. For zero-copy access to caller-owned memory see
/// [`StructView`] and [`StructViewMut`].
#[derive(Debug, Clone)]
pub struct StructValue {
    layout: Arc<Layout>,
    bytes: Vec<u8>,
}

impl StructValue {
    /// A zeroed instance of the layout.
    pub fn new(layout: &Arc<Layout>) -> Self {
        Self {
            layout: Arc::clone(layout),
            bytes: vec![0; layout.size()],
        }
    }

    /// Import an exact binary image of the layout.
    pub fn from_bytes(layout: &Arc<Layout>, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != layout.size() {
            return Err(StructError::BufferSize {
                expected: layout.size(),
                got: bytes.len(),
            });
        }
        Ok(Self {
            layout: Arc::clone(layout),
            bytes: bytes.to_vec(),
        })
    }

    /// Bulk-import from a named-value tree (recursively constructing
    /// nested values); fields absent from the tree stay zeroed.
    pub fn from_tree(layout: &Arc<Layout>, tree: &serde_json::Value) -> Result<Self> {
        let mut value = Self::new(layout);
        value.merge_tree(tree)?;
        Ok(value)
    }

    pub(crate) fn from_window(layout: &Arc<Layout>, window: &[u8]) -> Self {
        Self {
            layout: Arc::clone(layout),
            bytes: window.to_vec(),
        }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Buffer length; always equals `layout.size()`.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Encode a value into the named field's window, in place.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        encode_field(lookup(&self.layout, name)?, &mut self.bytes, &value)
    }

    /// Decode the named field's window.
    pub fn get(&self, name: &str) -> Result<Value> {
        Ok(decode_field(lookup(&self.layout, name)?, &self.bytes))
    }

    /// Export every field to a named-value tree, recursing through nested
    /// layouts and arrays of layouts.
    pub fn to_tree(&self) -> serde_json::Value {
        export_tree(&self.layout, &self.bytes)
    }

    /// Partial merge from a named-value tree: fields absent from the tree
    /// retain their current buffer contents, at every nesting level.
    pub fn merge_tree(&mut self, tree: &serde_json::Value) -> Result<()> {
        merge_tree(&self.layout, &mut self.bytes, tree)
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.layout, &other.layout) && self.bytes == other.bytes
    }
}

/// A read-only view of a layout over caller-owned memory.
///
/// No copy is made; the caller is responsible for the region's lifetime
/// and for any synchronization when the memory is shared.
pub struct StructView<'a> {
    layout: Arc<Layout>,
    bytes: &'a [u8],
}

impl<'a> StructView<'a> {
    /// Bind to a region of exactly `layout.size()` bytes.
    pub fn new(layout: &Arc<Layout>, bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != layout.size() {
            return Err(StructError::BufferSize {
                expected: layout.size(),
                got: bytes.len(),
            });
        }
        Ok(Self {
            layout: Arc::clone(layout),
            bytes,
        })
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        Ok(decode_field(lookup(&self.layout, name)?, self.bytes))
    }

    pub fn to_tree(&self) -> serde_json::Value {
        export_tree(&self.layout, self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Copy the viewed bytes into an owning [`StructValue`].
    pub fn to_owned(&self) -> StructValue {
        StructValue::from_window(&self.layout, self.bytes)
    }
}

/// A mutable view of a layout over caller-owned memory.
///
/// Writes go directly to the bound region — the zero-copy binding mode
/// for shared memory. The core provides no synchronization over the
/// region; callers coordinate externally.
#[derive(Debug)]
pub struct StructViewMut<'a> {
    layout: Arc<Layout>,
    bytes: &'a mut [u8],
}

impl<'a> StructViewMut<'a> {
    /// Bind to a region of exactly `layout.size()` bytes.
    pub fn new(layout: &Arc<Layout>, bytes: &'a mut [u8]) -> Result<Self> {
        if bytes.len() != layout.size() {
            return Err(StructError::BufferSize {
                expected: layout.size(),
                got: bytes.len(),
            });
        }
        Ok(Self {
            layout: Arc::clone(layout),
            bytes,
        })
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        encode_field(lookup(&self.layout, name)?, self.bytes, &value)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        Ok(decode_field(lookup(&self.layout, name)?, self.bytes))
    }

    pub fn to_tree(&self) -> serde_json::Value {
        export_tree(&self.layout, self.bytes)
    }

    pub fn merge_tree(&mut self, tree: &serde_json::Value) -> Result<()> {
        merge_tree(&self.layout, self.bytes, tree)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn telemetry_layout() -> Arc<Layout> {
        Layout::builder()
            .scalar("id", ScalarKind::U8)
            .scalar("count", ScalarKind::U16)
            .scalar("temp", ScalarKind::Float)
            .scalar("active", ScalarKind::Bool)
            .string("tag", 6)
            .build()
    }

    #[test]
    fn buffer_is_zeroed_and_sized() {
        let layout = telemetry_layout();
        let value = StructValue::new(&layout);
        assert_eq!(value.size(), layout.size());
        assert!(value.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn scalar_set_get_roundtrip() {
        let layout = telemetry_layout();
        let mut value = StructValue::new(&layout);

        value.set("id", 7u8).unwrap();
        value.set("count", 0x0203u16).unwrap();
        value.set("temp", 1.5f32).unwrap();
        value.set("active", true).unwrap();

        assert_eq!(value.get("id").unwrap(), Value::Unsigned(7));
        assert_eq!(value.get("count").unwrap(), Value::Unsigned(0x0203));
        assert_eq!(value.get("temp").unwrap(), Value::Float(1.5));
        assert_eq!(value.get("active").unwrap(), Value::Bool(true));
    }

    #[test]
    fn wire_image_is_packed_little_endian() {
        let layout = Layout::builder()
            .scalar("a", ScalarKind::U8)
            .scalar("b", ScalarKind::U16)
            .scalar("c", ScalarKind::I32)
            .build();
        let mut value = StructValue::new(&layout);
        value.set("a", 0x01u8).unwrap();
        value.set("b", 0x0302u16).unwrap();
        value.set("c", -2i32).unwrap();

        assert_eq!(
            value.as_bytes(),
            &[0x01, 0x02, 0x03, 0xFE, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn signed_scalars_sign_extend() {
        let layout = Layout::builder()
            .scalar("a", ScalarKind::I8)
            .scalar("b", ScalarKind::I16)
            .build();
        let mut value = StructValue::new(&layout);
        value.set("a", -5i8).unwrap();
        value.set("b", -300i16).unwrap();

        assert_eq!(value.get("a").unwrap(), Value::Signed(-5));
        assert_eq!(value.get("b").unwrap(), Value::Signed(-300));
    }

    #[test]
    fn string_field_trims_at_first_zero() {
        let layout = telemetry_layout();
        let mut value = StructValue::new(&layout);
        value.set("tag", "ab").unwrap();
        assert_eq!(value.get("tag").unwrap(), Value::Text("ab".to_string()));
    }

    #[test]
    fn string_field_truncates_and_zero_pads() {
        let layout = Layout::builder().string("tag", 4).build();
        let mut value = StructValue::new(&layout);

        value.set("tag", "abcdef").unwrap();
        assert_eq!(value.as_bytes(), b"abcd");
        assert_eq!(value.get("tag").unwrap(), Value::Text("abcd".to_string()));

        value.set("tag", "z").unwrap();
        assert_eq!(value.as_bytes(), &[b'z', 0, 0, 0]);
        assert_eq!(value.get("tag").unwrap(), Value::Text("z".to_string()));
    }

    #[test]
    fn scalar_array_roundtrip_requires_exact_length() {
        let layout = Layout::builder().array("samples", ScalarKind::U16, 3).build();
        let mut value = StructValue::new(&layout);

        value.set("samples", vec![1u64, 2, 515]).unwrap();
        assert_eq!(value.as_bytes(), &[1, 0, 2, 0, 3, 2]);
        assert_eq!(
            value.get("samples").unwrap(),
            Value::UnsignedArray(vec![1, 2, 515])
        );

        let err = value.set("samples", vec![1u64, 2]).unwrap_err();
        assert!(matches!(err, StructError::ArrayLength { expected: 3, got: 2, .. }));
    }

    #[test]
    fn float_array_roundtrip() {
        let layout = Layout::builder().array("v", ScalarKind::Float, 2).build();
        let mut value = StructValue::new(&layout);
        value.set("v", vec![0.5f64, -1.0]).unwrap();
        assert_eq!(value.get("v").unwrap(), Value::FloatArray(vec![0.5, -1.0]));
    }

    #[test]
    fn nested_struct_copy_truncates_to_smaller() {
        let small = Layout::builder().scalar("x", ScalarKind::U8).build();
        let big = Layout::builder()
            .scalar("x", ScalarKind::U8)
            .scalar("y", ScalarKind::U8)
            .build();
        let outer = Layout::builder().nested("inner", &small).build();

        let mut source = StructValue::new(&big);
        source.set("x", 9u8).unwrap();
        source.set("y", 8u8).unwrap();

        let mut value = StructValue::new(&outer);
        value.set("inner", source).unwrap();
        // Only the first byte fits the 1-byte window.
        assert_eq!(value.as_bytes(), &[9]);
    }

    #[test]
    fn struct_array_fills_slots_in_order() {
        let point = Layout::builder()
            .scalar("x", ScalarKind::U8)
            .scalar("y", ScalarKind::U8)
            .build();
        let outer = Layout::builder().struct_array("pts", &point, 2).build();

        let mut a = StructValue::new(&point);
        a.set("x", 1u8).unwrap();
        a.set("y", 2u8).unwrap();
        let mut b = StructValue::new(&point);
        b.set("x", 3u8).unwrap();
        b.set("y", 4u8).unwrap();

        let mut value = StructValue::new(&outer);
        value.set("pts", vec![a, b]).unwrap();
        assert_eq!(value.as_bytes(), &[1, 2, 3, 4]);

        let Value::StructArray(items) = value.get("pts").unwrap() else {
            panic!("expected struct array");
        };
        assert_eq!(items[1].get("x").unwrap(), Value::Unsigned(3));
    }

    #[test]
    fn unknown_field_and_wrong_shape_fail() {
        let layout = telemetry_layout();
        let mut value = StructValue::new(&layout);

        assert!(matches!(
            value.set("nope", 1u8).unwrap_err(),
            StructError::UnknownField(_)
        ));
        assert!(matches!(
            value.set("id", "text").unwrap_err(),
            StructError::ValueShape { .. }
        ));
        assert!(matches!(
            value.get("nope").unwrap_err(),
            StructError::UnknownField(_)
        ));
    }

    #[test]
    fn tree_roundtrip() {
        let point = Layout::builder()
            .scalar("x", ScalarKind::I16)
            .scalar("y", ScalarKind::I16)
            .build();
        let layout = Layout::builder()
            .scalar("id", ScalarKind::U8)
            .nested("pos", &point)
            .struct_array("trail", &point, 2)
            .array("raw", ScalarKind::U8, 3)
            .string("tag", 4)
            .build();

        let tree = json!({
            "id": 5,
            "pos": {"x": -1, "y": 2},
            "trail": [{"x": 1, "y": 1}, {"x": 2, "y": 2}],
            "raw": [9, 8, 7],
            "tag": "ok",
        });

        let value = StructValue::from_tree(&layout, &tree).unwrap();
        assert_eq!(value.to_tree(), tree);
    }

    #[test]
    fn merge_tree_is_partial_at_every_level() {
        let inner = Layout::builder()
            .scalar("x", ScalarKind::U8)
            .scalar("y", ScalarKind::U8)
            .build();
        let layout = Layout::builder()
            .scalar("id", ScalarKind::U8)
            .nested("pos", &inner)
            .build();

        let mut value = StructValue::from_tree(
            &layout,
            &json!({"id": 1, "pos": {"x": 10, "y": 20}}),
        )
        .unwrap();

        // Merge only touches pos.x; id and pos.y keep their bytes.
        value.merge_tree(&json!({"pos": {"x": 99}})).unwrap();
        assert_eq!(
            value.to_tree(),
            json!({"id": 1, "pos": {"x": 99, "y": 20}})
        );
    }

    #[test]
    fn merge_tree_rejects_non_object() {
        let layout = telemetry_layout();
        let mut value = StructValue::new(&layout);
        assert!(matches!(
            value.merge_tree(&json!([1, 2])).unwrap_err(),
            StructError::TreeRoot
        ));
    }

    #[test]
    fn from_bytes_requires_exact_size() {
        let layout = telemetry_layout();
        let err = StructValue::from_bytes(&layout, &[0u8; 3]).unwrap_err();
        assert!(matches!(err, StructError::BufferSize { .. }));

        let image = vec![0u8; layout.size()];
        assert!(StructValue::from_bytes(&layout, &image).is_ok());
    }

    #[test]
    fn mut_view_writes_through_to_caller_memory() {
        let layout = Layout::builder()
            .scalar("a", ScalarKind::U8)
            .scalar("b", ScalarKind::U16)
            .build();
        let mut region = vec![0u8; layout.size()];

        {
            let mut view = StructViewMut::new(&layout, &mut region).unwrap();
            view.set("a", 1u8).unwrap();
            view.set("b", 0x0202u16).unwrap();
        }
        assert_eq!(region, &[1, 2, 2]);

        let view = StructView::new(&layout, &region).unwrap();
        assert_eq!(view.get("b").unwrap(), Value::Unsigned(0x0202));
        assert_eq!(view.to_owned().as_bytes(), &[1, 2, 2]);
    }

    #[test]
    fn view_binding_requires_exact_size() {
        let layout = telemetry_layout();
        let mut region = vec![0u8; layout.size() + 1];
        assert!(matches!(
            StructViewMut::new(&layout, &mut region).unwrap_err(),
            StructError::BufferSize { .. }
        ));
    }

    #[test]
    fn bool_array_travels_as_bytes() {
        let layout = Layout::builder().array("flags", ScalarKind::Bool, 3).build();
        let mut value = StructValue::new(&layout);
        value.set("flags", vec![1u64, 0, 1]).unwrap();
        assert_eq!(value.as_bytes(), &[1, 0, 1]);
        assert_eq!(
            value.get("flags").unwrap(),
            Value::UnsignedArray(vec![1, 0, 1])
        );
    }
}
