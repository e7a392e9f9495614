use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

/// The C scalar kinds a field can carry.
///
/// Sizes and signedness match the device-side typedefs: `char`/`uchar`/
/// `byte`/`bool` are one byte, `int`/`uint`/`float` four, `double`/`long`/
/// `ulong` eight. Everything encodes little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Char,
    UChar,
    Byte,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Long,
    ULong,
}

impl ScalarKind {
    /// Encoded width in bytes.
    pub const fn size(self) -> usize {
        match self {
            ScalarKind::U8
            | ScalarKind::I8
            | ScalarKind::Char
            | ScalarKind::UChar
            | ScalarKind::Byte
            | ScalarKind::Bool => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::Int | ScalarKind::UInt
            | ScalarKind::Float => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::Double | ScalarKind::Long
            | ScalarKind::ULong => 8,
        }
    }

    pub const fn signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8
                | ScalarKind::I16
                | ScalarKind::I32
                | ScalarKind::I64
                | ScalarKind::Char
                | ScalarKind::Int
                | ScalarKind::Long
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Double)
    }
}

/// Decode-time conversion applied to an array field's raw window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayConverter {
    /// Decode up to the first zero byte as UTF-8 text. On encode the full
    /// window is written: text truncated to the array length, remainder
    /// zero-padded.
    Utf8Text,
}

/// What a single field holds.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Array {
        elem: ScalarKind,
        len: usize,
        converter: Option<ArrayConverter>,
    },
    Struct(Arc<Layout>),
    StructArray {
        layout: Arc<Layout>,
        len: usize,
    },
}

impl FieldKind {
    /// Encoded size of the field in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldKind::Scalar(kind) => kind.size(),
            FieldKind::Array { elem, len, .. } => elem.size() * len,
            FieldKind::Struct(layout) => layout.size(),
            FieldKind::StructArray { layout, len } => layout.size() * len,
        }
    }
}

/// One named field at a fixed offset inside a layout.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub offset: usize,
    pub size: usize,
}

/// An ordered set of fields with sequentially assigned offsets.
///
/// Offsets are the running sum of preceding field sizes — no alignment
/// padding, matching a packed C struct. Total size is the sum of all
/// field sizes. Immutable once built.
#[derive(Debug)]
pub struct Layout {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    size: usize,
}

impl Layout {
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// Total encoded size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }
}

/// Builds a [`Layout`] field by field, in declaration order.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    entries: Vec<(String, FieldKind)>,
}

impl LayoutBuilder {
    /// Add a field of any kind.
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        debug_assert!(
            !self.entries.iter().any(|(n, _)| n == name),
            "duplicate field name `{name}`"
        );
        self.entries.push((name.to_string(), kind));
        self
    }

    /// Add a scalar field.
    pub fn scalar(self, name: &str, kind: ScalarKind) -> Self {
        self.field(name, FieldKind::Scalar(kind))
    }

    /// Add a fixed-length array of scalars.
    pub fn array(self, name: &str, elem: ScalarKind, len: usize) -> Self {
        self.field(
            name,
            FieldKind::Array {
                elem,
                len,
                converter: None,
            },
        )
    }

    /// Add a fixed-capacity text field: a char array decoded up to the
    /// first zero byte.
    pub fn string(self, name: &str, max_len: usize) -> Self {
        self.field(
            name,
            FieldKind::Array {
                elem: ScalarKind::Char,
                len: max_len,
                converter: Some(ArrayConverter::Utf8Text),
            },
        )
    }

    /// Add a nested struct field.
    pub fn nested(self, name: &str, layout: &Arc<Layout>) -> Self {
        self.field(name, FieldKind::Struct(Arc::clone(layout)))
    }

    /// Add a fixed-length array of nested structs.
    pub fn struct_array(self, name: &str, layout: &Arc<Layout>, len: usize) -> Self {
        self.field(
            name,
            FieldKind::StructArray {
                layout: Arc::clone(layout),
                len,
            },
        )
    }

    /// Assign offsets and finish the layout.
    pub fn build(self) -> Arc<Layout> {
        let mut fields = Vec::with_capacity(self.entries.len());
        let mut index = HashMap::with_capacity(self.entries.len());
        let mut offset = 0usize;

        for (name, kind) in self.entries {
            let size = kind.size();
            index.insert(name.clone(), fields.len());
            fields.push(Field {
                name,
                kind,
                offset,
                size,
            });
            offset += size;
        }

        debug!(fields = fields.len(), size = offset, "layout built");
        Arc::new(Layout {
            fields,
            index,
            size: offset,
        })
    }
}
