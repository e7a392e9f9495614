/// Errors that can occur when encoding or decoding struct values.
#[derive(Debug, thiserror::Error)]
pub enum StructError {
    /// The layout has no field with this name.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// The supplied value's runtime shape does not fit the field.
    #[error("field `{field}` expects {expected}")]
    ValueShape {
        field: String,
        expected: &'static str,
    },

    /// An array field was given the wrong number of elements.
    #[error("array field `{field}` expects {expected} elements, got {got}")]
    ArrayLength {
        field: String,
        expected: usize,
        got: usize,
    },

    /// An external buffer does not match the layout size.
    #[error("buffer is {got} bytes, layout needs {expected}")]
    BufferSize { expected: usize, got: usize },

    /// A value tree was not a JSON object where one is required.
    #[error("value tree must be a JSON object")]
    TreeRoot,
}

pub type Result<T> = std::result::Result<T, StructError>;
