//! C-compatible binary struct layouts for boardlink.
//!
//! Device firmware exchanges packed C structs: named fields at fixed byte
//! offsets, little-endian, no alignment padding. This crate describes such
//! layouts ([`Layout`]) and converts between byte buffers and native
//! values ([`StructValue`]), so a host can read and write exactly the
//! bytes a `memcpy` of the device's struct would produce.
//!
//! Layouts are immutable once built and nest arbitrarily: a field may be a
//! scalar, a fixed-length array, another layout, or an array of layouts.

pub mod error;
pub mod layout;
pub mod value;

pub use error::{Result, StructError};
pub use layout::{ArrayConverter, Field, FieldKind, Layout, LayoutBuilder, ScalarKind};
pub use value::{StructValue, StructView, StructViewMut, Value};
