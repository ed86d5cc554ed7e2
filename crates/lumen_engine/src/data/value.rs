//! Tagged property value union and typed access
//!
//! Property identity crosses asset-format boundaries by name, so values are
//! a closed tagged union dispatched with `match` rather than a per-type
//! template zoo. Typed access goes through the sealed [`PropertyKind`]
//! conversion trait.

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

/// Opaque handle to a texture sampler owned by the GPU abstraction layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Enum-like render state value carried through the property system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
    /// Opaque blending (source overwrites destination)
    BlendOpaque,
    /// Standard alpha blending
    BlendAlpha,
    /// Additive blending
    BlendAdditive,
    /// Back-face culling
    CullBack,
    /// Front-face culling
    CullFront,
    /// No culling
    CullNone,
}

/// A single property value
///
/// The set of supported kinds is closed on purpose: every consumer
/// (uniform upload, macro evaluation, serialization) can exhaustively match.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// 32-bit float
    Float(f32),
    /// 32-bit signed integer
    Int(i32),
    /// Boolean flag
    Bool(bool),
    /// 2D vector
    Vec2(Vec2),
    /// 3D vector
    Vec3(Vec3),
    /// 4D vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
    /// Texture sampler handle
    Texture(TextureHandle),
    /// Enum-like render state
    State(RenderState),
    /// String value (technique names, debug labels)
    String(String),
}

impl PropertyValue {
    /// Human-readable kind name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat4(_) => "mat4",
            Self::Texture(_) => "texture",
            Self::State(_) => "state",
            Self::String(_) => "string",
        }
    }

    /// Integer view used by macro evaluation
    ///
    /// Bools map to 0/1, ints pass through; every other kind has no integer
    /// meaning and yields `None`.
    pub fn as_macro_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i32::from(*v)),
            _ => None,
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// Conversion between Rust types and [`PropertyValue`] kinds
///
/// Sealed: the union is closed, so the set of implementors is too.
pub trait PropertyKind: Sized + private::Sealed {
    /// Kind name used in `TypeMismatch` errors
    fn kind_name() -> &'static str;

    /// Extract a value of this kind, if the union holds one
    fn from_value(value: &PropertyValue) -> Option<Self>;

    /// Wrap into the union
    fn into_value(self) -> PropertyValue;
}

macro_rules! impl_property_kind {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl private::Sealed for $ty {}

        impl PropertyKind for $ty {
            fn kind_name() -> &'static str {
                $name
            }

            fn from_value(value: &PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_value(self) -> PropertyValue {
                PropertyValue::$variant(self)
            }
        }
    };
}

impl_property_kind!(f32, Float, "float");
impl_property_kind!(i32, Int, "int");
impl_property_kind!(bool, Bool, "bool");
impl_property_kind!(Vec2, Vec2, "vec2");
impl_property_kind!(Vec3, Vec3, "vec3");
impl_property_kind!(Vec4, Vec4, "vec4");
impl_property_kind!(Mat4, Mat4, "mat4");
impl_property_kind!(TextureHandle, Texture, "texture");
impl_property_kind!(RenderState, State, "state");
impl_property_kind!(String, String, "string");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        let v = 0.5_f32.into_value();
        assert_eq!(v.kind_name(), "float");
        assert_eq!(f32::from_value(&v), Some(0.5));
        assert_eq!(i32::from_value(&v), None);
    }

    #[test]
    fn test_macro_int_view() {
        assert_eq!(PropertyValue::Bool(true).as_macro_int(), Some(1));
        assert_eq!(PropertyValue::Int(4).as_macro_int(), Some(4));
        assert_eq!(PropertyValue::Float(1.0).as_macro_int(), None);
    }
}
