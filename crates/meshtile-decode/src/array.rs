//! Typed attribute and index arrays.
//!
//! Arrays are backed by reference-counted storage so a decoded buffer can be
//! handed to another thread by moving the handle, never by copying the data.

use std::borrow::Cow;
use std::sync::Arc;

/// Declared shape of one attribute element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
}

impl ElementType {
    /// Number of components per element.
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
        }
    }

    /// Parse an accessor type name (`"SCALAR"`, `"VEC2"`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SCALAR" => Some(Self::Scalar),
            "VEC2" => Some(Self::Vec2),
            "VEC3" => Some(Self::Vec3),
            "VEC4" => Some(Self::Vec4),
            _ => None,
        }
    }
}

/// Numeric component types an attribute stream can carry.
pub(crate) trait Component: Copy + Into<f64> {}

impl Component for i8 {}
impl Component for u8 {}
impl Component for i16 {}
impl Component for u16 {}
impl Component for u32 {}
impl Component for f32 {}

/// A typed attribute buffer.
#[derive(Debug, Clone)]
pub enum AttributeArray {
    I8(Arc<[i8]>),
    U8(Arc<[u8]>),
    I16(Arc<[i16]>),
    U16(Arc<[u16]>),
    U32(Arc<[u32]>),
    F32(Arc<[f32]>),
}

/// Run `$body` with `$slice` bound to the array's typed slice.
macro_rules! with_components {
    ($array:expr, $slice:ident => $body:expr) => {
        match $array {
            $crate::AttributeArray::I8(data) => {
                let $slice: &[i8] = data;
                $body
            }
            $crate::AttributeArray::U8(data) => {
                let $slice: &[u8] = data;
                $body
            }
            $crate::AttributeArray::I16(data) => {
                let $slice: &[i16] = data;
                $body
            }
            $crate::AttributeArray::U16(data) => {
                let $slice: &[u16] = data;
                $body
            }
            $crate::AttributeArray::U32(data) => {
                let $slice: &[u32] = data;
                $body
            }
            $crate::AttributeArray::F32(data) => {
                let $slice: &[f32] = data;
                $body
            }
        }
    };
}

pub(crate) use with_components;

impl AttributeArray {
    /// Number of scalar components.
    #[must_use]
    pub fn len(&self) -> usize {
        with_components!(self, s => s.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the components are already floating point.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32(_))
    }

    /// Borrow the data as `f32` if that is the stored type.
    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(data) => Some(data),
            _ => None,
        }
    }

    /// View the data as `f32`, converting integer components by value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32(&self) -> Cow<'_, [f32]> {
        match self {
            Self::F32(data) => Cow::Borrowed(data),
            other => with_components!(other, s => {
                Cow::Owned(s.iter().map(|&v| Into::<f64>::into(v) as f32).collect())
            }),
        }
    }

    /// Size of the backing storage in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        with_components!(self, s => std::mem::size_of_val(s))
    }

    /// Address of the backing storage. Two arrays with the same address
    /// share one allocation.
    #[must_use]
    pub fn storage_addr(&self) -> usize {
        with_components!(self, s => s.as_ptr().cast::<()>() as usize)
    }

    /// Whether both arrays are handles to the same allocation.
    #[must_use]
    pub fn same_storage(&self, other: &Self) -> bool {
        self.storage_addr() == other.storage_addr() && self.byte_len() == other.byte_len()
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for AttributeArray {
                fn from(data: Vec<$ty>) -> Self {
                    Self::$variant(data.into())
                }
            }
        )*
    };
}

impl_from_vec!(i8 => I8, u8 => U8, i16 => I16, u16 => U16, u32 => U32, f32 => F32);

/// A triangle index buffer.
#[derive(Debug, Clone)]
pub enum IndexArray {
    U8(Arc<[u8]>),
    U16(Arc<[u16]>),
    U32(Arc<[u32]>),
}

impl IndexArray {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(data) => data.len(),
            Self::U16(data) => data.len(),
            Self::U32(data) => data.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at position `i` widened to `usize`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<usize> {
        match self {
            Self::U8(data) => data.get(i).map(|&v| usize::from(v)),
            Self::U16(data) => data.get(i).map(|&v| usize::from(v)),
            Self::U32(data) => data.get(i).map(|&v| v as usize),
        }
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Self::U8(data) => std::mem::size_of_val(&**data),
            Self::U16(data) => std::mem::size_of_val(&**data),
            Self::U32(data) => std::mem::size_of_val(&**data),
        }
    }

    #[must_use]
    pub fn storage_addr(&self) -> usize {
        match self {
            Self::U8(data) => data.as_ptr().cast::<()>() as usize,
            Self::U16(data) => data.as_ptr().cast::<()>() as usize,
            Self::U32(data) => data.as_ptr().cast::<()>() as usize,
        }
    }
}

impl From<Vec<u8>> for IndexArray {
    fn from(data: Vec<u8>) -> Self {
        Self::U8(data.into())
    }
}

impl From<Vec<u16>> for IndexArray {
    fn from(data: Vec<u16>) -> Self {
        Self::U16(data.into())
    }
}

impl From<Vec<u32>> for IndexArray {
    fn from(data: Vec<u32>) -> Self {
        Self::U32(data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_names() {
        assert_eq!(ElementType::from_name("VEC4"), Some(ElementType::Vec4));
        assert_eq!(ElementType::from_name("MAT4"), None);
        assert_eq!(ElementType::Vec3.components(), 3);
    }

    #[test]
    fn clones_share_storage() {
        let a = AttributeArray::from(vec![1u16, 2, 3]);
        let b = a.clone();
        let c = AttributeArray::from(vec![1u16, 2, 3]);
        assert!(a.same_storage(&b));
        assert!(!a.same_storage(&c));
        assert_eq!(a.byte_len(), 6);
    }

    #[test]
    fn integer_arrays_widen_to_f32() {
        let a = AttributeArray::from(vec![-1i8, 0, 7]);
        assert_eq!(&*a.to_f32(), &[-1.0, 0.0, 7.0]);
        assert!(!a.is_float());
    }

    #[test]
    fn index_widening() {
        let idx = IndexArray::from(vec![0u32, 70_000]);
        assert_eq!(idx.get(1), Some(70_000));
        assert_eq!(idx.get(2), None);
        assert_eq!(idx.byte_len(), 8);
    }
}
