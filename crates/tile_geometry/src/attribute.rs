//! Typed vertex-attribute and index storage for finalized buffers.

use crate::flex::{FlexArray, FlexAttribute};
use bytemuck::Pod;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an attribute or index array.
///
/// The renderer keys its GPU buffer cache on this id, so it must never be
/// reused while the owning geometry buffer is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// GPU element type tag, numbered like the GL enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ElementType {
    Byte = 0x1400,
    UnsignedByte = 0x1401,
    Short = 0x1402,
    UnsignedShort = 0x1403,
    Int = 0x1404,
    UnsignedInt = 0x1405,
    Float = 0x1406,
}

impl ElementType {
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::Byte | ElementType::UnsignedByte => 1,
            ElementType::Short | ElementType::UnsignedShort => 2,
            ElementType::Int | ElementType::UnsignedInt | ElementType::Float => 4,
        }
    }
}

/// Attribute payload. The variant decides the element type.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::I8(v) => v.len(),
            AttributeData::U8(v) => v.len(),
            AttributeData::I16(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::I32(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            AttributeData::I8(_) => ElementType::Byte,
            AttributeData::U8(_) => ElementType::UnsignedByte,
            AttributeData::I16(_) => ElementType::Short,
            AttributeData::U16(_) => ElementType::UnsignedShort,
            AttributeData::I32(_) => ElementType::Int,
            AttributeData::U32(_) => ElementType::UnsignedInt,
            AttributeData::F32(_) => ElementType::Float,
        }
    }

    /// Raw little-endian bytes for upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::I8(v) => bytemuck::cast_slice(v),
            AttributeData::U8(v) => bytemuck::cast_slice(v),
            AttributeData::I16(v) => bytemuck::cast_slice(v),
            AttributeData::U16(v) => bytemuck::cast_slice(v),
            AttributeData::I32(v) => bytemuck::cast_slice(v),
            AttributeData::U32(v) => bytemuck::cast_slice(v),
            AttributeData::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Element `i` widened to f64.
    pub fn get(&self, i: usize) -> Option<f64> {
        match self {
            AttributeData::I8(v) => v.get(i).map(|&x| x as f64),
            AttributeData::U8(v) => v.get(i).map(|&x| x as f64),
            AttributeData::I16(v) => v.get(i).map(|&x| x as f64),
            AttributeData::U16(v) => v.get(i).map(|&x| x as f64),
            AttributeData::I32(v) => v.get(i).map(|&x| x as f64),
            AttributeData::U32(v) => v.get(i).map(|&x| x as f64),
            AttributeData::F32(v) => v.get(i).map(|&x| x as f64),
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            AttributeData::I16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            AttributeData::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        match self {
            AttributeData::I8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            AttributeData::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// Element types a [`FlexArray`] may hold when it is turned into an attribute.
pub trait AttributeElement: Pod + Default {
    const TYPE: ElementType;

    fn wrap(values: Vec<Self>) -> AttributeData;
}

macro_rules! attribute_element {
    ($ty:ty, $tag:ident, $variant:ident) => {
        impl AttributeElement for $ty {
            const TYPE: ElementType = ElementType::$tag;

            #[inline]
            fn wrap(values: Vec<Self>) -> AttributeData {
                AttributeData::$variant(values)
            }
        }
    };
}

attribute_element!(i8, Byte, I8);
attribute_element!(u8, UnsignedByte, U8);
attribute_element!(i16, Short, I16);
attribute_element!(u16, UnsignedShort, U16);
attribute_element!(i32, Int, I32);
attribute_element!(u32, UnsignedInt, U32);
attribute_element!(f32, Float, F32);

/// A finalized vertex attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub id: ResourceId,
    pub data: AttributeData,
    /// Components per vertex.
    pub size: u8,
    pub stride: u32,
    pub offset: u32,
    pub normalized: bool,
    /// Set when the GPU copy is missing or stale.
    pub dirty: bool,
}

impl Attribute {
    pub fn new(data: AttributeData, size: u8) -> Self {
        Self {
            id: ResourceId::next(),
            data,
            size,
            stride: 0,
            offset: 0,
            normalized: false,
            dirty: true,
        }
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Number of vertices described by this attribute.
    pub fn vertex_count(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.data.len() / self.size as usize
        }
    }

    /// Component `c` of vertex `v` widened to f64.
    #[inline]
    pub fn component(&self, v: usize, c: usize) -> Option<f64> {
        self.data.get(v * self.size as usize + c)
    }

    pub fn from_values<T: AttributeElement>(values: Vec<T>, size: u8) -> Self {
        Self::new(T::wrap(values), size)
    }
}

impl<T: AttributeElement> From<FlexAttribute<T>> for Attribute {
    fn from(flex: FlexAttribute<T>) -> Self {
        let normalized = flex.normalized;
        Attribute::from_values(flex.data.into_trimmed(), flex.size).normalized(normalized)
    }
}

/// Index payload; width chosen at group creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    /// Picks 16-bit storage unless an index exceeds `u16::MAX` or `wide` is set.
    pub fn from_indices(indices: &[u32], wide: bool) -> Self {
        let needs_wide = wide || indices.iter().any(|&i| i > u16::MAX as u32);
        if needs_wide {
            IndexData::U32(indices.to_vec())
        } else {
            IndexData::U16(indices.iter().map(|&i| i as u16).collect())
        }
    }

    pub fn from_flex(indices: FlexArray<u32>, wide: bool) -> Self {
        let values = indices.into_trimmed();
        if wide || values.iter().any(|&i| i > u16::MAX as u32) {
            IndexData::U32(values)
        } else {
            IndexData::U16(values.into_iter().map(|i| i as u16).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            IndexData::U16(_) => ElementType::UnsignedShort,
            IndexData::U32(_) => ElementType::UnsignedInt,
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexData::U16(v) => v.get(i).map(|&x| x as u32),
            IndexData::U32(v) => v.get(i).copied(),
        }
    }

    pub fn max_index(&self) -> Option<u32> {
        match self {
            IndexData::U16(v) => v.iter().max().map(|&x| x as u32),
            IndexData::U32(v) => v.iter().max().copied(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_indices_use_16_bit_storage() {
        let data = IndexData::from_indices(&[0, 1, 65535], false);
        assert_eq!(data.element_type(), ElementType::UnsignedShort);
        assert_eq!(data.as_bytes().len(), 6);
    }

    #[test]
    fn large_index_forces_32_bit_storage() {
        let data = IndexData::from_indices(&[0, 1, 65536], false);
        assert_eq!(data.element_type(), ElementType::UnsignedInt);
        assert_eq!(data.get(2), Some(65536));
    }

    #[test]
    fn wide_flag_forces_32_bit_storage() {
        let data = IndexData::from_indices(&[0, 1, 2], true);
        assert_eq!(data.element_type(), ElementType::UnsignedInt);
    }

    #[test]
    fn element_type_follows_payload() {
        let attr = Attribute::from_values(vec![1i16, 2, 3, 4], 2);
        assert_eq!(attr.element_type(), ElementType::Short);
        assert_eq!(attr.vertex_count(), 2);
        assert!(attr.dirty);
        assert_eq!(attr.stride, 0);
        assert_eq!(attr.component(1, 1), Some(4.0));
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = Attribute::from_values(vec![0u8], 1);
        let b = Attribute::from_values(vec![0u8], 1);
        assert_ne!(a.id, b.id);
    }
}
