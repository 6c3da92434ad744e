//! Growable typed arrays backing the tessellator output.
//!
//! A `FlexArray<T>` keeps a capacity-sized backing store and a logical length.
//! Appending past capacity at least doubles the store; `trim()` hands back an
//! exactly-sized copy ready for upload.

use bytemuck::Pod;

/// Initial capacity used when no size hint is given.
pub const DEFAULT_CAPACITY: usize = 32;

/// Append-only numeric array with amortized O(1) growth.
#[derive(Debug, Clone)]
pub struct FlexArray<T: Pod + Default> {
    data: Vec<T>,
    len: usize,
}

impl<T: Pod + Default> Default for FlexArray<T> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<T: Pod + Default> FlexArray<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity.max(1)],
            len: 0,
        }
    }

    /// Logical length (number of pushed elements).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing store.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Makes room for `additional` more elements, doubling at least once.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed <= self.data.len() {
            return;
        }
        let grown = (self.data.len() * 2).max(needed);
        // Old contents stay in place; only the tail is default-filled.
        self.data.resize(grown, T::default());
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        if self.len == self.data.len() {
            self.reserve(1);
        }
        self.data[self.len] = value;
        self.len += 1;
    }

    /// Appends every element of `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.reserve(values.len());
        self.data[self.len..self.len + values.len()].copy_from_slice(values);
        self.len += values.len();
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        if index < self.len {
            Some(self.data[index])
        } else {
            None
        }
    }

    /// Overwrites an already pushed element. Returns `false` when out of range.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        if index < self.len {
            self.data[index] = value;
            true
        } else {
            false
        }
    }

    /// Drops everything past `len`. Capacity is kept.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// View of the logical contents.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// Capacity-matched copy of the logical contents.
    pub fn trim(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Consumes the array, shrinking the store to the logical length.
    pub fn into_trimmed(mut self) -> Vec<T> {
        self.data.truncate(self.len);
        self.data.shrink_to_fit();
        self.data
    }
}

/// A growable vertex attribute: typed array plus component layout.
#[derive(Debug, Clone)]
pub struct FlexAttribute<T: Pod + Default> {
    pub data: FlexArray<T>,
    /// Components per vertex.
    pub size: u8,
    pub normalized: bool,
}

impl<T: Pod + Default> FlexAttribute<T> {
    pub fn new(size: u8) -> Self {
        Self {
            data: FlexArray::new(),
            size,
            normalized: false,
        }
    }

    pub fn normalized(size: u8) -> Self {
        Self {
            normalized: true,
            ..Self::new(size)
        }
    }

    /// Number of complete vertices stored.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.size.max(1) as usize
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn push_vertex(&mut self, components: &[T]) {
        debug_assert_eq!(components.len(), self.size as usize);
        self.data.extend_from_slice(components);
    }
}
