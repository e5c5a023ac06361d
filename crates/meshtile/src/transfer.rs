//! Bookkeeping for buffers moved from a worker back to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use meshtile_decode::{AttributeArray, IndexArray};

/// Identity and size of one transferred allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRef {
    pub addr: usize,
    pub byte_len: usize,
}

impl From<&AttributeArray> for BufferRef {
    fn from(array: &AttributeArray) -> Self {
        Self {
            addr: array.storage_addr(),
            byte_len: array.byte_len(),
        }
    }
}

impl From<&IndexArray> for BufferRef {
    fn from(array: &IndexArray) -> Self {
        Self {
            addr: array.storage_addr(),
            byte_len: array.byte_len(),
        }
    }
}

impl From<&Arc<[u8]>> for BufferRef {
    fn from(bytes: &Arc<[u8]>) -> Self {
        Self {
            addr: bytes.as_ptr() as usize,
            byte_len: bytes.len(),
        }
    }
}

/// Buffers whose ownership moves with a response, deduplicated by
/// allocation identity.
#[derive(Debug, Clone, Default)]
pub struct TransferList {
    buffers: Vec<BufferRef>,
    seen: HashSet<usize>,
}

impl TransferList {
    /// Record a buffer. Returns `false` if the allocation is already listed.
    pub fn register(&mut self, buffer: impl Into<BufferRef>) -> bool {
        let buffer = buffer.into();
        if !self.seen.insert(buffer.addr) {
            return false;
        }
        self.buffers.push(buffer);
        true
    }

    #[must_use]
    pub fn contains(&self, buffer: impl Into<BufferRef>) -> bool {
        self.seen.contains(&buffer.into().addr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Sum of the listed buffers' sizes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(|b| b.byte_len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferRef> {
        self.buffers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_each_allocation_once() {
        let positions = AttributeArray::from(vec![0.0f32; 9]);
        let alias = positions.clone();
        let indices = IndexArray::from(vec![0u16, 1, 2]);

        let mut list = TransferList::default();
        assert!(list.register(&positions));
        assert!(!list.register(&alias));
        assert!(list.register(&indices));

        assert_eq!(list.len(), 2);
        assert_eq!(list.total_bytes(), 36 + 6);
        assert!(list.contains(&alias));
    }

    #[test]
    fn sidecar_bytes_are_tracked() {
        let image: Arc<[u8]> = vec![0u8; 16].into();
        let mut list = TransferList::default();
        list.register(&image);
        list.register(&image);
        assert_eq!(list.len(), 1);
        assert_eq!(list.total_bytes(), 16);
    }
}
