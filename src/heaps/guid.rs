//! #GUID heap - 16-byte GUIDs with 1-based indexing.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// A GUID (16 bytes).
pub type Guid = [u8; 16];

/// The #GUID heap containing GUIDs (16-byte entries, 1-based indexing).
///
/// Unlike the other heaps this one is addressed by record index, not byte
/// offset, and has no leading null byte.
#[derive(Debug, Clone, Default)]
pub struct GuidHeap<'a> {
    /// Raw heap data (multiple of 16 bytes).
    data: Cow<'a, [u8]>,
}

impl<'a> GuidHeap<'a> {
    /// Create a new empty GUID heap.
    #[must_use]
    pub fn new() -> GuidHeap<'static> {
        GuidHeap {
            data: Cow::Owned(Vec::new()),
        }
    }

    /// Parse the GUID heap from raw bytes without copying.
    #[must_use]
    pub fn parse(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
        }
    }

    /// Get a GUID by 1-based index. Index 0 is the null GUID.
    pub fn get(&self, index: u32) -> Result<Guid> {
        if index == 0 {
            return Ok([0u8; 16]);
        }

        let offset = ((index - 1) as usize) * 16;
        if offset + 16 > self.data.len() {
            return Err(Error::InvalidGuidIndex(index));
        }

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&self.data[offset..offset + 16]);
        Ok(guid)
    }

    /// Add a GUID to the heap and return its 1-based index.
    pub fn add(&mut self, guid: &Guid) -> Result<u32> {
        let data = self.data.to_mut();
        data.try_reserve(16).map_err(|_| Error::Capacity { needed: 16 })?;
        let index = (data.len() / 16) + 1;
        data.extend_from_slice(guid);
        Ok(index as u32)
    }

    /// Append the tail of a delta GUID heap beyond this heap's current size.
    ///
    /// The GUID heap is cumulative across EnC generations, so prior indices
    /// stay valid and only new records are copied.
    pub fn append_tail(&mut self, delta_data: &[u8]) -> Result<()> {
        let len = self.data.len();
        if delta_data.len() <= len {
            return Ok(());
        }
        let tail = &delta_data[len..];
        let data = self.data.to_mut();
        data.try_reserve(tail.len()).map_err(|_| Error::Capacity {
            needed: tail.len(),
        })?;
        data.extend_from_slice(tail);
        Ok(())
    }

    /// Get the number of GUIDs in the heap.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// Get the raw heap data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the size of the heap.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if the heap uses 4-byte indices (count > 65535).
    #[must_use]
    pub fn uses_wide_indices(&self) -> bool {
        self.count() > 0xFFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_guid_index() {
        let heap = GuidHeap::new();
        assert_eq!(heap.get(0).unwrap(), [0u8; 16]);
    }

    #[test]
    fn test_add_and_get_guid() {
        let mut heap = GuidHeap::new();
        let guid: Guid = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let index = heap.add(&guid).unwrap();
        assert_eq!(index, 1); // 1-based indexing
        assert_eq!(heap.get(index).unwrap(), guid);
    }

    #[test]
    fn test_parse_heap() {
        let data: [u8; 32] = [
            1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, // GUID 1
            17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, // GUID 2
        ];
        let heap = GuidHeap::parse(&data);
        assert_eq!(heap.count(), 2);
        assert_eq!(
            heap.get(2).unwrap(),
            [17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32]
        );
    }

    #[test]
    fn test_append_tail_keeps_existing_records() {
        let base: [u8; 16] = [9; 16];
        let mut heap = GuidHeap::parse(&base);
        let mut delta = base.to_vec();
        delta.extend_from_slice(&[7u8; 16]);
        heap.append_tail(&delta).unwrap();
        assert_eq!(heap.count(), 2);
        assert_eq!(heap.get(1).unwrap(), [9u8; 16]);
        assert_eq!(heap.get(2).unwrap(), [7u8; 16]);
    }
}
