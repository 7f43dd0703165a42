//! #Blob heap - length-prefixed binary data.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// The #Blob heap containing compressed-length-prefixed binary blobs.
#[derive(Debug, Clone, Default)]
pub struct BlobHeap<'a> {
    /// Raw heap data. Borrowed from the input image until first mutation.
    data: Cow<'a, [u8]>,
    /// Blob to offset mapping for O(1) deduplication during writes.
    index_map: HashMap<Vec<u8>, u32>,
}

impl<'a> BlobHeap<'a> {
    /// Create a new empty blob heap.
    #[must_use]
    pub fn new() -> BlobHeap<'static> {
        // Heap always starts with a null byte (empty blob at offset 0)
        let mut index_map = HashMap::new();
        index_map.insert(Vec::new(), 0);
        BlobHeap {
            data: Cow::Owned(vec![0]),
            index_map,
        }
    }

    /// Parse the blob heap from raw bytes without copying.
    #[must_use]
    pub fn parse(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            index_map: HashMap::new(),
        }
    }

    /// Get a blob at the given offset. Offset 0 is always the empty blob.
    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        if offset == 0 {
            return Ok(&[]);
        }
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        let mut reader = Reader::new(&self.data[offset..]);
        let len = reader.read_compressed_uint()? as usize;

        let header_size = reader.position();
        let blob_start = offset + header_size;
        let blob_end = blob_start + len;

        if blob_end > self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        Ok(&self.data[blob_start..blob_end])
    }

    /// Add a blob to the heap and return its offset.
    ///
    /// The empty blob is stored as offset 0 without allocation. Blobs added
    /// during this session are deduplicated in O(1) time.
    pub fn add(&mut self, blob: &[u8]) -> Result<u32> {
        if blob.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.index_map.get(blob) {
            return Ok(offset);
        }

        let mut header = Writer::new();
        header.write_compressed_uint(blob.len() as u32);

        let data = self.data.to_mut();
        if data.is_empty() {
            data.push(0);
        }
        let needed = header.len() + blob.len();
        data.try_reserve(needed)
            .map_err(|_| Error::Capacity { needed })?;

        let offset = data.len() as u32;
        data.extend_from_slice(header.as_slice());
        data.extend_from_slice(blob);
        self.index_map.insert(blob.to_vec(), offset);
        Ok(offset)
    }

    /// Append raw heap bytes (used when merging delta heaps) and return the
    /// size before the append.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<u32> {
        let data = self.data.to_mut();
        data.try_reserve(bytes.len()).map_err(|_| Error::Capacity {
            needed: bytes.len(),
        })?;
        let offset = data.len() as u32;
        data.extend_from_slice(bytes);
        Ok(offset)
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

    /// Check if the heap uses 4-byte indices (size > 65535).
    #[must_use]
    pub fn uses_wide_indices(&self) -> bool {
        self.data.len() > 0xFFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_heap_has_empty_blob() {
        let heap = BlobHeap::new();
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_add_and_get_blob() {
        let mut heap = BlobHeap::new();
        let offset = heap.add(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(heap.get(offset).unwrap(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_parse_heap() {
        // Empty blob at 0, then blob [0xAB, 0xCD] at offset 1
        let data = [0x00, 0x02, 0xAB, 0xCD];
        let heap = BlobHeap::parse(&data);
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(heap.get(1).unwrap(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_blob_deduplication() {
        let mut heap = BlobHeap::new();
        let offset1 = heap.add(&[0x01, 0x02, 0x03]).unwrap();
        let offset2 = heap.add(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(offset1, offset2);
    }

    #[test]
    fn test_offset_stability_across_appends() {
        let mut heap = BlobHeap::new();
        let first = heap.add(&[0x42, 0x43]).unwrap();
        let second = heap.add(&[0x44]).unwrap();
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_ne!(first, second);
        // Earlier offsets keep returning the original bytes after later appends.
        assert_eq!(heap.get(first).unwrap(), &[0x42, 0x43]);
        assert_eq!(heap.get(second).unwrap(), &[0x44]);
    }
}
