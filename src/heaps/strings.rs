//! #Strings heap - null-terminated UTF-8 strings.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// The #Strings heap containing null-terminated UTF-8 strings.
#[derive(Debug, Clone, Default)]
pub struct StringsHeap<'a> {
    /// Raw heap data. Borrowed from the input image until first mutation.
    data: Cow<'a, [u8]>,
    /// String to offset mapping for O(1) deduplication during writes.
    index_map: HashMap<String, u32>,
}

impl<'a> StringsHeap<'a> {
    /// Create a new empty strings heap.
    #[must_use]
    pub fn new() -> StringsHeap<'static> {
        // Heap always starts with a null byte (empty string at offset 0)
        let mut index_map = HashMap::new();
        index_map.insert(String::new(), 0);
        StringsHeap {
            data: Cow::Owned(vec![0]),
            index_map,
        }
    }

    /// Parse the strings heap from raw bytes without copying.
    #[must_use]
    pub fn parse(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            index_map: HashMap::new(),
        }
    }

    /// Get a string at the given offset. Offset 0 is always the empty string.
    pub fn get(&self, offset: u32) -> Result<&str> {
        if offset == 0 {
            return Ok("");
        }
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidString(offset));
        }

        let end = self.data[offset..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::InvalidString(offset))?;

        std::str::from_utf8(&self.data[offset..offset + end])
            .map_err(|_| Error::InvalidString(offset))
    }

    /// Add a string to the heap and return its offset.
    ///
    /// The empty string is stored as offset 0 without allocation. Strings
    /// added during this session are deduplicated in O(1) time.
    pub fn add(&mut self, s: &str) -> Result<u32> {
        if s.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.index_map.get(s) {
            return Ok(offset);
        }

        let data = self.data.to_mut();
        if data.is_empty() {
            data.push(0);
        }
        let needed = s.len() + 1;
        data.try_reserve(needed)
            .map_err(|_| Error::Capacity { needed })?;

        let offset = data.len() as u32;
        data.extend_from_slice(s.as_bytes());
        data.push(0);
        self.index_map.insert(s.to_string(), offset);
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
    fn test_new_heap_has_empty_string() {
        let heap = StringsHeap::new();
        assert_eq!(heap.get(0).unwrap(), "");
    }

    #[test]
    fn test_add_and_get_string() {
        let mut heap = StringsHeap::new();
        let offset = heap.add("Hello").unwrap();
        assert_eq!(heap.get(offset).unwrap(), "Hello");
    }

    #[test]
    fn test_empty_string_is_offset_zero() {
        let mut heap = StringsHeap::new();
        assert_eq!(heap.add("").unwrap(), 0);
        assert_eq!(heap.size(), 1);
    }

    #[test]
    fn test_string_deduplication() {
        let mut heap = StringsHeap::new();
        let offset1 = heap.add("Test").unwrap();
        let offset2 = heap.add("Test").unwrap();
        assert_eq!(offset1, offset2);
    }

    #[test]
    fn test_parse_borrows_and_reads() {
        let data = b"\0Hello\0World\0";
        let heap = StringsHeap::parse(data);
        assert_eq!(heap.get(0).unwrap(), "");
        assert_eq!(heap.get(1).unwrap(), "Hello");
        assert_eq!(heap.get(7).unwrap(), "World");
    }

    #[test]
    fn test_add_after_parse_preserves_offsets() {
        let data = b"\0Hello\0";
        let mut heap = StringsHeap::parse(data);
        let offset = heap.add("World").unwrap();
        assert_eq!(heap.get(1).unwrap(), "Hello");
        assert_eq!(heap.get(offset).unwrap(), "World");
        assert_eq!(offset, 7);
    }
}
