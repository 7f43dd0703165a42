//! #US (User Strings) heap - length-prefixed UTF-16LE strings.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// The #US heap containing user strings (UTF-16LE with length prefix).
#[derive(Debug, Clone, Default)]
pub struct UserStringsHeap<'a> {
    /// Raw heap data. Borrowed from the input image until first mutation.
    data: Cow<'a, [u8]>,
}

impl<'a> UserStringsHeap<'a> {
    /// Create a new empty user strings heap.
    #[must_use]
    pub fn new() -> UserStringsHeap<'static> {
        // Heap always starts with a null byte
        UserStringsHeap {
            data: Cow::Owned(vec![0]),
        }
    }

    /// Parse the user strings heap from raw bytes without copying.
    #[must_use]
    pub fn parse(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
        }
    }

    /// Get a user string at the given offset. Offset 0 is the empty string.
    pub fn get(&self, offset: u32) -> Result<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidUserString(offset));
        }

        let mut reader = Reader::new(&self.data[offset..]);
        let blob_len = reader.read_compressed_uint()? as usize;

        if blob_len == 0 {
            return Ok(String::new());
        }

        // The blob length includes a trailing byte indicating if any chars are > 0x7F
        let str_len = blob_len.saturating_sub(1);

        if str_len % 2 != 0 {
            return Err(Error::InvalidUserString(offset));
        }

        let bytes = reader.read_bytes(str_len)?;

        let utf16: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        String::from_utf16(&utf16).map_err(|_| Error::InvalidUserString(offset))
    }

    /// Add a user string to the heap and return its offset.
    pub fn add(&mut self, s: &str) -> Result<u32> {
        let utf16: Vec<u16> = s.encode_utf16().collect();
        let byte_len = utf16.len() * 2;

        // Trailing flag byte: set when any unit needs special handling at
        // runtime (non-ASCII, control chars, quote, dash). ECMA-335 II.24.2.4.
        let has_special = utf16.iter().any(|&c| {
            c > 0x7F
                || (0x01..=0x08).contains(&c)
                || (0x0E..=0x1F).contains(&c)
                || c == 0x27
                || c == 0x2D
        });

        // Blob length = string bytes + 1 (trailing flag byte)
        let blob_len = byte_len + 1;

        let mut prefix = Writer::new();
        prefix.write_compressed_uint(blob_len as u32);

        let data = self.data.to_mut();
        if data.is_empty() {
            data.push(0);
        }
        let needed = prefix.len() + blob_len;
        data.try_reserve(needed)
            .map_err(|_| Error::Capacity { needed })?;

        let offset = data.len() as u32;
        data.extend_from_slice(prefix.as_slice());
        for &c in &utf16 {
            data.extend_from_slice(&c.to_le_bytes());
        }
        data.push(if has_special { 1 } else { 0 });

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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_string() {
        let mut heap = UserStringsHeap::new();
        let offset = heap.add("Hello").unwrap();
        assert_eq!(heap.get(offset).unwrap(), "Hello");
    }

    #[test]
    fn test_unicode_string() {
        let mut heap = UserStringsHeap::new();
        let offset = heap.add("日本語").unwrap();
        assert_eq!(heap.get(offset).unwrap(), "日本語");
    }

    #[test]
    fn test_parse_heap() {
        // null byte + "Hi" in UTF-16LE with length prefix
        let data = [
            0x00, // null byte at start
            0x05, // compressed length = 5
            0x48, 0x00, // 'H'
            0x69, 0x00, // 'i'
            0x00, // flag byte (no special chars)
        ];
        let heap = UserStringsHeap::parse(&data);
        assert_eq!(heap.get(1).unwrap(), "Hi");
    }
}
