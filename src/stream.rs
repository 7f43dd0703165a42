//! Metadata stream header parsing and writing.

use crate::error::Result;
use crate::reader::Reader;
use crate::writer::Writer;

/// A metadata stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset from the start of the metadata root.
    pub offset: u32,
    /// Size of the stream in bytes.
    pub size: u32,
    /// Stream name (e.g., "#~", "#Strings", "#US", "#GUID", "#Blob").
    pub name: String,
}

impl StreamHeader {
    /// Well-known stream names.
    pub const TABLES: &'static str = "#~";
    pub const TABLES_UNCOMPRESSED: &'static str = "#-";
    pub const STRINGS: &'static str = "#Strings";
    pub const USER_STRINGS: &'static str = "#US";
    pub const GUID: &'static str = "#GUID";
    pub const BLOB: &'static str = "#Blob";
    /// Marker stream emitted for minimal EnC deltas. Zero-length payload.
    pub const MINIMAL_DELTA: &'static str = "#JTD";

    /// Parse a stream header from the reader.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let offset = reader.read_u32()?;
        let size = reader.read_u32()?;

        // Read null-terminated name
        let name_start = reader.position();
        let name = reader.read_null_str()?.to_string();

        // Stream names are 4-byte aligned (including null terminator)
        let name_len_with_null = reader.position() - name_start;
        let padding = (4 - (name_len_with_null % 4)) % 4;
        if padding > 0 {
            reader.read_bytes(padding)?;
        }

        Ok(Self { offset, size, name })
    }

    /// Write the stream header to a writer.
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.offset);
        writer.write_u32(self.size);
        writer.write_null_str(&self.name);

        // Align to 4 bytes
        let name_len_with_null = self.name.len() + 1;
        let padding = (4 - (name_len_with_null % 4)) % 4;
        for _ in 0..padding {
            writer.write_u8(0);
        }
    }

    /// Calculate the serialized size of this header.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        let name_len_with_null = self.name.len() + 1;
        let padding = (4 - (name_len_with_null % 4)) % 4;
        8 + name_len_with_null + padding // offset(4) + size(4) + name + padding
    }
}
