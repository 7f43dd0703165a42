//! The in-memory metadata image: root, heaps, and tables.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap};
use crate::reader::Reader;
use crate::root::MetadataRoot;
use crate::schema::{LayoutCtx, TableId};
use crate::stream::StreamHeader;
use crate::table::{Table, TablesHeader};
use crate::writer::Writer;

/// A complete metadata image.
///
/// Parsing borrows from the input buffer; heaps and table buffers stay
/// zero-copy until the first edit promotes them to owned storage. An
/// unedited image serializes back byte-identically.
#[derive(Debug, Clone)]
pub struct MetadataImage<'a> {
    /// The BSJB root header.
    pub root: MetadataRoot,
    /// The tables stream header.
    pub header: TablesHeader,
    pub(crate) tables: [Option<Table<'a>>; 64],
    /// #Strings heap.
    pub strings: StringsHeap<'a>,
    /// #US heap.
    pub user_strings: UserStringsHeap<'a>,
    /// #GUID heap.
    pub guids: GuidHeap<'a>,
    /// #Blob heap.
    pub blobs: BlobHeap<'a>,
    /// Streams this library does not model (#JTD, #Pdb, vendor streams),
    /// preserved verbatim for serialization.
    other_streams: Vec<(String, Cow<'a, [u8]>)>,
    minimal_delta: bool,
    uncompressed: bool,
}

fn stream_slice<'a>(data: &'a [u8], header: &StreamHeader) -> Result<&'a [u8]> {
    let start = header.offset as usize;
    let end = start + header.size as usize;
    if end > data.len() {
        return Err(Error::UnexpectedEof {
            offset: start,
            needed: header.size as usize,
        });
    }
    Ok(&data[start..end])
}

impl<'a> MetadataImage<'a> {
    /// Create a new empty image with no tables and fresh heaps.
    #[must_use]
    pub fn new() -> MetadataImage<'static> {
        MetadataImage {
            root: MetadataRoot {
                major_version: 1,
                minor_version: 1,
                reserved: 0,
                version: "v4.0.30319".to_string(),
                flags: 0,
                streams: Vec::new(),
            },
            header: TablesHeader::default(),
            tables: [const { None }; 64],
            strings: StringsHeap::new(),
            user_strings: UserStringsHeap::new(),
            guids: GuidHeap::new(),
            blobs: BlobHeap::new(),
            other_streams: Vec::new(),
            minimal_delta: false,
            uncompressed: false,
        }
    }

    /// Parse a metadata image from raw bytes without copying heap or table
    /// data.
    ///
    /// `data` must start at the BSJB signature; stream offsets are relative
    /// to it.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let root = MetadataRoot::parse(data)?;

        // The #JTD marker changes column widths, so it must be known before
        // the tables stream is decoded.
        let minimal_delta = root.find_stream(StreamHeader::MINIMAL_DELTA).is_some();

        let mut strings = StringsHeap::parse(&[]);
        let mut user_strings = UserStringsHeap::parse(&[]);
        let mut guids = GuidHeap::parse(&[]);
        let mut blobs = BlobHeap::parse(&[]);
        let mut tables_data: Option<&[u8]> = None;
        let mut uncompressed = false;
        let mut other_streams = Vec::new();

        for stream in &root.streams {
            let slice = stream_slice(data, stream)?;
            match stream.name.as_str() {
                StreamHeader::STRINGS => strings = StringsHeap::parse(slice),
                StreamHeader::USER_STRINGS => user_strings = UserStringsHeap::parse(slice),
                StreamHeader::GUID => guids = GuidHeap::parse(slice),
                StreamHeader::BLOB => blobs = BlobHeap::parse(slice),
                StreamHeader::TABLES | StreamHeader::TABLES_UNCOMPRESSED => {
                    uncompressed = stream.name == StreamHeader::TABLES_UNCOMPRESSED;
                    tables_data = Some(slice);
                }
                _ => other_streams.push((stream.name.clone(), Cow::Borrowed(slice))),
            }
        }

        let tables_data =
            tables_data.ok_or_else(|| Error::StreamNotFound(StreamHeader::TABLES.to_string()))?;

        let mut reader = Reader::new(tables_data);
        let header = TablesHeader::parse(&mut reader)?;
        let ctx = LayoutCtx::new(header.heap_sizes, header.row_counts, minimal_delta);

        let mut tables: [Option<Table<'a>>; 64] = [const { None }; 64];
        for i in 0..64u8 {
            if header.valid & (1u64 << i) == 0 {
                continue;
            }
            let id = TableId::from_u8(i)?;
            let layout = ctx.describe(id)?;
            let row_count = header.row_counts[i as usize];
            let bytes = reader.read_bytes(row_count as usize * layout.row_size)?;
            tables[i as usize] = Some(Table::parse(
                id,
                row_count,
                header.is_sorted(id),
                layout,
                bytes,
            )?);
        }

        Ok(Self {
            root,
            header,
            tables,
            strings,
            user_strings,
            guids,
            blobs,
            other_streams,
            minimal_delta,
            uncompressed,
        })
    }

    /// Whether the image carries the #JTD minimal-delta marker.
    #[must_use]
    pub fn is_minimal_delta(&self) -> bool {
        self.minimal_delta
    }

    /// Whether the tables stream was #- (uncompressed/EnC) rather than #~.
    #[must_use]
    pub fn is_uncompressed(&self) -> bool {
        self.uncompressed
    }

    /// Mark a fresh emit target as a minimal EnC delta.
    ///
    /// Minimal deltas serialize with the #JTD marker stream and force every
    /// variable-width column to 4 bytes, so existing tables are re-encoded.
    pub fn set_minimal_delta(&mut self, minimal: bool) -> Result<()> {
        if self.minimal_delta == minimal {
            return Ok(());
        }
        self.minimal_delta = minimal;
        self.relayout()
    }

    /// The layout context derived from the current header and delta flag.
    #[must_use]
    pub fn layout_ctx(&self) -> LayoutCtx {
        LayoutCtx::new(
            self.header.heap_sizes,
            self.header.row_counts,
            self.minimal_delta,
        )
    }

    /// Get a table, if present.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table<'a>> {
        self.tables[id as usize].as_ref()
    }

    /// Get a table mutably, if present.
    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table<'a>> {
        self.tables[id as usize].as_mut()
    }

    /// Current row count of a table (0 when absent).
    #[must_use]
    pub fn row_count(&self, id: TableId) -> u32 {
        self.header.row_count(id)
    }

    /// Raw payload of an unmodeled stream, if the parsed image carried one.
    #[must_use]
    pub fn other_stream(&self, name: &str) -> Option<&[u8]> {
        self.other_streams
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_ref())
    }

    fn stream_payload(&self, name: &str, tables_payload: &[u8]) -> Option<Vec<u8>> {
        let bytes: &[u8] = match name {
            StreamHeader::TABLES | StreamHeader::TABLES_UNCOMPRESSED => tables_payload,
            StreamHeader::STRINGS => self.strings.data(),
            StreamHeader::USER_STRINGS => self.user_strings.data(),
            StreamHeader::GUID => self.guids.data(),
            StreamHeader::BLOB => self.blobs.data(),
            _ => self.other_stream(name)?,
        };
        Some(bytes.to_vec())
    }

    /// Serialize the whole image to bytes.
    ///
    /// Stream order follows the parsed image when there is one, otherwise
    /// the canonical tables-first order. Every stream is padded to 4 bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut tables_writer = Writer::new();
        self.header.write_to(&mut tables_writer);
        for table in self.tables.iter().flatten() {
            tables_writer.write_bytes(table.data());
        }
        tables_writer.align(4);
        let tables_payload = tables_writer.into_inner();

        let names: Vec<String> = if self.root.streams.is_empty() {
            let tables_name = if self.uncompressed || self.minimal_delta {
                StreamHeader::TABLES_UNCOMPRESSED
            } else {
                StreamHeader::TABLES
            };
            let mut names: Vec<String> = [
                tables_name,
                StreamHeader::STRINGS,
                StreamHeader::USER_STRINGS,
                StreamHeader::GUID,
                StreamHeader::BLOB,
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
            if self.minimal_delta {
                names.push(StreamHeader::MINIMAL_DELTA.to_string());
            }
            names
        } else {
            self.root.streams.iter().map(|s| s.name.clone()).collect()
        };

        let mut payloads = Vec::with_capacity(names.len());
        for name in &names {
            // A miss only happens for the zero-length #JTD marker.
            let mut payload = self
                .stream_payload(name, &tables_payload)
                .unwrap_or_default();
            let padded = (payload.len() + 3) & !3;
            payload.resize(padded, 0);
            payloads.push(payload);
        }

        let mut root = self.root.clone();
        root.streams = names
            .iter()
            .map(|name| StreamHeader {
                offset: 0,
                size: 0,
                name: name.clone(),
            })
            .collect();

        let mut offset = root.header_size() as u32;
        for (stream, payload) in root.streams.iter_mut().zip(&payloads) {
            stream.offset = offset;
            stream.size = payload.len() as u32;
            offset += stream.size;
        }

        let mut writer = Writer::with_capacity(offset as usize);
        root.write_to(&mut writer);
        for payload in &payloads {
            writer.write_bytes(payload);
        }
        writer.into_inner()
    }
}

impl Default for MetadataImage<'static> {
    fn default() -> Self {
        MetadataImage::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_image_round_trip() {
        let image = MetadataImage::new();
        let bytes = image.serialize();

        let parsed = MetadataImage::parse(&bytes).unwrap();
        assert_eq!(parsed.root.version, "v4.0.30319");
        assert_eq!(parsed.header.valid, 0);
        assert!(!parsed.is_minimal_delta());
        assert!(parsed.table(TableId::Module).is_none());
        // Heap leading null bytes survive.
        assert_eq!(parsed.strings.get(0).unwrap(), "");
        assert_eq!(parsed.blobs.get(0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_serialize_is_stable() {
        let image = MetadataImage::new();
        let first = image.serialize();
        let reparsed = MetadataImage::parse(&first).unwrap();
        assert_eq!(reparsed.serialize(), first);
    }

    #[test]
    fn test_parse_rejects_bad_signature() {
        let mut bytes = MetadataImage::new().serialize();
        bytes[0] = 0xFF;
        assert!(matches!(
            MetadataImage::parse(&bytes),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_parse_requires_tables_stream() {
        // A root with only a #Strings stream.
        let mut root = MetadataRoot {
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            version: "v4.0.30319".to_string(),
            flags: 0,
            streams: vec![StreamHeader {
                offset: 0,
                size: 4,
                name: StreamHeader::STRINGS.to_string(),
            }],
        };
        root.streams[0].offset = root.header_size() as u32;
        let mut writer = Writer::new();
        root.write_to(&mut writer);
        writer.write_bytes(&[0, 0, 0, 0]);
        assert!(matches!(
            MetadataImage::parse(writer.as_slice()),
            Err(Error::StreamNotFound(_))
        ));
    }
}
