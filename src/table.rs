//! Tables stream (#~/#-) header and the generic row-buffer table.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::schema::{TableId, TableLayout};
use crate::writer::Writer;

/// The tables stream (#~ or #-) header.
#[derive(Debug, Clone)]
pub struct TablesHeader {
    /// Reserved (should be 0).
    pub reserved: u32,
    /// Major version (typically 2).
    pub major_version: u8,
    /// Minor version (typically 0).
    pub minor_version: u8,
    /// Heap size flags.
    /// - Bit 0: #Strings uses 4-byte indices
    /// - Bit 1: #GUID uses 4-byte indices
    /// - Bit 2: #Blob uses 4-byte indices
    /// - Bit 6: an extra 4-byte field follows the row counts
    pub heap_sizes: u8,
    /// Reserved (should be 1).
    pub reserved2: u8,
    /// Bitmask of valid (present) tables.
    pub valid: u64,
    /// Bitmask of sorted tables.
    pub sorted: u64,
    /// Row counts for each valid table.
    pub row_counts: [u32; 64],
    /// The extra field present when heap_sizes bit 6 is set.
    pub extra_data: Option<u32>,
}

impl TablesHeader {
    /// Parse the tables header from a reader.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let reserved = reader.read_u32()?;
        let major_version = reader.read_u8()?;
        let minor_version = reader.read_u8()?;
        let heap_sizes = reader.read_u8()?;
        let reserved2 = reader.read_u8()?;
        let valid = reader.read_u64()?;
        let sorted = reader.read_u64()?;

        let mut row_counts = [0u32; 64];
        for (i, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << i) != 0 {
                *count = reader.read_u32()?;
            }
        }

        let extra_data = if heap_sizes & 0x40 != 0 {
            Some(reader.read_u32()?)
        } else {
            None
        };

        Ok(Self {
            reserved,
            major_version,
            minor_version,
            heap_sizes,
            reserved2,
            valid,
            sorted,
            row_counts,
            extra_data,
        })
    }

    /// Write the tables header to a writer.
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_u32(self.reserved);
        writer.write_u8(self.major_version);
        writer.write_u8(self.minor_version);
        writer.write_u8(self.heap_sizes);
        writer.write_u8(self.reserved2);
        writer.write_u64(self.valid);
        writer.write_u64(self.sorted);

        for i in 0..64 {
            if self.valid & (1u64 << i) != 0 {
                writer.write_u32(self.row_counts[i]);
            }
        }

        if let Some(extra) = self.extra_data {
            writer.write_u32(extra);
        }
    }

    /// Get the row count for a table.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table as usize]
    }

    /// Set the row count for a table, maintaining the valid bitmask.
    pub fn set_row_count(&mut self, table: TableId, count: u32) {
        let bit = 1u64 << (table as u8);
        if count > 0 {
            self.valid |= bit;
        } else {
            self.valid &= !bit;
        }
        self.row_counts[table as usize] = count;
    }

    /// Check whether a table's sorted bit is set.
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.sorted & (1u64 << (table as u8)) != 0
    }

    /// Clear a table's sorted bit. Sticky: nothing ever sets it back.
    pub fn mark_unsorted(&mut self, table: TableId) {
        self.sorted &= !(1u64 << (table as u8));
    }

    /// Calculate the size of this header in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let valid_count = self.valid.count_ones() as usize;
        let extra = if self.extra_data.is_some() { 4 } else { 0 };
        24 + valid_count * 4 + extra
    }
}

impl Default for TablesHeader {
    fn default() -> Self {
        Self {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved2: 1,
            valid: 0,
            // A fresh image starts with every sortable table trivially sorted.
            sorted: TableId::ALL
                .iter()
                .filter(|&&t| crate::schema::sort_key(t).is_some())
                .fold(0u64, |acc, &t| acc | 1u64 << (t as u8)),
            row_counts: [0; 64],
            extra_data: None,
        }
    }
}

/// One metadata table: a packed row buffer plus its derived layout.
///
/// The buffer borrows the parsed image until the first mutation promotes it
/// to owned storage.
#[derive(Debug, Clone)]
pub struct Table<'a> {
    /// Table kind id.
    pub id: TableId,
    /// Current row count.
    pub row_count: u32,
    /// Whether the table is still known to be sorted by its declared key.
    pub sorted: bool,
    /// Derived column layout; kept in sync with the image's row counts and
    /// heap sizes by the editor.
    pub layout: TableLayout,
    data: Cow<'a, [u8]>,
}

impl<'a> Table<'a> {
    /// Create an empty table with the given layout.
    #[must_use]
    pub fn new(id: TableId, layout: TableLayout, sorted: bool) -> Self {
        Self {
            id,
            row_count: 0,
            sorted,
            layout,
            data: Cow::Owned(Vec::new()),
        }
    }

    /// Wrap a parsed row buffer without copying.
    ///
    /// `data` must be exactly `row_count * layout.row_size` bytes.
    pub fn parse(
        id: TableId,
        row_count: u32,
        sorted: bool,
        layout: TableLayout,
        data: &'a [u8],
    ) -> Result<Self> {
        if data.len() != row_count as usize * layout.row_size {
            return Err(Error::UnexpectedEof {
                offset: data.len(),
                needed: row_count as usize * layout.row_size,
            });
        }
        Ok(Self {
            id,
            row_count,
            sorted,
            layout,
            data: Cow::Borrowed(data),
        })
    }

    /// Raw row bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn cell(&self, rid: u32, col: usize) -> Result<(usize, usize)> {
        if rid == 0 || rid > self.row_count {
            return Err(Error::RowOutOfBounds {
                table: self.id,
                row: rid,
                count: self.row_count,
            });
        }
        let desc = self
            .layout
            .columns
            .get(col)
            .ok_or(Error::ColumnOutOfBounds {
                table: self.id,
                column: col,
            })?;
        let pos = (rid as usize - 1) * self.layout.row_size + desc.offset;
        Ok((pos, desc.width))
    }

    /// Read one column value from one row, regardless of storage width.
    pub fn get(&self, rid: u32, col: usize) -> Result<u32> {
        let (pos, width) = self.cell(rid, col)?;
        let bytes = &self.data[pos..pos + width];
        Ok(match width {
            2 => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }

    /// Whether every byte of a row is still zero.
    ///
    /// Freshly inserted rows stay zeroed until their columns are written.
    pub fn row_is_zeroed(&self, rid: u32) -> Result<bool> {
        if rid == 0 || rid > self.row_count {
            return Err(Error::RowOutOfBounds {
                table: self.id,
                row: rid,
                count: self.row_count,
            });
        }
        let start = (rid as usize - 1) * self.layout.row_size;
        Ok(self.data[start..start + self.layout.row_size]
            .iter()
            .all(|&b| b == 0))
    }

    /// Write one column value into one row, regardless of storage width.
    ///
    /// Promotes the buffer to owned storage on first use. Fails when the
    /// value does not fit the column's current width; the editor re-widens
    /// layouts before row counts cross the 2-byte boundary.
    pub fn set(&mut self, rid: u32, col: usize, value: u32) -> Result<()> {
        let (pos, width) = self.cell(rid, col)?;
        if width == 2 && value > 0xFFFF {
            return Err(Error::ValueTooWide {
                table: self.id,
                column: col,
                width,
                value,
            });
        }
        let data = self.data.to_mut();
        match width {
            2 => data[pos..pos + 2].copy_from_slice(&(value as u16).to_le_bytes()),
            _ => data[pos..pos + 4].copy_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }

    /// Append one zeroed row.
    pub fn push_row(&mut self) -> Result<()> {
        let data = self.data.to_mut();
        let needed = self.layout.row_size;
        data.try_reserve(needed)
            .map_err(|_| Error::Capacity { needed })?;
        data.resize(data.len() + needed, 0);
        self.row_count += 1;
        Ok(())
    }

    /// Insert one zeroed row at `rid`, shifting the tail down.
    ///
    /// `rid` may be `row_count + 1`, which degenerates to an append.
    pub fn insert_row(&mut self, rid: u32) -> Result<()> {
        if rid == 0 || rid > self.row_count + 1 {
            return Err(Error::RowOutOfBounds {
                table: self.id,
                row: rid,
                count: self.row_count,
            });
        }
        let row_size = self.layout.row_size;
        let data = self.data.to_mut();
        data.try_reserve(row_size)
            .map_err(|_| Error::Capacity { needed: row_size })?;
        let old_len = data.len();
        data.resize(old_len + row_size, 0);
        let start = (rid as usize - 1) * row_size;
        data.copy_within(start..old_len, start + row_size);
        data[start..start + row_size].fill(0);
        self.row_count += 1;
        Ok(())
    }

    /// Re-encode every row under a new layout.
    ///
    /// Used when a referenced table or heap crossed the 65536 boundary and
    /// column widths changed. Values are copied column by column since widths
    /// are heterogeneous across columns of the same row.
    pub fn reencode(&mut self, new_layout: TableLayout) -> Result<()> {
        if new_layout == self.layout {
            return Ok(());
        }
        let rows = self.row_count as usize;
        let needed = rows * new_layout.row_size;
        let mut out: Vec<u8> = Vec::new();
        out.try_reserve(needed)
            .map_err(|_| Error::Capacity { needed })?;
        out.resize(needed, 0);

        for rid in 1..=self.row_count {
            for (col, desc) in new_layout.columns.iter().enumerate() {
                let value = self.get(rid, col)?;
                let pos = (rid as usize - 1) * new_layout.row_size + desc.offset;
                match desc.width {
                    2 => out[pos..pos + 2].copy_from_slice(&(value as u16).to_le_bytes()),
                    _ => out[pos..pos + 4].copy_from_slice(&value.to_le_bytes()),
                }
            }
        }

        self.data = Cow::Owned(out);
        self.layout = new_layout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LayoutCtx;

    fn field_table(rows: u32) -> Table<'static> {
        let ctx = LayoutCtx::new(0, [0; 64], false);
        let mut table = Table::new(TableId::Field, ctx.describe(TableId::Field).unwrap(), false);
        for _ in 0..rows {
            table.push_row().unwrap();
        }
        table
    }

    #[test]
    fn test_get_set_round_trip() {
        let mut table = field_table(2);
        table.set(2, 0, 0x16).unwrap();
        table.set(2, 1, 0x1234).unwrap();
        assert_eq!(table.get(2, 0).unwrap(), 0x16);
        assert_eq!(table.get(2, 1).unwrap(), 0x1234);
        // Row 1 untouched.
        assert_eq!(table.get(1, 1).unwrap(), 0);
    }

    #[test]
    fn test_row_zero_is_invalid() {
        let table = field_table(1);
        assert!(table.get(0, 0).is_err());
        assert!(table.get(2, 0).is_err());
    }

    #[test]
    fn test_set_rejects_value_wider_than_column() {
        let mut table = field_table(1);
        // Column 1 (name) is 2 bytes under narrow heaps.
        assert!(matches!(
            table.set(1, 1, 0x1_0000),
            Err(Error::ValueTooWide { .. })
        ));
        // The row is untouched.
        assert_eq!(table.get(1, 1).unwrap(), 0);
    }

    #[test]
    fn test_zeroed_row_detection() {
        let mut table = field_table(2);
        assert!(table.row_is_zeroed(1).unwrap());
        table.set(2, 0, 1).unwrap();
        assert!(table.row_is_zeroed(1).unwrap());
        assert!(!table.row_is_zeroed(2).unwrap());
        assert!(table.row_is_zeroed(0).is_err());
    }

    #[test]
    fn test_insert_row_shifts_tail() {
        let mut table = field_table(3);
        for rid in 1..=3 {
            table.set(rid, 0, rid * 10).unwrap();
        }
        table.insert_row(2).unwrap();
        assert_eq!(table.row_count, 4);
        assert_eq!(table.get(1, 0).unwrap(), 10);
        assert_eq!(table.get(2, 0).unwrap(), 0);
        assert_eq!(table.get(3, 0).unwrap(), 20);
        assert_eq!(table.get(4, 0).unwrap(), 30);
    }

    #[test]
    fn test_reencode_preserves_values() {
        let mut table = field_table(2);
        table.set(1, 1, 0x77).unwrap();
        table.set(2, 2, 0x99).unwrap();

        // Force the string column wide.
        let wide_ctx = LayoutCtx::new(0x01, [0; 64], false);
        let new_layout = wide_ctx.describe(TableId::Field).unwrap();
        assert_ne!(new_layout, table.layout);
        table.reencode(new_layout).unwrap();

        assert_eq!(table.get(1, 1).unwrap(), 0x77);
        assert_eq!(table.get(2, 2).unwrap(), 0x99);
    }
}
