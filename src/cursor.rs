//! Cursor positions, tokens, and the generic column read/write engine.

use crate::error::{Error, Result};
use crate::heaps::Guid;
use crate::image::MetadataImage;
use crate::schema::{self, ColumnDesc, ColumnKind, TableId};
use crate::table::Table;

/// A metadata token: table kind id in the high byte, 1-based rid in the low
/// 24 bits. Rid 0 is nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u32);

impl Token {
    /// The nil token.
    pub const NIL: Token = Token(0);

    /// Build a token from a table kind and rid.
    #[must_use]
    pub fn new(table: TableId, rid: u32) -> Self {
        Token(((table as u32) << 24) | (rid & 0x00FF_FFFF))
    }

    /// Wrap a raw token value.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Token(raw)
    }

    /// The raw packed value.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// The 1-based rid (0 for nil).
    #[must_use]
    pub fn rid(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// The table kind. Fails on an unrecognized id byte.
    pub fn table(self) -> Result<TableId> {
        TableId::from_u8((self.0 >> 24) as u8)
    }

    /// Whether the rid is 0.
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.rid() == 0
    }
}

/// A position within one table: 1-based row index.
///
/// Row 0 is reserved; `row_count + 1` is the valid end sentinel used for
/// empty ranges and insertion points. Cursors stay valid across buffer
/// reallocation since they are re-resolved on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Table kind.
    pub table: TableId,
    /// 1-based row index.
    pub row: u32,
}

/// A contiguous run of logical rows in one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    /// Table the rows belong to.
    pub table: TableId,
    /// First logical rid of the range.
    pub start: u32,
    /// Number of rows (0 for an empty range).
    pub count: u32,
}

impl<'a> MetadataImage<'a> {
    /// Create a cursor at row 1 of a table. Fails if the table has no rows.
    pub fn cursor_at_start(&self, table: TableId) -> Result<Cursor> {
        if self.row_count(table) == 0 {
            return Err(Error::RowOutOfBounds {
                table,
                row: 1,
                count: 0,
            });
        }
        Ok(Cursor { table, row: 1 })
    }

    /// Move a cursor by a signed delta.
    ///
    /// Fails if the resulting row would be 0 or past the end sentinel.
    pub fn cursor_move(&self, cursor: Cursor, delta: i64) -> Result<Cursor> {
        let count = self.row_count(cursor.table);
        let target = i64::from(cursor.row) + delta;
        if target < 1 || target > i64::from(count) + 1 {
            return Err(Error::RowOutOfBounds {
                table: cursor.table,
                row: target.max(0) as u32,
                count,
            });
        }
        Ok(Cursor {
            table: cursor.table,
            row: target as u32,
        })
    }

    /// Convert a cursor to a token. A cursor into an empty table yields nil.
    #[must_use]
    pub fn cursor_to_token(&self, cursor: Cursor) -> Token {
        if self.row_count(cursor.table) == 0 {
            return Token::new(cursor.table, 0);
        }
        Token::new(cursor.table, cursor.row)
    }

    /// Convert a token to a cursor. Nil and out-of-range rids fail.
    pub fn token_to_cursor(&self, token: Token) -> Result<Cursor> {
        let table = token.table()?;
        let count = self.row_count(table);
        let rid = token.rid();
        if rid == 0 || rid > count + 1 {
            return Err(Error::RowOutOfBounds {
                table,
                row: rid,
                count,
            });
        }
        Ok(Cursor { table, row: rid })
    }

    fn table_ref(&self, table: TableId, row: u32) -> Result<&Table<'a>> {
        self.table(table).ok_or(Error::RowOutOfBounds {
            table,
            row,
            count: 0,
        })
    }

    /// Bounds-check `count` consecutive rows starting at the cursor.
    fn checked_rows(&self, cursor: Cursor, count: u32) -> Result<&Table<'a>> {
        let table = self.table_ref(cursor.table, cursor.row)?;
        let last = cursor.row.saturating_add(count.saturating_sub(1));
        if cursor.row == 0 || last > table.row_count {
            return Err(Error::RowOutOfBounds {
                table: cursor.table,
                row: last,
                count: table.row_count,
            });
        }
        Ok(table)
    }

    fn column_desc(table: &Table<'a>, col: usize) -> Result<ColumnDesc> {
        table
            .layout
            .columns
            .get(col)
            .copied()
            .ok_or(Error::ColumnOutOfBounds {
                table: table.id,
                column: col,
            })
    }

    fn kind_mismatch(table: TableId, col: usize, expected: &'static str) -> Error {
        Error::ColumnKindMismatch {
            table,
            column: col,
            expected,
        }
    }

    /// Read `count` consecutive rows' fixed-constant values of one column.
    pub fn read_const(&self, cursor: Cursor, col: usize, count: u32) -> Result<Vec<u32>> {
        let table = self.checked_rows(cursor, count)?;
        let desc = Self::column_desc(table, col)?;
        if !matches!(desc.kind, ColumnKind::Fixed(_)) {
            return Err(Self::kind_mismatch(cursor.table, col, "constant"));
        }
        (cursor.row..cursor.row + count)
            .map(|rid| table.get(rid, col))
            .collect()
    }

    /// Read `count` consecutive rows of a simple or coded index column as
    /// tokens.
    pub fn read_tokens(&self, cursor: Cursor, col: usize, count: u32) -> Result<Vec<Token>> {
        let table = self.checked_rows(cursor, count)?;
        let desc = Self::column_desc(table, col)?;
        let mut out = Vec::with_capacity(count as usize);
        for rid in cursor.row..cursor.row + count {
            let value = table.get(rid, col)?;
            let token = match desc.kind {
                ColumnKind::Index(target) => Token::new(target, value),
                ColumnKind::Coded(kind) => match kind.decompose(value)? {
                    (Some(target), r) => Token::new(target, r),
                    (None, _) => Token::NIL,
                },
                _ => return Err(Self::kind_mismatch(cursor.table, col, "index")),
            };
            out.push(token);
        }
        Ok(out)
    }

    /// Read one index column value as a cursor. Fails on nil.
    pub fn read_cursor(&self, cursor: Cursor, col: usize) -> Result<Cursor> {
        let token = self.read_tokens(cursor, col, 1)?[0];
        self.token_to_cursor(token)
    }

    /// Read `count` consecutive rows' #Strings heap content of one column.
    pub fn read_strings(&self, cursor: Cursor, col: usize, count: u32) -> Result<Vec<&str>> {
        let table = self.checked_rows(cursor, count)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Str {
            return Err(Self::kind_mismatch(cursor.table, col, "string"));
        }
        (cursor.row..cursor.row + count)
            .map(|rid| self.strings.get(table.get(rid, col)?))
            .collect()
    }

    /// Read `count` consecutive rows' #Blob heap content of one column.
    pub fn read_blobs(&self, cursor: Cursor, col: usize, count: u32) -> Result<Vec<&[u8]>> {
        let table = self.checked_rows(cursor, count)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Blob {
            return Err(Self::kind_mismatch(cursor.table, col, "blob"));
        }
        (cursor.row..cursor.row + count)
            .map(|rid| self.blobs.get(table.get(rid, col)?))
            .collect()
    }

    /// Read `count` consecutive rows' #GUID heap content of one column.
    pub fn read_guids(&self, cursor: Cursor, col: usize, count: u32) -> Result<Vec<Guid>> {
        let table = self.checked_rows(cursor, count)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Guid {
            return Err(Self::kind_mismatch(cursor.table, col, "guid"));
        }
        (cursor.row..cursor.row + count)
            .map(|rid| self.guids.get(table.get(rid, col)?))
            .collect()
    }

    /// Write fixed-constant values into consecutive rows of one column.
    pub fn write_const(&mut self, cursor: Cursor, col: usize, values: &[u32]) -> Result<()> {
        let table = self.checked_rows(cursor, values.len() as u32)?;
        let desc = Self::column_desc(table, col)?;
        if !matches!(desc.kind, ColumnKind::Fixed(_)) {
            return Err(Self::kind_mismatch(cursor.table, col, "constant"));
        }
        self.store_values(cursor, col, values)
    }

    /// Write tokens into consecutive rows of a simple or coded index column.
    ///
    /// Simple index columns reject tokens into a different table; coded
    /// columns reject tokens outside the candidate set. Nil stores 0.
    pub fn write_tokens(&mut self, cursor: Cursor, col: usize, values: &[Token]) -> Result<()> {
        let table = self.checked_rows(cursor, values.len() as u32)?;
        let desc = Self::column_desc(table, col)?;
        let mut raw = Vec::with_capacity(values.len());
        for &token in values {
            let value = match desc.kind {
                ColumnKind::Index(target) => {
                    if token.is_nil() {
                        0
                    } else {
                        let got = token.table()?;
                        if got != target {
                            return Err(Error::IndexTargetMismatch {
                                table: cursor.table,
                                column: col,
                                expected: target,
                                got,
                            });
                        }
                        token.rid()
                    }
                }
                ColumnKind::Coded(kind) => {
                    if token.is_nil() {
                        0
                    } else {
                        kind.compose(token.table()?, token.rid())?
                    }
                }
                _ => return Err(Self::kind_mismatch(cursor.table, col, "index")),
            };
            raw.push(value);
        }
        self.store_values(cursor, col, &raw)
    }

    /// Write strings into consecutive rows of a #Strings column.
    ///
    /// Content is appended to the heap; the empty string stores offset 0
    /// without allocation.
    pub fn write_strings(&mut self, cursor: Cursor, col: usize, values: &[&str]) -> Result<()> {
        let table = self.checked_rows(cursor, values.len() as u32)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Str {
            return Err(Self::kind_mismatch(cursor.table, col, "string"));
        }
        let mut raw = Vec::with_capacity(values.len());
        for &s in values {
            raw.push(self.strings.add(s)?);
        }
        self.sync_heap_widths()?;
        self.store_values(cursor, col, &raw)
    }

    /// Write blobs into consecutive rows of a #Blob column.
    pub fn write_blobs(&mut self, cursor: Cursor, col: usize, values: &[&[u8]]) -> Result<()> {
        let table = self.checked_rows(cursor, values.len() as u32)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Blob {
            return Err(Self::kind_mismatch(cursor.table, col, "blob"));
        }
        let mut raw = Vec::with_capacity(values.len());
        for &b in values {
            raw.push(self.blobs.add(b)?);
        }
        self.sync_heap_widths()?;
        self.store_values(cursor, col, &raw)
    }

    /// Write GUIDs into consecutive rows of a #GUID column.
    pub fn write_guids(&mut self, cursor: Cursor, col: usize, values: &[Guid]) -> Result<()> {
        let table = self.checked_rows(cursor, values.len() as u32)?;
        let desc = Self::column_desc(table, col)?;
        if desc.kind != ColumnKind::Guid {
            return Err(Self::kind_mismatch(cursor.table, col, "guid"));
        }
        let mut raw = Vec::with_capacity(values.len());
        for guid in values {
            raw.push(self.guids.add(guid)?);
        }
        self.sync_heap_widths()?;
        self.store_values(cursor, col, &raw)
    }

    /// Store already-encoded raw values, then re-validate sortedness if the
    /// column is the table's sort key.
    fn store_values(&mut self, cursor: Cursor, col: usize, values: &[u32]) -> Result<()> {
        let table = self.table_mut(cursor.table).ok_or(Error::RowOutOfBounds {
            table: cursor.table,
            row: cursor.row,
            count: 0,
        })?;
        for (i, &value) in values.iter().enumerate() {
            table.set(cursor.row + i as u32, col, value)?;
        }
        if schema::sort_key(cursor.table) == Some(col) {
            for i in 0..values.len() as u32 {
                self.recheck_sorted(cursor.table, cursor.row + i)?;
            }
        }
        Ok(())
    }

    /// Number of logical rows of a table (the indirection table's count when
    /// one exists, otherwise the table's own).
    #[must_use]
    pub fn logical_count(&self, table: TableId) -> u32 {
        match schema::ptr_table(table) {
            Some(ptr) if self.row_count(ptr) > 0 => self.row_count(ptr),
            _ => self.row_count(table),
        }
    }

    /// Resolve a logical rid to a physical cursor, redirecting through the
    /// indirection table when one exists.
    pub fn resolve_logical(&self, table: TableId, logical: u32) -> Result<Cursor> {
        match schema::ptr_table(table) {
            Some(ptr) if self.row_count(ptr) > 0 => {
                let ptr_table = self.table_ref(ptr, logical)?;
                let physical = ptr_table.get(logical, 0)?;
                Ok(Cursor {
                    table,
                    row: physical,
                })
            }
            _ => {
                // Identity; still bounds-checked.
                let t = self.table_ref(table, logical)?;
                if logical == 0 || logical > t.row_count {
                    return Err(Error::RowOutOfBounds {
                        table,
                        row: logical,
                        count: t.row_count,
                    });
                }
                Ok(Cursor {
                    table,
                    row: logical,
                })
            }
        }
    }

    /// Map a physical rid back to its logical position.
    pub fn logical_rid(&self, table: TableId, physical: u32) -> Result<u32> {
        match schema::ptr_table(table) {
            Some(ptr) if self.row_count(ptr) > 0 => {
                let ptr_table = self.table_ref(ptr, physical)?;
                for rid in 1..=ptr_table.row_count {
                    if ptr_table.get(rid, 0)? == physical {
                        return Ok(rid);
                    }
                }
                Err(Error::RowOutOfBounds {
                    table: ptr,
                    row: physical,
                    count: ptr_table.row_count,
                })
            }
            _ => Ok(physical),
        }
    }

    /// Resolve a list-start column to the owner row's child range.
    ///
    /// The range end is the next sibling's start value, skipping nil
    /// placeholders, or one past the child table's logical row count when
    /// there is no next sibling. Start and rids are logical; resolve each
    /// through [`MetadataImage::resolve_logical`] to reach physical rows.
    pub fn get_range(&self, cursor: Cursor, col: usize) -> Result<RowRange> {
        let child = schema::list_columns(cursor.table)
            .iter()
            .find(|&&(c, _)| c == col)
            .map(|&(_, child)| child)
            .ok_or_else(|| Self::kind_mismatch(cursor.table, col, "list"))?;

        let table = self.checked_rows(cursor, 1)?;
        let start = table.get(cursor.row, col)?;

        let mut end = self.logical_count(child) + 1;
        for next in cursor.row + 1..=table.row_count {
            let value = table.get(next, col)?;
            if value != 0 {
                end = value;
                break;
            }
        }

        let count = if start == 0 { 0 } else { end.saturating_sub(start) };
        Ok(RowRange {
            table: child,
            start,
            count,
        })
    }

    /// Compose a token into the raw search-key encoding of a column.
    pub fn search_key(&self, table: TableId, col: usize, token: Token) -> Result<u32> {
        let t = self.table_ref(table, 1)?;
        let desc = Self::column_desc(t, col)?;
        match desc.kind {
            ColumnKind::Index(target) => {
                let got = token.table()?;
                if got != target {
                    return Err(Error::IndexTargetMismatch {
                        table,
                        column: col,
                        expected: target,
                        got,
                    });
                }
                Ok(token.rid())
            }
            ColumnKind::Coded(kind) => kind.compose(token.table()?, token.rid()),
            _ => Err(Self::kind_mismatch(table, col, "index")),
        }
    }

    /// Find one row whose column equals `key`.
    ///
    /// Binary search when the table is sorted on that column, otherwise a
    /// linear scan. Coded keys must be composed first (see
    /// [`MetadataImage::search_key`]).
    pub fn find_row(&self, table: TableId, col: usize, key: u32) -> Result<Option<Cursor>> {
        let Some(t) = self.table(table) else {
            return Ok(None);
        };
        Self::column_desc(t, col)?;

        if t.sorted && schema::sort_key(table) == Some(col) {
            if let Some(row) = Self::binary_find(t, col, key)? {
                return Ok(Some(Cursor { table, row }));
            }
            return Ok(None);
        }
        for rid in 1..=t.row_count {
            if t.get(rid, col)? == key {
                return Ok(Some(Cursor { table, row: rid }));
            }
        }
        Ok(None)
    }

    /// Find the full contiguous run of rows whose primary sort-key column
    /// equals `key`.
    pub fn find_range(&self, table: TableId, col: usize, key: u32) -> Result<Option<RowRange>> {
        if schema::sort_key(table) != Some(col) {
            return Err(Self::kind_mismatch(table, col, "sort key"));
        }
        let Some(found) = self.find_row(table, col, key)? else {
            return Ok(None);
        };
        let t = self.table_ref(table, found.row)?;

        let mut first = found.row;
        while first > 1 && t.get(first - 1, col)? == key {
            first -= 1;
        }
        let mut last = found.row;
        while last < t.row_count && t.get(last + 1, col)? == key {
            last += 1;
        }
        Ok(Some(RowRange {
            table,
            start: first,
            count: last - first + 1,
        }))
    }

    fn binary_find(table: &Table<'a>, col: usize, key: u32) -> Result<Option<u32>> {
        let mut lo = 1u32;
        let mut hi = table.row_count;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let value = table.get(mid, col)?;
            if value == key {
                return Ok(Some(mid));
            }
            if value < key {
                lo = mid + 1;
            } else {
                if mid == 1 {
                    break;
                }
                hi = mid - 1;
            }
        }
        Ok(None)
    }

    /// Find the owner row whose list range contains a child row.
    ///
    /// Closest-less-or-equal binary search on the owner's list-start column.
    /// Nil placeholders never begin a partition, so each probe steps down to
    /// the nearest row with a real start. At an exact match the search walks
    /// forward over any run of owners aliasing the same start value (nil rows
    /// included) and takes the last one (the earlier ones hold empty ranges);
    /// the walk is O(run length) and unbounded since the format does not cap
    /// aliasing runs.
    pub fn find_owning_parent(&self, child: Cursor) -> Result<Option<Cursor>> {
        let (owner, col) = schema::list_owner(child.table).ok_or_else(|| {
            Self::kind_mismatch(child.table, 0, "list child")
        })?;
        self.checked_rows(child, 1)?;
        let logical = self.logical_rid(child.table, child.row)?;

        let Some(t) = self.table(owner) else {
            return Ok(None);
        };

        // Largest owner row with a non-nil start <= the child's logical rid.
        let mut lo = 1u32;
        let mut hi = t.row_count;
        let mut best: Option<u32> = None;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let mut probe = mid;
            let mut found = None;
            loop {
                let start = t.get(probe, col)?;
                if start != 0 {
                    found = Some((probe, start));
                    break;
                }
                if probe == lo {
                    break;
                }
                probe -= 1;
            }
            match found {
                None => lo = mid + 1,
                Some((row, start)) if start <= logical => {
                    best = Some(row);
                    lo = mid + 1;
                }
                Some((row, _)) => {
                    if row == 1 {
                        break;
                    }
                    hi = row - 1;
                }
            }
        }
        let Some(mut row) = best else {
            return Ok(None);
        };

        if t.get(row, col)? == logical {
            let mut next = row + 1;
            while next <= t.row_count {
                let start = t.get(next, col)?;
                if start == logical {
                    row = next;
                } else if start != 0 {
                    break;
                }
                next += 1;
            }
        }
        Ok(Some(Cursor { table: owner, row }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = Token::new(TableId::MethodDef, 0x1234);
        assert_eq!(token.raw(), 0x0600_1234);
        assert_eq!(token.table().unwrap(), TableId::MethodDef);
        assert_eq!(token.rid(), 0x1234);
        assert!(!token.is_nil());
        assert!(Token::new(TableId::MethodDef, 0).is_nil());
    }

    #[test]
    fn test_cursor_bounds() {
        let mut image = MetadataImage::new();
        for _ in 0..3 {
            image.append_row(TableId::TypeRef).unwrap();
        }

        // row_count moves from row 1 reach the end sentinel; one more fails.
        let mut cursor = image.cursor_at_start(TableId::TypeRef).unwrap();
        for _ in 0..3 {
            cursor = image.cursor_move(cursor, 1).unwrap();
        }
        assert_eq!(cursor.row, 4);
        assert!(image.cursor_move(cursor, 1).is_err());
        // Row 0 is always invalid.
        let start = image.cursor_at_start(TableId::TypeRef).unwrap();
        assert!(image.cursor_move(start, -1).is_err());
    }

    #[test]
    fn test_empty_table_has_no_start_cursor() {
        let image = MetadataImage::new();
        assert!(image.cursor_at_start(TableId::TypeDef).is_err());
    }

    #[test]
    fn test_empty_table_cursor_converts_to_nil() {
        let image = MetadataImage::new();
        let cursor = Cursor {
            table: TableId::TypeDef,
            row: 1,
        };
        assert!(image.cursor_to_token(cursor).is_nil());
    }

    #[test]
    fn test_read_rejects_wrong_category() {
        let mut image = MetadataImage::new();
        let cursor = image.append_row(TableId::Module).unwrap();
        // Module column 1 is a string, not a constant.
        assert!(matches!(
            image.read_const(cursor, 1, 1),
            Err(Error::ColumnKindMismatch { .. })
        ));
        assert!(matches!(
            image.read_strings(cursor, 0, 1),
            Err(Error::ColumnKindMismatch { .. })
        ));
    }

    #[test]
    fn test_write_and_read_string_column() {
        let mut image = MetadataImage::new();
        let cursor = image.append_row(TableId::Module).unwrap();
        image.write_strings(cursor, 1, &["A.dll"]).unwrap();
        assert_eq!(image.read_strings(cursor, 1, 1).unwrap(), vec!["A.dll"]);
        // Empty string stores offset 0 without touching the heap.
        let before = image.strings.size();
        image.write_strings(cursor, 1, &[""]).unwrap();
        assert_eq!(image.strings.size(), before);
        assert_eq!(image.read_strings(cursor, 1, 1).unwrap(), vec![""]);
    }

    #[test]
    fn test_write_token_rejects_wrong_target() {
        let mut image = MetadataImage::new();
        image.append_row(TableId::Field).unwrap();
        let cursor = image.append_row(TableId::FieldLayout).unwrap();
        // FieldLayout column 1 indexes Field.
        let ok = Token::new(TableId::Field, 1);
        image.write_tokens(cursor, 1, &[ok]).unwrap();
        assert_eq!(image.read_tokens(cursor, 1, 1).unwrap(), vec![ok]);

        let bad = Token::new(TableId::MethodDef, 1);
        assert!(matches!(
            image.write_tokens(cursor, 1, &[bad]),
            Err(Error::IndexTargetMismatch { .. })
        ));
    }

    #[test]
    fn test_write_token_exceeding_column_width_fails() {
        let mut image = MetadataImage::new();
        image.append_row(TableId::Field).unwrap();
        let cursor = image.append_row(TableId::FieldLayout).unwrap();
        // Field is small, so FieldLayout's index column is 2 bytes; a
        // forward reference past 0xFFFF cannot be stored without widening.
        let far = Token::new(TableId::Field, 0x1_0000);
        assert!(matches!(
            image.write_tokens(cursor, 1, &[far]),
            Err(Error::ValueTooWide { .. })
        ));
        // The row is untouched.
        assert_eq!(image.read_tokens(cursor, 1, 1).unwrap()[0].rid(), 0);
    }

    #[test]
    fn test_owner_search_skips_nil_placeholders() {
        let mut image = MetadataImage::new();
        for _ in 0..3 {
            image.append_row(TableId::TypeDef).unwrap();
        }
        for _ in 0..2 {
            image.append_row(TableId::Field).unwrap();
        }
        // Field-list starts [1, 0, 2]: the middle owner is a nil placeholder
        // and owns nothing.
        {
            let table = image.table_mut(TableId::TypeDef).unwrap();
            table.set(1, 4, 1).unwrap();
            table.set(2, 4, 0).unwrap();
            table.set(3, 4, 2).unwrap();
        }

        let owner_of = |rid| {
            image
                .find_owning_parent(Cursor {
                    table: TableId::Field,
                    row: rid,
                })
                .unwrap()
                .unwrap()
                .row
        };
        assert_eq!(owner_of(1), 1);
        assert_eq!(owner_of(2), 3);
        // The partition agrees.
        let range = image
            .get_range(
                Cursor {
                    table: TableId::TypeDef,
                    row: 1,
                },
                4,
            )
            .unwrap();
        assert_eq!((range.start, range.count), (1, 1));
    }

    #[test]
    fn test_coded_column_write_rejects_non_candidate() {
        let mut image = MetadataImage::new();
        image.append_row(TableId::Field).unwrap();
        let cursor = image.append_row(TableId::Constant).unwrap();
        // Constant column 1 is a HasConstant coded index.
        let ok = Token::new(TableId::Field, 1);
        image.write_tokens(cursor, 1, &[ok]).unwrap();
        assert_eq!(image.read_tokens(cursor, 1, 1).unwrap(), vec![ok]);

        let bad = Token::new(TableId::TypeDef, 1);
        assert!(matches!(
            image.write_tokens(cursor, 1, &[bad]),
            Err(Error::CodedIndexTarget { .. })
        ));
    }

    #[test]
    fn test_multi_row_read() {
        let mut image = MetadataImage::new();
        for i in 0..4u32 {
            let cursor = image.append_row(TableId::Field).unwrap();
            image.write_const(cursor, 0, &[i + 10]).unwrap();
        }
        let start = image.cursor_at_start(TableId::Field).unwrap();
        assert_eq!(
            image.read_const(start, 0, 4).unwrap(),
            vec![10, 11, 12, 13]
        );
        // Reading past the last row fails.
        assert!(image.read_const(start, 0, 5).is_err());
    }

    #[test]
    fn test_find_row_linear_and_sorted() {
        let mut image = MetadataImage::new();
        // ClassLayout is sorted on column 2 (Parent, a TypeDef index).
        for parent in [2u32, 5, 9] {
            let cursor = image.append_row(TableId::ClassLayout).unwrap();
            image.write_const(cursor, 0, &[8]).unwrap();
            image
                .write_tokens(cursor, 2, &[Token::new(TableId::TypeDef, parent)])
                .unwrap();
        }
        let found = image.find_row(TableId::ClassLayout, 2, 5).unwrap().unwrap();
        assert_eq!(found.row, 2);
        assert!(image.find_row(TableId::ClassLayout, 2, 7).unwrap().is_none());
    }

    #[test]
    fn test_find_range_walks_ties() {
        let mut image = MetadataImage::new();
        // MethodSemantics sorted on column 2 (Association).
        let keys = [1u32, 4, 4, 4, 9];
        for key in keys {
            let cursor = image.append_row(TableId::MethodSemantics).unwrap();
            let table = image.table_mut(TableId::MethodSemantics).unwrap();
            table.set(cursor.row, 2, key).unwrap();
        }
        let range = image
            .find_range(TableId::MethodSemantics, 2, 4)
            .unwrap()
            .unwrap();
        assert_eq!((range.start, range.count), (2, 3));
    }
}
