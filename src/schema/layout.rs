//! Column layout derivation for metadata tables.
//!
//! For every table kind the registry declares the semantic kind of each
//! column; the storage width (2 or 4 bytes) and byte offset are derived from
//! the current row counts and heap sizes. The derivation is re-invocable: the
//! editor calls it again whenever a row count or heap size crosses the
//! 2-byte/4-byte boundary.

use crate::error::{Error, Result};
use crate::heaps::HeapKind;
use crate::schema::{CodedIndexKind, TableId};

/// Semantic kind of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Fixed-width constant data (width in bytes: 2 or 4).
    Fixed(u8),
    /// Simple 1-based index into one other table.
    Index(TableId),
    /// Coded (tagged) index into one of several tables.
    Coded(CodedIndexKind),
    /// Offset into the #Strings heap.
    Str,
    /// Offset into the #Blob heap.
    Blob,
    /// 1-based index into the #GUID heap.
    Guid,
}

impl ColumnKind {
    /// The heap this column references, if any.
    #[must_use]
    pub fn heap(self) -> Option<HeapKind> {
        match self {
            Self::Str => Some(HeapKind::String),
            Self::Blob => Some(HeapKind::Blob),
            Self::Guid => Some(HeapKind::Guid),
            _ => None,
        }
    }
}

/// One column's derived storage descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDesc {
    /// Semantic kind.
    pub kind: ColumnKind,
    /// Byte offset within a row.
    pub offset: usize,
    /// Storage width in bytes (2 or 4, or the fixed width).
    pub width: usize,
}

/// A table's full derived layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    /// Per-column descriptors in declaration order.
    pub columns: Vec<ColumnDesc>,
    /// Fixed row byte size (sum of column widths).
    pub row_size: usize,
}

/// Declared column kinds for a table, in physical order.
///
/// Total over all recognized table kinds; the hand-maintained core of the
/// schema registry (ECMA-335 II.22, Portable PDB spec for 0x30-0x37).
pub fn column_kinds(table: TableId) -> &'static [ColumnKind] {
    use ColumnKind::{Blob, Coded, Fixed, Guid, Index, Str};
    match table {
        TableId::Module => &[Fixed(2), Str, Guid, Guid, Guid],
        TableId::TypeRef => &[Coded(CodedIndexKind::ResolutionScope), Str, Str],
        TableId::TypeDef => &[
            Fixed(4),
            Str,
            Str,
            Coded(CodedIndexKind::TypeDefOrRef),
            Index(TableId::Field),
            Index(TableId::MethodDef),
        ],
        TableId::FieldPtr => &[Index(TableId::Field)],
        TableId::Field => &[Fixed(2), Str, Blob],
        TableId::MethodPtr => &[Index(TableId::MethodDef)],
        TableId::MethodDef => &[
            Fixed(4),
            Fixed(2),
            Fixed(2),
            Str,
            Blob,
            Index(TableId::Param),
        ],
        TableId::ParamPtr => &[Index(TableId::Param)],
        TableId::Param => &[Fixed(2), Fixed(2), Str],
        TableId::InterfaceImpl => &[
            Index(TableId::TypeDef),
            Coded(CodedIndexKind::TypeDefOrRef),
        ],
        TableId::MemberRef => &[Coded(CodedIndexKind::MemberRefParent), Str, Blob],
        TableId::Constant => &[Fixed(2), Coded(CodedIndexKind::HasConstant), Blob],
        TableId::CustomAttribute => &[
            Coded(CodedIndexKind::HasCustomAttribute),
            Coded(CodedIndexKind::CustomAttributeType),
            Blob,
        ],
        TableId::FieldMarshal => &[Coded(CodedIndexKind::HasFieldMarshal), Blob],
        TableId::DeclSecurity => &[Fixed(2), Coded(CodedIndexKind::HasDeclSecurity), Blob],
        TableId::ClassLayout => &[Fixed(2), Fixed(4), Index(TableId::TypeDef)],
        TableId::FieldLayout => &[Fixed(4), Index(TableId::Field)],
        TableId::StandAloneSig => &[Blob],
        TableId::EventMap => &[Index(TableId::TypeDef), Index(TableId::Event)],
        TableId::EventPtr => &[Index(TableId::Event)],
        TableId::Event => &[Fixed(2), Str, Coded(CodedIndexKind::TypeDefOrRef)],
        TableId::PropertyMap => &[Index(TableId::TypeDef), Index(TableId::Property)],
        TableId::PropertyPtr => &[Index(TableId::Property)],
        TableId::Property => &[Fixed(2), Str, Blob],
        TableId::MethodSemantics => &[
            Fixed(2),
            Index(TableId::MethodDef),
            Coded(CodedIndexKind::HasSemantics),
        ],
        TableId::MethodImpl => &[
            Index(TableId::TypeDef),
            Coded(CodedIndexKind::MethodDefOrRef),
            Coded(CodedIndexKind::MethodDefOrRef),
        ],
        TableId::ModuleRef => &[Str],
        TableId::TypeSpec => &[Blob],
        TableId::ImplMap => &[
            Fixed(2),
            Coded(CodedIndexKind::MemberForwarded),
            Str,
            Index(TableId::ModuleRef),
        ],
        TableId::FieldRva => &[Fixed(4), Index(TableId::Field)],
        TableId::EncLog => &[Fixed(4), Fixed(4)],
        TableId::EncMap => &[Fixed(4)],
        TableId::Assembly => &[
            Fixed(4),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(4),
            Blob,
            Str,
            Str,
        ],
        TableId::AssemblyProcessor => &[Fixed(4)],
        TableId::AssemblyOs => &[Fixed(4), Fixed(4), Fixed(4)],
        TableId::AssemblyRef => &[
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(4),
            Blob,
            Str,
            Str,
            Blob,
        ],
        TableId::AssemblyRefProcessor => &[Fixed(4), Index(TableId::AssemblyRef)],
        TableId::AssemblyRefOs => &[
            Fixed(4),
            Fixed(4),
            Fixed(4),
            Index(TableId::AssemblyRef),
        ],
        TableId::File => &[Fixed(4), Str, Blob],
        TableId::ExportedType => &[
            Fixed(4),
            Fixed(4),
            Str,
            Str,
            Coded(CodedIndexKind::Implementation),
        ],
        TableId::ManifestResource => &[
            Fixed(4),
            Fixed(4),
            Str,
            Coded(CodedIndexKind::Implementation),
        ],
        TableId::NestedClass => &[Index(TableId::TypeDef), Index(TableId::TypeDef)],
        TableId::GenericParam => &[
            Fixed(2),
            Fixed(2),
            Coded(CodedIndexKind::TypeOrMethodDef),
            Str,
        ],
        TableId::MethodSpec => &[Coded(CodedIndexKind::MethodDefOrRef), Blob],
        TableId::GenericParamConstraint => &[
            Index(TableId::GenericParam),
            Coded(CodedIndexKind::TypeDefOrRef),
        ],
        TableId::Document => &[Blob, Guid, Blob, Guid],
        TableId::MethodDebugInformation => &[Index(TableId::Document), Blob],
        TableId::LocalScope => &[
            Index(TableId::MethodDef),
            Index(TableId::ImportScope),
            Index(TableId::LocalVariable),
            Index(TableId::LocalConstant),
            Fixed(4),
            Fixed(4),
        ],
        TableId::LocalVariable => &[Fixed(2), Fixed(2), Str],
        TableId::LocalConstant => &[Str, Blob],
        TableId::ImportScope => &[Index(TableId::ImportScope), Blob],
        TableId::StateMachineMethod => &[Index(TableId::MethodDef), Index(TableId::MethodDef)],
        TableId::CustomDebugInformation => &[
            Coded(CodedIndexKind::HasCustomDebugInformation),
            Guid,
            Blob,
        ],
    }
}

/// Context for deriving column widths: current row counts, heap size flags,
/// and whether the image is a minimal EnC delta (which forces every
/// variable-width column to 4 bytes, since final row counts are unknown when
/// the delta is authored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutCtx {
    /// HeapSizes byte from the tables header (bits 0/1/2 for wide
    /// #Strings/#GUID/#Blob indices).
    pub heap_sizes: u8,
    /// Row counts for each table, indexed by table id.
    pub row_counts: [u32; 64],
    /// Minimal-delta images always use 4-byte columns.
    pub minimal_delta: bool,
}

impl LayoutCtx {
    /// Create a new layout context.
    #[must_use]
    pub fn new(heap_sizes: u8, row_counts: [u32; 64], minimal_delta: bool) -> Self {
        Self {
            heap_sizes,
            row_counts,
            minimal_delta,
        }
    }

    /// Get the row count for a table.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table as usize]
    }

    fn wide_heap(&self, heap: HeapKind) -> bool {
        let bit = match heap {
            HeapKind::String => 0x01,
            HeapKind::Guid => 0x02,
            HeapKind::Blob => 0x04,
            // #US is never referenced from table columns.
            HeapKind::UserString => return false,
        };
        self.heap_sizes & bit != 0
    }

    fn wide_table_index(&self, table: TableId) -> bool {
        self.row_counts[table as usize] > 0xFFFF
    }

    fn wide_coded_index(&self, kind: CodedIndexKind) -> bool {
        let max_rows = kind.max_small_rows();
        kind.tables()
            .iter()
            .filter_map(|&t| t)
            .any(|t| self.row_counts[t as usize] >= max_rows)
    }

    /// Storage width of one column under this context.
    #[must_use]
    pub fn column_width(&self, kind: ColumnKind) -> usize {
        let wide = match kind {
            ColumnKind::Fixed(n) => return n as usize,
            _ if self.minimal_delta => true,
            ColumnKind::Index(t) => self.wide_table_index(t),
            ColumnKind::Coded(k) => self.wide_coded_index(k),
            ColumnKind::Str => self.wide_heap(HeapKind::String),
            ColumnKind::Blob => self.wide_heap(HeapKind::Blob),
            ColumnKind::Guid => self.wide_heap(HeapKind::Guid),
        };
        if wide { 4 } else { 2 }
    }

    /// Derive the full layout (column widths, offsets, row size) for a table.
    ///
    /// Total over recognized table kinds; fails only for an unrecognized raw
    /// id upstream of this call.
    pub fn describe(&self, table: TableId) -> Result<TableLayout> {
        let kinds = column_kinds(table);
        let mut columns = Vec::with_capacity(kinds.len());
        let mut offset = 0usize;
        for &kind in kinds {
            let width = self.column_width(kind);
            columns.push(ColumnDesc {
                kind,
                offset,
                width,
            });
            offset += width;
        }
        if columns.is_empty() {
            // Every recognized table declares at least one column.
            return Err(Error::InvalidTableId(table as u8));
        }
        Ok(TableLayout {
            columns,
            row_size: offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(heap_sizes: u8) -> LayoutCtx {
        LayoutCtx::new(heap_sizes, [0; 64], false)
    }

    #[test]
    fn test_every_table_has_a_layout() {
        let ctx = ctx(0);
        for &t in TableId::ALL {
            let layout = ctx.describe(t).unwrap();
            assert!(layout.row_size > 0, "{t} has empty layout");
            assert_eq!(
                layout.row_size,
                layout.columns.iter().map(|c| c.width).sum::<usize>()
            );
        }
    }

    #[test]
    fn test_narrow_module_row_size() {
        // generation(2) + name(2) + three guid indices(2 each)
        let layout = ctx(0).describe(TableId::Module).unwrap();
        assert_eq!(layout.row_size, 10);
    }

    #[test]
    fn test_wide_string_heap_widens_module() {
        let layout = ctx(0x01).describe(TableId::Module).unwrap();
        assert_eq!(layout.row_size, 12);
    }

    #[test]
    fn test_table_index_width_follows_row_count() {
        let mut ctx = ctx(0);
        assert_eq!(ctx.column_width(ColumnKind::Index(TableId::Field)), 2);
        ctx.row_counts[TableId::Field as usize] = 0x1_0000;
        assert_eq!(ctx.column_width(ColumnKind::Index(TableId::Field)), 4);
    }

    #[test]
    fn test_coded_index_width_uses_tag_adjusted_limit() {
        let mut ctx = ctx(0);
        let kind = ColumnKind::Coded(CodedIndexKind::TypeDefOrRef);
        // 2 tag bits: the boundary is 2^14 rows, not 2^16.
        ctx.row_counts[TableId::TypeRef as usize] = (1 << 14) - 1;
        assert_eq!(ctx.column_width(kind), 2);
        ctx.row_counts[TableId::TypeRef as usize] = 1 << 14;
        assert_eq!(ctx.column_width(kind), 4);
    }

    #[test]
    fn test_minimal_delta_forces_wide_columns() {
        let ctx = LayoutCtx::new(0, [0; 64], true);
        assert_eq!(ctx.column_width(ColumnKind::Index(TableId::Field)), 4);
        assert_eq!(ctx.column_width(ColumnKind::Str), 4);
        // Fixed columns keep their declared width.
        assert_eq!(ctx.column_width(ColumnKind::Fixed(2)), 2);
    }

    #[test]
    fn test_widening_one_table_affects_other_tables_columns() {
        // FieldLayout's second column indexes Field; growing Field widens it.
        let mut ctx = ctx(0);
        let narrow = ctx.describe(TableId::FieldLayout).unwrap();
        ctx.row_counts[TableId::Field as usize] = 0x1_0001;
        let wide = ctx.describe(TableId::FieldLayout).unwrap();
        assert_eq!(narrow.row_size + 2, wide.row_size);
    }
}
