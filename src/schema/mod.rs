//! Schema registry: table kinds, coded-index maps, column layouts, and the
//! static side tables (sort keys, list columns, indirection pairs) that drive
//! the cursor engine and the editor.

mod coded;
mod layout;
mod table_id;

pub use coded::CodedIndexKind;
pub use layout::{ColumnDesc, ColumnKind, LayoutCtx, TableLayout, column_kinds};
pub use table_id::TableId;

/// Tables the ECMA-335/Portable-PDB specifications require to be sorted, with
/// the column index of the primary sort key.
///
/// Heap-backed columns are never sort keys; every key below is a simple or
/// coded index column.
#[must_use]
pub fn sort_key(table: TableId) -> Option<usize> {
    match table {
        TableId::InterfaceImpl => Some(0),
        TableId::Constant => Some(1),
        TableId::CustomAttribute => Some(0),
        TableId::FieldMarshal => Some(0),
        TableId::DeclSecurity => Some(1),
        TableId::ClassLayout => Some(2),
        TableId::FieldLayout => Some(1),
        TableId::MethodSemantics => Some(2),
        TableId::MethodImpl => Some(0),
        TableId::ImplMap => Some(1),
        TableId::FieldRva => Some(1),
        TableId::NestedClass => Some(0),
        TableId::GenericParam => Some(2),
        TableId::GenericParamConstraint => Some(0),
        TableId::LocalScope => Some(0),
        TableId::StateMachineMethod => Some(0),
        _ => None,
    }
}

/// List-start columns: `(column index, child table)` pairs for owner tables
/// whose columns mark the start of a child row range.
#[must_use]
pub fn list_columns(table: TableId) -> &'static [(usize, TableId)] {
    match table {
        TableId::TypeDef => &[(4, TableId::Field), (5, TableId::MethodDef)],
        TableId::MethodDef => &[(5, TableId::Param)],
        TableId::EventMap => &[(1, TableId::Event)],
        TableId::PropertyMap => &[(1, TableId::Property)],
        TableId::LocalScope => &[(2, TableId::LocalVariable), (3, TableId::LocalConstant)],
        _ => &[],
    }
}

/// The owner table and list column for a child table kind, if any.
#[must_use]
pub fn list_owner(child: TableId) -> Option<(TableId, usize)> {
    match child {
        TableId::Field => Some((TableId::TypeDef, 4)),
        TableId::MethodDef => Some((TableId::TypeDef, 5)),
        TableId::Param => Some((TableId::MethodDef, 5)),
        TableId::Event => Some((TableId::EventMap, 1)),
        TableId::Property => Some((TableId::PropertyMap, 1)),
        TableId::LocalVariable => Some((TableId::LocalScope, 2)),
        TableId::LocalConstant => Some((TableId::LocalScope, 3)),
        _ => None,
    }
}

/// The indirection (pointer) table for a child table kind, if the format
/// defines one. Only the five ECMA kinds targeted by sorted list-start
/// columns have pointer tables.
#[must_use]
pub fn ptr_table(child: TableId) -> Option<TableId> {
    match child {
        TableId::Field => Some(TableId::FieldPtr),
        TableId::MethodDef => Some(TableId::MethodPtr),
        TableId::Param => Some(TableId::ParamPtr),
        TableId::Event => Some(TableId::EventPtr),
        TableId::Property => Some(TableId::PropertyPtr),
        _ => None,
    }
}

/// Inverse of [`ptr_table`]: the real table a pointer table redirects to.
#[must_use]
pub fn ptr_target(ptr: TableId) -> Option<TableId> {
    match ptr {
        TableId::FieldPtr => Some(TableId::Field),
        TableId::MethodPtr => Some(TableId::MethodDef),
        TableId::ParamPtr => Some(TableId::Param),
        TableId::EventPtr => Some(TableId::Event),
        TableId::PropertyPtr => Some(TableId::Property),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_keys_are_never_heap_columns() {
        for &t in TableId::ALL {
            if let Some(col) = sort_key(t) {
                let kind = column_kinds(t)[col];
                assert!(
                    matches!(kind, ColumnKind::Index(_) | ColumnKind::Coded(_)),
                    "{t} sort key column {col} is heap-backed"
                );
            }
        }
    }

    #[test]
    fn test_list_columns_point_at_declared_child() {
        for &t in TableId::ALL {
            for &(col, child) in list_columns(t) {
                assert_eq!(column_kinds(t)[col], ColumnKind::Index(child));
            }
        }
    }

    #[test]
    fn test_list_owner_is_inverse_of_list_columns() {
        for &t in TableId::ALL {
            for &(col, child) in list_columns(t) {
                assert_eq!(list_owner(child), Some((t, col)));
            }
        }
    }

    #[test]
    fn test_ptr_pairs_are_inverse() {
        for &t in TableId::ALL {
            if let Some(ptr) = ptr_table(t) {
                assert_eq!(ptr_target(ptr), Some(t));
                // A pointer table is a single index column at the child.
                assert_eq!(column_kinds(ptr), &[ColumnKind::Index(t)]);
            }
        }
    }
}
