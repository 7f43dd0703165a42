//! Coded (tagged-union) index maps for metadata tables.

use crate::error::{Error, Result};
use crate::schema::TableId;

/// Kinds of coded indices used in metadata tables.
///
/// Each kind declares a closed, ordered candidate table list; the position of
/// a table in that list is the tag packed into the low bits of the stored
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedIndexKind {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
    /// Portable PDB only.
    HasCustomDebugInformation,
}

impl CodedIndexKind {
    /// Get the number of tag bits for this coded index kind.
    ///
    /// Fixed per map: `ceil(log2(candidate_count))`.
    #[must_use]
    pub const fn tag_bits(self) -> u8 {
        match self {
            Self::TypeDefOrRef => 2,
            Self::HasConstant => 2,
            Self::HasCustomAttribute => 5,
            Self::HasFieldMarshal => 1,
            Self::HasDeclSecurity => 2,
            Self::MemberRefParent => 3,
            Self::HasSemantics => 1,
            Self::MethodDefOrRef => 1,
            Self::MemberForwarded => 1,
            Self::Implementation => 2,
            Self::CustomAttributeType => 3,
            Self::ResolutionScope => 2,
            Self::TypeOrMethodDef => 1,
            Self::HasCustomDebugInformation => 5,
        }
    }

    /// Get the tables that can be referenced by this coded index kind.
    ///
    /// `None` entries are tag values reserved by the specification.
    #[must_use]
    pub const fn tables(self) -> &'static [Option<TableId>] {
        match self {
            Self::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            Self::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            Self::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            Self::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            Self::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            Self::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            Self::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            Self::MethodDefOrRef => &[Some(TableId::MethodDef), Some(TableId::MemberRef)],
            Self::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            Self::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            Self::CustomAttributeType => &[
                None, // Not used
                None, // Not used
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None, // Not used
            ],
            Self::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            Self::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
            Self::HasCustomDebugInformation => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
                Some(TableId::Document),
                Some(TableId::LocalScope),
                Some(TableId::LocalVariable),
                Some(TableId::LocalConstant),
                Some(TableId::ImportScope),
            ],
        }
    }

    /// Get the maximum number of rows that can use a 2-byte index.
    #[must_use]
    pub const fn max_small_rows(self) -> u32 {
        1u32 << (16 - self.tag_bits())
    }

    /// Name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TypeDefOrRef => "TypeDefOrRef",
            Self::HasConstant => "HasConstant",
            Self::HasCustomAttribute => "HasCustomAttribute",
            Self::HasFieldMarshal => "HasFieldMarshal",
            Self::HasDeclSecurity => "HasDeclSecurity",
            Self::MemberRefParent => "MemberRefParent",
            Self::HasSemantics => "HasSemantics",
            Self::MethodDefOrRef => "MethodDefOrRef",
            Self::MemberForwarded => "MemberForwarded",
            Self::Implementation => "Implementation",
            Self::CustomAttributeType => "CustomAttributeType",
            Self::ResolutionScope => "ResolutionScope",
            Self::TypeOrMethodDef => "TypeOrMethodDef",
            Self::HasCustomDebugInformation => "HasCustomDebugInformation",
        }
    }

    /// Compose a packed coded value `(rid << tag_bits) | tag` from a target
    /// table and rid.
    ///
    /// Fails if the table is not one of this kind's candidates.
    pub fn compose(self, table: TableId, rid: u32) -> Result<u32> {
        let tag = self
            .tables()
            .iter()
            .position(|&t| t == Some(table))
            .ok_or(Error::CodedIndexTarget {
                kind: self.name(),
                table,
            })? as u32;
        Ok((rid << self.tag_bits()) | tag)
    }

    /// Decompose a packed coded value into `(table, rid)`.
    ///
    /// Zero is the null reference regardless of what tag 0 names. Fails if
    /// the tag exceeds the candidate count or names a reserved slot.
    pub fn decompose(self, value: u32) -> Result<(Option<TableId>, u32)> {
        if value == 0 {
            return Ok((None, 0));
        }
        let tag_bits = self.tag_bits();
        let tag = (value & ((1u32 << tag_bits) - 1)) as usize;
        let rid = value >> tag_bits;

        match self.tables().get(tag) {
            Some(&Some(table)) => Ok((Some(table), rid)),
            _ => Err(Error::InvalidCodedIndex {
                kind: self.name(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: &[CodedIndexKind] = &[
        CodedIndexKind::TypeDefOrRef,
        CodedIndexKind::HasConstant,
        CodedIndexKind::HasCustomAttribute,
        CodedIndexKind::HasFieldMarshal,
        CodedIndexKind::HasDeclSecurity,
        CodedIndexKind::MemberRefParent,
        CodedIndexKind::HasSemantics,
        CodedIndexKind::MethodDefOrRef,
        CodedIndexKind::MemberForwarded,
        CodedIndexKind::Implementation,
        CodedIndexKind::CustomAttributeType,
        CodedIndexKind::ResolutionScope,
        CodedIndexKind::TypeOrMethodDef,
        CodedIndexKind::HasCustomDebugInformation,
    ];

    #[test]
    fn test_tag_bits_cover_candidates() {
        for &kind in ALL_KINDS {
            assert!(
                kind.tables().len() <= (1 << kind.tag_bits()),
                "{} candidates do not fit its tag width",
                kind.name()
            );
        }
    }

    #[test]
    fn test_compose_decompose_round_trip() {
        for &kind in ALL_KINDS {
            for table in kind.tables().iter().copied().flatten() {
                for rid in [1u32, 2, 0xFFFF, 0xFF_FFFF] {
                    let value = kind.compose(table, rid).unwrap();
                    assert_eq!(kind.decompose(value).unwrap(), (Some(table), rid));
                }
            }
        }
    }

    #[test]
    fn test_compose_rejects_non_candidate() {
        assert!(
            CodedIndexKind::HasConstant
                .compose(TableId::TypeDef, 1)
                .is_err()
        );
    }

    #[test]
    fn test_decompose_rejects_reserved_tag() {
        // CustomAttributeType tag 4 is reserved.
        let bad = (5u32 << CodedIndexKind::CustomAttributeType.tag_bits()) | 4;
        assert!(CodedIndexKind::CustomAttributeType.decompose(bad).is_err());
    }

    #[test]
    fn test_nil_decomposes_to_null() {
        for &kind in ALL_KINDS {
            assert_eq!(kind.decompose(0).unwrap(), (None, 0));
        }
    }
}
