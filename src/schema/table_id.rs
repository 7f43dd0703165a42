//! Metadata table kind ids (ECMA-335 II.22 plus Portable PDB).

use crate::error::{Error, Result};
use std::fmt;

/// Metadata table kinds.
///
/// Covers the ECMA-335 tables 0x00-0x2C (including the `*Ptr` indirection
/// tables and the EnC log/map) and the Portable PDB tables 0x30-0x37.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
    // Portable PDB extension
    Document = 0x30,
    MethodDebugInformation = 0x31,
    LocalScope = 0x32,
    LocalVariable = 0x33,
    LocalConstant = 0x34,
    ImportScope = 0x35,
    StateMachineMethod = 0x36,
    CustomDebugInformation = 0x37,
}

impl TableId {
    /// All recognized table kinds, in id order.
    pub const ALL: &'static [TableId] = &[
        Self::Module,
        Self::TypeRef,
        Self::TypeDef,
        Self::FieldPtr,
        Self::Field,
        Self::MethodPtr,
        Self::MethodDef,
        Self::ParamPtr,
        Self::Param,
        Self::InterfaceImpl,
        Self::MemberRef,
        Self::Constant,
        Self::CustomAttribute,
        Self::FieldMarshal,
        Self::DeclSecurity,
        Self::ClassLayout,
        Self::FieldLayout,
        Self::StandAloneSig,
        Self::EventMap,
        Self::EventPtr,
        Self::Event,
        Self::PropertyMap,
        Self::PropertyPtr,
        Self::Property,
        Self::MethodSemantics,
        Self::MethodImpl,
        Self::ModuleRef,
        Self::TypeSpec,
        Self::ImplMap,
        Self::FieldRva,
        Self::EncLog,
        Self::EncMap,
        Self::Assembly,
        Self::AssemblyProcessor,
        Self::AssemblyOs,
        Self::AssemblyRef,
        Self::AssemblyRefProcessor,
        Self::AssemblyRefOs,
        Self::File,
        Self::ExportedType,
        Self::ManifestResource,
        Self::NestedClass,
        Self::GenericParam,
        Self::MethodSpec,
        Self::GenericParamConstraint,
        Self::Document,
        Self::MethodDebugInformation,
        Self::LocalScope,
        Self::LocalVariable,
        Self::LocalConstant,
        Self::ImportScope,
        Self::StateMachineMethod,
        Self::CustomDebugInformation,
    ];

    /// Convert a raw table id byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|&t| t as u8 == value)
            .ok_or(Error::InvalidTableId(value))
    }

    /// Human-readable table name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Module => "Module",
            Self::TypeRef => "TypeRef",
            Self::TypeDef => "TypeDef",
            Self::FieldPtr => "FieldPtr",
            Self::Field => "Field",
            Self::MethodPtr => "MethodPtr",
            Self::MethodDef => "MethodDef",
            Self::ParamPtr => "ParamPtr",
            Self::Param => "Param",
            Self::InterfaceImpl => "InterfaceImpl",
            Self::MemberRef => "MemberRef",
            Self::Constant => "Constant",
            Self::CustomAttribute => "CustomAttribute",
            Self::FieldMarshal => "FieldMarshal",
            Self::DeclSecurity => "DeclSecurity",
            Self::ClassLayout => "ClassLayout",
            Self::FieldLayout => "FieldLayout",
            Self::StandAloneSig => "StandAloneSig",
            Self::EventMap => "EventMap",
            Self::EventPtr => "EventPtr",
            Self::Event => "Event",
            Self::PropertyMap => "PropertyMap",
            Self::PropertyPtr => "PropertyPtr",
            Self::Property => "Property",
            Self::MethodSemantics => "MethodSemantics",
            Self::MethodImpl => "MethodImpl",
            Self::ModuleRef => "ModuleRef",
            Self::TypeSpec => "TypeSpec",
            Self::ImplMap => "ImplMap",
            Self::FieldRva => "FieldRva",
            Self::EncLog => "EncLog",
            Self::EncMap => "EncMap",
            Self::Assembly => "Assembly",
            Self::AssemblyProcessor => "AssemblyProcessor",
            Self::AssemblyOs => "AssemblyOs",
            Self::AssemblyRef => "AssemblyRef",
            Self::AssemblyRefProcessor => "AssemblyRefProcessor",
            Self::AssemblyRefOs => "AssemblyRefOs",
            Self::File => "File",
            Self::ExportedType => "ExportedType",
            Self::ManifestResource => "ManifestResource",
            Self::NestedClass => "NestedClass",
            Self::GenericParam => "GenericParam",
            Self::MethodSpec => "MethodSpec",
            Self::GenericParamConstraint => "GenericParamConstraint",
            Self::Document => "Document",
            Self::MethodDebugInformation => "MethodDebugInformation",
            Self::LocalScope => "LocalScope",
            Self::LocalVariable => "LocalVariable",
            Self::LocalConstant => "LocalConstant",
            Self::ImportScope => "ImportScope",
            Self::StateMachineMethod => "StateMachineMethod",
            Self::CustomDebugInformation => "CustomDebugInformation",
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_round_trip() {
        for &t in TableId::ALL {
            assert_eq!(TableId::from_u8(t as u8).unwrap(), t);
        }
    }

    #[test]
    fn test_from_u8_rejects_gaps() {
        assert!(TableId::from_u8(0x2D).is_err());
        assert!(TableId::from_u8(0x2F).is_err());
        assert!(TableId::from_u8(0x38).is_err());
    }
}
