//! Published registers (§4.8): per-stream indexed mirrors of the type,
//! static-cast, conversion-operation, URI-scheme, and create-action
//! catalogs. Entries are written opportunistically before first reference
//! and read back by index, the way `xdr::nfs3`'s type catalogs work (fixed
//! numeric UIDs rather than names on the wire).

use std::collections::HashMap;

use crate::wire::codec::{Deserialize, Serialize};
use crate::{DeserializeStruct, SerializeStruct};

/// A value-constant of an enum type register entry (name + optional
/// explicit value, matching `tRemoteType`'s enum constant list).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub value: Option<i64>,
}

impl Serialize for EnumConstant {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.name.clone().serialize(dest)?;
        self.value.is_some().serialize(dest)?;
        if let Some(v) = self.value {
            v.serialize(dest)?;
        }
        Ok(())
    }
}
impl Deserialize for EnumConstant {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.name.deserialize(src)?;
        let mut has_value = false;
        has_value.deserialize(src)?;
        self.value = if has_value {
            let mut v = 0i64;
            v.deserialize(src)?;
            Some(v)
        } else {
            None
        };
        Ok(())
    }
}

/// Register kind 0: a named data type, its underlying representation and
/// (for container types) element type, and, for enums, the constant list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeRegisterEntry {
    pub name: String,
    pub underlying_type: String,
    pub element_type: Option<String>,
    pub enum_constants: Vec<EnumConstant>,
}

impl Serialize for TypeRegisterEntry {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.name.clone().serialize(dest)?;
        self.underlying_type.clone().serialize(dest)?;
        self.element_type.clone().unwrap_or_default().serialize(dest)?;
        self.enum_constants.serialize(dest)
    }
}
impl Deserialize for TypeRegisterEntry {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.name.deserialize(src)?;
        self.underlying_type.deserialize(src)?;
        let mut element_type = String::new();
        element_type.deserialize(src)?;
        self.element_type = if element_type.is_empty() { None } else { Some(element_type) };
        self.enum_constants.deserialize(src)
    }
}

/// Register kind 1: a static-cast entry between two named types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticCastRegisterEntry {
    pub source_type: String,
    pub destination_type: String,
}
DeserializeStruct!(StaticCastRegisterEntry, source_type, destination_type);
SerializeStruct!(StaticCastRegisterEntry, source_type, destination_type);

/// Register kind 2: a conversion operation, named, with the source/
/// destination type filters it supports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversionOperationRegisterEntry {
    pub name: String,
    pub supported_source_types: Vec<String>,
    pub supported_destination_types: Vec<String>,
}
DeserializeStruct!(
    ConversionOperationRegisterEntry,
    name,
    supported_source_types,
    supported_destination_types
);
SerializeStruct!(
    ConversionOperationRegisterEntry,
    name,
    supported_source_types,
    supported_destination_types
);

/// Register kind 3: a URI scheme handler name (the authority/path shape is
/// parsed by the embedder's scheme handler, not by this crate).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriSchemeRegisterEntry {
    pub scheme: String,
}
DeserializeStruct!(UriSchemeRegisterEntry, scheme);
SerializeStruct!(UriSchemeRegisterEntry, scheme);

/// Register kind 4: a create-action entry (what a peer's CONNECT_PORTS-style
/// request may ask the host to instantiate on demand).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateActionRegisterEntry {
    pub name: String,
    pub result_type: String,
}
DeserializeStruct!(CreateActionRegisterEntry, name, result_type);
SerializeStruct!(CreateActionRegisterEntry, name, result_type);

/// One peer-stream's mirror of all five register kinds, indexed by the UID
/// the peer assigned when it first published the entry.
#[derive(Debug, Default)]
pub struct RegisterTables {
    pub types: HashMap<u32, TypeRegisterEntry>,
    pub static_casts: HashMap<u32, StaticCastRegisterEntry>,
    pub conversion_operations: HashMap<u32, ConversionOperationRegisterEntry>,
    pub uri_schemes: HashMap<u32, UriSchemeRegisterEntry>,
    pub create_actions: HashMap<u32, CreateActionRegisterEntry>,
}

impl RegisterTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_entry(&self, index: u32) -> Option<&TypeRegisterEntry> {
        self.types.get(&index)
    }

    pub fn insert_type(&mut self, index: u32, entry: TypeRegisterEntry) {
        self.types.insert(index, entry);
    }

    pub fn insert_static_cast(&mut self, index: u32, entry: StaticCastRegisterEntry) {
        self.static_casts.insert(index, entry);
    }

    pub fn insert_conversion_operation(&mut self, index: u32, entry: ConversionOperationRegisterEntry) {
        self.conversion_operations.insert(index, entry);
    }

    pub fn insert_uri_scheme(&mut self, index: u32, entry: UriSchemeRegisterEntry) {
        self.uri_schemes.insert(index, entry);
    }

    pub fn insert_create_action(&mut self, index: u32, entry: CreateActionRegisterEntry) {
        self.create_actions.insert(index, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn type_register_entry_round_trips_with_enum_constants() {
        let entry = TypeRegisterEntry {
            name: "Status".into(),
            underlying_type: "i32".into(),
            element_type: None,
            enum_constants: vec![
                EnumConstant { name: "Ok".into(), value: Some(0) },
                EnumConstant { name: "Err".into(), value: None },
            ],
        };
        let mut buf = Vec::new();
        entry.serialize(&mut buf).unwrap();
        let mut back = TypeRegisterEntry::default();
        back.deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn register_tables_track_entries_by_uid() {
        let mut tables = RegisterTables::new();
        tables.insert_type(3, TypeRegisterEntry { name: "Vec3".into(), ..Default::default() });
        assert_eq!(tables.type_entry(3).unwrap().name, "Vec3");
        assert!(tables.type_entry(4).is_none());
    }
}
