//! VM configuration store
//!
//! The host describes its own layout once, at startup: C++ field offsets and
//! static addresses, integer constants, absolute addresses of runtime stubs,
//! command-line flags and intrinsic descriptors. [`VmConfigStore`] freezes
//! that bundle and answers lookups by name. A missing name means the
//! interface and the host were built from different versions, so every
//! lookup failure is a fatal [`JvmciError::MissingConfig`].

mod hotspot;

pub use hotspot::HotSpotVmConfig;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{JvmciError, JvmciResult};

/// A C++ field exported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmField {
    /// Qualified name, e.g. `ConstantPool::_tags`
    pub name: String,
    /// C++ type name, e.g. `Array<u1>*`
    pub type_name: String,
    /// Offset within the holder (instance fields)
    pub offset: i64,
    /// Absolute address (static fields), zero for instance fields
    pub address: u64,
    /// Current value of a static field, if the host exported it
    pub value: Option<i64>,
}

impl VmField {
    /// Whether this is a static field
    pub fn is_static(&self) -> bool {
        self.address != 0
    }
}

/// Typed value of a VM flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// `bool` flags
    Bool(bool),
    /// `intx`, `uintx`, `size_t` and friends
    Int(i64),
    /// `double` flags
    Double(f64),
    /// `ccstr` flags; `None` when unset
    Str(Option<String>),
}

/// A command-line flag exported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmFlag {
    /// Flag name, e.g. `UseCompressedOops`
    pub name: String,
    /// Declared C++ type of the flag
    pub type_name: String,
    /// Value at snapshot time
    pub value: FlagValue,
}

/// An intrinsic method known to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmIntrinsic {
    /// Internal name of the declaring class
    pub declaring_class: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Host intrinsic id
    pub id: i32,
}

/// Raw configuration as delivered by the host in one bulk read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfigBundle {
    /// Exported fields
    pub fields: Vec<VmField>,
    /// Named integer constants
    pub constants: Vec<(String, i64)>,
    /// Named absolute addresses
    pub addresses: Vec<(String, u64)>,
    /// Flags
    pub flags: Vec<VmFlag>,
    /// Intrinsic descriptors
    pub intrinsics: Vec<VmIntrinsic>,
    /// Saved system properties (`os.arch`, `os.name`, ...)
    pub properties: Vec<(String, String)>,
}

/// Immutable, name-indexed view over a [`VmConfigBundle`]
///
/// Read-only after construction; shared across compiler threads without
/// locking.
#[derive(Debug, Clone, Serialize)]
pub struct VmConfigStore {
    fields: BTreeMap<String, VmField>,
    constants: BTreeMap<String, i64>,
    addresses: BTreeMap<String, u64>,
    flags: BTreeMap<String, VmFlag>,
    intrinsics: Vec<VmIntrinsic>,
    properties: BTreeMap<String, String>,
}

impl VmConfigStore {
    /// Freeze a bundle. Later duplicates of the same name win.
    pub fn new(bundle: VmConfigBundle) -> Self {
        VmConfigStore {
            fields: bundle.fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
            constants: bundle.constants.into_iter().collect(),
            addresses: bundle.addresses.into_iter().collect(),
            flags: bundle.flags.into_iter().map(|f| (f.name.clone(), f)).collect(),
            intrinsics: bundle.intrinsics,
            properties: bundle.properties.into_iter().collect(),
        }
    }

    /// Look up a field description
    pub fn field(&self, name: &str) -> JvmciResult<&VmField> {
        self.fields.get(name).ok_or_else(|| JvmciError::missing_field(name))
    }

    /// Offset of an instance field
    pub fn field_offset(&self, name: &str) -> JvmciResult<i64> {
        Ok(self.field(name)?.offset)
    }

    /// Offset of an instance field whose declared C++ type must be `cpp_type`
    pub fn field_offset_typed(&self, name: &str, cpp_type: &str) -> JvmciResult<i64> {
        let field = self.field(name)?;
        if field.type_name != cpp_type {
            return Err(JvmciError::ConfigTypeMismatch {
                name: name.to_string(),
                expected: cpp_type.to_string(),
                actual: field.type_name.clone(),
            });
        }
        Ok(field.offset)
    }

    /// Address of a static field
    pub fn field_address(&self, name: &str) -> JvmciResult<u64> {
        let field = self.field(name)?;
        if !field.is_static() {
            return Err(JvmciError::ConfigTypeMismatch {
                name: name.to_string(),
                expected: "static field".to_string(),
                actual: "instance field".to_string(),
            });
        }
        Ok(field.address)
    }

    /// Exported value of a static field
    pub fn field_value(&self, name: &str) -> JvmciResult<i64> {
        self.field(name)?.value.ok_or_else(|| JvmciError::missing_field(name))
    }

    /// Integer constant
    pub fn constant(&self, name: &str) -> JvmciResult<i64> {
        self.constants.get(name).copied().ok_or_else(|| JvmciError::missing_constant(name))
    }

    /// Integer constant with a fallback for entries absent in older hosts
    pub fn constant_or(&self, name: &str, default: i64) -> i64 {
        self.constants.get(name).copied().unwrap_or(default)
    }

    /// Absolute address
    pub fn address(&self, name: &str) -> JvmciResult<u64> {
        self.addresses.get(name).copied().ok_or_else(|| JvmciError::missing_address(name))
    }

    /// Raw flag value
    pub fn flag(&self, name: &str) -> JvmciResult<&FlagValue> {
        self.flags.get(name).map(|f| &f.value).ok_or_else(|| JvmciError::missing_flag(name))
    }

    /// Boolean flag
    pub fn flag_bool(&self, name: &str) -> JvmciResult<bool> {
        match self.flag(name)? {
            FlagValue::Bool(b) => Ok(*b),
            other => Err(self.flag_mismatch(name, "bool", other)),
        }
    }

    /// Boolean flag with a fallback
    pub fn flag_bool_or(&self, name: &str, default: bool) -> bool {
        match self.flags.get(name).map(|f| &f.value) {
            Some(FlagValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// Integer flag
    pub fn flag_int(&self, name: &str) -> JvmciResult<i64> {
        match self.flag(name)? {
            FlagValue::Int(v) => Ok(*v),
            other => Err(self.flag_mismatch(name, "intx", other)),
        }
    }

    /// Saved system property
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Intrinsic descriptors
    pub fn intrinsics(&self) -> &[VmIntrinsic] {
        &self.intrinsics
    }

    fn flag_mismatch(&self, name: &str, expected: &str, actual: &FlagValue) -> JvmciError {
        let actual = match actual {
            FlagValue::Bool(_) => "bool",
            FlagValue::Int(_) => "intx",
            FlagValue::Double(_) => "double",
            FlagValue::Str(_) => "ccstr",
        };
        JvmciError::ConfigTypeMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Human-readable listing of every entry, sorted by name within each section
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[vmconfig:fields]");
        for (name, field) in &self.fields {
            if field.is_static() {
                let value = field.value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
                let _ = writeln!(out, "{name} {} = {value} @ {:#x}", field.type_name, field.address);
            } else {
                let _ = writeln!(out, "{name} {} @ {}", field.type_name, field.offset);
            }
        }
        let _ = writeln!(out, "[vmconfig:constants]");
        for (name, value) in &self.constants {
            let _ = writeln!(out, "{name} = {value}");
        }
        let _ = writeln!(out, "[vmconfig:addresses]");
        for (name, value) in &self.addresses {
            let _ = writeln!(out, "{name} = {value:#x}");
        }
        let _ = writeln!(out, "[vmconfig:flags]");
        for (name, flag) in &self.flags {
            let _ = writeln!(out, "{name} {} = {:?}", flag.type_name, flag.value);
        }
        let _ = writeln!(out, "[vmconfig:intrinsics]");
        let mut intrinsics: Vec<_> = self.intrinsics.iter().collect();
        intrinsics.sort_by(|a, b| (&a.declaring_class, &a.name).cmp(&(&b.declaring_class, &b.name)));
        for i in intrinsics {
            let _ = writeln!(out, "{}.{}{} = {}", i.declaring_class, i.name, i.descriptor, i.id);
        }
        out
    }

    /// JSON rendering of the store, for diffing across host builds
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> VmConfigBundle {
        VmConfigBundle {
            fields: vec![
                VmField {
                    name: "Symbol::_length".into(),
                    type_name: "u2".into(),
                    offset: 0,
                    address: 0,
                    value: None,
                },
                VmField {
                    name: "CompilerToVM::Data::cardtable_shift".into(),
                    type_name: "int".into(),
                    offset: 0,
                    address: 0x7000,
                    value: Some(9),
                },
            ],
            constants: vec![("JVM_CONSTANT_Utf8".into(), 1)],
            addresses: vec![("SharedRuntime::deopt_blob_unpack".into(), 0xdead_0000)],
            flags: vec![
                VmFlag { name: "UseCompressedOops".into(), type_name: "bool".into(), value: FlagValue::Bool(true) },
                VmFlag { name: "CodeEntryAlignment".into(), type_name: "intx".into(), value: FlagValue::Int(32) },
            ],
            intrinsics: vec![VmIntrinsic {
                declaring_class: "java/lang/Math".into(),
                name: "sqrt".into(),
                descriptor: "(D)D".into(),
                id: 17,
            }],
            properties: vec![("os.arch".into(), "amd64".into())],
        }
    }

    #[test]
    fn test_lookups() {
        let store = VmConfigStore::new(bundle());
        assert_eq!(store.field_offset("Symbol::_length").unwrap(), 0);
        assert_eq!(store.field_offset_typed("Symbol::_length", "u2").unwrap(), 0);
        assert_eq!(store.field_address("CompilerToVM::Data::cardtable_shift").unwrap(), 0x7000);
        assert_eq!(store.field_value("CompilerToVM::Data::cardtable_shift").unwrap(), 9);
        assert_eq!(store.constant("JVM_CONSTANT_Utf8").unwrap(), 1);
        assert_eq!(store.address("SharedRuntime::deopt_blob_unpack").unwrap(), 0xdead_0000);
        assert!(store.flag_bool("UseCompressedOops").unwrap());
        assert_eq!(store.flag_int("CodeEntryAlignment").unwrap(), 32);
        assert_eq!(store.property("os.arch"), Some("amd64"));
        assert_eq!(store.intrinsics().len(), 1);
    }

    #[test]
    fn test_missing_entries_are_fatal() {
        let store = VmConfigStore::new(bundle());
        let err = store.constant("JVM_CONSTANT_Nope").unwrap_err();
        assert!(err.is_fatal());
        assert!(store.field_offset("Klass::_nope").unwrap_err().is_fatal());
        assert!(store.address("nope").unwrap_err().is_fatal());
        assert!(store.flag("Nope").unwrap_err().is_fatal());
        assert_eq!(store.constant_or("JVM_CONSTANT_Nope", 5), 5);
    }

    #[test]
    fn test_type_mismatches() {
        let store = VmConfigStore::new(bundle());
        assert!(matches!(
            store.field_offset_typed("Symbol::_length", "int"),
            Err(JvmciError::ConfigTypeMismatch { .. })
        ));
        assert!(store.field_address("Symbol::_length").is_err());
        assert!(store.flag_int("UseCompressedOops").is_err());
        assert!(store.flag_bool_or("CodeEntryAlignment", false) == false);
    }

    #[test]
    fn test_dump_is_sorted() {
        let mut b = bundle();
        b.constants.push(("AAA".into(), 3));
        let dump = VmConfigStore::new(b).dump();
        let aaa = dump.find("AAA = 3").unwrap();
        let utf8 = dump.find("JVM_CONSTANT_Utf8 = 1").unwrap();
        assert!(aaa < utf8);
        assert!(dump.contains("java/lang/Math.sqrt(D)D = 17"));
    }

    #[test]
    fn test_json_dump() {
        let json = VmConfigStore::new(bundle()).to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["constants"]["JVM_CONSTANT_Utf8"], 1);
        assert_eq!(parsed["flags"]["UseCompressedOops"]["value"], true);
    }
}
