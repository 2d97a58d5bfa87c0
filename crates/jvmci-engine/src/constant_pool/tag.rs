//! Constant pool tags and their native encoding

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::VmConfigStore;
use crate::error::JvmciResult;

/// Tag of a constant pool entry, including the host's internal states
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ConstantTag {
    /// Unused slot (index 0, second half of a long or double)
    Invalid,
    /// Modified UTF-8 symbol
    Utf8,
    /// `int` literal
    Integer,
    /// `float` literal
    Float,
    /// `long` literal
    Long,
    /// `double` literal
    Double,
    /// Resolved class
    Class,
    /// String literal
    String,
    /// Field reference
    Fieldref,
    /// Class method reference
    Methodref,
    /// Interface method reference
    InterfaceMethodref,
    /// Name and descriptor pair
    NameAndType,
    /// Method handle literal
    MethodHandle,
    /// Method type literal
    MethodType,
    /// Invokedynamic call site specifier
    InvokeDynamic,
    /// Class not yet resolved
    UnresolvedClass,
    /// Class whose resolution failed; the failure is replayed
    UnresolvedClassInError,
    /// Method handle whose resolution failed
    MethodHandleInError,
    /// Method type whose resolution failed
    MethodTypeInError,
}

impl ConstantTag {
    /// Whether entries with this tag take two slots
    pub fn is_two_slot(self) -> bool {
        matches!(self, ConstantTag::Long | ConstantTag::Double)
    }

    /// Whether this tag names a class, resolved or not
    pub fn is_klass(self) -> bool {
        matches!(self, ConstantTag::Class | ConstantTag::UnresolvedClass | ConstantTag::UnresolvedClassInError)
    }

    /// Whether this tag is a member reference
    pub fn is_member_ref(self) -> bool {
        matches!(self, ConstantTag::Fieldref | ConstantTag::Methodref | ConstantTag::InterfaceMethodref)
    }

    const ALL: [(ConstantTag, &'static str); 19] = [
        (ConstantTag::Invalid, "JVM_CONSTANT_Invalid"),
        (ConstantTag::Utf8, "JVM_CONSTANT_Utf8"),
        (ConstantTag::Integer, "JVM_CONSTANT_Integer"),
        (ConstantTag::Float, "JVM_CONSTANT_Float"),
        (ConstantTag::Long, "JVM_CONSTANT_Long"),
        (ConstantTag::Double, "JVM_CONSTANT_Double"),
        (ConstantTag::Class, "JVM_CONSTANT_Class"),
        (ConstantTag::String, "JVM_CONSTANT_String"),
        (ConstantTag::Fieldref, "JVM_CONSTANT_Fieldref"),
        (ConstantTag::Methodref, "JVM_CONSTANT_Methodref"),
        (ConstantTag::InterfaceMethodref, "JVM_CONSTANT_InterfaceMethodref"),
        (ConstantTag::NameAndType, "JVM_CONSTANT_NameAndType"),
        (ConstantTag::MethodHandle, "JVM_CONSTANT_MethodHandle"),
        (ConstantTag::MethodType, "JVM_CONSTANT_MethodType"),
        (ConstantTag::InvokeDynamic, "JVM_CONSTANT_InvokeDynamic"),
        (ConstantTag::UnresolvedClass, "JVM_CONSTANT_UnresolvedClass"),
        (ConstantTag::UnresolvedClassInError, "JVM_CONSTANT_UnresolvedClassInError"),
        (ConstantTag::MethodHandleInError, "JVM_CONSTANT_MethodHandleInError"),
        (ConstantTag::MethodTypeInError, "JVM_CONSTANT_MethodTypeInError"),
    ];

    /// Configuration constant naming each tag's native value
    pub fn config_names() -> impl Iterator<Item = (ConstantTag, &'static str)> {
        Self::ALL.into_iter()
    }

    /// Native value used by the reference host layout
    pub fn default_raw(self) -> u8 {
        match self {
            ConstantTag::Invalid => 0,
            ConstantTag::Utf8 => 1,
            ConstantTag::Integer => 3,
            ConstantTag::Float => 4,
            ConstantTag::Long => 5,
            ConstantTag::Double => 6,
            ConstantTag::Class => 7,
            ConstantTag::String => 8,
            ConstantTag::Fieldref => 9,
            ConstantTag::Methodref => 10,
            ConstantTag::InterfaceMethodref => 11,
            ConstantTag::NameAndType => 12,
            ConstantTag::MethodHandle => 15,
            ConstantTag::MethodType => 16,
            ConstantTag::InvokeDynamic => 18,
            ConstantTag::UnresolvedClass => 100,
            ConstantTag::UnresolvedClassInError => 103,
            ConstantTag::MethodHandleInError => 104,
            ConstantTag::MethodTypeInError => 105,
        }
    }
}

/// Native tag byte to [`ConstantTag`] mapping read from the host
#[derive(Debug, Clone, Serialize)]
pub struct TagTable {
    by_raw: BTreeMap<u8, ConstantTag>,
}

impl TagTable {
    /// Read every `JVM_CONSTANT_*` value from the configuration
    pub fn from_store(store: &VmConfigStore) -> JvmciResult<Self> {
        let mut by_raw = BTreeMap::new();
        for (tag, name) in ConstantTag::config_names() {
            by_raw.insert(store.constant(name)? as u8, tag);
        }
        Ok(TagTable { by_raw })
    }

    /// Table using [`ConstantTag::default_raw`] values
    pub fn with_defaults() -> Self {
        TagTable { by_raw: ConstantTag::config_names().map(|(tag, _)| (tag.default_raw(), tag)).collect() }
    }

    /// Tag for a native byte; unknown values decode as `Invalid`
    pub fn decode(&self, raw: u8) -> ConstantTag {
        self.by_raw.get(&raw).copied().unwrap_or(ConstantTag::Invalid)
    }

    /// Native byte for a tag
    pub fn to_raw(&self, tag: ConstantTag) -> u8 {
        self.by_raw.iter().find(|(_, t)| **t == tag).map(|(raw, _)| *raw).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfigBundle;

    #[test]
    fn test_defaults_round_trip() {
        let table = TagTable::with_defaults();
        for (tag, _) in ConstantTag::config_names() {
            assert_eq!(table.decode(table.to_raw(tag)), tag);
        }
        assert_eq!(table.decode(200), ConstantTag::Invalid);
    }

    #[test]
    fn test_from_store_uses_host_values() {
        let mut bundle = VmConfigBundle::default();
        for (tag, name) in ConstantTag::config_names() {
            let raw = if tag == ConstantTag::UnresolvedClass { 42 } else { tag.default_raw() as i64 };
            bundle.constants.push((name.to_string(), raw));
        }
        let table = TagTable::from_store(&VmConfigStore::new(bundle)).unwrap();
        assert_eq!(table.decode(42), ConstantTag::UnresolvedClass);
        assert_eq!(table.decode(100), ConstantTag::Invalid);
    }

    #[test]
    fn test_missing_tag_constant_is_fatal() {
        let err = TagTable::from_store(&VmConfigStore::new(VmConfigBundle::default())).unwrap_err();
        assert!(err.is_fatal());
    }
}
