//! Resolved and unresolved Java fields

use std::fmt;
use std::sync::Arc;

use super::context::MetadataContext;
use super::handle::FieldPointer;
use super::kind::JavaKind;
use super::signature::descriptor_kind;
use super::types::{HotSpotResolvedObjectType, JavaType};
use super::{ACC_FINAL, ACC_VOLATILE};
use crate::bridge::ResolvedFieldInfo;
use crate::error::JvmciResult;

/// Wrapper for a field of a loaded class
///
/// Fields live inside their holder's metadata, so the wrapper pins nothing
/// of its own.
pub struct HotSpotResolvedJavaField {
    field: FieldPointer,
    info: ResolvedFieldInfo,
    kind: JavaKind,
}

impl HotSpotResolvedJavaField {
    pub(crate) fn new(ctx: &MetadataContext, field: FieldPointer) -> Self {
        let info = ctx.compiler_to_vm().get_field_info(field);
        let kind = descriptor_kind(&info.descriptor);
        HotSpotResolvedJavaField { field, info, kind }
    }

    /// Native handle
    pub fn pointer(&self) -> FieldPointer {
        self.field
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Field descriptor
    pub fn descriptor(&self) -> &str {
        &self.info.descriptor
    }

    /// Value kind
    pub fn kind(&self) -> JavaKind {
        self.kind
    }

    /// Offset within the instance, or within the mirror for statics
    pub fn offset(&self) -> i32 {
        self.info.offset
    }

    /// Access flags
    pub fn modifiers(&self) -> u32 {
        self.info.modifiers
    }

    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.info.is_static()
    }

    /// Whether the field is final
    pub fn is_final(&self) -> bool {
        self.info.modifiers & ACC_FINAL != 0
    }

    /// Whether the field is volatile
    pub fn is_volatile(&self) -> bool {
        self.info.modifiers & ACC_VOLATILE != 0
    }

    /// Declaring class
    pub fn holder(&self, ctx: &MetadataContext) -> Arc<HotSpotResolvedObjectType> {
        ctx.resolved_type(self.info.holder)
    }

    /// Declared type, looked up without loading
    pub fn field_type(&self, ctx: &MetadataContext) -> JvmciResult<JavaType> {
        if self.kind.is_primitive() {
            return Ok(JavaType::Primitive(self.kind));
        }
        let name = self.info.descriptor.strip_prefix('L').and_then(|d| d.strip_suffix(';')).unwrap_or(&self.info.descriptor);
        ctx.lookup_type(name, Some(self.info.holder), false)
    }
}

impl fmt::Debug for HotSpotResolvedJavaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSpotField<{}:{} @{}>", self.info.name, self.info.descriptor, self.info.offset)
    }
}

/// A field referenced symbolically that could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedJavaField {
    /// Declaring type as referenced
    pub holder: JavaType,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// A field as seen by the compiler
#[derive(Debug, Clone)]
pub enum JavaField {
    /// Linked field wrapper
    Resolved(Arc<HotSpotResolvedJavaField>),
    /// Symbolic reference only
    Unresolved(UnresolvedJavaField),
}

impl JavaField {
    /// Field name
    pub fn name(&self) -> &str {
        match self {
            JavaField::Resolved(f) => f.name(),
            JavaField::Unresolved(u) => &u.name,
        }
    }

    /// Value kind, derived from the descriptor
    pub fn kind(&self) -> JavaKind {
        match self {
            JavaField::Resolved(f) => f.kind(),
            JavaField::Unresolved(u) => descriptor_kind(&u.descriptor),
        }
    }

    /// Whether the field is linked
    pub fn is_resolved(&self) -> bool {
        matches!(self, JavaField::Resolved(_))
    }

    /// The wrapper, if linked
    pub fn as_resolved(&self) -> Option<&Arc<HotSpotResolvedJavaField>> {
        match self {
            JavaField::Resolved(f) => Some(f),
            JavaField::Unresolved(_) => None,
        }
    }
}

impl PartialEq for JavaField {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JavaField::Resolved(a), JavaField::Resolved(b)) => Arc::ptr_eq(a, b),
            (JavaField::Unresolved(a), JavaField::Unresolved(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::UnresolvedJavaType;

    #[test]
    fn test_unresolved_field_kind() {
        let f = JavaField::Unresolved(UnresolvedJavaField {
            holder: JavaType::Unresolved(UnresolvedJavaType::new("app/Point")),
            name: "x".into(),
            descriptor: "D".into(),
        });
        assert_eq!(f.kind(), JavaKind::Double);
        assert_eq!(f.name(), "x");
        assert!(f.as_resolved().is_none());
    }
}
