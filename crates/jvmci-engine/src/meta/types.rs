//! Resolved and unresolved Java types

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::cleaner::Cleanable;
use super::context::MetadataContext;
use super::field::HotSpotResolvedJavaField;
use super::handle::KlassPointer;
use super::kind::JavaKind;
use super::{ACC_ABSTRACT, ACC_FINAL};
use crate::bridge::KlassInfo;
use crate::constant_pool::HotSpotConstantPool;
use crate::error::JvmciResult;

/// Wrapper for a class, interface or array class loaded in the host
pub struct HotSpotResolvedObjectType {
    klass: KlassPointer,
    info: KlassInfo,
    _pin: Cleanable,
    constant_pool: OnceCell<Option<Arc<HotSpotConstantPool>>>,
    instance_fields: OnceCell<Vec<Arc<HotSpotResolvedJavaField>>>,
}

impl HotSpotResolvedObjectType {
    pub(crate) fn new(ctx: &MetadataContext, klass: KlassPointer) -> Self {
        let info = ctx.compiler_to_vm().get_klass_info(klass);
        HotSpotResolvedObjectType {
            klass,
            info,
            _pin: ctx.pin_metadata(klass.raw()),
            constant_pool: OnceCell::new(),
            instance_fields: OnceCell::new(),
        }
    }

    /// Native handle
    pub fn klass(&self) -> KlassPointer {
        self.klass
    }

    /// Internal name, e.g. `java/lang/String`
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Access flags
    pub fn modifiers(&self) -> u32 {
        self.info.modifiers
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.info.is_interface
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> bool {
        self.info.is_array
    }

    /// Whether this class can be instantiated directly
    pub fn is_concrete(&self) -> bool {
        !self.info.is_interface && self.info.modifiers & ACC_ABSTRACT == 0
    }

    /// Whether this class is final
    pub fn is_final(&self) -> bool {
        self.info.modifiers & ACC_FINAL != 0
    }

    /// Whether instances need finalization
    pub fn has_finalizer(&self) -> bool {
        self.info.has_finalizer
    }

    /// Instance size in bytes
    pub fn instance_size(&self) -> u32 {
        self.info.instance_size
    }

    /// Whether static initialization has completed
    pub fn is_initialized(&self, ctx: &MetadataContext) -> bool {
        ctx.compiler_to_vm().is_initialized(self.klass)
    }

    /// Run static initialization
    pub fn initialize(&self, ctx: &MetadataContext) -> JvmciResult<()> {
        ctx.compiler_to_vm().ensure_initialized(self.klass)
    }

    /// Superclass wrapper
    pub fn super_class(&self, ctx: &MetadataContext) -> Option<Arc<HotSpotResolvedObjectType>> {
        self.info.super_klass.map(|k| ctx.resolved_type(k))
    }

    /// Element type of an array class
    pub fn component_type(&self, ctx: &MetadataContext) -> Option<JavaType> {
        if !self.info.is_array {
            return None;
        }
        if let Some(component) = self.info.component {
            return Some(JavaType::Resolved(ctx.resolved_type(component)));
        }
        let element = self.info.name.strip_prefix('[')?;
        let kind = element.chars().next().and_then(JavaKind::from_type_char)?;
        Some(JavaType::Primitive(kind))
    }

    /// Whether `other` is this type or one of its subclasses
    pub fn is_assignable_from(&self, ctx: &MetadataContext, other: &HotSpotResolvedObjectType) -> bool {
        if self.klass == other.klass {
            return true;
        }
        let mut current = other.super_class(ctx);
        while let Some(t) = current {
            if t.klass == self.klass {
                return true;
            }
            current = t.super_class(ctx);
        }
        false
    }

    /// Constant pool of an instance class
    pub fn constant_pool(&self, ctx: &MetadataContext) -> Option<Arc<HotSpotConstantPool>> {
        self.constant_pool
            .get_or_init(|| ctx.compiler_to_vm().get_constant_pool(self.klass).map(|cp| ctx.constant_pool(cp)))
            .clone()
    }

    /// Declared instance fields
    pub fn instance_fields(&self, ctx: &MetadataContext) -> &[Arc<HotSpotResolvedJavaField>] {
        self.instance_fields.get_or_init(|| {
            ctx.compiler_to_vm()
                .get_instance_fields(self.klass)
                .into_iter()
                .map(|f| ctx.resolved_field(f))
                .collect()
        })
    }
}

impl fmt::Debug for HotSpotResolvedObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSpotType<{}, {:?}>", self.info.name, self.klass)
    }
}

/// A type referenced by name that the host has not resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedJavaType {
    name: String,
}

impl UnresolvedJavaType {
    /// Type with internal name `name`
    pub fn new(name: impl Into<String>) -> Self {
        UnresolvedJavaType { name: name.into() }
    }

    /// Internal name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A type as seen by the compiler
#[derive(Clone)]
pub enum JavaType {
    /// Loaded class wrapper
    Resolved(Arc<HotSpotResolvedObjectType>),
    /// Primitive type, including `void`
    Primitive(JavaKind),
    /// Symbolic reference only
    Unresolved(UnresolvedJavaType),
}

impl JavaType {
    /// Internal name (`I` style descriptor for primitives)
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            JavaType::Resolved(t) => Cow::Borrowed(t.name()),
            JavaType::Primitive(k) => Cow::Owned(k.type_char().to_string()),
            JavaType::Unresolved(u) => Cow::Borrowed(u.name()),
        }
    }

    /// Value kind of this type
    pub fn kind(&self) -> JavaKind {
        match self {
            JavaType::Primitive(k) => *k,
            _ => JavaKind::Object,
        }
    }

    /// Whether the type is usable without further resolution
    pub fn is_resolved(&self) -> bool {
        !matches!(self, JavaType::Unresolved(_))
    }

    /// The class wrapper, if resolved to one
    pub fn as_resolved(&self) -> Option<&Arc<HotSpotResolvedObjectType>> {
        match self {
            JavaType::Resolved(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq for JavaType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JavaType::Resolved(a), JavaType::Resolved(b)) => Arc::ptr_eq(a, b),
            (JavaType::Primitive(a), JavaType::Primitive(b)) => a == b,
            (JavaType::Unresolved(a), JavaType::Unresolved(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Resolved(t) => write!(f, "{t:?}"),
            JavaType::Primitive(k) => write!(f, "Primitive({})", k.java_name()),
            JavaType::Unresolved(u) => write!(f, "Unresolved({})", u.name()),
        }
    }
}
