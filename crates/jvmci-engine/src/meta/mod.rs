//! Metadata wrappers and native handle lifetimes
//!
//! Wrappers for host classes, methods, fields and constant pools are handed
//! out by a [`MetadataContext`]. Each wrapper that pins host metadata owns a
//! [`Cleanable`] registered with the context's [`HandleCleaner`]; the pin is
//! released on the first sweep after the last wrapper owner goes away.

mod cleaner;
mod constant;
mod context;
mod field;
mod handle;
mod kind;
mod method;
mod signature;
mod types;

pub use cleaner::{Cleanable, HandleCleaner, HandleReleaser};
pub use constant::{HeapObject, HostObject, JavaConstant, ObjectConstant};
pub use context::{MetadataContext, WeakCache};
pub use field::{HotSpotResolvedJavaField, JavaField, UnresolvedJavaField};
pub use handle::{ConstantPoolPointer, CompileId, FieldPointer, GlobalHandle, HandleKind, KlassPointer, MethodPointer};
pub use kind::JavaKind;
pub use method::{ExceptionHandler, HotSpotResolvedJavaMethod, JavaMethod, UnresolvedJavaMethod};
pub use signature::{descriptor_kind, Signature};
pub use types::{HotSpotResolvedObjectType, JavaType, UnresolvedJavaType};

/// `public`
pub const ACC_PUBLIC: u32 = 0x0001;
/// `private`
pub const ACC_PRIVATE: u32 = 0x0002;
/// `protected`
pub const ACC_PROTECTED: u32 = 0x0004;
/// `static`
pub const ACC_STATIC: u32 = 0x0008;
/// `final`
pub const ACC_FINAL: u32 = 0x0010;
/// `synchronized`
pub const ACC_SYNCHRONIZED: u32 = 0x0020;
/// `volatile`
pub const ACC_VOLATILE: u32 = 0x0040;
/// `transient`
pub const ACC_TRANSIENT: u32 = 0x0080;
/// `native`
pub const ACC_NATIVE: u32 = 0x0100;
/// `interface`
pub const ACC_INTERFACE: u32 = 0x0200;
/// `abstract`
pub const ACC_ABSTRACT: u32 = 0x0400;
/// `strictfp`
pub const ACC_STRICT: u32 = 0x0800;
/// Compiler-generated
pub const ACC_SYNTHETIC: u32 = 0x1000;
