//! Constants and heap object references

use std::fmt;
use std::sync::Arc;

use super::cleaner::Cleanable;
use super::handle::{GlobalHandle, KlassPointer};

/// Contents of a host heap object that the compiler may embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapObject {
    /// `java.lang.String`
    String(String),
    /// `java.lang.invoke.MethodType` with its descriptor
    MethodType(String),
    /// `java.lang.invoke.MethodHandle` for a constant pool MethodHandle entry
    MethodHandle {
        /// JVMS reference kind (1..=9)
        ref_kind: u8,
        /// Internal name of the owning class
        owner: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },
    /// Linked call site or invoke-handle appendix
    Appendix {
        /// Description of the bound target
        target: String,
    },
    /// `java.lang.Class` mirror of a klass
    Mirror(KlassPointer),
    /// Any other object, described by its class name
    Opaque(String),
}

/// A heap object as returned by the host: contents plus the global reference pinning it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostObject {
    /// Global reference that keeps the object alive
    pub handle: GlobalHandle,
    /// Object contents
    pub value: HeapObject,
}

/// Backing data of an [`ObjectConstant`]
#[derive(Debug)]
pub struct ObjectData {
    handle: Option<GlobalHandle>,
    value: HeapObject,
    _pin: Option<Cleanable>,
}

/// Reference to a heap object, compared by identity
#[derive(Clone)]
pub struct ObjectConstant(Arc<ObjectData>);

impl ObjectConstant {
    /// Wrap a host object pinned by `pin`
    pub(crate) fn pinned(handle: GlobalHandle, value: HeapObject, pin: Cleanable) -> Self {
        ObjectConstant(Arc::new(ObjectData { handle: Some(handle), value, _pin: Some(pin) }))
    }

    /// Wrap a managed-side object with no host handle
    pub(crate) fn unpinned(value: HeapObject) -> Self {
        ObjectConstant(Arc::new(ObjectData { handle: None, value, _pin: None }))
    }

    pub(crate) fn from_data(data: Arc<ObjectData>) -> Self {
        ObjectConstant(data)
    }

    pub(crate) fn data(&self) -> &Arc<ObjectData> {
        &self.0
    }

    /// Object contents
    pub fn value(&self) -> &HeapObject {
        &self.0.value
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match &self.0.value {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Host global handle, if the object lives in the host heap
    pub fn handle(&self) -> Option<GlobalHandle> {
        self.0.handle
    }

    /// Reference identity
    pub fn is_same_object(&self, other: &ObjectConstant) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectConstant {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_object(other)
    }
}

impl Eq for ObjectConstant {}

impl fmt::Debug for ObjectConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object[{:?}]", self.0.value)
    }
}

/// A constant value that can be embedded in compiled code
#[derive(Debug, Clone)]
pub enum JavaConstant {
    /// `null`
    Null,
    /// `int` (and sub-int kinds)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Object reference
    Object(ObjectConstant),
    /// No value
    Illegal,
}

impl JavaConstant {
    /// Object payload, if any
    pub fn as_object(&self) -> Option<&ObjectConstant> {
        match self {
            JavaConstant::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Integer payload widened to `i64`, if this is an integral constant
    pub fn as_long(&self) -> Option<i64> {
        match self {
            JavaConstant::Int(v) => Some(*v as i64),
            JavaConstant::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this is the null constant
    pub fn is_null(&self) -> bool {
        matches!(self, JavaConstant::Null)
    }
}

impl PartialEq for JavaConstant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JavaConstant::Null, JavaConstant::Null) => true,
            (JavaConstant::Illegal, JavaConstant::Illegal) => true,
            (JavaConstant::Int(a), JavaConstant::Int(b)) => a == b,
            (JavaConstant::Long(a), JavaConstant::Long(b)) => a == b,
            // Bitwise, so NaN constants compare equal to themselves
            (JavaConstant::Float(a), JavaConstant::Float(b)) => a.to_bits() == b.to_bits(),
            (JavaConstant::Double(a), JavaConstant::Double(b)) => a.to_bits() == b.to_bits(),
            (JavaConstant::Object(a), JavaConstant::Object(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_identity() {
        let a = ObjectConstant::unpinned(HeapObject::String("x".into()));
        let b = ObjectConstant::unpinned(HeapObject::String("x".into()));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.as_str(), Some("x"));
        assert!(a.handle().is_none());
    }

    #[test]
    fn test_float_constant_equality_is_bitwise() {
        assert_eq!(JavaConstant::Float(f32::NAN), JavaConstant::Float(f32::NAN));
        assert_ne!(JavaConstant::Double(0.0), JavaConstant::Double(-0.0));
        assert_ne!(JavaConstant::Int(1), JavaConstant::Long(1));
        assert_eq!(JavaConstant::Int(5).as_long(), Some(5));
    }
}
