//! Native handle newtypes
//!
//! A handle is an opaque integer naming host-owned storage. Its validity is
//! governed by the host's class loading, unloading and GC; nothing on this
//! side keeps it alive except the pins released through the handle cleaner.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

macro_rules! native_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw native value
            pub const fn new(raw: u64) -> Self {
                $name(raw)
            }

            /// The raw native value
            pub const fn raw(self) -> u64 {
                self.0
            }

            /// Whether this is the null handle
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

native_handle!(
    /// Address of a host `Klass`
    KlassPointer
);
native_handle!(
    /// Address of a host `Method`
    MethodPointer
);
native_handle!(
    /// Address of a host `ConstantPool`
    ConstantPoolPointer
);
native_handle!(
    /// Address of a host field descriptor
    FieldPointer
);
native_handle!(
    /// Global reference to a host heap object
    GlobalHandle
);

/// What kind of native resource a tracked handle pins
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Metadata pin (klass, method, constant pool); released by clearing its slot
    Metadata,
    /// Heap object global reference; released by deleting the handle
    Global,
    /// Failed-speculations list owned by a speculation log
    FailedSpeculations,
}

/// Identifier of one compilation request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CompileId(u64);

static NEXT_COMPILE_ID: AtomicU64 = AtomicU64::new(1);

impl CompileId {
    /// Generate a new unique id
    pub fn next() -> Self {
        CompileId(NEXT_COMPILE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric id value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Use a host-assigned id
    pub fn from_u64(id: u64) -> Self {
        CompileId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_raw_round_trip() {
        let k = KlassPointer::new(0x7f00_1000);
        assert_eq!(k.raw(), 0x7f00_1000);
        assert!(!k.is_null());
        assert!(MethodPointer::new(0).is_null());
        assert_eq!(format!("{k:?}"), "KlassPointer(0x7f001000)");
    }

    #[test]
    fn test_compile_id_uniqueness() {
        let a = CompileId::next();
        let b = CompileId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(CompileId::from_u64(42).as_u64(), 42);
    }
}
