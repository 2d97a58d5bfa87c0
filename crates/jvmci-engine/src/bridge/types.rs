//! Records exchanged across the host boundary

use crate::meta::{KlassPointer, MethodPointer};

/// Static description of a host class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlassInfo {
    /// Internal name, e.g. `java/lang/String` or `[I`
    pub name: String,
    /// Access flags
    pub modifiers: u32,
    /// Superclass, if any
    pub super_klass: Option<KlassPointer>,
    /// Element class of an array class
    pub component: Option<KlassPointer>,
    /// Whether this is an interface
    pub is_interface: bool,
    /// Whether this is an array class
    pub is_array: bool,
    /// Whether instances need finalization
    pub has_finalizer: bool,
    /// Instance size in bytes (0 for arrays and interfaces)
    pub instance_size: u32,
}

/// Static description of a host method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Declaring class
    pub holder: KlassPointer,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub modifiers: u32,
    /// Local variable slots
    pub max_locals: u16,
    /// Operand stack depth
    pub max_stack: u16,
    /// Bytecode length
    pub code_size: u32,
}

/// One exception handler range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandlerEntry {
    /// First covered bci
    pub start_bci: u32,
    /// First bci after the covered range
    pub end_bci: u32,
    /// Handler bci
    pub handler_bci: u32,
    /// Constant pool index of the caught class, 0 for catch-all
    pub catch_type_cpi: u16,
}

/// Bytecode offset to source line mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    /// Start bci
    pub bci: u32,
    /// Source line
    pub line: u32,
}

/// One local variable table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    /// First bci where the variable is live
    pub start_bci: u32,
    /// Length of the live range
    pub length: u32,
    /// Variable name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Local slot
    pub slot: u16,
}

/// A class entry of a constant pool: resolved, or only its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolKlass {
    /// The class is loaded and linked to the entry
    Resolved(KlassPointer),
    /// The entry still holds the symbolic name
    Unresolved(String),
}

/// Description of a resolved field in a constant pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFieldInfo {
    /// Declaring class
    pub holder: KlassPointer,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Offset within the instance (or the mirror, for statics)
    pub offset: i32,
    /// Access flags
    pub modifiers: u32,
}

impl ResolvedFieldInfo {
    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.modifiers & crate::meta::ACC_STATIC != 0
    }
}

/// A Java-level frame reported by stack inspection
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrameInfo {
    /// Executing method
    pub method: MethodPointer,
    /// Current bci
    pub bci: i32,
    /// Depth from the top of the stack (0 is the caller of the inspection)
    pub depth: usize,
    /// Local values, rendered by the host
    pub locals: Vec<String>,
    /// Whether some locals are still virtual (scalar-replaced)
    pub has_virtual_objects: bool,
}

/// Per-compilation statistics recorded by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationStatistics {
    /// Compile request id
    pub compile_id: u64,
    /// Method compiled
    pub method: MethodPointer,
    /// Bytecodes processed, including inlinees
    pub processed_bytecodes: u64,
    /// Wall time spent in the compiler
    pub elapsed_nanos: u64,
    /// Size of the installed code, 0 when nothing was installed
    pub installed_code_size: u64,
}
