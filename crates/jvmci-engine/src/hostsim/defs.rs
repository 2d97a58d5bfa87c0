//! Declarations of classes, methods, fields and constant pools to load into the simulated host

use rustc_hash::FxHashMap;

use crate::bridge::{ExceptionHandlerEntry, LineNumberEntry, LocalVariableEntry};
use crate::meta::{ConstantPoolPointer, KlassPointer, ACC_STATIC};

/// A field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Access flags
    pub modifiers: u32,
    /// Offset in the instance, or in the mirror for statics
    pub offset: i32,
}

impl FieldDef {
    /// Instance field
    pub fn instance(name: &str, descriptor: &str, offset: i32) -> Self {
        FieldDef { name: name.to_string(), descriptor: descriptor.to_string(), modifiers: 0, offset }
    }

    /// Static field
    pub fn with_static(name: &str, descriptor: &str, offset: i32) -> Self {
        FieldDef { modifiers: ACC_STATIC, ..Self::instance(name, descriptor, offset) }
    }

    /// Add access flags
    pub fn modifiers(mut self, modifiers: u32) -> Self {
        self.modifiers |= modifiers;
        self
    }
}

/// A method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
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
    /// Bytecode
    pub bytecode: Vec<u8>,
    /// Exception table
    pub exception_table: Vec<ExceptionHandlerEntry>,
    /// Line number table
    pub line_numbers: Vec<LineNumberEntry>,
    /// Local variable table
    pub local_variables: Vec<LocalVariableEntry>,
}

impl MethodDef {
    /// Method without code
    pub fn new(name: &str, descriptor: &str, modifiers: u32) -> Self {
        MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            modifiers,
            max_locals: 0,
            max_stack: 0,
            bytecode: Vec::new(),
            exception_table: Vec::new(),
            line_numbers: Vec::new(),
            local_variables: Vec::new(),
        }
    }

    /// Set bytecode and frame sizes
    pub fn code(mut self, bytecode: Vec<u8>, max_locals: u16, max_stack: u16) -> Self {
        self.bytecode = bytecode;
        self.max_locals = max_locals;
        self.max_stack = max_stack;
        self
    }

    /// Add an exception handler
    pub fn handler(mut self, start_bci: u32, end_bci: u32, handler_bci: u32, catch_type_cpi: u16) -> Self {
        self.exception_table.push(ExceptionHandlerEntry { start_bci, end_bci, handler_bci, catch_type_cpi });
        self
    }

    /// Add a line number entry
    pub fn line(mut self, bci: u32, line: u32) -> Self {
        self.line_numbers.push(LineNumberEntry { bci, line });
        self
    }

    /// Add a local variable entry
    pub fn local(mut self, slot: u16, name: &str, descriptor: &str, start_bci: u32, length: u32) -> Self {
        self.local_variables.push(LocalVariableEntry {
            start_bci,
            length,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            slot,
        });
        self
    }
}

/// A class declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Internal name
    pub name: String,
    /// Superclass
    pub super_klass: Option<KlassPointer>,
    /// Access flags
    pub modifiers: u32,
    /// Whether this is an interface
    pub is_interface: bool,
    /// Whether instances need finalization
    pub has_finalizer: bool,
    /// Instance size in bytes
    pub instance_size: u32,
    /// Element class, for array classes
    pub component: Option<KlassPointer>,
    /// Whether the class starts out loaded; unloaded classes load on first resolution
    pub loaded: bool,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Loaded public class with no members
    pub fn new(name: &str) -> Self {
        ClassDef {
            name: name.to_string(),
            super_klass: None,
            modifiers: crate::meta::ACC_PUBLIC,
            is_interface: false,
            has_finalizer: false,
            instance_size: 16,
            component: None,
            loaded: true,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Set the superclass
    pub fn extends(mut self, super_klass: KlassPointer) -> Self {
        self.super_klass = Some(super_klass);
        self
    }

    /// Add access flags
    pub fn modifiers(mut self, modifiers: u32) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Make this an interface
    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self.modifiers |= crate::meta::ACC_INTERFACE | crate::meta::ACC_ABSTRACT;
        self.instance_size = 0;
        self
    }

    /// Give instances a finalizer
    pub fn finalizer(mut self) -> Self {
        self.has_finalizer = true;
        self
    }

    /// Make this the array class of `component`
    pub fn array_of(mut self, component: KlassPointer) -> Self {
        self.component = Some(component);
        self.instance_size = 0;
        self
    }

    /// Start out known but not loaded
    pub fn unloaded(mut self) -> Self {
        self.loaded = false;
        self
    }

    /// Declare a field
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a method
    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }
}

/// A constant pool entry as declared in a class file
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    /// Slot 0 and the upper half of a long or double
    Invalid,
    /// Symbol
    Utf8(String),
    /// `int` literal
    Integer(i32),
    /// `float` literal
    Float(f32),
    /// `long` literal
    Long(i64),
    /// `double` literal
    Double(f64),
    /// Class by internal name
    Class(String),
    /// String literal
    String(String),
    /// Field reference
    Fieldref {
        /// Class entry
        class: u16,
        /// NameAndType entry
        name_and_type: u16,
    },
    /// Class method reference
    Methodref {
        /// Class entry
        class: u16,
        /// NameAndType entry
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodref {
        /// Class entry
        class: u16,
        /// NameAndType entry
        name_and_type: u16,
    },
    /// Name and descriptor
    NameAndType {
        /// Utf8 entry of the name
        name: u16,
        /// Utf8 entry of the descriptor
        descriptor: u16,
    },
    /// Method handle literal
    MethodHandle {
        /// JVMS reference kind
        ref_kind: u8,
        /// Member reference entry
        reference: u16,
    },
    /// Method type literal
    MethodType {
        /// Utf8 entry of the descriptor
        descriptor: u16,
    },
    /// Invokedynamic call site
    InvokeDynamic {
        /// Bootstrap method attribute index
        bootstrap: u16,
        /// NameAndType entry
        name_and_type: u16,
    },
}

impl PoolEntry {
    /// Class and NameAndType indices of a member reference
    pub(crate) fn member_ref(&self) -> Option<(u16, u16)> {
        match *self {
            PoolEntry::Fieldref { class, name_and_type }
            | PoolEntry::Methodref { class, name_and_type }
            | PoolEntry::InterfaceMethodref { class, name_and_type } => Some((class, name_and_type)),
            _ => None,
        }
    }

    /// Whether the entry gets a constant pool cache entry
    pub(crate) fn needs_cache_entry(&self) -> bool {
        self.member_ref().is_some() || matches!(self, PoolEntry::InvokeDynamic { .. })
    }
}

/// Builder for a constant pool; indices start at 1
#[derive(Debug, Clone)]
pub struct ConstantPoolBuilder {
    pub(crate) entries: Vec<PoolEntry>,
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPoolBuilder {
    /// Pool holding only the unused slot 0
    pub fn new() -> Self {
        ConstantPoolBuilder { entries: vec![PoolEntry::Invalid] }
    }

    /// Append an entry, padding two-slot entries, and return its index
    pub fn add(&mut self, entry: PoolEntry) -> u16 {
        let index = self.entries.len() as u16;
        let two_slot = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        self.entries.push(entry);
        if two_slot {
            self.entries.push(PoolEntry::Invalid);
        }
        index
    }

    /// Utf8 entry
    pub fn utf8(&mut self, s: &str) -> u16 {
        self.add(PoolEntry::Utf8(s.to_string()))
    }

    /// Class entry
    pub fn class(&mut self, name: &str) -> u16 {
        self.add(PoolEntry::Class(name.to_string()))
    }

    /// String entry
    pub fn string(&mut self, s: &str) -> u16 {
        self.add(PoolEntry::String(s.to_string()))
    }

    /// NameAndType entry with fresh Utf8 entries
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(PoolEntry::NameAndType { name, descriptor })
    }

    /// Field reference
    pub fn field_ref(&mut self, class: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(PoolEntry::Fieldref { class, name_and_type })
    }

    /// Class method reference
    pub fn method_ref(&mut self, class: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(PoolEntry::Methodref { class, name_and_type })
    }

    /// Interface method reference
    pub fn interface_method_ref(&mut self, class: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(PoolEntry::InterfaceMethodref { class, name_and_type })
    }

    /// Method type entry
    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        self.add(PoolEntry::MethodType { descriptor })
    }

    /// Method handle entry
    pub fn method_handle(&mut self, ref_kind: u8, reference: u16) -> u16 {
        self.add(PoolEntry::MethodHandle { ref_kind, reference })
    }

    /// Invokedynamic entry
    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(PoolEntry::InvokeDynamic { bootstrap, name_and_type })
    }

    /// Number of slots, including slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only slot 0 exists
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

/// A constant pool loaded into the simulated host
#[derive(Debug, Clone)]
pub struct SimulatedPool {
    /// Native handle
    pub pointer: ConstantPoolPointer,
    pub(crate) cache_operands: FxHashMap<u16, i32>,
}

impl SimulatedPool {
    /// Rewritten instruction operand for a member reference or invokedynamic entry
    pub fn operand(&self, cpi: u16) -> Option<i32> {
        self.cache_operands.get(&cpi).copied()
    }
}
