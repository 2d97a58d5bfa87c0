//! Value kinds and machine locations

use std::fmt;

use super::register::Register;
use crate::meta::JavaKind;

/// Low-level kind of a value: its size and which of its elements are references
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LirKind {
    /// Size of the whole value in bytes
    pub size_in_bytes: u8,
    /// Number of elements (1 for scalars)
    pub vector_length: u8,
    /// Bit `i` set when element `i` is a reference
    pub reference_mask: u32,
    /// Bit `i` set when element `i` is a compressed reference
    pub compression_mask: u32,
    /// Element is derived from a base reference
    pub derived: bool,
    /// A reference of unknown kind; may not be live across a safepoint
    pub unknown_reference: bool,
}

impl LirKind {
    /// A plain value with no references
    pub const fn value(size_in_bytes: u8) -> Self {
        LirKind {
            size_in_bytes,
            vector_length: 1,
            reference_mask: 0,
            compression_mask: 0,
            derived: false,
            unknown_reference: false,
        }
    }

    /// An uncompressed object reference
    pub const fn reference(word_size: u8) -> Self {
        LirKind { reference_mask: 1, ..LirKind::value(word_size) }
    }

    /// A compressed object reference
    pub const fn compressed_reference() -> Self {
        LirKind { reference_mask: 1, compression_mask: 1, ..LirKind::value(4) }
    }

    /// A pointer derived from a base reference
    pub const fn derived_reference(word_size: u8) -> Self {
        LirKind { derived: true, ..LirKind::reference(word_size) }
    }

    /// A reference whose shape is unknown
    pub const fn unknown_reference(word_size: u8) -> Self {
        LirKind { unknown_reference: true, ..LirKind::value(word_size) }
    }

    /// A vector of `count` elements of `element_size` bytes
    pub const fn vector(element_size: u8, count: u8, reference_mask: u32) -> Self {
        LirKind {
            size_in_bytes: element_size * count,
            vector_length: count,
            reference_mask,
            compression_mask: 0,
            derived: false,
            unknown_reference: false,
        }
    }

    /// Kind of a Java value on a target with `word_size` byte words
    pub fn for_java_kind(kind: JavaKind, word_size: usize) -> Self {
        match kind {
            JavaKind::Object => LirKind::reference(word_size as u8),
            JavaKind::Void | JavaKind::Illegal => LirKind::value(0),
            other => LirKind::value(other.stack_kind().byte_count() as u8),
        }
    }

    /// Whether no element is a reference
    pub fn is_value(&self) -> bool {
        self.reference_mask == 0 && !self.unknown_reference
    }

    /// Whether element `i` is a reference
    pub fn is_reference(&self, i: u32) -> bool {
        self.reference_mask & (1 << i) != 0
    }

    /// Whether element `i` is a compressed reference
    pub fn is_compressed_reference(&self, i: u32) -> bool {
        self.compression_mask & (1 << i) != 0
    }

    /// Bytes per element
    pub fn bytes_per_element(&self) -> usize {
        self.size_in_bytes as usize / self.vector_length.max(1) as usize
    }
}

/// A stack slot relative to the stack pointer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StackSlot {
    /// Value kind stored in the slot
    pub kind: LirKind,
    /// Offset from the stack pointer before the frame size is applied
    pub raw_offset: i32,
    /// Whether the frame size must be added to reach the slot (incoming arguments)
    pub add_frame_size: bool,
}

impl StackSlot {
    /// Describe a slot
    pub fn new(kind: LirKind, raw_offset: i32, add_frame_size: bool) -> Self {
        StackSlot { kind, raw_offset, add_frame_size }
    }

    /// Offset from the stack pointer once the frame of `total_frame_size` bytes exists
    pub fn offset(&self, total_frame_size: i32) -> i32 {
        if self.add_frame_size {
            self.raw_offset + total_frame_size
        } else {
            self.raw_offset
        }
    }
}

/// A value held in a register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegisterValue {
    /// The register
    pub register: Register,
    /// Kind of the value
    pub kind: LirKind,
}

/// A location the allocator can assign: a register, a stack slot, or nothing
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AllocatableValue {
    /// Value in a register
    Register(RegisterValue),
    /// Value in a stack slot
    Stack(StackSlot),
    /// No location (void return)
    Illegal,
}

impl AllocatableValue {
    /// Register location
    pub fn register(register: Register, kind: LirKind) -> Self {
        AllocatableValue::Register(RegisterValue { register, kind })
    }

    /// Stack location
    pub fn stack(kind: LirKind, raw_offset: i32, add_frame_size: bool) -> Self {
        AllocatableValue::Stack(StackSlot::new(kind, raw_offset, add_frame_size))
    }

    /// Kind of the value, if any
    pub fn kind(&self) -> Option<LirKind> {
        match self {
            AllocatableValue::Register(r) => Some(r.kind),
            AllocatableValue::Stack(s) => Some(s.kind),
            AllocatableValue::Illegal => None,
        }
    }

    /// The register, if this is a register location
    pub fn as_register(&self) -> Option<Register> {
        match self {
            AllocatableValue::Register(r) => Some(r.register),
            _ => None,
        }
    }

    /// The stack slot, if this is a stack location
    pub fn as_stack_slot(&self) -> Option<StackSlot> {
        match self {
            AllocatableValue::Stack(s) => Some(*s),
            _ => None,
        }
    }

    /// Whether this is [`AllocatableValue::Illegal`]
    pub fn is_illegal(&self) -> bool {
        matches!(self, AllocatableValue::Illegal)
    }
}

impl fmt::Debug for AllocatableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatableValue::Register(r) => write!(f, "{}[{}]", r.register, r.kind.size_in_bytes),
            AllocatableValue::Stack(s) => {
                write!(f, "stack:{}{}[{}]", if s.add_frame_size { "in:" } else { "" }, s.raw_offset, s.kind.size_in_bytes)
            }
            AllocatableValue::Illegal => f.write_str("illegal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::register::RegisterCategory;

    #[test]
    fn test_kinds_for_java_kinds() {
        assert!(LirKind::for_java_kind(JavaKind::Object, 8).is_reference(0));
        assert_eq!(LirKind::for_java_kind(JavaKind::Byte, 8).size_in_bytes, 4);
        assert_eq!(LirKind::for_java_kind(JavaKind::Double, 8).size_in_bytes, 8);
        assert!(LirKind::for_java_kind(JavaKind::Long, 8).is_value());
    }

    #[test]
    fn test_vector_elements() {
        let k = LirKind::vector(8, 2, 0b10);
        assert_eq!(k.bytes_per_element(), 8);
        assert!(!k.is_reference(0));
        assert!(k.is_reference(1));
    }

    #[test]
    fn test_stack_slot_offsets() {
        let incoming = StackSlot::new(LirKind::value(8), 16, true);
        let outgoing = StackSlot::new(LirKind::value(8), 16, false);
        assert_eq!(incoming.offset(64), 80);
        assert_eq!(outgoing.offset(64), 16);
    }

    #[test]
    fn test_location_accessors() {
        let reg = Register::new(0, 0, "rax", RegisterCategory::Cpu);
        let v = AllocatableValue::register(reg, LirKind::value(8));
        assert_eq!(v.as_register(), Some(reg));
        assert!(v.as_stack_slot().is_none());
        assert!(AllocatableValue::Illegal.is_illegal());
        assert_eq!(format!("{v:?}"), "rax[8]");
    }
}
