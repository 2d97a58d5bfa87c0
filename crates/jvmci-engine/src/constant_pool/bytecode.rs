//! Bytecodes that carry a constant pool operand

#![allow(missing_docs)]

use serde::Serialize;

/// How an instruction's operand indexes the constant pool
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandKind {
    /// Operand is a constant pool index
    ConstantPoolIndex,
    /// Operand was rewritten to a biased constant pool cache index
    CacheIndex,
    /// Operand is the complement of a cache index
    InvokeDynamic,
}

/// Opcodes whose operand refers to the constant pool
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Bytecode {
    Ldc = 0x12,
    LdcW = 0x13,
    Ldc2W = 0x14,
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Getfield = 0xb4,
    Putfield = 0xb5,
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    Invokeinterface = 0xb9,
    Invokedynamic = 0xba,
    New = 0xbb,
    Anewarray = 0xbd,
    Checkcast = 0xc0,
    Instanceof = 0xc1,
    Multianewarray = 0xc5,
    /// Host-internal rewrite of `invokevirtual` on a signature-polymorphic method
    Invokehandle = 0xe9,
}

impl Bytecode {
    /// Decode an opcode byte
    pub fn from_opcode(opcode: u8) -> Option<Bytecode> {
        use Bytecode::*;
        Some(match opcode {
            0x12 => Ldc,
            0x13 => LdcW,
            0x14 => Ldc2W,
            0xb2 => Getstatic,
            0xb3 => Putstatic,
            0xb4 => Getfield,
            0xb5 => Putfield,
            0xb6 => Invokevirtual,
            0xb7 => Invokespecial,
            0xb8 => Invokestatic,
            0xb9 => Invokeinterface,
            0xba => Invokedynamic,
            0xbb => New,
            0xbd => Anewarray,
            0xc0 => Checkcast,
            0xc1 => Instanceof,
            0xc5 => Multianewarray,
            0xe9 => Invokehandle,
            _ => return None,
        })
    }

    /// Opcode byte
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Operand encoding after the host's bytecode rewriting
    pub fn operand_kind(self) -> OperandKind {
        use Bytecode::*;
        match self {
            Ldc | LdcW | Ldc2W | New | Anewarray | Checkcast | Instanceof | Multianewarray => {
                OperandKind::ConstantPoolIndex
            }
            Getstatic | Putstatic | Getfield | Putfield => OperandKind::CacheIndex,
            Invokevirtual | Invokespecial | Invokestatic | Invokeinterface | Invokehandle => OperandKind::CacheIndex,
            Invokedynamic => OperandKind::InvokeDynamic,
        }
    }

    /// Whether this is one of the invoke instructions
    pub fn is_invoke(self) -> bool {
        use Bytecode::*;
        matches!(self, Invokevirtual | Invokespecial | Invokestatic | Invokeinterface | Invokedynamic | Invokehandle)
    }

    /// Whether this reads or writes a field
    pub fn is_field_access(self) -> bool {
        use Bytecode::*;
        matches!(self, Getstatic | Putstatic | Getfield | Putfield)
    }

    /// Whether executing this may trigger static initialization of the referenced class
    pub fn initializes_class(self) -> bool {
        use Bytecode::*;
        matches!(self, New | Getstatic | Putstatic | Invokestatic)
    }

    /// Whether a resolved cache entry records this bytecode in its second slot
    pub(crate) fn uses_second_cache_slot(self) -> bool {
        use Bytecode::*;
        matches!(self, Putstatic | Putfield | Invokevirtual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for op in 0u8..=255 {
            if let Some(bc) = Bytecode::from_opcode(op) {
                assert_eq!(bc.opcode(), op);
            }
        }
        assert_eq!(Bytecode::from_opcode(0x00), None);
    }

    #[test]
    fn test_operand_table() {
        assert_eq!(Bytecode::Ldc.operand_kind(), OperandKind::ConstantPoolIndex);
        assert_eq!(Bytecode::New.operand_kind(), OperandKind::ConstantPoolIndex);
        assert_eq!(Bytecode::Getfield.operand_kind(), OperandKind::CacheIndex);
        assert_eq!(Bytecode::Invokehandle.operand_kind(), OperandKind::CacheIndex);
        assert_eq!(Bytecode::Invokedynamic.operand_kind(), OperandKind::InvokeDynamic);
    }

    #[test]
    fn test_cache_slots() {
        assert!(Bytecode::Putfield.uses_second_cache_slot());
        assert!(Bytecode::Invokevirtual.uses_second_cache_slot());
        assert!(!Bytecode::Getfield.uses_second_cache_slot());
        assert!(!Bytecode::Invokedynamic.uses_second_cache_slot());
    }
}
