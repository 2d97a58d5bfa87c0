//! Machine registers and architecture descriptions

use std::fmt;

/// Register file a register belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegisterCategory {
    /// General purpose integer/pointer registers
    Cpu,
    /// Vector registers that hold both float and double scalars (xmm, v)
    Simd,
    /// Single-precision float registers
    FpuSingle,
    /// Double-precision float registers
    FpuDouble,
}

/// A machine register
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// Position in the architecture's register file
    pub number: u16,
    /// Hardware encoding used by the assembler
    pub encoding: u16,
    /// Assembly name
    pub name: &'static str,
    /// Register file
    pub category: RegisterCategory,
}

impl Register {
    /// Describe a register
    pub const fn new(number: u16, encoding: u16, name: &'static str, category: RegisterCategory) -> Self {
        Register { number, encoding, name, category }
    }

    /// Whether this is a general purpose register
    pub fn is_cpu(&self) -> bool {
        self.category == RegisterCategory::Cpu
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Static facts about a target architecture
#[derive(Debug)]
pub struct Architecture {
    /// Name as used in `os.arch`
    pub name: &'static str,
    /// Machine word size in bytes
    pub word_size: usize,
    /// Complete register file, indexed by [`Register::number`]
    pub registers: &'static [Register],
    /// Bytes pushed by a call instruction for the return address
    pub return_address_size: usize,
    /// Required stack alignment in bytes
    pub stack_alignment: usize,
}

impl Architecture {
    /// Find a register by assembly name
    pub fn register(&self, name: &str) -> Option<Register> {
        self.registers.iter().copied().find(|r| r.name == name)
    }

    /// Size in bytes of a register category's native width
    pub fn category_size(&self, category: RegisterCategory) -> usize {
        match category {
            RegisterCategory::Cpu => self.word_size,
            RegisterCategory::Simd => 16,
            RegisterCategory::FpuSingle => 4,
            RegisterCategory::FpuDouble => 8,
        }
    }
}

/// Round `value` up to a multiple of `align` (a power of two)
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(12, 4), 12);
        assert_eq!(round_up(13, 16), 16);
    }

    #[test]
    fn test_register_display() {
        let r = Register::new(3, 3, "rbx", RegisterCategory::Cpu);
        assert_eq!(r.to_string(), "rbx");
        assert!(r.is_cpu());
    }
}
