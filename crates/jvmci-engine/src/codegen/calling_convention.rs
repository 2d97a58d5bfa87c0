//! Calling conventions and the register configuration seam

use super::register::{round_up, Architecture, Register, RegisterCategory};
use super::value::{AllocatableValue, LirKind};
use crate::meta::JavaKind;

/// Which side of which kind of call a convention describes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallingConventionType {
    /// Caller's view of a Java call: outgoing arguments
    JavaCall,
    /// Callee's view of a Java call: incoming arguments
    JavaCallee,
    /// Call into native code using the platform C ABI
    NativeCall,
}

impl CallingConventionType {
    /// Whether arguments flow out of the current frame
    pub fn is_out(self) -> bool {
        !matches!(self, CallingConventionType::JavaCallee)
    }
}

/// Argument and return locations for one call shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingConvention {
    /// Stack bytes consumed by arguments
    pub stack_size: usize,
    /// Location of the return value
    pub return_location: AllocatableValue,
    /// One location per parameter, in declaration order
    pub argument_locations: Vec<AllocatableValue>,
}

impl CallingConvention {
    /// Number of arguments passed on the stack
    pub fn stack_argument_count(&self) -> usize {
        self.argument_locations.iter().filter(|l| l.as_stack_slot().is_some()).count()
    }
}

/// Lays out stack-passed arguments contiguously after a fixed save area
#[derive(Debug)]
pub(crate) struct StackArgumentAllocator {
    current: usize,
    save_area: usize,
    min_slot_size: usize,
    add_frame_size: bool,
}

impl StackArgumentAllocator {
    /// `min_slot_size` is the minimum bytes each slot occupies (a word on
    /// AMD64 and AArch64; the value size on SPARC)
    pub(crate) fn new(cc: CallingConventionType, save_area: usize, min_slot_size: usize) -> Self {
        StackArgumentAllocator { current: 0, save_area, min_slot_size, add_frame_size: !cc.is_out() }
    }

    /// Start after `bytes` already reserved (native home space)
    pub(crate) fn reserve(&mut self, bytes: usize) {
        self.current += bytes;
    }

    /// Allocate the next slot for `kind`, aligned to its size
    pub(crate) fn allocate(&mut self, kind: LirKind) -> AllocatableValue {
        let size = kind.size_in_bytes as usize;
        self.current = round_up(self.current, size.max(1));
        let slot = AllocatableValue::stack(kind, (self.current + self.save_area) as i32, self.add_frame_size);
        self.current += size.max(self.min_slot_size);
        slot
    }

    /// Bytes consumed so far (save area excluded)
    pub(crate) fn size(&self) -> usize {
        self.current
    }
}

/// Register usage contract of a target, shared with the host's calling convention
pub trait RegisterConfig: Send + Sync {
    /// Target architecture
    fn architecture(&self) -> &'static Architecture;

    /// Register holding a return value of `kind`, as seen from `cc`
    fn return_register(&self, kind: JavaKind, cc: CallingConventionType) -> Option<Register>;

    /// Frame pointer register
    fn frame_register(&self) -> Register;

    /// Argument and return locations for a call shape
    ///
    /// Every parameter must be a value kind (`Void` and `Illegal` are caller
    /// errors); such a parameter gets an [`AllocatableValue::Illegal`]
    /// location and consumes no register or stack space.
    fn calling_convention(
        &self,
        cc: CallingConventionType,
        return_kind: JavaKind,
        parameters: &[JavaKind],
    ) -> CallingConvention;

    /// Ordered parameter registers for values of `kind`
    fn calling_convention_registers(&self, cc: CallingConventionType, kind: JavaKind) -> &[Register];

    /// Registers the allocator may use
    fn allocatable_registers(&self) -> &[Register];

    /// Registers not preserved across calls
    fn caller_save_registers(&self) -> &[Register];

    /// Registers preserved across calls
    fn callee_save_registers(&self) -> &[Register];

    /// Registers never handed to the allocator
    fn reserved_registers(&self) -> &[Register];

    /// Whether every allocatable register is caller-saved
    fn are_all_allocatable_registers_caller_saved(&self) -> bool {
        let caller = self.caller_save_registers();
        self.allocatable_registers().iter().all(|r| caller.contains(r))
    }

    /// Allocatable registers able to hold a value of `kind`
    fn filter_allocatable_registers(&self, kind: JavaKind) -> Vec<Register> {
        let arch = self.architecture();
        self.allocatable_registers()
            .iter()
            .copied()
            .filter(|r| match kind.stack_kind() {
                JavaKind::Float => matches!(r.category, RegisterCategory::Simd | RegisterCategory::FpuSingle),
                JavaKind::Double => matches!(r.category, RegisterCategory::Simd | RegisterCategory::FpuDouble),
                JavaKind::Int | JavaKind::Long | JavaKind::Object => {
                    r.category == RegisterCategory::Cpu && arch.category_size(r.category) >= kind.byte_count()
                }
                _ => false,
            })
            .collect()
    }

    /// Location kind for a Java value on this target
    fn value_kind(&self, kind: JavaKind) -> LirKind {
        LirKind::for_java_kind(kind, self.architecture().word_size)
    }
}

/// Registers of `all` not listed in `excluded`, in register-file order
pub(crate) fn without(all: &[Register], excluded: &[Register]) -> Vec<Register> {
    all.iter().copied().filter(|r| !excluded.contains(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_allocator_aligns_to_size() {
        let mut alloc = StackArgumentAllocator::new(CallingConventionType::JavaCall, 0, 0);
        let a = alloc.allocate(LirKind::value(4));
        let b = alloc.allocate(LirKind::value(8));
        let c = alloc.allocate(LirKind::value(4));
        assert_eq!(a.as_stack_slot().unwrap().raw_offset, 0);
        assert_eq!(b.as_stack_slot().unwrap().raw_offset, 8);
        assert_eq!(c.as_stack_slot().unwrap().raw_offset, 16);
        assert_eq!(alloc.size(), 20);
    }

    #[test]
    fn test_stack_allocator_word_slots_and_save_area() {
        let mut alloc = StackArgumentAllocator::new(CallingConventionType::JavaCallee, 128, 8);
        let a = alloc.allocate(LirKind::value(4));
        let b = alloc.allocate(LirKind::value(4));
        let a = a.as_stack_slot().unwrap();
        assert_eq!(a.raw_offset, 128);
        assert!(a.add_frame_size);
        assert_eq!(b.as_stack_slot().unwrap().raw_offset, 136);
        assert_eq!(alloc.size(), 16);
    }

    #[test]
    fn test_out_flags() {
        assert!(CallingConventionType::JavaCall.is_out());
        assert!(CallingConventionType::NativeCall.is_out());
        assert!(!CallingConventionType::JavaCallee.is_out());
    }
}
