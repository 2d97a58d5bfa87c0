//! AMD64 register configuration

use super::calling_convention::{
    without, CallingConvention, CallingConventionType, RegisterConfig, StackArgumentAllocator,
};
use super::register::{Architecture, Register, RegisterCategory::*};
use super::value::AllocatableValue;
use crate::meta::JavaKind;

pub const RAX: Register = Register::new(0, 0, "rax", Cpu);
pub const RCX: Register = Register::new(1, 1, "rcx", Cpu);
pub const RDX: Register = Register::new(2, 2, "rdx", Cpu);
pub const RBX: Register = Register::new(3, 3, "rbx", Cpu);
pub const RSP: Register = Register::new(4, 4, "rsp", Cpu);
pub const RBP: Register = Register::new(5, 5, "rbp", Cpu);
pub const RSI: Register = Register::new(6, 6, "rsi", Cpu);
pub const RDI: Register = Register::new(7, 7, "rdi", Cpu);
pub const R8: Register = Register::new(8, 8, "r8", Cpu);
pub const R9: Register = Register::new(9, 9, "r9", Cpu);
pub const R10: Register = Register::new(10, 10, "r10", Cpu);
pub const R11: Register = Register::new(11, 11, "r11", Cpu);
pub const R12: Register = Register::new(12, 12, "r12", Cpu);
pub const R13: Register = Register::new(13, 13, "r13", Cpu);
pub const R14: Register = Register::new(14, 14, "r14", Cpu);
pub const R15: Register = Register::new(15, 15, "r15", Cpu);

pub const XMM0: Register = Register::new(16, 0, "xmm0", Simd);
pub const XMM1: Register = Register::new(17, 1, "xmm1", Simd);
pub const XMM2: Register = Register::new(18, 2, "xmm2", Simd);
pub const XMM3: Register = Register::new(19, 3, "xmm3", Simd);
pub const XMM4: Register = Register::new(20, 4, "xmm4", Simd);
pub const XMM5: Register = Register::new(21, 5, "xmm5", Simd);
pub const XMM6: Register = Register::new(22, 6, "xmm6", Simd);
pub const XMM7: Register = Register::new(23, 7, "xmm7", Simd);
pub const XMM8: Register = Register::new(24, 8, "xmm8", Simd);
pub const XMM9: Register = Register::new(25, 9, "xmm9", Simd);
pub const XMM10: Register = Register::new(26, 10, "xmm10", Simd);
pub const XMM11: Register = Register::new(27, 11, "xmm11", Simd);
pub const XMM12: Register = Register::new(28, 12, "xmm12", Simd);
pub const XMM13: Register = Register::new(29, 13, "xmm13", Simd);
pub const XMM14: Register = Register::new(30, 14, "xmm14", Simd);
pub const XMM15: Register = Register::new(31, 15, "xmm15", Simd);

const ALL: &[Register] = &[
    RAX, RCX, RDX, RBX, RSP, RBP, RSI, RDI, R8, R9, R10, R11, R12, R13, R14, R15,
    XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7,
    XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
];

/// AMD64 architecture description
pub static AMD64: Architecture = Architecture {
    name: "amd64",
    word_size: 8,
    registers: ALL,
    return_address_size: 8,
    stack_alignment: 16,
};

/// Thread register holding the current `JavaThread*`
pub const THREAD_REGISTER: Register = R15;
/// Compressed-oops heap base register
pub const HEAP_BASE_REGISTER: Register = R12;

const JAVA_GENERAL_PARAMETERS: &[Register] = &[RSI, RDX, RCX, R8, R9, RDI];
const WINDOWS_JAVA_GENERAL_PARAMETERS: &[Register] = &[RDX, R8, R9, RDI, RSI, RCX];
const SYSV_NATIVE_GENERAL_PARAMETERS: &[Register] = &[RDI, RSI, RDX, RCX, R8, R9];
const WINDOWS_NATIVE_GENERAL_PARAMETERS: &[Register] = &[RCX, RDX, R8, R9];
const XMM_PARAMETERS: &[Register] = &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7];
const WINDOWS_NATIVE_XMM_PARAMETERS: &[Register] = &[XMM0, XMM1, XMM2, XMM3];

/// Register configuration for HotSpot on AMD64
pub struct Amd64RegisterConfig {
    windows: bool,
    java_general: &'static [Register],
    native_general: &'static [Register],
    native_xmm: &'static [Register],
    reserved: Vec<Register>,
    allocatable: Vec<Register>,
}

impl Amd64RegisterConfig {
    /// Build the configuration for the given host settings
    pub fn new(windows: bool, use_compressed_oops: bool, preserve_frame_pointer: bool) -> Self {
        let mut reserved = vec![RSP, THREAD_REGISTER];
        if use_compressed_oops {
            reserved.push(HEAP_BASE_REGISTER);
        }
        if preserve_frame_pointer {
            reserved.push(RBP);
        }
        let allocatable = without(ALL, &reserved);
        Amd64RegisterConfig {
            windows,
            java_general: if windows { WINDOWS_JAVA_GENERAL_PARAMETERS } else { JAVA_GENERAL_PARAMETERS },
            native_general: if windows { WINDOWS_NATIVE_GENERAL_PARAMETERS } else { SYSV_NATIVE_GENERAL_PARAMETERS },
            native_xmm: if windows { WINDOWS_NATIVE_XMM_PARAMETERS } else { XMM_PARAMETERS },
            reserved,
            allocatable,
        }
    }

    fn general_parameters(&self, cc: CallingConventionType) -> &'static [Register] {
        match cc {
            CallingConventionType::NativeCall => self.native_general,
            _ => self.java_general,
        }
    }

    fn xmm_parameters(&self, cc: CallingConventionType) -> &'static [Register] {
        match cc {
            CallingConventionType::NativeCall => self.native_xmm,
            _ => XMM_PARAMETERS,
        }
    }
}

impl RegisterConfig for Amd64RegisterConfig {
    fn architecture(&self) -> &'static Architecture {
        &AMD64
    }

    fn return_register(&self, kind: JavaKind, _cc: CallingConventionType) -> Option<Register> {
        match kind.stack_kind() {
            JavaKind::Int | JavaKind::Long | JavaKind::Object => Some(RAX),
            JavaKind::Float | JavaKind::Double => Some(XMM0),
            _ => None,
        }
    }

    fn frame_register(&self) -> Register {
        RSP
    }

    fn calling_convention(
        &self,
        cc: CallingConventionType,
        return_kind: JavaKind,
        parameters: &[JavaKind],
    ) -> CallingConvention {
        let general = self.general_parameters(cc);
        let xmm = self.xmm_parameters(cc);
        let mut stack = StackArgumentAllocator::new(cc, 0, AMD64.word_size);
        let positional = self.windows && cc == CallingConventionType::NativeCall;
        if positional {
            // Home space the callee may spill register arguments into
            stack.reserve(4 * AMD64.word_size);
        }

        let mut next_general = 0;
        let mut next_xmm = 0;
        let mut locations = Vec::with_capacity(parameters.len());
        for (i, &param) in parameters.iter().enumerate() {
            let kind = param.stack_kind();
            debug_assert!(
                !matches!(kind, JavaKind::Void | JavaKind::Illegal),
                "parameter of kind {kind:?} has no location"
            );
            let lir = self.value_kind(kind);
            let register = match kind {
                JavaKind::Int | JavaKind::Long | JavaKind::Object => {
                    let slot = if positional { i } else { next_general };
                    next_general += 1;
                    general.get(slot).copied()
                }
                JavaKind::Float | JavaKind::Double => {
                    let slot = if positional { i } else { next_xmm };
                    next_xmm += 1;
                    xmm.get(slot).copied()
                }
                _ => {
                    locations.push(AllocatableValue::Illegal);
                    continue;
                }
            };
            locations.push(match register {
                Some(r) => AllocatableValue::register(r, lir),
                None => stack.allocate(lir),
            });
        }

        let return_location = self
            .return_register(return_kind, cc)
            .map(|r| AllocatableValue::register(r, self.value_kind(return_kind)))
            .unwrap_or(AllocatableValue::Illegal);

        CallingConvention { stack_size: stack.size(), return_location, argument_locations: locations }
    }

    fn calling_convention_registers(&self, cc: CallingConventionType, kind: JavaKind) -> &[Register] {
        match kind.stack_kind() {
            JavaKind::Int | JavaKind::Long | JavaKind::Object => self.general_parameters(cc),
            JavaKind::Float | JavaKind::Double => self.xmm_parameters(cc),
            _ => &[],
        }
    }

    fn allocatable_registers(&self) -> &[Register] {
        &self.allocatable
    }

    fn caller_save_registers(&self) -> &[Register] {
        &self.allocatable
    }

    fn callee_save_registers(&self) -> &[Register] {
        &[]
    }

    fn reserved_registers(&self) -> &[Register] {
        &self.reserved
    }
}
