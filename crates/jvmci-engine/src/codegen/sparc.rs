//! SPARC V9 register configuration
//!
//! The general registers are windowed: a caller's `o` registers become the
//! callee's `i` registers, so the Java callee view of a call reads its
//! arguments and writes its return value through `i0..i5`. Double registers
//! `d0..d30` alias pairs of single registers and are never handed to the
//! allocator; `d32..d62` have no single-precision halves.

#![allow(non_upper_case_globals)]

use super::calling_convention::{
    without, CallingConvention, CallingConventionType, RegisterConfig, StackArgumentAllocator,
};
use super::register::{Architecture, Register, RegisterCategory::*};
use super::value::AllocatableValue;
use crate::meta::JavaKind;

macro_rules! registers {
    ($category:ident, $base:literal; $($name:ident = $n:literal),* $(,)?) => {
        $(pub const $name: Register = Register::new($base + $n, $n, stringify!($name), $category);)*
    };
}

registers!(Cpu, 0;
    g0 = 0, g1 = 1, g2 = 2, g3 = 3, g4 = 4, g5 = 5, g6 = 6, g7 = 7,
    o0 = 8, o1 = 9, o2 = 10, o3 = 11, o4 = 12, o5 = 13, o6 = 14, o7 = 15,
    l0 = 16, l1 = 17, l2 = 18, l3 = 19, l4 = 20, l5 = 21, l6 = 22, l7 = 23,
    i0 = 24, i1 = 25, i2 = 26, i3 = 27, i4 = 28, i5 = 29, i6 = 30, i7 = 31,
);

registers!(FpuSingle, 32;
    f0 = 0, f1 = 1, f2 = 2, f3 = 3, f4 = 4, f5 = 5, f6 = 6, f7 = 7,
    f8 = 8, f9 = 9, f10 = 10, f11 = 11, f12 = 12, f13 = 13, f14 = 14, f15 = 15,
    f16 = 16, f17 = 17, f18 = 18, f19 = 19, f20 = 20, f21 = 21, f22 = 22, f23 = 23,
    f24 = 24, f25 = 25, f26 = 26, f27 = 27, f28 = 28, f29 = 29, f30 = 30, f31 = 31,
);

// Numbered by pair index; the encoding is the lower half's register number
macro_rules! double_registers {
    ($($name:ident = $n:literal),* $(,)?) => {
        $(pub const $name: Register = Register::new(64 + $n / 2, $n, stringify!($name), FpuDouble);)*
    };
}

double_registers!(
    d0 = 0, d2 = 2, d4 = 4, d6 = 6, d8 = 8, d10 = 10, d12 = 12, d14 = 14,
    d16 = 16, d18 = 18, d20 = 20, d22 = 22, d24 = 24, d26 = 26, d28 = 28, d30 = 30,
    d32 = 32, d34 = 34, d36 = 36, d38 = 38, d40 = 40, d42 = 42, d44 = 44, d46 = 46,
    d48 = 48, d50 = 50, d52 = 52, d54 = 54, d56 = 56, d58 = 58, d60 = 60, d62 = 62,
);

const ALL: &[Register] = &[
    g0, g1, g2, g3, g4, g5, g6, g7, o0, o1, o2, o3, o4, o5, o6, o7,
    l0, l1, l2, l3, l4, l5, l6, l7, i0, i1, i2, i3, i4, i5, i6, i7,
    f0, f1, f2, f3, f4, f5, f6, f7, f8, f9, f10, f11, f12, f13, f14, f15,
    f16, f17, f18, f19, f20, f21, f22, f23, f24, f25, f26, f27, f28, f29, f30, f31,
    d0, d2, d4, d6, d8, d10, d12, d14, d16, d18, d20, d22, d24, d26, d28, d30,
    d32, d34, d36, d38, d40, d42, d44, d46, d48, d50, d52, d54, d56, d58, d60, d62,
];

/// SPARC V9 architecture description
pub static SPARCV9: Architecture = Architecture {
    name: "sparcv9",
    word_size: 8,
    registers: ALL,
    return_address_size: 0,
    stack_alignment: 16,
};

/// Stack pointer
pub const SP: Register = o6;
/// Frame pointer
pub const FP: Register = i6;
/// Thread register holding the current `JavaThread*`
pub const THREAD_REGISTER: Register = g2;
/// Compressed-oops heap base register
pub const HEAP_BASE_REGISTER: Register = g6;

/// Bytes at the bottom of every frame where the register window is spilled
pub const REGISTER_SAFE_AREA_SIZE: usize = 16 * 8;

const CALLER_GENERAL_PARAMETERS: &[Register] = &[o0, o1, o2, o3, o4, o5];
const CALLEE_GENERAL_PARAMETERS: &[Register] = &[i0, i1, i2, i3, i4, i5];
const SINGLE_PARAMETERS: &[Register] = &[
    f0, f1, f2, f3, f4, f5, f6, f7, f8, f9, f10, f11, f12, f13, f14, f15,
    f16, f17, f18, f19, f20, f21, f22, f23, f24, f25, f26, f27, f28, f29, f30, f31,
];
const DOUBLE_PARAMETERS: &[Register] = &[
    d0, d2, d4, d6, d8, d10, d12, d14, d16, d18, d20, d22, d24, d26, d28, d30,
];
// Native floats go in the odd (low-order) half of the positional double register
const NATIVE_SINGLE_PARAMETERS: &[Register] = &[
    f1, f3, f5, f7, f9, f11, f13, f15, f17, f19, f21, f23, f25, f27, f29, f31,
];
const WINDOW_SAVED: &[Register] = &[
    l0, l1, l2, l3, l4, l5, l6, l7, i0, i1, i2, i3, i4, i5,
];

/// Register configuration for HotSpot on SPARC V9
pub struct SparcRegisterConfig {
    reserved: Vec<Register>,
    allocatable: Vec<Register>,
    caller_saved: Vec<Register>,
}

impl SparcRegisterConfig {
    /// Build the configuration for the given host settings
    pub fn new(use_compressed_oops: bool) -> Self {
        let mut reserved = vec![g0, THREAD_REGISTER, g7, SP, o7, FP, i7];
        if use_compressed_oops {
            reserved.push(HEAP_BASE_REGISTER);
        }
        let mut excluded = reserved.clone();
        excluded.extend_from_slice(DOUBLE_PARAMETERS);
        let allocatable = without(ALL, &excluded);

        let mut not_caller_saved = reserved.clone();
        not_caller_saved.extend_from_slice(WINDOW_SAVED);
        let caller_saved = without(ALL, &not_caller_saved);

        SparcRegisterConfig { reserved, allocatable, caller_saved }
    }

    fn general_parameters(cc: CallingConventionType) -> &'static [Register] {
        match cc {
            CallingConventionType::JavaCallee => CALLEE_GENERAL_PARAMETERS,
            _ => CALLER_GENERAL_PARAMETERS,
        }
    }

    fn java_convention(&self, cc: CallingConventionType, parameters: &[JavaKind]) -> (Vec<AllocatableValue>, usize) {
        let general = Self::general_parameters(cc);
        let mut stack = StackArgumentAllocator::new(cc, REGISTER_SAFE_AREA_SIZE, 0);
        let mut next_general = 0;
        let mut next_float = 0;
        let mut locations = Vec::with_capacity(parameters.len());

        for &param in parameters {
            let kind = param.stack_kind();
            debug_assert!(
                !matches!(kind, JavaKind::Void | JavaKind::Illegal),
                "parameter of kind {kind:?} has no location"
            );
            let lir = self.value_kind(kind);
            let register = match kind {
                JavaKind::Int | JavaKind::Long | JavaKind::Object => {
                    next_general += 1;
                    general.get(next_general - 1).copied()
                }
                JavaKind::Float => {
                    let r = SINGLE_PARAMETERS.get(next_float).copied();
                    if r.is_some() {
                        next_float += 1;
                    }
                    r
                }
                JavaKind::Double => {
                    // Pairs are numbered by their lower half: round up to even first
                    let aligned = next_float + (next_float & 1);
                    let r = DOUBLE_PARAMETERS.get(aligned / 2).copied();
                    if r.is_some() {
                        next_float = aligned + 2;
                    }
                    r
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
        (locations, stack.size())
    }

    fn native_convention(&self, parameters: &[JavaKind]) -> (Vec<AllocatableValue>, usize) {
        let cc = CallingConventionType::NativeCall;
        let mut stack = StackArgumentAllocator::new(cc, REGISTER_SAFE_AREA_SIZE, SPARCV9.word_size);
        let mut locations = Vec::with_capacity(parameters.len());

        for (i, &param) in parameters.iter().enumerate() {
            let kind = param.stack_kind();
            debug_assert!(
                !matches!(kind, JavaKind::Void | JavaKind::Illegal),
                "parameter of kind {kind:?} has no location"
            );
            let lir = self.value_kind(kind);
            let register = match kind {
                JavaKind::Int | JavaKind::Long | JavaKind::Object => CALLER_GENERAL_PARAMETERS.get(i).copied(),
                JavaKind::Float => NATIVE_SINGLE_PARAMETERS.get(i).copied(),
                JavaKind::Double => DOUBLE_PARAMETERS.get(i).copied(),
                _ => {
                    locations.push(AllocatableValue::Illegal);
                    continue;
                }
            };
            locations.push(match register {
                Some(r) => {
                    // Every argument owns a word of the outgoing area, even in a register
                    stack.reserve(SPARCV9.word_size);
                    AllocatableValue::register(r, lir)
                }
                None => stack.allocate(lir),
            });
        }
        (locations, stack.size())
    }
}

impl RegisterConfig for SparcRegisterConfig {
    fn architecture(&self) -> &'static Architecture {
        &SPARCV9
    }

    fn return_register(&self, kind: JavaKind, cc: CallingConventionType) -> Option<Register> {
        match kind.stack_kind() {
            JavaKind::Int | JavaKind::Long | JavaKind::Object => match cc {
                CallingConventionType::JavaCallee => Some(i0),
                _ => Some(o0),
            },
            JavaKind::Float => Some(f0),
            JavaKind::Double => Some(d0),
            _ => None,
        }
    }

    fn frame_register(&self) -> Register {
        SP
    }

    fn calling_convention(
        &self,
        cc: CallingConventionType,
        return_kind: JavaKind,
        parameters: &[JavaKind],
    ) -> CallingConvention {
        let (argument_locations, stack_size) = match cc {
            CallingConventionType::NativeCall => self.native_convention(parameters),
            _ => self.java_convention(cc, parameters),
        };
        let return_location = self
            .return_register(return_kind, cc)
            .map(|r| AllocatableValue::register(r, self.value_kind(return_kind)))
            .unwrap_or(AllocatableValue::Illegal);

        CallingConvention { stack_size, return_location, argument_locations }
    }

    fn calling_convention_registers(&self, cc: CallingConventionType, kind: JavaKind) -> &[Register] {
        match (kind.stack_kind(), cc) {
            (JavaKind::Int | JavaKind::Long | JavaKind::Object, _) => Self::general_parameters(cc),
            (JavaKind::Float, CallingConventionType::NativeCall) => NATIVE_SINGLE_PARAMETERS,
            (JavaKind::Float, _) => SINGLE_PARAMETERS,
            (JavaKind::Double, _) => DOUBLE_PARAMETERS,
            _ => &[],
        }
    }

    fn allocatable_registers(&self) -> &[Register] {
        &self.allocatable
    }

    fn caller_save_registers(&self) -> &[Register] {
        &self.caller_saved
    }

    fn callee_save_registers(&self) -> &[Register] {
        WINDOW_SAVED
    }

    fn reserved_registers(&self) -> &[Register] {
        &self.reserved
    }
}
