//! AArch64 register configuration

#![allow(non_upper_case_globals)]

use super::calling_convention::{
    without, CallingConvention, CallingConventionType, RegisterConfig, StackArgumentAllocator,
};
use super::register::{Architecture, Register, RegisterCategory::*};
use super::value::AllocatableValue;
use crate::meta::JavaKind;

macro_rules! cpu_registers {
    ($($name:ident = $n:literal),* $(,)?) => {
        $(pub const $name: Register = Register::new($n, $n, stringify!($name), Cpu);)*
    };
}

macro_rules! simd_registers {
    ($($name:ident = $n:literal),* $(,)?) => {
        $(pub const $name: Register = Register::new(32 + $n, $n, stringify!($name), Simd);)*
    };
}

cpu_registers!(
    r0 = 0, r1 = 1, r2 = 2, r3 = 3, r4 = 4, r5 = 5, r6 = 6, r7 = 7,
    r8 = 8, r9 = 9, r10 = 10, r11 = 11, r12 = 12, r13 = 13, r14 = 14, r15 = 15,
    r16 = 16, r17 = 17, r18 = 18, r19 = 19, r20 = 20, r21 = 21, r22 = 22, r23 = 23,
    r24 = 24, r25 = 25, r26 = 26, r27 = 27, r28 = 28, r29 = 29, r30 = 30, sp = 31,
);

simd_registers!(
    v0 = 0, v1 = 1, v2 = 2, v3 = 3, v4 = 4, v5 = 5, v6 = 6, v7 = 7,
    v8 = 8, v9 = 9, v10 = 10, v11 = 11, v12 = 12, v13 = 13, v14 = 14, v15 = 15,
    v16 = 16, v17 = 17, v18 = 18, v19 = 19, v20 = 20, v21 = 21, v22 = 22, v23 = 23,
    v24 = 24, v25 = 25, v26 = 26, v27 = 27, v28 = 28, v29 = 29, v30 = 30, v31 = 31,
);

const ALL: &[Register] = &[
    r0, r1, r2, r3, r4, r5, r6, r7, r8, r9, r10, r11, r12, r13, r14, r15,
    r16, r17, r18, r19, r20, r21, r22, r23, r24, r25, r26, r27, r28, r29, r30, sp,
    v0, v1, v2, v3, v4, v5, v6, v7, v8, v9, v10, v11, v12, v13, v14, v15,
    v16, v17, v18, v19, v20, v21, v22, v23, v24, v25, v26, v27, v28, v29, v30, v31,
];

/// AArch64 architecture description
pub static AARCH64: Architecture = Architecture {
    name: "aarch64",
    word_size: 8,
    registers: ALL,
    return_address_size: 0,
    stack_alignment: 16,
};

/// Scratch registers used by the macro assembler
pub const RSCRATCH1: Register = r8;
/// Second scratch register
pub const RSCRATCH2: Register = r9;
/// Compressed-oops heap base register
pub const HEAP_BASE_REGISTER: Register = r27;
/// Thread register holding the current `JavaThread*`
pub const THREAD_REGISTER: Register = r28;
/// Frame pointer
pub const FP: Register = r29;
/// Link register
pub const LR: Register = r30;

const JAVA_GENERAL_PARAMETERS: &[Register] = &[r1, r2, r3, r4, r5, r6, r7, r0];
const NATIVE_GENERAL_PARAMETERS: &[Register] = &[r0, r1, r2, r3, r4, r5, r6, r7];
const SIMD_PARAMETERS: &[Register] = &[v0, v1, v2, v3, v4, v5, v6, v7];

/// Register configuration for HotSpot on AArch64
pub struct AArch64RegisterConfig {
    reserved: Vec<Register>,
    allocatable: Vec<Register>,
}

impl AArch64RegisterConfig {
    /// Build the configuration for the given host settings
    pub fn new(use_compressed_oops: bool) -> Self {
        let mut reserved = vec![RSCRATCH1, RSCRATCH2, THREAD_REGISTER, FP, LR, sp];
        if use_compressed_oops {
            reserved.push(HEAP_BASE_REGISTER);
        }
        let allocatable = without(ALL, &reserved);
        AArch64RegisterConfig { reserved, allocatable }
    }

    fn general_parameters(cc: CallingConventionType) -> &'static [Register] {
        match cc {
            CallingConventionType::NativeCall => NATIVE_GENERAL_PARAMETERS,
            _ => JAVA_GENERAL_PARAMETERS,
        }
    }
}

impl RegisterConfig for AArch64RegisterConfig {
    fn architecture(&self) -> &'static Architecture {
        &AARCH64
    }

    fn return_register(&self, kind: JavaKind, _cc: CallingConventionType) -> Option<Register> {
        match kind.stack_kind() {
            JavaKind::Int | JavaKind::Long | JavaKind::Object => Some(r0),
            JavaKind::Float | JavaKind::Double => Some(v0),
            _ => None,
        }
    }

    fn frame_register(&self) -> Register {
        sp
    }

    fn calling_convention(
        &self,
        cc: CallingConventionType,
        return_kind: JavaKind,
        parameters: &[JavaKind],
    ) -> CallingConvention {
        let general = Self::general_parameters(cc);
        let mut stack = StackArgumentAllocator::new(cc, 0, AARCH64.word_size);
        let mut next_general = 0;
        let mut next_simd = 0;
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
                JavaKind::Float | JavaKind::Double => {
                    next_simd += 1;
                    SIMD_PARAMETERS.get(next_simd - 1).copied()
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
            JavaKind::Int | JavaKind::Long | JavaKind::Object => Self::general_parameters(cc),
            JavaKind::Float | JavaKind::Double => SIMD_PARAMETERS,
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

#[cfg(test)]
mod tests {
    use super::*;
    use JavaKind::*;

    #[test]
    fn test_java_receiver_in_r1() {
        let config = AArch64RegisterConfig::new(true);
        let cc = config.calling_convention(CallingConventionType::JavaCallee, Object, &[Object, Int, Float]);
        assert_eq!(cc.argument_locations[0].as_register(), Some(r1));
        assert_eq!(cc.argument_locations[1].as_register(), Some(r2));
        assert_eq!(cc.argument_locations[2].as_register(), Some(v0));
        assert_eq!(cc.return_location.as_register(), Some(r0));
    }

    #[test]
    fn test_native_starts_at_r0() {
        let config = AArch64RegisterConfig::new(true);
        let cc = config.calling_convention(CallingConventionType::NativeCall, Void, &[Long, Long]);
        assert_eq!(cc.argument_locations[0].as_register(), Some(r0));
        assert_eq!(cc.argument_locations[1].as_register(), Some(r1));
    }

    #[test]
    fn test_ninth_general_argument_spills() {
        let config = AArch64RegisterConfig::new(false);
        let params = vec![Long; 10];
        let cc = config.calling_convention(CallingConventionType::JavaCall, Void, &params);
        assert_eq!(cc.argument_locations[7].as_register(), Some(r0));
        assert_eq!(cc.argument_locations[8].as_stack_slot().unwrap().raw_offset, 0);
        assert_eq!(cc.argument_locations[9].as_stack_slot().unwrap().raw_offset, 8);
        assert_eq!(cc.stack_size, 16);
    }

    #[test]
    fn test_reserved_registers() {
        let config = AArch64RegisterConfig::new(true);
        for r in [r8, r9, r27, r28, r29, r30, sp] {
            assert!(config.reserved_registers().contains(&r));
            assert!(!config.allocatable_registers().contains(&r));
        }
        assert!(AArch64RegisterConfig::new(false).allocatable_registers().contains(&r27));
        assert_eq!(AARCH64.register("v3"), Some(v3));
    }
}
