//! Register allocation and calling convention layer
//!
//! Static register tables per architecture plus the argument-location
//! algorithm that must agree bit for bit with the host's calling convention.
//! This layer computes locations only; it never emits code.

pub mod aarch64;
pub mod amd64;
pub mod calling_convention;
pub mod register;
pub mod sparc;
pub mod value;

use std::sync::Arc;

pub use calling_convention::{CallingConvention, CallingConventionType, RegisterConfig};
pub use register::{Architecture, Register, RegisterCategory};
pub use value::{AllocatableValue, LirKind, RegisterValue, StackSlot};

use crate::config::HotSpotVmConfig;
use crate::error::{JvmciError, JvmciResult};

/// Build the register configuration matching the host's `os.arch`
pub fn register_config_for(config: &HotSpotVmConfig) -> JvmciResult<Arc<dyn RegisterConfig>> {
    match config.os_arch.as_str() {
        "amd64" | "x86_64" => Ok(Arc::new(amd64::Amd64RegisterConfig::new(
            config.is_windows(),
            config.use_compressed_oops,
            config.preserve_frame_pointer,
        ))),
        "aarch64" => Ok(Arc::new(aarch64::AArch64RegisterConfig::new(config.use_compressed_oops))),
        "sparcv9" => Ok(Arc::new(sparc::SparcRegisterConfig::new(config.use_compressed_oops))),
        other => Err(JvmciError::MissingService {
            service: "RegisterConfig",
            selected: Some(other.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::JavaKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const KINDS: [JavaKind; 8] = [
        JavaKind::Boolean,
        JavaKind::Byte,
        JavaKind::Char,
        JavaKind::Int,
        JavaKind::Long,
        JavaKind::Float,
        JavaKind::Double,
        JavaKind::Object,
    ];

    fn configs() -> Vec<Arc<dyn RegisterConfig>> {
        vec![
            Arc::new(amd64::Amd64RegisterConfig::new(false, true, false)),
            Arc::new(amd64::Amd64RegisterConfig::new(true, true, true)),
            Arc::new(aarch64::AArch64RegisterConfig::new(true)),
            Arc::new(sparc::SparcRegisterConfig::new(true)),
            Arc::new(sparc::SparcRegisterConfig::new(false)),
        ]
    }

    /// Expected outgoing-area shape of one configuration
    struct StackLayout {
        save_area: i32,
        min_slot: i32,
        native_home: i32,
        native_word_per_parameter: bool,
    }

    fn layouts() -> Vec<(Arc<dyn RegisterConfig>, StackLayout)> {
        let word = |native_home| StackLayout { save_area: 0, min_slot: 8, native_home, native_word_per_parameter: false };
        let sparc = || StackLayout {
            save_area: sparc::REGISTER_SAFE_AREA_SIZE as i32,
            min_slot: 0,
            native_home: 0,
            native_word_per_parameter: true,
        };
        configs().into_iter().zip([word(0), word(32), word(0), sparc(), sparc()]).collect()
    }

    #[test]
    fn test_register_sets_partition_the_file() {
        for config in configs() {
            let arch = config.architecture();
            let mut union: Vec<Register> = config.caller_save_registers().to_vec();
            union.extend_from_slice(config.callee_save_registers());
            union.extend_from_slice(config.reserved_registers());
            for r in arch.registers {
                assert!(union.contains(r), "{} missing {}", arch.name, r);
            }
            for r in config.allocatable_registers() {
                assert!(!config.reserved_registers().contains(r), "{} allocates reserved {}", arch.name, r);
            }
        }
    }

    #[test]
    fn test_parameter_registers_are_not_reserved() {
        let all_types = [
            CallingConventionType::JavaCall,
            CallingConventionType::JavaCallee,
            CallingConventionType::NativeCall,
        ];
        for config in configs() {
            for cc in all_types {
                for kind in [JavaKind::Int, JavaKind::Float, JavaKind::Double] {
                    for r in config.calling_convention_registers(cc, kind) {
                        assert!(!config.reserved_registers().contains(r));
                    }
                }
            }
        }
    }

    #[test]
    fn test_random_signatures_use_disjoint_stack_slots() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let types = [
            CallingConventionType::JavaCall,
            CallingConventionType::JavaCallee,
            CallingConventionType::NativeCall,
        ];

        for (config, layout) in layouts() {
            for _ in 0..200 {
                let len = rng.gen_range(0..=24);
                let params: Vec<JavaKind> = (0..len).map(|_| KINDS[rng.gen_range(0..KINDS.len())]).collect();
                let cc = types[rng.gen_range(0..types.len())];
                let conv = config.calling_convention(cc, JavaKind::Int, &params);
                assert_eq!(conv.argument_locations.len(), params.len());

                let mut used: Vec<(i32, i32)> = Vec::new();
                let mut end = layout.save_area;
                let mut registers = Vec::new();
                for loc in &conv.argument_locations {
                    if let Some(slot) = loc.as_stack_slot() {
                        let size = slot.kind.size_in_bytes as i32;
                        assert_eq!(slot.raw_offset % size, 0, "misaligned slot {loc:?}");
                        assert!(slot.raw_offset >= layout.save_area, "slot {loc:?} inside the save area");
                        for &(start, stop) in &used {
                            assert!(slot.raw_offset >= stop || slot.raw_offset + size <= start, "overlap at {loc:?}");
                        }
                        used.push((slot.raw_offset, slot.raw_offset + size));
                        end = end.max(slot.raw_offset + size.max(layout.min_slot));
                        assert_eq!(slot.add_frame_size, !cc.is_out());
                    } else if let Some(r) = loc.as_register() {
                        assert!(!registers.contains(&r), "register {r} assigned twice");
                        registers.push(r);
                    }
                }

                let stack_size = conv.stack_size as i32;
                if cc != CallingConventionType::NativeCall {
                    assert_eq!(stack_size, end - layout.save_area, "{} {cc:?} {params:?}", config.architecture().name);
                } else if layout.native_word_per_parameter {
                    assert_eq!(stack_size, 8 * params.len() as i32, "{params:?}");
                    assert!(end - layout.save_area <= stack_size);
                } else {
                    let expected = (end - layout.save_area).max(layout.native_home);
                    assert_eq!(stack_size, expected, "{} {params:?}", config.architecture().name);
                }
            }
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_void_parameter_gets_no_location() {
        for config in configs() {
            for cc in [CallingConventionType::JavaCall, CallingConventionType::NativeCall] {
                let conv = config.calling_convention(cc, JavaKind::Void, &[JavaKind::Int, JavaKind::Void]);
                assert_eq!(conv.argument_locations[1], AllocatableValue::Illegal);
                assert!(conv.argument_locations[0].as_register().is_some());
            }
        }
    }

    #[test]
    fn test_stack_only_after_category_exhausted() {
        for config in configs() {
            for cc in [CallingConventionType::JavaCall, CallingConventionType::JavaCallee] {
                let general = config.calling_convention_registers(cc, JavaKind::Long).len();
                let params = vec![JavaKind::Long; general + 2];
                let conv = config.calling_convention(cc, JavaKind::Void, &params);
                assert!(conv.argument_locations[..general].iter().all(|l| l.as_register().is_some()));
                assert!(conv.argument_locations[general..].iter().all(|l| l.as_stack_slot().is_some()));
                assert_eq!(conv.stack_argument_count(), 2);
            }
        }
    }
}
