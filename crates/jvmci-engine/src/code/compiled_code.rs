//! The compiled code artifact handed to the host for installation

use super::site::Site;
use crate::codegen::StackSlot;
use crate::error::{JvmciError, JvmciResult};
use crate::meta::{CompileId, GlobalHandle, KlassPointer, MethodPointer};

/// A property of the class hierarchy the code relies on; re-checked at install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assumption {
    /// `receiver_type` has no subclass with a finalizer
    NoFinalizableSubclass {
        /// Type whose subclasses are checked
        receiver_type: KlassPointer,
    },
    /// `subtype` is the only concrete subtype of `context`
    ConcreteSubtype {
        /// Root of the hierarchy
        context: KlassPointer,
        /// The single concrete subtype
        subtype: KlassPointer,
    },
    /// `context` has no subtypes
    LeafType {
        /// The leaf type
        context: KlassPointer,
    },
    /// `implementation` is the only implementation of `method` below `context`
    ConcreteMethod {
        /// Virtual method
        method: MethodPointer,
        /// Receiver type bounding the search
        context: KlassPointer,
        /// The single implementation
        implementation: MethodPointer,
    },
    /// A call site's target has not changed
    CallSiteTargetValue {
        /// The call site object
        call_site: GlobalHandle,
        /// Its target when compiled
        method_handle: GlobalHandle,
    },
}

/// Instruction bytes, data and metadata for one unit of generated code
#[derive(Debug, Clone, PartialEq)]
pub struct HotSpotCompiledCode {
    /// Name used in logs and disassembly
    pub name: String,
    /// Instruction bytes
    pub target_code: Vec<u8>,
    /// Number of meaningful bytes in `target_code`
    pub target_code_size: usize,
    /// Sites sorted by pc offset
    pub sites: Vec<Site>,
    /// Hierarchy assumptions validated at install
    pub assumptions: Vec<Assumption>,
    /// Methods inlined into this code (for dependency tracking)
    pub methods: Vec<MethodPointer>,
    /// Read-only data section
    pub data_section: Vec<u8>,
    /// Required alignment of the data section (power of two)
    pub data_section_alignment: usize,
    /// Patches inside the data section
    pub data_section_patches: Vec<Site>,
    /// Frame size including the return address
    pub total_frame_size: i32,
    /// Slot the deoptimization handler uses to save the original pc
    pub deopt_rescue_slot: Option<StackSlot>,
}

impl HotSpotCompiledCode {
    /// Code with no sites, data or assumptions
    pub fn new(name: impl Into<String>, target_code: Vec<u8>, total_frame_size: i32) -> Self {
        let target_code_size = target_code.len();
        HotSpotCompiledCode {
            name: name.into(),
            target_code,
            target_code_size,
            sites: Vec::new(),
            assumptions: Vec::new(),
            methods: Vec::new(),
            data_section: Vec::new(),
            data_section_alignment: 1,
            data_section_patches: Vec::new(),
            total_frame_size,
            deopt_rescue_slot: None,
        }
    }

    /// Bytes the installed blob will occupy
    pub fn install_size(&self) -> usize {
        self.target_code_size + self.data_section.len()
    }

    /// Check the structural contract before the host sees the artifact
    pub fn validate(&self) -> JvmciResult<()> {
        if self.target_code_size > self.target_code.len() {
            return Err(JvmciError::Bailout(format!(
                "{}: declared code size {} exceeds {} code bytes",
                self.name,
                self.target_code_size,
                self.target_code.len()
            )));
        }
        if !self.data_section_alignment.is_power_of_two() {
            return Err(JvmciError::Bailout(format!(
                "{}: data section alignment {} is not a power of two",
                self.name, self.data_section_alignment
            )));
        }
        let mut previous = 0;
        for site in &self.sites {
            let pc = site.pc_offset();
            if pc as usize > self.target_code_size {
                return Err(JvmciError::Bailout(format!("{}: site at {pc} is outside the code", self.name)));
            }
            if pc < previous {
                return Err(JvmciError::Bailout(format!("{}: sites are not sorted at {pc}", self.name)));
            }
            previous = pc;
        }
        for patch in &self.data_section_patches {
            if patch.pc_offset() as usize >= self.data_section.len() {
                return Err(JvmciError::Bailout(format!(
                    "{}: data patch at {} is outside the data section",
                    self.name,
                    patch.pc_offset()
                )));
            }
        }
        Ok(())
    }
}

/// Compiled code for a Java method
#[derive(Debug, Clone, PartialEq)]
pub struct HotSpotCompiledNmethod {
    /// The generated code
    pub code: HotSpotCompiledCode,
    /// Root method
    pub method: MethodPointer,
    /// Entry bci: -1 for a normal entry, otherwise an OSR entry
    pub entry_bci: i32,
    /// Compile request that produced the code
    pub compile_id: CompileId,
    /// Flattened speculation encodings referenced by the code
    pub speculations: Option<Vec<u8>>,
    /// Failed-speculations list deoptimizations should append to
    pub failed_speculations_address: u64,
}

/// Entry bci of a normal (non-OSR) compilation
pub const INVOCATION_ENTRY_BCI: i32 = -1;

/// An installable artifact
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledCode {
    /// A runtime stub with no Java method
    Stub(HotSpotCompiledCode),
    /// A Java method
    Nmethod(HotSpotCompiledNmethod),
}

impl CompiledCode {
    /// The generated code
    pub fn code(&self) -> &HotSpotCompiledCode {
        match self {
            CompiledCode::Stub(code) => code,
            CompiledCode::Nmethod(nm) => &nm.code,
        }
    }

    /// Root method, if this is an nmethod
    pub fn method(&self) -> Option<MethodPointer> {
        match self {
            CompiledCode::Nmethod(nm) => Some(nm.method),
            CompiledCode::Stub(_) => None,
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.code().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::site::MarkId;

    #[test]
    fn test_validate_accepts_well_formed_code() {
        let mut code = HotSpotCompiledCode::new("stub", vec![0x90; 16], 16);
        code.sites.push(Site::Mark { pc_offset: 0, id: MarkId::VerifiedEntry });
        code.sites.push(Site::Mark { pc_offset: 8, id: MarkId::FrameComplete });
        assert!(code.validate().is_ok());
        assert_eq!(code.install_size(), 16);
    }

    #[test]
    fn test_validate_rejects_unsorted_sites() {
        let mut code = HotSpotCompiledCode::new("stub", vec![0x90; 16], 16);
        code.sites.push(Site::Mark { pc_offset: 8, id: MarkId::VerifiedEntry });
        code.sites.push(Site::Mark { pc_offset: 4, id: MarkId::FrameComplete });
        assert!(matches!(code.validate(), Err(JvmciError::Bailout(_))));
    }

    #[test]
    fn test_validate_rejects_bad_alignment_and_size() {
        let mut code = HotSpotCompiledCode::new("stub", vec![0; 4], 16);
        code.data_section_alignment = 3;
        assert!(code.validate().is_err());

        let mut code = HotSpotCompiledCode::new("stub", vec![0; 4], 16);
        code.target_code_size = 5;
        assert!(code.validate().is_err());
    }

    #[test]
    fn test_compiled_code_accessors() {
        let nm = CompiledCode::Nmethod(HotSpotCompiledNmethod {
            code: HotSpotCompiledCode::new("m", vec![0xc3], 8),
            method: MethodPointer::new(0x40),
            entry_bci: INVOCATION_ENTRY_BCI,
            compile_id: CompileId::from_u64(3),
            speculations: None,
            failed_speculations_address: 0,
        });
        assert_eq!(nm.method(), Some(MethodPointer::new(0x40)));
        assert_eq!(nm.name(), "m");
        assert_eq!(CompiledCode::Stub(HotSpotCompiledCode::new("s", vec![], 0)).method(), None);
    }
}
