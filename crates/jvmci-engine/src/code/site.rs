//! Site metadata attached to positions in emitted code

use super::reference_map::HotSpotReferenceMap;
use crate::meta::{JavaConstant, KlassPointer, MethodPointer};

/// Source position: method and bytecode index, plus the inlining caller chain
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodePosition {
    /// Method at this level
    pub method: MethodPointer,
    /// Bytecode index within `method`
    pub bci: i32,
    /// Position of the call site this method was inlined into
    pub caller: Option<Box<BytecodePosition>>,
}

impl BytecodePosition {
    /// A top-level position
    pub fn new(method: MethodPointer, bci: i32) -> Self {
        BytecodePosition { method, bci, caller: None }
    }

    /// Nest this position inside `caller`
    pub fn inlined_into(mut self, caller: BytecodePosition) -> Self {
        self.caller = Some(Box::new(caller));
        self
    }

    /// Number of inlining levels, 1 for a top-level position
    pub fn depth(&self) -> usize {
        1 + self.caller.as_ref().map_or(0, |c| c.depth())
    }
}

/// Deoptimization and GC state at a safepoint
#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    /// Source position to resume at
    pub position: Option<BytecodePosition>,
    /// Live references
    pub reference_map: Option<HotSpotReferenceMap>,
}

/// Why an infopoint was emitted
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InfopointReason {
    /// Safepoint poll
    Safepoint,
    /// Call site
    Call,
    /// Instruction that may raise an implicit exception
    ImplicitException,
    /// Start of the method
    MethodStart,
    /// End of the method
    MethodEnd,
    /// Pure position marker
    BytecodePosition,
}

/// Target of a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// A Java method
    Method(MethodPointer),
    /// A runtime stub at a fixed address
    ForeignCall(u64),
}

/// Value referenced by a data patch
#[derive(Debug, Clone, PartialEq)]
pub enum PatchReference {
    /// Offset into the data section
    Data {
        /// Byte offset in the data section
        offset: u32,
    },
    /// Inline constant
    Constant(JavaConstant),
    /// Metaspace pointer to a klass
    Klass(KlassPointer),
    /// Metaspace pointer to a method
    Method(MethodPointer),
}

/// Well-known positions the host needs to find in the code
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MarkId {
    /// Entry after the inline cache check
    VerifiedEntry,
    /// Entry including the inline cache check
    UnverifiedEntry,
    /// On-stack-replacement entry
    OsrEntry,
    /// Exception handler stub entry
    ExceptionHandlerEntry,
    /// Deoptimization handler stub entry
    DeoptHandlerEntry,
    /// Start of the frame setup
    FrameComplete,
    /// Invokeinterface call
    InvokeInterface,
    /// Invokevirtual call
    InvokeVirtual,
    /// Invokestatic call
    InvokeStatic,
    /// Invokespecial call
    InvokeSpecial,
    /// Safepoint polling instruction
    PollNear,
}

/// Metadata for one position in the emitted code
#[derive(Debug, Clone, PartialEq)]
pub enum Site {
    /// A call instruction
    Call {
        /// Offset of the call instruction
        pc_offset: u32,
        /// Size of the call instruction in bytes
        size: u32,
        /// Callee
        target: CallTarget,
        /// Whether the call binds statically
        direct: bool,
        /// State at the call
        debug_info: Option<DebugInfo>,
    },
    /// A safepoint or other debug-info point
    Infopoint {
        /// Offset of the instruction
        pc_offset: u32,
        /// Why the point exists
        reason: InfopointReason,
        /// State at the point
        debug_info: DebugInfo,
    },
    /// An instruction embedding a patched value
    DataPatch {
        /// Offset of the instruction
        pc_offset: u32,
        /// Patched value
        reference: PatchReference,
    },
    /// A well-known position
    Mark {
        /// Offset of the marked instruction
        pc_offset: u32,
        /// What is marked
        id: MarkId,
    },
    /// An exception edge
    ExceptionHandler {
        /// Offset of the throwing instruction
        pc_offset: u32,
        /// Offset of the handler
        handler_pos: u32,
    },
}

impl Site {
    /// Offset in the code this site describes
    pub fn pc_offset(&self) -> u32 {
        match self {
            Site::Call { pc_offset, .. }
            | Site::Infopoint { pc_offset, .. }
            | Site::DataPatch { pc_offset, .. }
            | Site::Mark { pc_offset, .. }
            | Site::ExceptionHandler { pc_offset, .. } => *pc_offset,
        }
    }

    /// Debug info carried by the site, if any
    pub fn debug_info(&self) -> Option<&DebugInfo> {
        match self {
            Site::Call { debug_info, .. } => debug_info.as_ref(),
            Site::Infopoint { debug_info, .. } => Some(debug_info),
            _ => None,
        }
    }
}
