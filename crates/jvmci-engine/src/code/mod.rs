//! Compiled code artifacts, reference maps and installation results

pub mod compiled_code;
pub mod installed;
pub mod reference_map;
pub mod site;

pub use compiled_code::{
    Assumption, CompiledCode, HotSpotCompiledCode, HotSpotCompiledNmethod, INVOCATION_ENTRY_BCI,
};
pub use installed::{InstallResult, InstalledCode};
pub use reference_map::{HotSpotReferenceMap, Location, ReferenceMapBuilder};
pub use site::{BytecodePosition, CallTarget, DebugInfo, InfopointReason, MarkId, PatchReference, Site};
