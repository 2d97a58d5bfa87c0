//! JVMCI Engine
//!
//! Compiler-side half of the JVM compiler interface. A compiler written
//! against this crate talks to a HotSpot-style host VM through a narrow
//! native bridge:
//! - **Configuration**: the host's exported field offsets, constants and flags (`config` module)
//! - **Metadata**: identity-preserving wrappers over host classes, methods and fields (`meta` module)
//! - **Constant pools**: native decoding of pool entries and the pool cache (`constant_pool` module)
//! - **Code**: compiled artifacts, installation and invalidation (`code` module)
//! - **Register configurations**: calling conventions per target (`codegen` module)
//! - **Speculation**: the failed-speculation log (`speculation` module)
//! - **Runtime**: startup, compiler selection and dispatch (`runtime` module)
//!
//! `hostsim` provides an in-process host for tests and tooling.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jvmci_engine::{hostsim::SimulatedHost, JvmciOptions, JvmciRuntime};
//!
//! let host = Arc::new(SimulatedHost::new());
//! let runtime = JvmciRuntime::initialize(host, JvmciOptions::default(), factories)?;
//! let string = runtime.context().lookup_type("java/lang/String", None, true)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

// ============================================================================
// Core Modules
// ============================================================================

/// Error types shared by every layer
pub mod error;

/// Raw native memory access
pub mod memory;

/// Host VM configuration: exported fields, constants, flags and intrinsics
pub mod config;

/// Native-call bridge into the host VM
pub mod bridge;

/// Metadata wrappers, handles and the handle cleaner
pub mod meta;

/// Constant pool decoding
pub mod constant_pool;

/// Compiled code, sites, reference maps and installed code
pub mod code;

/// Registers, calling conventions and per-target register configurations
pub mod codegen;

/// Speculation log backed by the host's failed-speculation lists
pub mod speculation;

/// Runtime startup and compiler dispatch
pub mod runtime;

/// Simulated in-process host VM
pub mod hostsim;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{JvmciError, JvmciResult};

pub use bridge::{CompilerToVm, NativeHost};

pub use config::{HotSpotVmConfig, VmConfigBundle, VmConfigStore};

pub use meta::{
    // Handles
    CompileId, ConstantPoolPointer, FieldPointer, GlobalHandle, KlassPointer, MethodPointer,
    // Wrappers
    HotSpotResolvedJavaField, HotSpotResolvedJavaMethod, HotSpotResolvedObjectType, JavaField, JavaMethod, JavaType,
    // Constants
    JavaConstant, JavaKind, ObjectConstant,
    // Context
    MetadataContext,
};

pub use constant_pool::{Bytecode, ConstantTag, HotSpotConstantPool, PoolConstant};

pub use code::{Assumption, CompiledCode, HotSpotCompiledCode, InstallResult, InstalledCode};

pub use codegen::{register_config_for, CallingConvention, RegisterConfig};

pub use speculation::{HotSpotSpeculationLog, Speculation, SpeculationReason};

pub use runtime::{
    CompilationRequest, CompilationRequestResult, HotSpotVmEventListener, JvmciCompiler, JvmciCompilerFactory,
    JvmciOptions, JvmciRuntime,
};
