//! Native-call bridge into the host VM
//!
//! [`NativeHost`] is the contract a host implements: one method per remote
//! call. [`CompilerToVm`] is the only way the rest of the crate reaches it.
//! It checks handle arguments in debug builds, emits `tracing` events and
//! serializes the calls whose host subsystems are not reentrant.
//!
//! Passing an invalid handle is a caller error with undefined results. Link
//! failures and other host-reported conditions come back as [`JvmciError`]s.

pub mod types;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

pub use types::{
    CompilationStatistics, ExceptionHandlerEntry, KlassInfo, LineNumberEntry, LocalVariableEntry, MethodInfo,
    PoolKlass, ResolvedFieldInfo, StackFrameInfo,
};

use crate::code::{CompiledCode, InstallResult, InstalledCode};
use crate::config::VmConfigBundle;
use crate::error::{JvmciError, JvmciResult};
use crate::memory::NativeMemory;
use crate::meta::{
    ConstantPoolPointer, FieldPointer, GlobalHandle, HandleKind, HandleReleaser, HostObject, KlassPointer,
    MethodPointer,
};

/// Remote calls the host VM services
pub trait NativeHost: Send + Sync {
    /// Memory holding the host's metadata
    fn memory(&self) -> &dyn NativeMemory;

    /// One-shot read of the configuration bundle
    fn read_configuration(&self) -> JvmciResult<VmConfigBundle>;

    /// Copy of a method's bytecode
    fn get_bytecode(&self, method: MethodPointer) -> Vec<u8>;
    /// Exception handler table of a method
    fn get_exception_table(&self, method: MethodPointer) -> Vec<ExceptionHandlerEntry>;
    /// Line number table of a method
    fn get_line_number_table(&self, method: MethodPointer) -> Vec<LineNumberEntry>;
    /// Local variable table of a method
    fn get_local_variable_table(&self, method: MethodPointer) -> Vec<LocalVariableEntry>;
    /// Static facts about a method
    fn get_method_info(&self, method: MethodPointer) -> MethodInfo;
    /// Static facts about a class
    fn get_klass_info(&self, klass: KlassPointer) -> KlassInfo;
    /// Instance fields declared by a class
    fn get_instance_fields(&self, klass: KlassPointer) -> Vec<FieldPointer>;
    /// Description of a field
    fn get_field_info(&self, field: FieldPointer) -> ResolvedFieldInfo;
    /// Constant pool of an instance class
    fn get_constant_pool(&self, klass: KlassPointer) -> Option<ConstantPoolPointer>;
    /// Whether a class has finished static initialization
    fn is_initialized(&self, klass: KlassPointer) -> bool;

    /// Find a class by internal name, loading it through `accessing` when `resolve` is set
    fn lookup_type(&self, name: &str, accessing: Option<KlassPointer>, resolve: bool)
        -> JvmciResult<Option<KlassPointer>>;
    /// Resolve the class entry at `cpi`; fails with a linkage error
    fn resolve_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> JvmciResult<KlassPointer>;
    /// Class entry at `cpi` without resolving it
    fn lookup_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> PoolKlass;
    /// Resolve a field reference as accessed by `opcode`; fails with a linkage error
    fn resolve_field_in_pool(
        &self,
        cp: ConstantPoolPointer,
        raw_index: i32,
        method: Option<MethodPointer>,
        opcode: u8,
    ) -> JvmciResult<FieldPointer>;
    /// Method referenced by an invoke operand, if linked
    fn lookup_method_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32, opcode: u8) -> Option<MethodPointer>;
    /// Implementation of `method` selected for `receiver`, as seen from `caller`
    fn resolve_method(&self, receiver: KlassPointer, method: MethodPointer, caller: KlassPointer)
        -> Option<MethodPointer>;
    /// Resolve a String, MethodHandle or MethodType entry to its heap object
    fn resolve_possibly_cached_constant_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> JvmciResult<HostObject>;
    /// Link an invokedynamic call site
    fn resolve_invoke_dynamic_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()>;
    /// Link a signature-polymorphic invoke
    fn resolve_invoke_handle_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()>;
    /// Appendix of a linked invokedynamic or invokehandle site
    fn lookup_appendix_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> Option<HostObject>;
    /// Run static initialization of a class
    fn ensure_initialized(&self, klass: KlassPointer) -> JvmciResult<()>;
    /// Resolved references array of a constant pool, once allocated
    fn get_resolved_references(&self, cp: ConstantPoolPointer) -> Option<HostObject>;
    /// Element of a host object array
    fn read_object_array_element(&self, array: GlobalHandle, index: usize) -> Option<HostObject>;

    /// Install code, filling `installed` on success
    fn install_code(&self, code: &CompiledCode, installed: &InstalledCode) -> InstallResult;
    /// Make installed code non-entrant
    fn invalidate_installed_code(&self, installed: &InstalledCode);
    /// Discard profiling data of a method
    fn reprofile(&self, method: MethodPointer);

    /// Disassembly of installed code, if the host has a disassembler
    fn disassemble_code_blob(&self, installed: &InstalledCode) -> Option<String>;
    /// Next Java frame after `previous` whose method is in `methods` (any method when empty)
    fn get_next_stack_frame(
        &self,
        previous: Option<&StackFrameInfo>,
        methods: &[MethodPointer],
        initial_skip: usize,
    ) -> Option<StackFrameInfo>;
    /// Reallocate scalar-replaced objects of a frame
    fn materialize_virtual_objects(&self, frame: &StackFrameInfo, invalidate: bool) -> StackFrameInfo;

    /// Append bytes to the host's log stream
    fn write_debug_output(&self, bytes: &[u8]);
    /// Flush the host's log stream
    fn flush_debug_output(&self);
    /// Snapshot of the benchmark counters
    fn collect_counters(&self) -> Vec<i64>;
    /// Zero the benchmark counters
    fn reset_counters(&self);
    /// Record per-compilation statistics
    fn record_compilation_statistics(&self, stats: &CompilationStatistics);

    /// Allocate an empty failed-speculations list, returning its address
    fn allocate_failed_speculations_list(&self) -> u64;
    /// Encodings currently in a failed-speculations list
    fn get_failed_speculations(&self, list: u64) -> Vec<Vec<u8>>;
    /// Append an encoding; false if it was already present
    fn add_failed_speculation(&self, list: u64, encoding: &[u8]) -> bool;
    /// Free a list allocated by [`NativeHost::allocate_failed_speculations_list`]
    fn release_failed_speculations(&self, list: u64);

    /// Pin a metadata pointer so it survives class unloading; returns the pin slot
    fn allocate_metadata_handle(&self, metadata: u64) -> u64;
    /// Clear a metadata pin slot
    fn release_metadata_handle(&self, handle: u64);
    /// Delete a global reference to a heap object
    fn delete_global_handle(&self, handle: GlobalHandle);
}

/// Checked, traced and partly serialized access to a [`NativeHost`]
pub struct CompilerToVm {
    host: Arc<dyn NativeHost>,
    /// Held across calls into non-reentrant host subsystems
    serial: Mutex<()>,
}

impl CompilerToVm {
    /// Wrap a host
    pub fn new(host: Arc<dyn NativeHost>) -> Self {
        CompilerToVm { host, serial: Mutex::new(()) }
    }

    /// Memory holding the host's metadata
    pub fn memory(&self) -> &dyn NativeMemory {
        self.host.memory()
    }

    /// Read the configuration bundle
    pub fn read_configuration(&self) -> JvmciResult<VmConfigBundle> {
        debug!("readConfiguration");
        self.host.read_configuration()
    }

    /// Copy of a method's bytecode
    pub fn get_bytecode(&self, method: MethodPointer) -> Vec<u8> {
        debug_assert!(!method.is_null(), "null method");
        trace!(?method, "getBytecode");
        self.host.get_bytecode(method)
    }

    /// Exception handler table of a method
    pub fn get_exception_table(&self, method: MethodPointer) -> Vec<ExceptionHandlerEntry> {
        debug_assert!(!method.is_null(), "null method");
        self.host.get_exception_table(method)
    }

    /// Line number table of a method
    pub fn get_line_number_table(&self, method: MethodPointer) -> Vec<LineNumberEntry> {
        debug_assert!(!method.is_null(), "null method");
        self.host.get_line_number_table(method)
    }

    /// Local variable table of a method
    pub fn get_local_variable_table(&self, method: MethodPointer) -> Vec<LocalVariableEntry> {
        debug_assert!(!method.is_null(), "null method");
        self.host.get_local_variable_table(method)
    }

    /// Static facts about a method
    pub fn get_method_info(&self, method: MethodPointer) -> MethodInfo {
        debug_assert!(!method.is_null(), "null method");
        trace!(?method, "getMethodInfo");
        self.host.get_method_info(method)
    }

    /// Static facts about a class
    pub fn get_klass_info(&self, klass: KlassPointer) -> KlassInfo {
        debug_assert!(!klass.is_null(), "null klass");
        trace!(?klass, "getKlassInfo");
        self.host.get_klass_info(klass)
    }

    /// Instance fields declared by a class
    pub fn get_instance_fields(&self, klass: KlassPointer) -> Vec<FieldPointer> {
        debug_assert!(!klass.is_null(), "null klass");
        self.host.get_instance_fields(klass)
    }

    /// Description of a field
    pub fn get_field_info(&self, field: FieldPointer) -> ResolvedFieldInfo {
        debug_assert!(!field.is_null(), "null field");
        self.host.get_field_info(field)
    }

    /// Constant pool of an instance class
    pub fn get_constant_pool(&self, klass: KlassPointer) -> Option<ConstantPoolPointer> {
        debug_assert!(!klass.is_null(), "null klass");
        self.host.get_constant_pool(klass)
    }

    /// Whether a class is initialized
    pub fn is_initialized(&self, klass: KlassPointer) -> bool {
        debug_assert!(!klass.is_null(), "null klass");
        self.host.is_initialized(klass)
    }

    /// Find a class by internal name
    pub fn lookup_type(
        &self,
        name: &str,
        accessing: Option<KlassPointer>,
        resolve: bool,
    ) -> JvmciResult<Option<KlassPointer>> {
        debug!(name, resolve, "lookupType");
        self.host.lookup_type(name, accessing, resolve)
    }

    /// Resolve a class entry
    pub fn resolve_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> JvmciResult<KlassPointer> {
        debug_assert!(!cp.is_null(), "null constant pool");
        debug!(?cp, cpi, "resolveKlassInPool");
        self.host.resolve_klass_in_pool(cp, cpi)
    }

    /// Class entry without resolution
    pub fn lookup_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> PoolKlass {
        debug_assert!(!cp.is_null(), "null constant pool");
        debug!(?cp, cpi, "lookupKlassInPool");
        self.host.lookup_klass_in_pool(cp, cpi)
    }

    /// Resolve a field reference
    pub fn resolve_field_in_pool(
        &self,
        cp: ConstantPoolPointer,
        raw_index: i32,
        method: Option<MethodPointer>,
        opcode: u8,
    ) -> JvmciResult<FieldPointer> {
        debug_assert!(!cp.is_null(), "null constant pool");
        debug!(?cp, raw_index, opcode, "resolveFieldInPool");
        self.host.resolve_field_in_pool(cp, raw_index, method, opcode)
    }

    /// Method referenced by an invoke operand
    pub fn lookup_method_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32, opcode: u8) -> Option<MethodPointer> {
        debug_assert!(!cp.is_null(), "null constant pool");
        debug!(?cp, raw_index, opcode, "lookupMethodInPool");
        self.host.lookup_method_in_pool(cp, raw_index, opcode)
    }

    /// Select the implementation of `method` for `receiver`
    pub fn resolve_method(
        &self,
        receiver: KlassPointer,
        method: MethodPointer,
        caller: KlassPointer,
    ) -> Option<MethodPointer> {
        debug_assert!(!receiver.is_null() && !method.is_null(), "null handle");
        debug!(?receiver, ?method, "resolveMethod");
        self.host.resolve_method(receiver, method, caller)
    }

    /// Resolve an object-valued entry
    pub fn resolve_possibly_cached_constant_in_pool(
        &self,
        cp: ConstantPoolPointer,
        cpi: u32,
    ) -> JvmciResult<HostObject> {
        debug_assert!(!cp.is_null(), "null constant pool");
        debug!(?cp, cpi, "resolvePossiblyCachedConstantInPool");
        self.host.resolve_possibly_cached_constant_in_pool(cp, cpi)
    }

    /// Link an invokedynamic site
    pub fn resolve_invoke_dynamic_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()> {
        debug_assert!(raw_index < 0, "not an invokedynamic operand: {raw_index}");
        debug!(?cp, raw_index, "resolveInvokeDynamicInPool");
        self.host.resolve_invoke_dynamic_in_pool(cp, raw_index)
    }

    /// Link a signature-polymorphic invoke
    pub fn resolve_invoke_handle_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()> {
        debug!(?cp, raw_index, "resolveInvokeHandleInPool");
        self.host.resolve_invoke_handle_in_pool(cp, raw_index)
    }

    /// Appendix of a linked call site
    pub fn lookup_appendix_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> Option<HostObject> {
        debug!(?cp, raw_index, "lookupAppendixInPool");
        self.host.lookup_appendix_in_pool(cp, raw_index)
    }

    /// Run static initialization
    pub fn ensure_initialized(&self, klass: KlassPointer) -> JvmciResult<()> {
        debug_assert!(!klass.is_null(), "null klass");
        debug!(?klass, "ensureInitialized");
        self.host.ensure_initialized(klass)
    }

    /// Resolved references array of a constant pool
    pub fn get_resolved_references(&self, cp: ConstantPoolPointer) -> Option<HostObject> {
        debug_assert!(!cp.is_null(), "null constant pool");
        self.host.get_resolved_references(cp)
    }

    /// Element of a host object array
    pub fn read_object_array_element(&self, array: GlobalHandle, index: usize) -> Option<HostObject> {
        debug_assert!(!array.is_null(), "null array");
        self.host.read_object_array_element(array, index)
    }

    /// Install code; the caller must branch on the result
    pub fn install_code(&self, code: &CompiledCode, installed: &InstalledCode) -> InstallResult {
        debug!(name = code.name(), size = code.code().install_size(), "installCode");
        let result = self.host.install_code(code, installed);
        if !result.is_ok() {
            warn!(name = code.name(), %result, "installation refused");
        }
        result
    }

    /// Make installed code non-entrant
    pub fn invalidate_installed_code(&self, installed: &InstalledCode) {
        debug!(name = installed.name(), "invalidateInstalledCode");
        self.host.invalidate_installed_code(installed)
    }

    /// Discard profiling data
    pub fn reprofile(&self, method: MethodPointer) {
        debug_assert!(!method.is_null(), "null method");
        debug!(?method, "reprofile");
        self.host.reprofile(method)
    }

    /// Disassemble installed code; one call at a time
    pub fn disassemble_code_blob(&self, installed: &InstalledCode) -> Option<String> {
        let _guard = self.serial.lock();
        self.host.disassemble_code_blob(installed)
    }

    /// Next matching Java frame
    pub fn get_next_stack_frame(
        &self,
        previous: Option<&StackFrameInfo>,
        methods: &[MethodPointer],
        initial_skip: usize,
    ) -> Option<StackFrameInfo> {
        self.host.get_next_stack_frame(previous, methods, initial_skip)
    }

    /// Reallocate scalar-replaced objects of a frame
    pub fn materialize_virtual_objects(&self, frame: &StackFrameInfo, invalidate: bool) -> StackFrameInfo {
        debug!(method = ?frame.method, invalidate, "materializeVirtualObjects");
        self.host.materialize_virtual_objects(frame, invalidate)
    }

    /// Append bytes to the host log
    pub fn write_debug_output(&self, bytes: &[u8]) {
        self.host.write_debug_output(bytes)
    }

    /// Flush the host log
    pub fn flush_debug_output(&self) {
        self.host.flush_debug_output()
    }

    /// Snapshot of the benchmark counters
    pub fn collect_counters(&self) -> Vec<i64> {
        self.host.collect_counters()
    }

    /// Zero the benchmark counters
    pub fn reset_counters(&self) {
        self.host.reset_counters()
    }

    /// Record compilation statistics; one call at a time
    pub fn record_compilation_statistics(&self, stats: &CompilationStatistics) {
        let _guard = self.serial.lock();
        self.host.record_compilation_statistics(stats)
    }

    /// Allocate an empty failed-speculations list
    pub fn allocate_failed_speculations_list(&self) -> u64 {
        self.host.allocate_failed_speculations_list()
    }

    /// Encodings in a failed-speculations list
    pub fn get_failed_speculations(&self, list: u64) -> Vec<Vec<u8>> {
        if list == 0 {
            return Vec::new();
        }
        self.host.get_failed_speculations(list)
    }

    /// Append to a failed-speculations list
    pub fn add_failed_speculation(&self, list: u64, encoding: &[u8]) -> JvmciResult<bool> {
        if list == 0 {
            return Err(JvmciError::InvalidState("no failed speculations list".into()));
        }
        Ok(self.host.add_failed_speculation(list, encoding))
    }

    /// Pin a metadata pointer
    pub fn allocate_metadata_handle(&self, metadata: u64) -> u64 {
        debug_assert!(metadata != 0, "null metadata");
        self.host.allocate_metadata_handle(metadata)
    }
}

impl HandleReleaser for CompilerToVm {
    fn release(&self, kind: HandleKind, raw: u64) {
        match kind {
            HandleKind::Metadata => self.host.release_metadata_handle(raw),
            HandleKind::Global => self.host.delete_global_handle(GlobalHandle::new(raw)),
            HandleKind::FailedSpeculations => self.host.release_failed_speculations(raw),
        }
    }
}
