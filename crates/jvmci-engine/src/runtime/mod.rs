//! Runtime entry points
//!
//! [`JvmciRuntime`] ties the pieces together: it reads the host
//! configuration once, chooses the register configuration for the target,
//! owns the metadata context and dispatches compile requests to the one
//! selected compiler.

mod compiler;
mod options;

pub use compiler::{
    select_factory, CompilationRequest, CompilationRequestResult, HotSpotVmEventListener, JvmciCompiler,
    JvmciCompilerFactory,
};
pub use options::JvmciOptions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::bridge::{CompilationStatistics, CompilerToVm, NativeHost, StackFrameInfo};
use crate::code::{CompiledCode, InstallResult, InstalledCode};
use crate::codegen::{register_config_for, RegisterConfig};
use crate::config::{HotSpotVmConfig, VmConfigStore};
use crate::error::{JvmciError, JvmciResult};
use crate::meta::{CompileId, HotSpotResolvedJavaMethod, MetadataContext, MethodPointer};

/// The compiler side of one host VM
pub struct JvmciRuntime {
    options: JvmciOptions,
    c2v: Arc<CompilerToVm>,
    store: VmConfigStore,
    config: Arc<HotSpotVmConfig>,
    register_config: Arc<dyn RegisterConfig>,
    context: MetadataContext,
    factory: Arc<dyn JvmciCompilerFactory>,
    compiler: OnceCell<Arc<dyn JvmciCompiler>>,
    listeners: RwLock<Vec<Arc<dyn HotSpotVmEventListener>>>,
    shutting_down: AtomicBool,
}

impl JvmciRuntime {
    /// Connect to a host and select the compiler
    ///
    /// Every error here is fatal: the configuration does not match this
    /// interface, the architecture is unsupported, or compiler selection is
    /// missing or ambiguous.
    pub fn initialize(
        host: Arc<dyn NativeHost>,
        options: JvmciOptions,
        factories: Vec<Arc<dyn JvmciCompilerFactory>>,
    ) -> JvmciResult<Self> {
        let c2v = Arc::new(CompilerToVm::new(host));
        let store = VmConfigStore::new(c2v.read_configuration()?);
        if options.print_config {
            c2v.write_debug_output(store.dump().as_bytes());
            c2v.flush_debug_output();
        }

        let config = Arc::new(HotSpotVmConfig::from_store(&store).map_err(|err| {
            warn!(%err, "host configuration does not match");
            err
        })?);
        let register_config = register_config_for(&config)?;
        let factory = select_factory(factories, options.compiler.as_deref())?;
        let context = MetadataContext::new(c2v.clone(), config.clone(), options.cleaner_sweep_interval);

        info!(
            arch = register_config.architecture().name,
            compiler = factory.name(),
            compressed_oops = config.use_compressed_oops,
            "JVMCI runtime initialized"
        );
        Ok(JvmciRuntime {
            options,
            c2v,
            store,
            config,
            register_config,
            context,
            factory,
            compiler: OnceCell::new(),
            listeners: RwLock::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Options in effect
    pub fn options(&self) -> &JvmciOptions {
        &self.options
    }

    /// The bridge
    pub fn compiler_to_vm(&self) -> &Arc<CompilerToVm> {
        &self.c2v
    }

    /// Raw configuration entries
    pub fn config_store(&self) -> &VmConfigStore {
        &self.store
    }

    /// Resolved layout facts
    pub fn config(&self) -> &HotSpotVmConfig {
        &self.config
    }

    /// Register configuration of the target
    pub fn register_config(&self) -> &Arc<dyn RegisterConfig> {
        &self.register_config
    }

    /// Metadata wrappers and handle lifetimes
    pub fn context(&self) -> &MetadataContext {
        &self.context
    }

    /// Name of the selected compiler factory
    pub fn compiler_name(&self) -> &str {
        self.factory.name()
    }

    /// The compiler, created on first use
    pub fn compiler(&self) -> Arc<dyn JvmciCompiler> {
        self.compiler.get_or_init(|| self.factory.create_compiler(self)).clone()
    }

    /// Register a listener for install, bootstrap and shutdown events
    pub fn add_listener(&self, listener: Arc<dyn HotSpotVmEventListener>) {
        self.listeners.write().push(listener);
    }

    /// Serve one compile request from the host
    ///
    /// Statistics are recorded for every request, successful or not.
    pub fn compile_method(&self, method: MethodPointer, entry_bci: i32, compile_id: CompileId) -> CompilationRequestResult {
        if self.shutting_down.load(Ordering::Acquire) {
            return CompilationRequestResult::failure("runtime is shutting down", false);
        }
        let started = Instant::now();
        let result = match self.context.resolved_method(method) {
            Ok(method) => {
                let request = CompilationRequest { method, entry_bci, compile_id };
                self.compiler().compile_method(self, &request)
            }
            Err(err) => CompilationRequestResult::failure(err.to_string(), false),
        };

        let stats = CompilationStatistics {
            compile_id: compile_id.as_u64(),
            method,
            processed_bytecodes: result.inlined_bytecodes,
            elapsed_nanos: started.elapsed().as_nanos() as u64,
            installed_code_size: result.installed.as_ref().map_or(0, |code| code.size()),
        };
        self.c2v.record_compilation_statistics(&stats);
        match &result.failure_message {
            None => debug!(id = compile_id.as_u64(), elapsed = stats.elapsed_nanos, "compilation succeeded"),
            Some(message) => debug!(id = compile_id.as_u64(), reason = %message, retry = result.retry, "compilation failed"),
        }
        result
    }

    /// Ask the host to install `code` into `installed`
    ///
    /// Malformed artifacts are rejected with the validation error. Code
    /// larger than [`JvmciOptions::max_code_size`] is refused with
    /// [`InstallResult::CodeTooLarge`] before the host is involved.
    pub fn install(&self, code: &CompiledCode, installed: &InstalledCode) -> JvmciResult<InstallResult> {
        code.code().validate()?;
        let size = code.code().install_size();
        if let Some(max) = self.options.max_code_size {
            if size > max {
                warn!(name = code.name(), size, max, "code exceeds the installation size cap");
                return Ok(InstallResult::CodeTooLarge);
            }
        }

        let result = self.c2v.install_code(code, installed);
        if result.is_ok() {
            if self.options.trace_installs {
                info!(name = code.name(), size, address = installed.address(), "installed code");
            }
            for listener in self.listeners.read().iter() {
                listener.notify_install(code, installed);
            }
        }
        Ok(result)
    }

    /// Validate and install `code`, turning any refusal into a bailout
    pub fn install_code(&self, code: &CompiledCode) -> JvmciResult<Arc<InstalledCode>> {
        let installed = Arc::new(InstalledCode::new(code.name()));
        match self.install(code, &installed)? {
            InstallResult::Ok => Ok(installed),
            InstallResult::CodeCacheFull => {
                Err(JvmciError::Bailout(format!("{}: code cache is full, retry after a sweep", code.name())))
            }
            InstallResult::CodeTooLarge => Err(JvmciError::Bailout(format!(
                "{}: code of {} bytes is too large",
                code.name(),
                code.code().install_size()
            ))),
            InstallResult::DependenciesFailed => {
                Err(JvmciError::Bailout(format!("{}: an assumption no longer holds", code.name())))
            }
            InstallResult::DependenciesInvalid => {
                Err(JvmciError::Bailout(format!("{}: dependencies were invalidated concurrently", code.name())))
            }
        }
    }

    /// Make installed code non-entrant
    pub fn invalidate_installed_code(&self, installed: &InstalledCode) {
        self.c2v.invalidate_installed_code(installed)
    }

    /// Disassembly of installed code, if the host supports it
    pub fn disassemble(&self, installed: &InstalledCode) -> Option<String> {
        self.c2v.disassemble_code_blob(installed)
    }

    /// Discard the profile of a method
    pub fn reprofile(&self, method: &HotSpotResolvedJavaMethod) {
        method.reprofile(&self.context)
    }

    /// Snapshot of the benchmark counters
    pub fn collect_counters(&self) -> Vec<i64> {
        self.c2v.collect_counters()
    }

    /// Zero the benchmark counters
    pub fn reset_counters(&self) {
        self.c2v.reset_counters()
    }

    /// Walk Java frames, skipping `initial_skip` matches
    ///
    /// With an empty `methods` filter every frame matches.
    pub fn stack_frames(&self, methods: &[MethodPointer], initial_skip: usize) -> Vec<StackFrameInfo> {
        let mut frames = Vec::new();
        let mut next = self.c2v.get_next_stack_frame(None, methods, initial_skip);
        while let Some(frame) = next {
            next = self.c2v.get_next_stack_frame(Some(&frame), methods, 0);
            frames.push(frame);
        }
        frames
    }

    /// Reallocate scalar-replaced objects of a frame
    pub fn materialize_virtual_objects(&self, frame: &StackFrameInfo, invalidate: bool) -> StackFrameInfo {
        self.c2v.materialize_virtual_objects(frame, invalidate)
    }

    /// Write to the host log
    pub fn log(&self, message: &str) {
        self.c2v.write_debug_output(message.as_bytes());
    }

    /// Flush the host log
    pub fn flush_log(&self) {
        self.c2v.flush_debug_output()
    }

    /// Host notification: bootstrap done
    pub fn bootstrap_finished(&self) {
        info!("bootstrap finished");
        for listener in self.listeners.read().iter() {
            listener.notify_bootstrap_finished();
        }
    }

    /// Host notification: shutting down
    ///
    /// Later compile requests fail without reaching the compiler. Released
    /// handles are swept one last time.
    pub fn notify_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for listener in self.listeners.read().iter() {
            listener.notify_shutdown();
        }
        let released = self.context.sweep();
        info!(released, "runtime shut down");
    }
}
