//! Runtime Tests
//!
//! Startup against a simulated host and the services the runtime offers a
//! compiler:
//! - Compiler selection and fatal configuration mismatches
//! - Compile dispatch, statistics and code installation
//! - Installation refusals: size caps, full code cache, broken assumptions
//! - Stack walking, counters, logging and shutdown

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{factory, runtime, runtime_with, Fixture, RefusingCompiler};
use jvmci_engine::code::{HotSpotCompiledNmethod, INVOCATION_ENTRY_BCI};
use jvmci_engine::hostsim::{ClassDef, HostSettings, SimulatedHost};
use jvmci_engine::meta::{ACC_ABSTRACT, ACC_PUBLIC};
use jvmci_engine::{
    Assumption, CompilationRequest, CompilationRequestResult, CompileId, CompiledCode, HotSpotCompiledCode,
    HotSpotVmEventListener, InstallResult, InstalledCode, JvmciCompiler, JvmciCompilerFactory, JvmciError,
    JvmciOptions, JvmciRuntime,
};
use parking_lot::Mutex;

/// Compiler that installs `code_size` bytes of padding for every request
struct InstallingCompiler {
    code_size: usize,
    calls: AtomicUsize,
}

impl InstallingCompiler {
    fn new(code_size: usize) -> Arc<Self> {
        Arc::new(InstallingCompiler { code_size, calls: AtomicUsize::new(0) })
    }
}

impl JvmciCompiler for InstallingCompiler {
    fn compile_method(&self, runtime: &JvmciRuntime, request: &CompilationRequest) -> CompilationRequestResult {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let nmethod = HotSpotCompiledNmethod {
            code: HotSpotCompiledCode::new(request.method.name(), vec![0x90; self.code_size], 16),
            method: request.method.pointer(),
            entry_bci: request.entry_bci,
            compile_id: request.compile_id,
            speculations: None,
            failed_speculations_address: 0,
        };
        match runtime.install_code(&CompiledCode::Nmethod(nmethod)) {
            Ok(installed) => CompilationRequestResult::success(installed, request.method.code_size() as u64),
            Err(err) => CompilationRequestResult::failure(err.to_string(), false),
        }
    }
}

#[derive(Default)]
struct RecordingListener {
    installs: Mutex<Vec<String>>,
    bootstraps: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl HotSpotVmEventListener for RecordingListener {
    fn notify_install(&self, code: &CompiledCode, _installed: &InstalledCode) {
        self.installs.lock().push(code.name().to_string());
    }

    fn notify_bootstrap_finished(&self) {
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
    }

    fn notify_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
    }
}

fn stub(name: &str, size: usize) -> CompiledCode {
    CompiledCode::Stub(HotSpotCompiledCode::new(name, vec![0xcc; size], 16))
}

/// Startup error, if any
fn startup_error(host: SimulatedHost, options: JvmciOptions) -> Option<JvmciError> {
    let factories: Vec<Arc<dyn JvmciCompilerFactory>> = vec![factory("test", Arc::new(RefusingCompiler))];
    JvmciRuntime::initialize(Arc::new(host), options, factories).err()
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_single_compiler_is_selected() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    assert_eq!(rt.compiler_name(), "test");
    assert_eq!(rt.register_config().architecture().name, "amd64");
    assert!(rt.config().use_compressed_oops);
}

#[test]
fn test_ambiguous_compilers_are_fatal() {
    let host = Arc::new(SimulatedHost::new());
    let factories: Vec<Arc<dyn JvmciCompilerFactory>> =
        vec![factory("graal", Arc::new(RefusingCompiler)), factory("c1x", Arc::new(RefusingCompiler))];
    let err = JvmciRuntime::initialize(host.clone(), JvmciOptions::default(), factories).err();
    match err {
        Some(err @ JvmciError::AmbiguousService { .. }) => assert!(err.is_fatal()),
        other => panic!("expected an ambiguity error, got {other:?}"),
    }

    let options = JvmciOptions { compiler: Some("c1x".to_string()), ..Default::default() };
    let c1x = factory("c1x", Arc::new(RefusingCompiler));
    let rt = runtime_with(&host, options, vec![factory("graal", Arc::new(RefusingCompiler)), c1x.clone()]);
    assert_eq!(rt.compiler_name(), "c1x");
    assert_eq!(c1x.created.load(Ordering::Relaxed), 0, "compiler is created on first use");
}

#[test]
fn test_missing_config_entry_is_fatal() {
    let settings = HostSettings { omitted: vec!["ConstantPool::_tags".to_string()], ..Default::default() };
    match startup_error(SimulatedHost::with_settings(settings), JvmciOptions::default()) {
        Some(JvmciError::MissingConfig { kind, name }) => {
            assert_eq!(kind, "field");
            assert_eq!(name, "ConstantPool::_tags");
        }
        other => panic!("expected a missing field, got {other:?}"),
    }
}

#[test]
fn test_unsupported_architecture_is_fatal() {
    let settings = HostSettings { os_arch: "mips".to_string(), ..Default::default() };
    let err = startup_error(SimulatedHost::with_settings(settings), JvmciOptions::default());
    assert!(matches!(err, Some(JvmciError::MissingService { service: "RegisterConfig", .. })), "{err:?}");
}

#[test]
fn test_print_config_writes_to_host_log() {
    let fx = Fixture::new();
    let options = JvmciOptions { print_config: true, ..Default::default() };
    let _rt = runtime_with(&fx.host, options, vec![factory("test", Arc::new(RefusingCompiler))]);
    let output = fx.host.debug_output();
    assert!(output.contains("[vmconfig:fields]"), "{output}");
    assert!(output.contains("ConstantPool::_tags"));
    assert!(fx.host.flush_count() >= 1);
}

// ============================================================================
// Compilation and installation
// ============================================================================

#[test]
fn test_compile_installs_and_notifies() {
    let fx = Fixture::new();
    let compiler = InstallingCompiler::new(48);
    let test_factory = factory("test", compiler.clone());
    let rt = runtime_with(&fx.host, JvmciOptions::default(), vec![test_factory.clone()]);
    let listener = Arc::new(RecordingListener::default());
    rt.add_listener(listener.clone());

    let length = fx.host.method(fx.point, "length", "()D").unwrap();
    let result = rt.compile_method(length, INVOCATION_ENTRY_BCI, CompileId::from_u64(7));
    assert!(result.is_success(), "{:?}", result.failure_message);
    let installed = result.installed.clone().unwrap();
    assert!(installed.is_valid());
    assert_eq!(installed.size(), 48);
    assert!(fx.host.code_cache().contains(installed.address()));
    assert_eq!(*listener.installs.lock(), vec!["length".to_string()]);

    let stats = fx.host.compilation_statistics();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].compile_id, 7);
    assert_eq!(stats[0].method, length);
    assert_eq!(stats[0].processed_bytecodes, 2);
    assert_eq!(stats[0].installed_code_size, 48);

    rt.compile_method(length, INVOCATION_ENTRY_BCI, CompileId::from_u64(8));
    assert_eq!(test_factory.created.load(Ordering::Relaxed), 1);
    assert_eq!(compiler.calls.load(Ordering::Relaxed), 2);
}

#[test]
fn test_failed_compile_still_records_statistics() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let origin = fx.host.method(fx.point, "origin", "()Lp/Point;").unwrap();

    let result = rt.compile_method(origin, INVOCATION_ENTRY_BCI, CompileId::from_u64(3));
    assert!(!result.is_success());
    assert!(result.installed.is_none());
    let stats = fx.host.compilation_statistics();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].installed_code_size, 0);
}

#[test]
fn test_size_cap_refuses_before_the_host() {
    let fx = Fixture::new();
    let options = JvmciOptions { max_code_size: Some(64), ..Default::default() };
    let rt = runtime_with(&fx.host, options, vec![factory("test", Arc::new(RefusingCompiler))]);

    let big = stub("big", 128);
    assert_eq!(rt.install(&big, &InstalledCode::new("big")).unwrap(), InstallResult::CodeTooLarge);
    assert_eq!(fx.host.code_cache().entry_count(), 0);
    assert!(matches!(rt.install_code(&big), Err(JvmciError::Bailout(msg)) if msg.contains("too large")));

    assert!(rt.install_code(&stub("small", 32)).is_ok());
    assert_eq!(fx.host.code_cache().entry_count(), 1);
}

#[test]
fn test_malformed_artifact_is_rejected_before_the_host() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let mut artifact = HotSpotCompiledCode::new("short", vec![0xcc; 8], 16);
    artifact.target_code_size = 32;
    let code = CompiledCode::Stub(artifact);
    let installed = InstalledCode::new("short");

    assert!(matches!(rt.install(&code, &installed), Err(JvmciError::Bailout(msg)) if msg.contains("declared code size")));
    assert!(matches!(rt.install_code(&code), Err(JvmciError::Bailout(_))));
    assert!(!installed.is_alive());
    assert_eq!(fx.host.code_cache().entry_count(), 0);
}

#[test]
fn test_host_size_limit_is_enforced() {
    let settings = HostSettings { nmethod_size_limit: 100, ..Default::default() };
    let fx = Fixture::with_host(SimulatedHost::with_settings(settings));
    let rt = runtime(&fx.host);

    assert_eq!(rt.install(&stub("big", 128), &InstalledCode::new("big")).unwrap(), InstallResult::CodeTooLarge);
    assert_eq!(fx.host.code_cache().entry_count(), 0);
}

#[test]
fn test_full_code_cache_is_retryable() {
    let settings = HostSettings { code_cache_capacity: 64, ..Default::default() };
    let fx = Fixture::with_host(SimulatedHost::with_settings(settings));
    let rt = runtime(&fx.host);

    assert!(rt.install_code(&stub("first", 48)).is_ok());
    let installed = InstalledCode::new("second");
    let result = rt.install(&stub("second", 48), &installed).unwrap();
    assert_eq!(result, InstallResult::CodeCacheFull);
    assert!(result.is_retryable());
    assert!(!installed.is_alive());
}

#[test]
fn test_assumptions_are_checked_at_install() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let shape = fx.host.define_class(ClassDef::new("p/Shape").extends(fx.object).modifiers(ACC_PUBLIC | ACC_ABSTRACT));
    let circle = fx.host.define_class(ClassDef::new("p/Circle").extends(shape).modifiers(ACC_PUBLIC));

    let with = |name: &str, assumption: Assumption| {
        let mut code = HotSpotCompiledCode::new(name, vec![0x90; 16], 16);
        code.assumptions.push(assumption);
        CompiledCode::Stub(code)
    };
    let concrete = with("concrete", Assumption::ConcreteSubtype { context: shape, subtype: circle });
    let leaf = with("leaf", Assumption::LeafType { context: circle });
    let no_finalizer = with("finalizer", Assumption::NoFinalizableSubclass { receiver_type: shape });

    assert!(rt.install_code(&concrete).is_ok());
    assert!(rt.install_code(&leaf).is_ok());
    assert!(rt.install_code(&no_finalizer).is_ok());

    fx.host.define_class(ClassDef::new("p/Square").extends(shape).modifiers(ACC_PUBLIC).finalizer());
    assert_eq!(rt.install(&concrete, &InstalledCode::new("concrete")).unwrap(), InstallResult::DependenciesFailed);
    assert_eq!(rt.install(&no_finalizer, &InstalledCode::new("finalizer")).unwrap(), InstallResult::DependenciesFailed);
    assert!(rt.install_code(&leaf).is_ok(), "circle is still a leaf");

    fx.host.set_redefining(true);
    assert_eq!(rt.install(&leaf, &InstalledCode::new("leaf")).unwrap(), InstallResult::DependenciesInvalid);
    assert!(rt.install_code(&stub("plain", 16)).is_ok(), "code without assumptions is unaffected");
}

#[test]
fn test_invalidate_and_disassemble() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let installed = rt.install_code(&stub("blob", 20)).unwrap();

    let listing = rt.disassemble(&installed).unwrap();
    assert!(listing.starts_with("; blob\n"), "{listing}");
    assert_eq!(listing.lines().count(), 3);

    rt.invalidate_installed_code(&installed);
    assert!(!installed.is_valid());
    assert!(installed.is_alive());
    assert!(!fx.host.code_cache().contains(installed.address()));
    assert!(rt.disassemble(&InstalledCode::new("never")).is_none());
}

// ============================================================================
// Host services and lifecycle
// ============================================================================

#[test]
fn test_stack_walk_and_materialization() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let length = fx.host.method(fx.point, "length", "()D").unwrap();
    let origin = fx.host.method(fx.point, "origin", "()Lp/Point;").unwrap();
    fx.host.push_frame(length, 1, vec!["this".to_string()], true);
    fx.host.push_frame(origin, 0, Vec::new(), false);
    fx.host.push_frame(length, 0, vec!["this".to_string()], false);

    assert_eq!(rt.stack_frames(&[], 0).len(), 3);
    let lengths = rt.stack_frames(&[length], 0);
    assert_eq!(lengths.iter().map(|f| f.depth).collect::<Vec<_>>(), vec![0, 2]);
    let skipped = rt.stack_frames(&[length], 1);
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].depth, 2);

    let top = &lengths[0];
    assert!(top.has_virtual_objects);
    let materialized = rt.materialize_virtual_objects(top, true);
    assert!(!materialized.has_virtual_objects);
    assert_eq!(fx.host.deoptimization_count(), 1);
    assert!(!rt.stack_frames(&[length], 0)[0].has_virtual_objects);
}

#[test]
fn test_counters_log_and_reprofile() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);

    assert_eq!(rt.collect_counters(), vec![0; 16]);
    fx.host.counters().increment(3, 5);
    assert_eq!(rt.collect_counters()[3], 5);
    rt.reset_counters();
    assert!(rt.collect_counters().iter().all(|c| *c == 0));

    rt.log("compiled length()D\n");
    rt.flush_log();
    assert!(fx.host.debug_output().contains("compiled length()D"));
    assert_eq!(fx.host.flush_count(), 1);

    let length = fx.host.method(fx.point, "length", "()D").unwrap();
    rt.reprofile(&rt.context().resolved_method(length).unwrap());
    assert_eq!(fx.host.reprofile_count(length), 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let fx = Fixture::new();
    let compiler = InstallingCompiler::new(16);
    let rt = runtime_with(&fx.host, JvmciOptions::default(), vec![factory("test", compiler.clone())]);
    let listener = Arc::new(RecordingListener::default());
    rt.add_listener(listener.clone());

    rt.bootstrap_finished();
    assert_eq!(listener.bootstraps.load(Ordering::Relaxed), 1);

    let point = rt.context().resolved_type(fx.point);
    drop(point);
    rt.notify_shutdown();
    rt.notify_shutdown();
    assert_eq!(listener.shutdowns.load(Ordering::Relaxed), 1);
    assert_eq!(fx.host.live_metadata_handles(), 0, "shutdown sweeps released handles");

    let length = fx.host.method(fx.point, "length", "()D").unwrap();
    let result = rt.compile_method(length, INVOCATION_ENTRY_BCI, CompileId::from_u64(1));
    assert!(!result.is_success());
    assert_eq!(compiler.calls.load(Ordering::Relaxed), 0);
}
