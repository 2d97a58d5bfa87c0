//! Shared fixtures: a simulated host with one application class and a
//! constant pool that references it in every way a compiler cares about.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jvmci_engine::hostsim::{ClassDef, ConstantPoolBuilder, FieldDef, MethodDef, PoolEntry, SimulatedHost, SimulatedPool};
use jvmci_engine::meta::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
use jvmci_engine::{
    CompilationRequest, CompilationRequestResult, JvmciCompiler, JvmciCompilerFactory, JvmciOptions, JvmciRuntime,
    KlassPointer,
};

/// Compiler that refuses every request
pub struct RefusingCompiler;

impl JvmciCompiler for RefusingCompiler {
    fn compile_method(&self, _: &JvmciRuntime, _: &CompilationRequest) -> CompilationRequestResult {
        CompilationRequestResult::failure("not supported", false)
    }
}

/// Factory with a fixed name, counting how many compilers it created
pub struct NamedFactory {
    pub name: &'static str,
    pub compiler: Arc<dyn JvmciCompiler>,
    pub created: AtomicUsize,
}

impl JvmciCompilerFactory for NamedFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn create_compiler(&self, _: &JvmciRuntime) -> Arc<dyn JvmciCompiler> {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.compiler.clone()
    }
}

pub fn factory(name: &'static str, compiler: Arc<dyn JvmciCompiler>) -> Arc<NamedFactory> {
    Arc::new(NamedFactory { name, compiler, created: AtomicUsize::new(0) })
}

pub fn runtime(host: &Arc<SimulatedHost>) -> JvmciRuntime {
    runtime_with(host, JvmciOptions::default(), vec![factory("test", Arc::new(RefusingCompiler))])
}

pub fn runtime_with(host: &Arc<SimulatedHost>, options: JvmciOptions, factories: Vec<Arc<NamedFactory>>) -> JvmciRuntime {
    let factories = factories.into_iter().map(|f| f as Arc<dyn JvmciCompilerFactory>).collect();
    JvmciRuntime::initialize(host.clone(), options, factories).expect("runtime initializes")
}

/// Constant pool indices of the fixture pool
#[derive(Debug, Clone, Copy)]
pub struct Indices {
    pub point_class: u16,
    pub missing_class: u16,
    pub lazy_class: u16,
    pub x_ref: u16,
    pub count_ref: u16,
    pub missing_field_ref: u16,
    pub length_ref: u16,
    pub origin_ref: u16,
    pub scale_ref: u16,
    pub ghost_ref: u16,
    pub invoke_exact_ref: u16,
    pub indy: u16,
    pub hello: u16,
    pub answer: u16,
    pub big: u16,
    pub half: u16,
    pub method_type: u16,
    pub bad_method_type: u16,
    pub origin_handle: u16,
    pub ghost_handle: u16,
}

pub struct Fixture {
    pub host: Arc<SimulatedHost>,
    pub object: KlassPointer,
    pub point: KlassPointer,
    pub lazy: KlassPointer,
    pub pool: SimulatedPool,
    pub idx: Indices,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_host(SimulatedHost::new())
    }

    pub fn with_host(host: SimulatedHost) -> Self {
        let host = Arc::new(host);
        let object = host.klass_named("java/lang/Object").expect("bootstrap class");
        let point = host.define_class(
            ClassDef::new("p/Point")
                .extends(object)
                .modifiers(ACC_PUBLIC)
                .field(FieldDef::instance("x", "I", 12))
                .field(FieldDef::instance("y", "I", 16))
                .field(FieldDef::with_static("COUNT", "J", 0))
                .method(
                    MethodDef::new("length", "()D", ACC_PUBLIC)
                        .code(vec![0x0e, 0xaf], 1, 2)
                        .line(0, 10)
                        .local(0, "this", "Lp/Point;", 0, 2),
                )
                .method(MethodDef::new("origin", "()Lp/Point;", ACC_PUBLIC | ACC_STATIC).code(vec![0x01, 0xb0], 0, 1))
                .method(MethodDef::new("scale", "(I)V", ACC_PUBLIC | ACC_FINAL).code(vec![0xb1], 2, 1)),
        );
        let lazy = host.define_class(ClassDef::new("p/Lazy").extends(object).unloaded());

        let mut b = ConstantPoolBuilder::new();
        let point_class = b.class("p/Point");
        let missing_class = b.class("q/Missing");
        let lazy_class = b.class("p/Lazy");
        let x_ref = b.field_ref(point_class, "x", "I");
        let count_ref = b.field_ref(point_class, "COUNT", "J");
        let missing_field_ref = b.field_ref(point_class, "nope", "I");
        let length_ref = b.method_ref(point_class, "length", "()D");
        let origin_ref = b.method_ref(point_class, "origin", "()Lp/Point;");
        let scale_ref = b.method_ref(point_class, "scale", "(I)V");
        let ghost_ref = b.field_ref(missing_class, "ghost", "I");
        let mh_class = b.class("java/lang/invoke/MethodHandle");
        let invoke_exact_ref = b.method_ref(mh_class, "invokeExact", "(I)I");
        let indy = b.invoke_dynamic(0, "apply", "(I)Ljava/lang/Runnable;");
        let hello = b.string("hello");
        let answer = b.add(PoolEntry::Integer(42));
        let big = b.add(PoolEntry::Long(1 << 40));
        let half = b.add(PoolEntry::Double(0.5));
        let method_type = b.method_type("(I)V");
        let bad_method_type = b.method_type("(I");
        let origin_handle = b.method_handle(6, origin_ref);
        let ghost_handle = b.method_handle(1, ghost_ref);
        let pool = host.define_pool(point, b);

        let idx = Indices {
            point_class,
            missing_class,
            lazy_class,
            x_ref,
            count_ref,
            missing_field_ref,
            length_ref,
            origin_ref,
            scale_ref,
            ghost_ref,
            invoke_exact_ref,
            indy,
            hello,
            answer,
            big,
            half,
            method_type,
            bad_method_type,
            origin_handle,
            ghost_handle,
        };
        Fixture { host, object, point, lazy, pool, idx }
    }

    /// Rewritten operand of a member reference or invokedynamic entry
    pub fn operand(&self, cpi: u16) -> i32 {
        self.pool.operand(cpi).expect("entry has a cache operand")
    }
}
