//! In-process simulated host VM
//!
//! [`SimulatedHost`] implements [`NativeHost`] over a [`SimulatedMemory`]
//! arena. Constant pools, their caches, tag arrays and symbols are laid out
//! in native format and described by the exported configuration, so the
//! decoder reads them exactly as it reads a real host. Class tables, heap
//! objects and the code cache live in ordinary collections.
//!
//! Entry state only moves forward: resolving writes the payload first and
//! publishes the tag or bytecode byte last, under a per-pool lock.

mod code_cache;
mod counters;
mod defs;
mod layout;
mod registry;

pub use code_cache::{CodeBlob, CodeCache};
pub use counters::BenchmarkCounters;
pub use defs::{ClassDef, ConstantPoolBuilder, FieldDef, MethodDef, PoolEntry, SimulatedPool};
pub use layout::HostSettings;
pub use registry::HandleRegistry;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use layout::*;

use crate::bridge::{
    CompilationStatistics, ExceptionHandlerEntry, KlassInfo, LineNumberEntry, LocalVariableEntry, MethodInfo,
    NativeHost, PoolKlass, ResolvedFieldInfo, StackFrameInfo,
};
use crate::code::{Assumption, CompiledCode, InstallResult, InstalledCode};
use crate::config::VmConfigBundle;
use crate::constant_pool::{mutf8, Bytecode, ConstantTag, TagTable};
use crate::error::{JvmciError, JvmciResult};
use crate::memory::{NativeMemory, SimulatedMemory, UnsafeAccess};
use crate::meta::{
    ConstantPoolPointer, FieldPointer, GlobalHandle, HeapObject, HostObject, KlassPointer, MethodPointer, Signature,
    ACC_ABSTRACT, ACC_FINAL, ACC_STATIC, ACC_SYNTHETIC,
};

const OBJECT_CLASS: &str = "java/lang/Object";
const INVOKERS_HOLDER: &str = "java/lang/invoke/Invokers$Holder";

struct SimKlass {
    info: KlassInfo,
    loaded: AtomicBool,
    initialized: AtomicBool,
    pool: RwLock<Option<ConstantPoolPointer>>,
    fields: Vec<FieldPointer>,
    methods: Vec<MethodPointer>,
}

impl SimKlass {
    fn is_concrete(&self) -> bool {
        !self.info.is_interface && self.info.modifiers & ACC_ABSTRACT == 0
    }
}

struct SimMethod {
    holder: KlassPointer,
    def: MethodDef,
    reprofiled: AtomicU32,
}

struct SimPool {
    cp: u64,
    entries: Vec<PoolEntry>,
    tags: u64,
    cache: u64,
    /// Cache index to constant pool index
    cache_cpi: Vec<u32>,
    /// Constant pool index to resolved references index
    reference_index: FxHashMap<u32, usize>,
    references_array: Option<u64>,
    resolved: RwLock<Vec<Option<u64>>>,
    appendices: Mutex<FxHashMap<u32, u64>>,
    constants: Mutex<FxHashMap<u32, u64>>,
    errors: Mutex<FxHashMap<u32, String>>,
    /// Held across every entry state transition
    linking: Mutex<()>,
}

impl SimPool {
    fn slot(&self, cpi: u32) -> u64 {
        self.cp + CP_SIZE as u64 + cpi as u64 * WORD_SIZE as u64
    }

    fn tag_address(&self, cpi: u32) -> u64 {
        self.tags + ARRAY_DATA as u64 + cpi as u64
    }

    fn cache_entry(&self, index: u32) -> u64 {
        self.cache + CACHE_SIZE as u64 + index as u64 * ENTRY_SIZE as u64
    }

    fn utf8(&self, cpi: u16) -> &str {
        match self.entries.get(cpi as usize) {
            Some(PoolEntry::Utf8(s)) => s,
            _ => "",
        }
    }

    fn class_name(&self, cpi: u16) -> &str {
        match self.entries.get(cpi as usize) {
            Some(PoolEntry::Class(name)) => name,
            _ => "",
        }
    }

    fn name_and_type(&self, nat: u16) -> (&str, &str) {
        match self.entries.get(nat as usize) {
            Some(PoolEntry::NameAndType { name, descriptor }) => (self.utf8(*name), self.utf8(*descriptor)),
            _ => ("", ""),
        }
    }

    /// Class entry, name and descriptor of a member reference
    fn member(&self, cpi: u32) -> Option<(u16, &str, &str)> {
        let (class, nat) = self.entries.get(cpi as usize)?.member_ref()?;
        let (name, descriptor) = self.name_and_type(nat);
        Some((class, name, descriptor))
    }

    fn call_site(&self, cpi: u32) -> (&str, &str) {
        match self.entries.get(cpi as usize) {
            Some(PoolEntry::InvokeDynamic { name_and_type, .. }) => self.name_and_type(*name_and_type),
            _ => ("", ""),
        }
    }
}

/// Cache index encoded in a rewritten operand
fn cache_index(raw_index: i32) -> u32 {
    if raw_index < 0 {
        !raw_index as u32
    } else {
        (raw_index as i64 - CPCACHE_INDEX_TAG) as u32
    }
}

/// Descriptor of an adapter taking the call site appendix as a trailing argument
fn with_appendix(descriptor: &str) -> String {
    descriptor.replacen(')', "Ljava/lang/Object;)", 1)
}

/// A host VM simulated in process
pub struct SimulatedHost {
    settings: HostSettings,
    memory: SimulatedMemory,
    static_area: u64,
    tags: TagTable,
    klasses: DashMap<u64, Arc<SimKlass>>,
    klass_names: DashMap<String, KlassPointer>,
    methods: DashMap<u64, Arc<SimMethod>>,
    fields: DashMap<u64, ResolvedFieldInfo>,
    pools: DashMap<u64, Arc<SimPool>>,
    adapters: DashMap<String, MethodPointer>,
    objects: DashMap<u64, HeapObject>,
    reference_arrays: DashMap<u64, ConstantPoolPointer>,
    next_object: AtomicU64,
    globals: HandleRegistry<u64>,
    metadata_pins: HandleRegistry<u64>,
    speculation_lists: HandleRegistry<Arc<Mutex<Vec<Vec<u8>>>>>,
    code_cache: CodeCache,
    counters: BenchmarkCounters,
    frames: RwLock<Vec<StackFrameInfo>>,
    statistics: Mutex<Vec<CompilationStatistics>>,
    debug_output: Mutex<Vec<u8>>,
    flushes: AtomicU64,
    deoptimizations: AtomicU64,
    redefining: AtomicBool,
}

impl SimulatedHost {
    /// Host with default settings: 64-bit Linux on amd64
    pub fn new() -> Self {
        Self::with_settings(HostSettings::default())
    }

    /// Host with the given settings and the bootstrap classes loaded
    pub fn with_settings(settings: HostSettings) -> Self {
        let memory = SimulatedMemory::new();
        let static_area = memory.allocate(64, 8);
        let host = SimulatedHost {
            code_cache: CodeCache::new(settings.code_cache_capacity),
            counters: BenchmarkCounters::new(settings.counter_count),
            settings,
            memory,
            static_area,
            tags: TagTable::with_defaults(),
            klasses: DashMap::new(),
            klass_names: DashMap::new(),
            methods: DashMap::new(),
            fields: DashMap::new(),
            pools: DashMap::new(),
            adapters: DashMap::new(),
            objects: DashMap::new(),
            reference_arrays: DashMap::new(),
            next_object: AtomicU64::new(1),
            globals: HandleRegistry::new(0x10),
            metadata_pins: HandleRegistry::new(0),
            speculation_lists: HandleRegistry::new(0),
            frames: RwLock::new(Vec::new()),
            statistics: Mutex::new(Vec::new()),
            debug_output: Mutex::new(Vec::new()),
            flushes: AtomicU64::new(0),
            deoptimizations: AtomicU64::new(0),
            redefining: AtomicBool::new(false),
        };

        let object = host.define_class(ClassDef::new(OBJECT_CLASS));
        host.define_class(ClassDef::new("java/lang/String").extends(object).modifiers(ACC_FINAL));
        host.define_class(ClassDef::new("java/lang/Class").extends(object).modifiers(ACC_FINAL));
        host.define_class(ClassDef::new("java/lang/invoke/MethodHandle").extends(object).modifiers(ACC_ABSTRACT));
        host.define_class(ClassDef::new("java/lang/invoke/VarHandle").extends(object).modifiers(ACC_ABSTRACT));
        host.define_class(ClassDef::new(INVOKERS_HOLDER).extends(object).modifiers(ACC_FINAL));
        host
    }

    fn access(&self) -> UnsafeAccess<'_> {
        UnsafeAccess::new(&self.memory)
    }

    /// The metaspace arena
    pub fn arena(&self) -> &SimulatedMemory {
        &self.memory
    }

    /// Settings in effect
    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    fn klass(&self, klass: KlassPointer) -> Arc<SimKlass> {
        self.klasses.get(&klass.raw()).map(|k| k.clone()).unwrap_or_else(|| panic!("unknown klass {klass:?}"))
    }

    fn method_of(&self, method: MethodPointer) -> Arc<SimMethod> {
        self.methods.get(&method.raw()).map(|m| m.clone()).unwrap_or_else(|| panic!("unknown method {method:?}"))
    }

    fn pool(&self, cp: ConstantPoolPointer) -> Arc<SimPool> {
        self.pools.get(&cp.raw()).map(|p| p.clone()).unwrap_or_else(|| panic!("unknown constant pool {cp:?}"))
    }

    /// Load a class; returns its handle
    pub fn define_class(&self, def: ClassDef) -> KlassPointer {
        let ClassDef {
            name,
            super_klass,
            modifiers,
            is_interface,
            has_finalizer,
            instance_size,
            component,
            loaded,
            fields,
            methods,
        } = def;
        let klass = KlassPointer::new(self.memory.allocate(METADATA_BLOCK, 8));

        let fields = fields
            .into_iter()
            .map(|f| {
                let field = FieldPointer::new(self.memory.allocate(METADATA_BLOCK, 8));
                let info = ResolvedFieldInfo {
                    holder: klass,
                    name: f.name,
                    descriptor: f.descriptor,
                    offset: f.offset,
                    modifiers: f.modifiers,
                };
                self.fields.insert(field.raw(), info);
                field
            })
            .collect();
        let methods = methods.into_iter().map(|m| self.add_method(klass, m)).collect();

        let info = KlassInfo {
            name: name.clone(),
            modifiers,
            super_klass,
            component,
            is_interface,
            is_array: component.is_some(),
            has_finalizer,
            instance_size,
        };
        self.klasses.insert(
            klass.raw(),
            Arc::new(SimKlass {
                info,
                loaded: AtomicBool::new(loaded),
                initialized: AtomicBool::new(false),
                pool: RwLock::new(None),
                fields,
                methods,
            }),
        );
        debug!(name = name.as_str(), ?klass, loaded, "defined class");
        self.klass_names.insert(name, klass);
        klass
    }

    fn add_method(&self, holder: KlassPointer, def: MethodDef) -> MethodPointer {
        let method = MethodPointer::new(self.memory.allocate(METADATA_BLOCK, 8));
        self.methods.insert(method.raw(), Arc::new(SimMethod { holder, def, reprofiled: AtomicU32::new(0) }));
        method
    }

    fn symbol(&self, body: &[u8]) -> u64 {
        let symbol = self.memory.allocate(SYMBOL_BODY as usize + body.len(), 8);
        self.access().put_char(symbol + SYMBOL_LENGTH as u64, body.len() as u16);
        self.memory.store(symbol + SYMBOL_BODY as u64, body);
        symbol
    }

    /// Lay out a constant pool for `holder` in native format
    pub fn define_pool(&self, holder: KlassPointer, builder: ConstantPoolBuilder) -> SimulatedPool {
        let access = self.access();
        let entries = builder.entries;
        let length = entries.len();
        let cp = self.memory.allocate(CP_SIZE as usize + length * WORD_SIZE, 8);
        let tags = self.memory.allocate(ARRAY_DATA as usize + length, 8);
        access.put_int(tags + ARRAY_LENGTH as u64, length as i32);

        let mut cache_cpi = Vec::new();
        let mut cache_operands = FxHashMap::default();
        let mut reference_index = FxHashMap::default();
        for (cpi, entry) in entries.iter().enumerate() {
            let slot = cp + CP_SIZE as u64 + (cpi * WORD_SIZE) as u64;
            let pair = |high: u16, low: u16| ((high as u32) << 16 | low as u32) as i32;
            let tag = match entry {
                PoolEntry::Invalid => ConstantTag::Invalid,
                PoolEntry::Utf8(s) => {
                    access.put_address(slot, self.symbol(&mutf8::encode(s)));
                    ConstantTag::Utf8
                }
                PoolEntry::Integer(v) => {
                    access.put_int(slot, *v);
                    ConstantTag::Integer
                }
                PoolEntry::Float(v) => {
                    access.put_float(slot, *v);
                    ConstantTag::Float
                }
                PoolEntry::Long(v) => {
                    access.put_long(slot, *v);
                    ConstantTag::Long
                }
                PoolEntry::Double(v) => {
                    access.put_double(slot, *v);
                    ConstantTag::Double
                }
                PoolEntry::Class(name) => {
                    access.put_address(slot, self.symbol(&mutf8::encode(name)));
                    ConstantTag::UnresolvedClass
                }
                PoolEntry::String(s) => {
                    access.put_address(slot, self.symbol(&mutf8::encode(s)));
                    let next = reference_index.len();
                    reference_index.insert(cpi as u32, next);
                    ConstantTag::String
                }
                PoolEntry::Fieldref { class, name_and_type } => {
                    access.put_int(slot, pair(*name_and_type, *class));
                    ConstantTag::Fieldref
                }
                PoolEntry::Methodref { class, name_and_type } => {
                    access.put_int(slot, pair(*name_and_type, *class));
                    ConstantTag::Methodref
                }
                PoolEntry::InterfaceMethodref { class, name_and_type } => {
                    access.put_int(slot, pair(*name_and_type, *class));
                    ConstantTag::InterfaceMethodref
                }
                PoolEntry::NameAndType { name, descriptor } => {
                    access.put_int(slot, pair(*descriptor, *name));
                    ConstantTag::NameAndType
                }
                PoolEntry::MethodHandle { ref_kind, reference } => {
                    access.put_int(slot, pair(*reference, *ref_kind as u16));
                    ConstantTag::MethodHandle
                }
                PoolEntry::MethodType { descriptor } => {
                    access.put_int(slot, *descriptor as i32);
                    ConstantTag::MethodType
                }
                PoolEntry::InvokeDynamic { bootstrap, name_and_type } => {
                    access.put_int(slot, pair(*name_and_type, *bootstrap));
                    ConstantTag::InvokeDynamic
                }
            };
            access.put_byte(tags + ARRAY_DATA as u64 + cpi as u64, self.tags.to_raw(tag) as i8);

            if entry.needs_cache_entry() {
                let index = cache_cpi.len() as i32;
                cache_cpi.push(cpi as u32);
                let operand = match entry {
                    PoolEntry::InvokeDynamic { .. } => !index,
                    _ => index + CPCACHE_INDEX_TAG as i32,
                };
                cache_operands.insert(cpi as u16, operand);
            }
        }

        let cache = self.memory.allocate(CACHE_SIZE as usize + cache_cpi.len() * ENTRY_SIZE as usize, 8);
        access.put_int(cache + CACHE_LENGTH as u64, cache_cpi.len() as i32);
        for (index, cpi) in cache_cpi.iter().enumerate() {
            let entry = cache + CACHE_SIZE as u64 + index as u64 * ENTRY_SIZE as u64;
            access.put_long(entry + ENTRY_INDICES as u64, *cpi as i64);
        }

        let reference_map = if reference_index.is_empty() {
            0
        } else {
            let array = self.memory.allocate(ARRAY_DATA as usize + 2 * reference_index.len(), 8);
            access.put_int(array + ARRAY_LENGTH as u64, reference_index.len() as i32);
            for (cpi, index) in &reference_index {
                access.put_char(array + ARRAY_DATA as u64 + 2 * *index as u64, *cpi as u16);
            }
            array
        };

        access.put_address(cp + CP_TAGS as u64, tags);
        access.put_address(cp + CP_CACHE as u64, cache);
        access.put_address(cp + CP_POOL_HOLDER as u64, holder.raw());
        access.put_int(cp + CP_LENGTH as u64, length as i32);
        access.put_address(cp + CP_REFERENCE_MAP as u64, reference_map);

        let pointer = ConstantPoolPointer::new(cp);
        let references_array = if reference_index.is_empty() {
            None
        } else {
            let array = self.new_object(HeapObject::Opaque("[Ljava/lang/Object;".to_string()));
            self.reference_arrays.insert(array, pointer);
            Some(array)
        };
        let reference_count = reference_index.len();
        self.pools.insert(
            cp,
            Arc::new(SimPool {
                cp,
                entries,
                tags,
                cache,
                cache_cpi,
                reference_index,
                references_array,
                resolved: RwLock::new(vec![None; reference_count]),
                appendices: Mutex::new(FxHashMap::default()),
                constants: Mutex::new(FxHashMap::default()),
                errors: Mutex::new(FxHashMap::default()),
                linking: Mutex::new(()),
            }),
        );
        *self.klass(holder).pool.write() = Some(pointer);
        debug!(?pointer, ?holder, length, "defined constant pool");
        SimulatedPool { pointer, cache_operands }
    }

    /// Replace the symbol in slot `cpi` with raw, possibly malformed, bytes
    pub fn set_raw_symbol(&self, cp: ConstantPoolPointer, cpi: u16, body: &[u8]) {
        let pool = self.pool(cp);
        let symbol = self.symbol(body);
        self.access().put_address(pool.slot(cpi as u32), symbol);
    }

    /// Class loaded under `name`
    pub fn klass_named(&self, name: &str) -> Option<KlassPointer> {
        self.klass_names.get(name).map(|k| *k)
    }

    /// Whether a class has been loaded
    pub fn is_loaded(&self, klass: KlassPointer) -> bool {
        self.klass(klass).loaded.load(Ordering::Acquire)
    }

    /// Method declared by `klass`
    pub fn method(&self, klass: KlassPointer, name: &str, descriptor: &str) -> Option<MethodPointer> {
        self.klass(klass).methods.iter().copied().find(|m| {
            let method = self.method_of(*m);
            method.def.name == name && method.def.descriptor == descriptor
        })
    }

    /// Field declared by `klass`
    pub fn field(&self, klass: KlassPointer, name: &str) -> Option<FieldPointer> {
        self.klass(klass).fields.iter().copied().find(|f| self.fields.get(&f.raw()).map_or(false, |i| i.name == name))
    }

    /// Times a method's profile was reset
    pub fn reprofile_count(&self, method: MethodPointer) -> u32 {
        self.method_of(method).reprofiled.load(Ordering::Relaxed)
    }

    fn new_object(&self, value: HeapObject) -> u64 {
        let id = self.next_object.fetch_add(1, Ordering::Relaxed);
        self.objects.insert(id, value);
        id
    }

    /// Fresh global reference to heap object `id`
    fn host_object(&self, id: u64) -> HostObject {
        let value = self.objects.get(&id).map(|o| o.clone()).unwrap_or_else(|| HeapObject::Opaque("?".to_string()));
        HostObject { handle: GlobalHandle::new(self.globals.create(id)), value }
    }

    /// A new heap object with a global reference to it
    pub fn allocate_object(&self, value: HeapObject) -> HostObject {
        let id = self.new_object(value);
        self.host_object(id)
    }

    /// Global references not yet deleted
    pub fn live_global_handles(&self) -> usize {
        self.globals.count()
    }

    /// Metadata pins not yet released
    pub fn live_metadata_handles(&self) -> usize {
        self.metadata_pins.count()
    }

    /// Failed-speculation lists not yet freed
    pub fn live_speculation_lists(&self) -> usize {
        self.speculation_lists.count()
    }

    /// Releases of handles that were already released or never existed
    pub fn bad_releases(&self) -> u64 {
        self.globals.bad_releases() + self.metadata_pins.bad_releases() + self.speculation_lists.bad_releases()
    }

    /// The code cache
    pub fn code_cache(&self) -> &CodeCache {
        &self.code_cache
    }

    /// The benchmark counters
    pub fn counters(&self) -> &BenchmarkCounters {
        &self.counters
    }

    /// Everything written to the log stream
    pub fn debug_output(&self) -> String {
        String::from_utf8_lossy(&self.debug_output.lock()).into_owned()
    }

    /// Number of log flushes
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Statistics recorded so far
    pub fn compilation_statistics(&self) -> Vec<CompilationStatistics> {
        self.statistics.lock().clone()
    }

    /// Frames materialized with invalidation
    pub fn deoptimization_count(&self) -> u64 {
        self.deoptimizations.load(Ordering::Relaxed)
    }

    /// While set, installing code with assumptions reports `DependenciesInvalid`
    pub fn set_redefining(&self, redefining: bool) {
        self.redefining.store(redefining, Ordering::Release);
    }

    /// Push a Java frame; frames are walked from the first pushed
    pub fn push_frame(&self, method: MethodPointer, bci: i32, locals: Vec<String>, has_virtual_objects: bool) -> usize {
        let mut frames = self.frames.write();
        let depth = frames.len();
        frames.push(StackFrameInfo { method, bci, depth, locals, has_virtual_objects });
        depth
    }

    fn tag(&self, pool: &SimPool, cpi: u32) -> ConstantTag {
        self.tags.decode(self.access().get_byte_volatile(pool.tag_address(cpi)) as u8)
    }

    fn set_tag(&self, pool: &SimPool, cpi: u32, tag: ConstantTag) {
        self.access().put_byte_volatile(pool.tag_address(cpi), self.tags.to_raw(tag) as i8);
    }

    fn load_class(&self, name: &str) -> JvmciResult<KlassPointer> {
        let klass = self
            .klass_named(name)
            .ok_or_else(|| JvmciError::Linkage(format!("java.lang.NoClassDefFoundError: {name}")))?;
        if !self.klass(klass).loaded.swap(true, Ordering::AcqRel) {
            debug!(name, "loaded class");
        }
        Ok(klass)
    }

    fn resolve_class_entry(&self, pool: &SimPool, cpi: u32) -> JvmciResult<KlassPointer> {
        let _linking = pool.linking.lock();
        match self.tag(pool, cpi) {
            ConstantTag::Class => Ok(KlassPointer::new(self.access().get_address(pool.slot(cpi)))),
            ConstantTag::UnresolvedClassInError => {
                let message = pool.errors.lock().get(&cpi).cloned().unwrap_or_default();
                Err(JvmciError::Linkage(message))
            }
            ConstantTag::UnresolvedClass => match self.load_class(pool.class_name(cpi as u16)) {
                Ok(klass) => {
                    self.access().put_address(pool.slot(cpi), klass.raw());
                    self.set_tag(pool, cpi, ConstantTag::Class);
                    trace!(cp = pool.cp, cpi, ?klass, "resolved class entry");
                    Ok(klass)
                }
                Err(err) => {
                    let message = match &err {
                        JvmciError::Linkage(message) => message.clone(),
                        other => other.to_string(),
                    };
                    pool.errors.lock().insert(cpi, message);
                    self.set_tag(pool, cpi, ConstantTag::UnresolvedClassInError);
                    Err(err)
                }
            },
            other => Err(JvmciError::Host(format!("entry {cpi} is {other:?}, not a class"))),
        }
    }

    /// Publish a linked cache entry: payload first, then the bytecode byte
    fn link_entry(&self, pool: &SimPool, index: u32, opcode: Bytecode, f1: u64, f2: u64, flags: u64) {
        let access = self.access();
        let entry = pool.cache_entry(index);
        access.put_address(entry + ENTRY_F1 as u64, f1);
        access.put_address(entry + ENTRY_F2 as u64, f2);
        let old_flags = access.get_address(entry + ENTRY_FLAGS as u64);
        access.put_address(entry + ENTRY_FLAGS as u64, old_flags | flags);
        let shift = if opcode.uses_second_cache_slot() { BYTECODE_2_SHIFT } else { BYTECODE_1_SHIFT };
        let indices = access.get_address(entry + ENTRY_INDICES as u64) | (opcode.opcode() as u64) << shift;
        access.put_long_volatile(entry + ENTRY_INDICES as u64, indices as i64);
    }

    fn is_linked(&self, pool: &SimPool, index: u32, opcode: Bytecode) -> bool {
        let indices = self.access().get_address_volatile(pool.cache_entry(index) + ENTRY_INDICES as u64);
        let shift = if opcode.uses_second_cache_slot() { BYTECODE_2_SHIFT } else { BYTECODE_1_SHIFT };
        (indices >> shift) & BYTECODE_MASK as u64 == opcode.opcode() as u64
    }

    /// Walk `klass` and its superclasses
    fn hierarchy(&self, klass: KlassPointer) -> impl Iterator<Item = (KlassPointer, Arc<SimKlass>)> + '_ {
        std::iter::successors(Some(klass), move |k| self.klass(*k).info.super_klass).map(move |k| (k, self.klass(k)))
    }

    fn find_field(&self, klass: KlassPointer, name: &str, descriptor: &str) -> Option<FieldPointer> {
        self.hierarchy(klass).find_map(|(_, k)| {
            k.fields.iter().copied().find(|f| {
                self.fields.get(&f.raw()).map_or(false, |info| info.name == name && info.descriptor == descriptor)
            })
        })
    }

    fn find_method(&self, klass: KlassPointer, name: &str, descriptor: &str, concrete: bool) -> Option<MethodPointer> {
        self.hierarchy(klass).find_map(|(_, k)| {
            k.methods.iter().copied().find(|m| {
                let method = self.method_of(*m);
                method.def.name == name
                    && method.def.descriptor == descriptor
                    && !(concrete && method.def.modifiers & ACC_ABSTRACT != 0)
            })
        })
    }

    fn adapter(&self, name: &str, descriptor: &str) -> MethodPointer {
        let key = format!("{name}{descriptor}");
        if let Some(existing) = self.adapters.get(&key) {
            return *existing;
        }
        let holder = self.klass_named(INVOKERS_HOLDER).unwrap_or(KlassPointer::new(0));
        let method = self.add_method(holder, MethodDef::new(name, descriptor, ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC));
        *self.adapters.entry(key).or_insert(method)
    }

    /// Link an invoke site the way the interpreter does on first execution
    pub fn link_invoke(&self, pool: &SimulatedPool, cpi: u16, opcode: Bytecode) -> JvmciResult<MethodPointer> {
        let raw_index = pool
            .operand(cpi)
            .ok_or_else(|| JvmciError::Host(format!("entry {cpi} has no cache entry")))?;
        let sim = self.pool(pool.pointer);
        let (class_cpi, name, descriptor) =
            sim.member(cpi as u32).ok_or_else(|| JvmciError::Host(format!("entry {cpi} is not a member reference")))?;
        let klass = self.resolve_class_entry(&sim, class_cpi as u32)?;
        let method = self
            .find_method(klass, name, descriptor, false)
            .ok_or_else(|| JvmciError::Linkage(format!("java.lang.NoSuchMethodError: {name}{descriptor}")))?;

        let _linking = sim.linking.lock();
        let index = cache_index(raw_index);
        match opcode {
            Bytecode::Invokevirtual => {
                let sim_method = self.method_of(method);
                let is_final = sim_method.def.modifiers & ACC_FINAL != 0
                    || self.klass(sim_method.holder).info.modifiers & ACC_FINAL != 0;
                if is_final {
                    self.link_entry(&sim, index, opcode, 0, method.raw(), 1u64 << IS_VFINAL_SHIFT);
                } else {
                    self.link_entry(&sim, index, opcode, 0, 0, 0);
                }
            }
            Bytecode::Invokeinterface => self.link_entry(&sim, index, opcode, klass.raw(), method.raw(), 0),
            _ => self.link_entry(&sim, index, opcode, method.raw(), 0, 0),
        }
        debug!(cp = sim.cp, cpi, ?opcode, ?method, "linked invoke");
        Ok(method)
    }

    fn is_subtype(&self, klass: KlassPointer, root: KlassPointer) -> bool {
        self.hierarchy(klass).any(|(k, _)| k == root)
    }

    /// Loaded classes at or below `root`
    fn loaded_subtypes(&self, root: KlassPointer) -> Vec<(KlassPointer, Arc<SimKlass>)> {
        let all: Vec<_> = self.klasses.iter().map(|e| (KlassPointer::new(*e.key()), e.value().clone())).collect();
        all.into_iter()
            .filter(|(k, sim)| sim.loaded.load(Ordering::Acquire) && self.is_subtype(*k, root))
            .collect()
    }

    fn assumption_holds(&self, assumption: &Assumption) -> bool {
        match *assumption {
            Assumption::NoFinalizableSubclass { receiver_type } => {
                !self.loaded_subtypes(receiver_type).iter().any(|(_, k)| k.info.has_finalizer)
            }
            Assumption::ConcreteSubtype { context, subtype } => self
                .loaded_subtypes(context)
                .iter()
                .filter(|(_, k)| k.is_concrete())
                .all(|(k, _)| *k == subtype),
            Assumption::LeafType { context } => self.loaded_subtypes(context).iter().all(|(k, _)| *k == context),
            Assumption::ConcreteMethod { method, context, implementation } => {
                let target = self.method_of(method);
                self.loaded_subtypes(context).iter().filter(|(_, k)| k.is_concrete()).all(|(k, _)| {
                    match self.find_method(*k, &target.def.name, &target.def.descriptor, true) {
                        Some(found) => found == implementation,
                        None => true,
                    }
                })
            }
            Assumption::CallSiteTargetValue { call_site, method_handle } => {
                self.globals.get(call_site.raw()).is_some() && self.globals.get(method_handle.raw()).is_some()
            }
        }
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeHost for SimulatedHost {
    fn memory(&self) -> &dyn NativeMemory {
        &self.memory
    }

    fn read_configuration(&self) -> JvmciResult<VmConfigBundle> {
        Ok(layout::config_bundle(&self.settings, self.static_area))
    }

    fn get_bytecode(&self, method: MethodPointer) -> Vec<u8> {
        self.method_of(method).def.bytecode.clone()
    }

    fn get_exception_table(&self, method: MethodPointer) -> Vec<ExceptionHandlerEntry> {
        self.method_of(method).def.exception_table.clone()
    }

    fn get_line_number_table(&self, method: MethodPointer) -> Vec<LineNumberEntry> {
        self.method_of(method).def.line_numbers.clone()
    }

    fn get_local_variable_table(&self, method: MethodPointer) -> Vec<LocalVariableEntry> {
        self.method_of(method).def.local_variables.clone()
    }

    fn get_method_info(&self, method: MethodPointer) -> MethodInfo {
        let sim = self.method_of(method);
        MethodInfo {
            holder: sim.holder,
            name: sim.def.name.clone(),
            descriptor: sim.def.descriptor.clone(),
            modifiers: sim.def.modifiers,
            max_locals: sim.def.max_locals,
            max_stack: sim.def.max_stack,
            code_size: sim.def.bytecode.len() as u32,
        }
    }

    fn get_klass_info(&self, klass: KlassPointer) -> KlassInfo {
        self.klass(klass).info.clone()
    }

    fn get_instance_fields(&self, klass: KlassPointer) -> Vec<FieldPointer> {
        self.klass(klass)
            .fields
            .iter()
            .copied()
            .filter(|f| self.fields.get(&f.raw()).map_or(false, |info| !info.is_static()))
            .collect()
    }

    fn get_field_info(&self, field: FieldPointer) -> ResolvedFieldInfo {
        self.fields.get(&field.raw()).map(|f| f.clone()).unwrap_or_else(|| panic!("unknown field {field:?}"))
    }

    fn get_constant_pool(&self, klass: KlassPointer) -> Option<ConstantPoolPointer> {
        *self.klass(klass).pool.read()
    }

    fn is_initialized(&self, klass: KlassPointer) -> bool {
        self.klass(klass).initialized.load(Ordering::Acquire)
    }

    fn lookup_type(&self, name: &str, _accessing: Option<KlassPointer>, resolve: bool) -> JvmciResult<Option<KlassPointer>> {
        if resolve {
            return self.load_class(name).map(Some);
        }
        Ok(self.klass_named(name).filter(|k| self.is_loaded(*k)))
    }

    fn resolve_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> JvmciResult<KlassPointer> {
        self.resolve_class_entry(&self.pool(cp), cpi)
    }

    fn lookup_klass_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> PoolKlass {
        let pool = self.pool(cp);
        match self.tag(&pool, cpi) {
            ConstantTag::Class => PoolKlass::Resolved(KlassPointer::new(self.access().get_address(pool.slot(cpi)))),
            _ => PoolKlass::Unresolved(pool.class_name(cpi as u16).to_string()),
        }
    }

    fn resolve_field_in_pool(
        &self,
        cp: ConstantPoolPointer,
        raw_index: i32,
        _method: Option<MethodPointer>,
        opcode: u8,
    ) -> JvmciResult<FieldPointer> {
        let pool = self.pool(cp);
        let index = cache_index(raw_index);
        let cpi = *pool
            .cache_cpi
            .get(index as usize)
            .ok_or_else(|| JvmciError::Host(format!("no cache entry {index}")))?;
        let (class_cpi, name, descriptor) =
            pool.member(cpi).ok_or_else(|| JvmciError::Host(format!("entry {cpi} is not a field reference")))?;
        let klass = self.resolve_class_entry(&pool, class_cpi as u32)?;
        let field = self
            .find_field(klass, name, descriptor)
            .ok_or_else(|| JvmciError::Linkage(format!("java.lang.NoSuchFieldError: {name}")))?;
        let info = self.get_field_info(field);

        let bytecode = Bytecode::from_opcode(opcode).ok_or_else(|| JvmciError::Host(format!("bad opcode {opcode}")))?;
        let wants_static = matches!(bytecode, Bytecode::Getstatic | Bytecode::Putstatic);
        if info.is_static() != wants_static {
            return Err(JvmciError::Linkage(format!(
                "java.lang.IncompatibleClassChangeError: field {name} accessed by {bytecode:?}"
            )));
        }

        let _linking = pool.linking.lock();
        self.link_entry(&pool, index, bytecode, info.holder.raw(), info.offset as u64, 0);
        Ok(field)
    }

    fn lookup_method_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32, opcode: u8) -> Option<MethodPointer> {
        let pool = self.pool(cp);
        let index = cache_index(raw_index);
        let bytecode = Bytecode::from_opcode(opcode)?;
        if matches!(bytecode, Bytecode::Invokedynamic | Bytecode::Invokehandle) {
            if !self.is_linked(&pool, index, bytecode) {
                return None;
            }
            let f1 = self.access().get_address_volatile(pool.cache_entry(index) + ENTRY_F1 as u64);
            return (f1 != 0).then(|| MethodPointer::new(f1));
        }

        let cpi = *pool.cache_cpi.get(index as usize)?;
        let (class_cpi, name, descriptor) = pool.member(cpi)?;
        if self.tag(&pool, class_cpi as u32) != ConstantTag::Class {
            return None;
        }
        let klass = KlassPointer::new(self.access().get_address(pool.slot(class_cpi as u32)));
        self.find_method(klass, name, descriptor, false)
    }

    fn resolve_method(&self, receiver: KlassPointer, method: MethodPointer, _caller: KlassPointer) -> Option<MethodPointer> {
        let target = self.method_of(method);
        self.find_method(receiver, &target.def.name, &target.def.descriptor, true)
    }

    fn resolve_possibly_cached_constant_in_pool(&self, cp: ConstantPoolPointer, cpi: u32) -> JvmciResult<HostObject> {
        let pool = self.pool(cp);
        let _linking = pool.linking.lock();
        if let Some(id) = pool.constants.lock().get(&cpi).copied() {
            return Ok(self.host_object(id));
        }

        let tag = self.tag(&pool, cpi);
        if matches!(tag, ConstantTag::MethodHandleInError | ConstantTag::MethodTypeInError) {
            let message = pool.errors.lock().get(&cpi).cloned().unwrap_or_default();
            return Err(JvmciError::Linkage(message));
        }

        let fail = |tag: ConstantTag, message: String| {
            pool.errors.lock().insert(cpi, message.clone());
            self.set_tag(&pool, cpi, tag);
            Err(JvmciError::Linkage(message))
        };
        let id = match pool.entries.get(cpi as usize) {
            Some(PoolEntry::String(s)) => {
                let index = pool.reference_index.get(&cpi).copied().unwrap_or(0);
                let mut resolved = pool.resolved.write();
                match resolved.get(index).copied().flatten() {
                    Some(id) => id,
                    None => {
                        let id = self.new_object(HeapObject::String(s.clone()));
                        if let Some(slot) = resolved.get_mut(index) {
                            *slot = Some(id);
                        }
                        id
                    }
                }
            }
            Some(PoolEntry::MethodHandle { ref_kind, reference }) => {
                let (class_cpi, name, descriptor) = pool
                    .member(*reference as u32)
                    .ok_or_else(|| JvmciError::Host(format!("entry {reference} is not a member reference")))?;
                let owner = pool.class_name(class_cpi);
                if self.klass_named(owner).is_none() {
                    return fail(ConstantTag::MethodHandleInError, format!("java.lang.NoClassDefFoundError: {owner}"));
                }
                self.new_object(HeapObject::MethodHandle {
                    ref_kind: *ref_kind,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            Some(PoolEntry::MethodType { descriptor }) => {
                let descriptor = pool.utf8(*descriptor);
                if Signature::parse(descriptor).is_none() {
                    return fail(
                        ConstantTag::MethodTypeInError,
                        format!("java.lang.ClassFormatError: bad method type {descriptor}"),
                    );
                }
                self.new_object(HeapObject::MethodType(descriptor.to_string()))
            }
            _ => return Err(JvmciError::Host(format!("entry {cpi} with tag {tag:?} is not an object constant"))),
        };
        if !matches!(pool.entries.get(cpi as usize), Some(PoolEntry::String(_))) {
            pool.constants.lock().insert(cpi, id);
        }
        Ok(self.host_object(id))
    }

    fn resolve_invoke_dynamic_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()> {
        let pool = self.pool(cp);
        let index = cache_index(raw_index);
        let _linking = pool.linking.lock();
        if self.is_linked(&pool, index, Bytecode::Invokedynamic) {
            return Ok(());
        }
        let cpi = *pool
            .cache_cpi
            .get(index as usize)
            .ok_or_else(|| JvmciError::Host(format!("no cache entry {index}")))?;
        let (name, descriptor) = pool.call_site(cpi);
        let adapter = self.adapter("linkToTargetMethod", &with_appendix(descriptor));
        let appendix = self.new_object(HeapObject::Appendix { target: format!("{name}{descriptor}") });
        pool.appendices.lock().insert(index, appendix);
        self.link_entry(&pool, index, Bytecode::Invokedynamic, adapter.raw(), 0, 1u64 << HAS_APPENDIX_SHIFT);
        debug!(cp = pool.cp, cpi, name, "linked call site");
        Ok(())
    }

    fn resolve_invoke_handle_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> JvmciResult<()> {
        let pool = self.pool(cp);
        let index = cache_index(raw_index);
        let _linking = pool.linking.lock();
        if self.is_linked(&pool, index, Bytecode::Invokehandle) {
            return Ok(());
        }
        let cpi = *pool
            .cache_cpi
            .get(index as usize)
            .ok_or_else(|| JvmciError::Host(format!("no cache entry {index}")))?;
        let (_, name, descriptor) =
            pool.member(cpi).ok_or_else(|| JvmciError::Host(format!("entry {cpi} is not a method reference")))?;
        let adapter = self.adapter(&format!("{name}_MT"), &with_appendix(descriptor));
        let appendix = self.new_object(HeapObject::MethodType(descriptor.to_string()));
        pool.appendices.lock().insert(index, appendix);
        self.link_entry(&pool, index, Bytecode::Invokehandle, adapter.raw(), 0, 1u64 << HAS_APPENDIX_SHIFT);
        Ok(())
    }

    fn lookup_appendix_in_pool(&self, cp: ConstantPoolPointer, raw_index: i32) -> Option<HostObject> {
        let pool = self.pool(cp);
        let id = pool.appendices.lock().get(&cache_index(raw_index)).copied()?;
        Some(self.host_object(id))
    }

    fn ensure_initialized(&self, klass: KlassPointer) -> JvmciResult<()> {
        let sim = self.klass(klass);
        if sim.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(super_klass) = sim.info.super_klass {
            self.ensure_initialized(super_klass)?;
        }
        sim.loaded.store(true, Ordering::Release);
        if !sim.initialized.swap(true, Ordering::AcqRel) {
            debug!(name = sim.info.name.as_str(), "initialized class");
        }
        Ok(())
    }

    fn get_resolved_references(&self, cp: ConstantPoolPointer) -> Option<HostObject> {
        self.pool(cp).references_array.map(|id| self.host_object(id))
    }

    fn read_object_array_element(&self, array: GlobalHandle, index: usize) -> Option<HostObject> {
        let id = self.globals.get(array.raw())?;
        let cp = self.reference_arrays.get(&id).map(|cp| *cp)?;
        let element = self.pool(cp).resolved.read().get(index).copied().flatten()?;
        Some(self.host_object(element))
    }

    fn install_code(&self, code: &CompiledCode, installed: &InstalledCode) -> InstallResult {
        let artifact = code.code();
        let size = artifact.install_size();
        if size as i64 > self.settings.nmethod_size_limit {
            return InstallResult::CodeTooLarge;
        }
        if !artifact.assumptions.is_empty() && self.redefining.load(Ordering::Acquire) {
            return InstallResult::DependenciesInvalid;
        }
        if let Some(failed) = artifact.assumptions.iter().find(|a| !self.assumption_holds(a)) {
            debug!(name = code.name(), ?failed, "assumption no longer holds");
            return InstallResult::DependenciesFailed;
        }

        let Some(code_bytes) = artifact.target_code.get(..artifact.target_code_size) else {
            debug!(name = code.name(), size = artifact.target_code_size, "declared code size exceeds the code bytes");
            return InstallResult::CodeTooLarge;
        };
        let mut bytes = code_bytes.to_vec();
        bytes.extend_from_slice(&artifact.data_section);
        let alignment = self.settings.code_entry_alignment.max(1) as u64;
        match self.code_cache.insert(code.name(), code.method(), bytes, alignment) {
            Some(address) => {
                installed.set_installed(address, address, size as u64);
                InstallResult::Ok
            }
            None => InstallResult::CodeCacheFull,
        }
    }

    fn invalidate_installed_code(&self, installed: &InstalledCode) {
        self.code_cache.invalidate(installed.address());
        installed.mark_invalid();
    }

    fn reprofile(&self, method: MethodPointer) {
        self.method_of(method).reprofiled.fetch_add(1, Ordering::Relaxed);
    }

    fn disassemble_code_blob(&self, installed: &InstalledCode) -> Option<String> {
        let address = installed.address();
        if address == 0 {
            return None;
        }
        self.code_cache.with_blob(address, |blob| {
            let mut out = format!("; {}\n", blob.name);
            for (i, chunk) in blob.bytes.chunks(16).enumerate() {
                out.push_str(&format!("{:#x}: {}\n", address + 16 * i as u64, hex::encode(chunk)));
            }
            out
        })
    }

    fn get_next_stack_frame(
        &self,
        previous: Option<&StackFrameInfo>,
        methods: &[MethodPointer],
        initial_skip: usize,
    ) -> Option<StackFrameInfo> {
        let frames = self.frames.read();
        let start = previous.map_or(0, |f| f.depth + 1);
        frames
            .iter()
            .skip(start)
            .filter(|f| methods.is_empty() || methods.contains(&f.method))
            .nth(initial_skip)
            .cloned()
    }

    fn materialize_virtual_objects(&self, frame: &StackFrameInfo, invalidate: bool) -> StackFrameInfo {
        let mut frames = self.frames.write();
        if invalidate {
            self.deoptimizations.fetch_add(1, Ordering::Relaxed);
        }
        match frames.get_mut(frame.depth) {
            Some(stored) => {
                stored.has_virtual_objects = false;
                stored.clone()
            }
            None => StackFrameInfo { has_virtual_objects: false, ..frame.clone() },
        }
    }

    fn write_debug_output(&self, bytes: &[u8]) {
        self.debug_output.lock().extend_from_slice(bytes);
    }

    fn flush_debug_output(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn collect_counters(&self) -> Vec<i64> {
        self.counters.snapshot()
    }

    fn reset_counters(&self) {
        self.counters.reset()
    }

    fn record_compilation_statistics(&self, stats: &CompilationStatistics) {
        self.statistics.lock().push(stats.clone());
    }

    fn allocate_failed_speculations_list(&self) -> u64 {
        let list = self.memory.allocate(16, 8);
        self.speculation_lists.insert(list, Arc::new(Mutex::new(Vec::new())));
        list
    }

    fn get_failed_speculations(&self, list: u64) -> Vec<Vec<u8>> {
        self.speculation_lists.get(list).map(|l| l.lock().clone()).unwrap_or_default()
    }

    fn add_failed_speculation(&self, list: u64, encoding: &[u8]) -> bool {
        let Some(list) = self.speculation_lists.get(list) else {
            return false;
        };
        let mut entries = list.lock();
        if entries.iter().any(|e| e == encoding) {
            return false;
        }
        entries.push(encoding.to_vec());
        true
    }

    fn release_failed_speculations(&self, list: u64) {
        self.speculation_lists.release(list);
    }

    fn allocate_metadata_handle(&self, metadata: u64) -> u64 {
        let slot = self.memory.allocate(WORD_SIZE, 8);
        self.access().put_address(slot, metadata);
        self.metadata_pins.insert(slot, metadata);
        slot
    }

    fn release_metadata_handle(&self, handle: u64) {
        if self.metadata_pins.release(handle) {
            self.access().put_address(handle, 0);
        }
    }

    fn delete_global_handle(&self, handle: GlobalHandle) {
        self.globals.release(handle.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_classes_loaded() {
        let host = SimulatedHost::new();
        let object = host.klass_named(OBJECT_CLASS).unwrap();
        assert!(host.is_loaded(object));
        let string = host.klass_named("java/lang/String").unwrap();
        assert_eq!(host.get_klass_info(string).super_klass, Some(object));
    }

    #[test]
    fn test_pool_layout_is_native() {
        let host = SimulatedHost::new();
        let object = host.klass_named(OBJECT_CLASS).unwrap();
        let mut builder = ConstantPoolBuilder::new();
        let int = builder.add(PoolEntry::Integer(-5));
        let text = builder.utf8("hi");
        let pool = host.define_pool(object, builder);

        let access = host.access();
        let cp = pool.pointer.raw();
        assert_eq!(access.get_int(cp + CP_LENGTH as u64), 3);
        assert_eq!(access.get_address(cp + CP_POOL_HOLDER as u64), object.raw());
        assert_eq!(access.get_int(cp + CP_SIZE as u64 + int as u64 * 8), -5);
        let symbol = access.get_address(cp + CP_SIZE as u64 + text as u64 * 8);
        assert_eq!(access.get_char(symbol + SYMBOL_LENGTH as u64), 2);
        assert_eq!(access.get_bytes(symbol + SYMBOL_BODY as u64, 2), b"hi".to_vec());
    }

    #[test]
    fn test_class_entry_resolution_is_sticky() {
        let host = SimulatedHost::new();
        let object = host.klass_named(OBJECT_CLASS).unwrap();
        let mut builder = ConstantPoolBuilder::new();
        let good = builder.class(OBJECT_CLASS);
        let bad = builder.class("does/not/Exist");
        let pool = host.define_pool(object, builder);

        assert_eq!(host.lookup_klass_in_pool(pool.pointer, good as u32), PoolKlass::Unresolved(OBJECT_CLASS.into()));
        assert_eq!(host.resolve_klass_in_pool(pool.pointer, good as u32).unwrap(), object);
        assert_eq!(host.lookup_klass_in_pool(pool.pointer, good as u32), PoolKlass::Resolved(object));

        let first = host.resolve_klass_in_pool(pool.pointer, bad as u32).unwrap_err();
        let second = host.resolve_klass_in_pool(pool.pointer, bad as u32).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_speculation_lists() {
        let host = SimulatedHost::new();
        let list = host.allocate_failed_speculations_list();
        assert!(host.add_failed_speculation(list, b"a"));
        assert!(!host.add_failed_speculation(list, b"a"));
        assert_eq!(host.get_failed_speculations(list), vec![b"a".to_vec()]);
        host.release_failed_speculations(list);
        assert_eq!(host.live_speculation_lists(), 0);
        host.release_failed_speculations(list);
        assert_eq!(host.bad_releases(), 1);
    }

    #[test]
    fn test_overstated_code_size_is_refused() {
        let host = SimulatedHost::new();
        let mut artifact = crate::code::HotSpotCompiledCode::new("short", vec![0x90; 8], 16);
        artifact.target_code_size = 32;
        let installed = InstalledCode::new("short");

        assert_eq!(host.install_code(&CompiledCode::Stub(artifact), &installed), InstallResult::CodeTooLarge);
        assert!(!installed.is_alive());
        assert_eq!(host.code_cache().entry_count(), 0);
    }

    #[test]
    fn test_stack_walk_filters_and_skips() {
        let host = SimulatedHost::new();
        let holder = host.define_class(
            ClassDef::new("p/Walk").method(MethodDef::new("a", "()V", 0)).method(MethodDef::new("b", "()V", 0)),
        );
        let a = host.method(holder, "a", "()V").unwrap();
        let b = host.method(holder, "b", "()V").unwrap();
        host.push_frame(a, 1, vec![], false);
        host.push_frame(b, 2, vec![], true);
        host.push_frame(a, 3, vec![], false);

        let first = host.get_next_stack_frame(None, &[a], 1).unwrap();
        assert_eq!(first.bci, 3);
        let any = host.get_next_stack_frame(None, &[], 0).unwrap();
        let next = host.get_next_stack_frame(Some(&any), &[], 0).unwrap();
        assert_eq!(next.method, b);
        assert!(!host.materialize_virtual_objects(&next, true).has_virtual_objects);
        assert_eq!(host.deoptimization_count(), 1);
    }
}
