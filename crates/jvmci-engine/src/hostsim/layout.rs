//! Native layout of the simulated host and the configuration it exports
//!
//! Offsets follow a 64-bit HotSpot build. The engine never sees these
//! constants directly; it reads them back through the configuration bundle.

use crate::config::{FlagValue, VmConfigBundle, VmField, VmFlag, VmIntrinsic};
use crate::constant_pool::ConstantTag;

pub(crate) const WORD_SIZE: usize = 8;

pub(crate) const CP_TAGS: i64 = 8;
pub(crate) const CP_CACHE: i64 = 16;
pub(crate) const CP_POOL_HOLDER: i64 = 24;
pub(crate) const CP_LENGTH: i64 = 32;
pub(crate) const CP_REFERENCE_MAP: i64 = 40;
pub(crate) const CP_SIZE: i64 = 48;
/// Bias of rewritten cache operands, as in debug builds of the host
pub(crate) const CPCACHE_INDEX_TAG: i64 = 10000;

pub(crate) const CACHE_LENGTH: i64 = 0;
pub(crate) const CACHE_SIZE: i64 = 16;
pub(crate) const ENTRY_INDICES: i64 = 0;
pub(crate) const ENTRY_F1: i64 = 8;
pub(crate) const ENTRY_F2: i64 = 16;
pub(crate) const ENTRY_FLAGS: i64 = 24;
pub(crate) const ENTRY_SIZE: i64 = 32;
pub(crate) const CP_INDEX_MASK: i64 = 0xffff;
pub(crate) const BYTECODE_1_SHIFT: i64 = 16;
pub(crate) const BYTECODE_2_SHIFT: i64 = 24;
pub(crate) const BYTECODE_MASK: i64 = 0xff;
pub(crate) const HAS_APPENDIX_SHIFT: i64 = 24;
pub(crate) const IS_VFINAL_SHIFT: i64 = 20;

pub(crate) const ARRAY_LENGTH: i64 = 0;
pub(crate) const ARRAY_DATA: i64 = 4;

pub(crate) const SYMBOL_LENGTH: i64 = 4;
pub(crate) const SYMBOL_BODY: i64 = 6;

/// Size reserved for each klass, method and field block
pub(crate) const METADATA_BLOCK: usize = 64;

/// Tunable parts of the simulated host
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// `os.arch` property, which selects the register configuration
    pub os_arch: String,
    /// `os.name` property
    pub os_name: String,
    /// `UseCompressedOops`
    pub use_compressed_oops: bool,
    /// `JVMCINMethodSizeLimit`: installs above this size fail with `CodeTooLarge`
    pub nmethod_size_limit: i64,
    /// Total code cache capacity in bytes
    pub code_cache_capacity: usize,
    /// `CodeEntryAlignment`
    pub code_entry_alignment: i64,
    /// `JVMCICounterSize`: number of benchmark counters
    pub counter_count: usize,
    /// Configuration names left out of the exported bundle
    pub omitted: Vec<String>,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            os_arch: "amd64".to_string(),
            os_name: "Linux".to_string(),
            use_compressed_oops: true,
            nmethod_size_limit: 80 * 1024,
            code_cache_capacity: 1 << 20,
            code_entry_alignment: 32,
            counter_count: 16,
            omitted: Vec::new(),
        }
    }
}

fn field(name: &str, type_name: &str, offset: i64) -> VmField {
    VmField { name: name.to_string(), type_name: type_name.to_string(), offset, address: 0, value: None }
}

fn flag(name: &str, type_name: &str, value: FlagValue) -> VmFlag {
    VmFlag { name: name.to_string(), type_name: type_name.to_string(), value }
}

/// Bundle describing this layout
pub(crate) fn config_bundle(settings: &HostSettings, static_base: u64) -> VmConfigBundle {
    let fields = vec![
        field("ConstantPool::_tags", "Array<u1>*", CP_TAGS),
        field("ConstantPool::_cache", "ConstantPoolCache*", CP_CACHE),
        field("ConstantPool::_pool_holder", "InstanceKlass*", CP_POOL_HOLDER),
        field("ConstantPool::_length", "int", CP_LENGTH),
        field("ConstantPool::_reference_map", "Array<u2>*", CP_REFERENCE_MAP),
        field("ConstantPoolCache::_length", "int", CACHE_LENGTH),
        field("ConstantPoolCacheEntry::_indices", "intx", ENTRY_INDICES),
        field("ConstantPoolCacheEntry::_f1", "Metadata*", ENTRY_F1),
        field("ConstantPoolCacheEntry::_f2", "intx", ENTRY_F2),
        field("ConstantPoolCacheEntry::_flags", "intx", ENTRY_FLAGS),
        field("Array<int>::_length", "int", ARRAY_LENGTH),
        field("Array<u1>::_data", "u1", ARRAY_DATA),
        field("Array<u2>::_data", "u2", ARRAY_DATA),
        field("Symbol::_length", "u2", SYMBOL_LENGTH),
        field("Symbol::_body", "u1", SYMBOL_BODY),
        VmField {
            name: "CompilerToVM::Data::Universe_collectedHeap".to_string(),
            type_name: "CollectedHeap*".to_string(),
            offset: 0,
            address: static_base,
            value: Some(0),
        },
    ];

    let mut constants = vec![
        ("wordSize".to_string(), WORD_SIZE as i64),
        ("sizeof(ConstantPool)".to_string(), CP_SIZE),
        ("ConstantPool::CPCACHE_INDEX_TAG".to_string(), CPCACHE_INDEX_TAG),
        ("sizeof(ConstantPoolCache)".to_string(), CACHE_SIZE),
        ("sizeof(ConstantPoolCacheEntry)".to_string(), ENTRY_SIZE),
        ("ConstantPoolCacheEntry::cp_index_mask".to_string(), CP_INDEX_MASK),
        ("ConstantPoolCacheEntry::bytecode_1_shift".to_string(), BYTECODE_1_SHIFT),
        ("ConstantPoolCacheEntry::bytecode_2_shift".to_string(), BYTECODE_2_SHIFT),
        ("ConstantPoolCacheEntry::bytecode_1_mask".to_string(), BYTECODE_MASK),
        ("ConstantPoolCacheEntry::has_appendix_shift".to_string(), HAS_APPENDIX_SHIFT),
        ("ConstantPoolCacheEntry::is_vfinal_shift".to_string(), IS_VFINAL_SHIFT),
    ];
    constants.extend(ConstantTag::config_names().map(|(tag, name)| (name.to_string(), tag.default_raw() as i64)));

    let flags = vec![
        flag("UseCompressedOops", "bool", FlagValue::Bool(settings.use_compressed_oops)),
        flag("PreserveFramePointer", "bool", FlagValue::Bool(false)),
        flag("CodeEntryAlignment", "intx", FlagValue::Int(settings.code_entry_alignment)),
        flag("JVMCINMethodSizeLimit", "intx", FlagValue::Int(settings.nmethod_size_limit)),
        flag("JVMCICounterSize", "intx", FlagValue::Int(settings.counter_count as i64)),
        flag("JVMCILibPath", "ccstr", FlagValue::Str(None)),
    ];

    let intrinsics = vec![VmIntrinsic {
        declaring_class: "java/lang/Math".to_string(),
        name: "sqrt".to_string(),
        descriptor: "(D)D".to_string(),
        id: 1,
    }];

    let properties = vec![
        ("os.arch".to_string(), settings.os_arch.clone()),
        ("os.name".to_string(), settings.os_name.clone()),
    ];

    let mut bundle = VmConfigBundle {
        fields,
        constants,
        addresses: vec![("CompilerToVM::Data::SharedRuntime_deopt_blob_unpack".to_string(), static_base + 8)],
        flags,
        intrinsics,
        properties,
    };
    if !settings.omitted.is_empty() {
        let omitted = |name: &str| settings.omitted.iter().any(|o| o == name);
        bundle.fields.retain(|f| !omitted(&f.name));
        bundle.constants.retain(|(name, _)| !omitted(name));
        bundle.addresses.retain(|(name, _)| !omitted(name));
        bundle.flags.retain(|f| !omitted(&f.name));
        bundle.properties.retain(|(name, _)| !omitted(name));
    }
    bundle
}
