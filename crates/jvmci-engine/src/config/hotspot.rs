//! Typed layout facts resolved from the configuration store
//!
//! Every offset and constant the decoder and the installer use is resolved
//! here, once, during runtime initialization. Nothing below this layer
//! hardcodes a host layout.

use serde::Serialize;

use super::VmConfigStore;
use crate::constant_pool::TagTable;
use crate::error::JvmciResult;

/// Host layout and policy facts needed by the interface layer
#[derive(Debug, Clone, Serialize)]
pub struct HotSpotVmConfig {
    /// Size of a machine word in bytes
    pub word_size: usize,

    /// `ConstantPool::_tags`
    pub constant_pool_tags_offset: i64,
    /// `ConstantPool::_cache`
    pub constant_pool_cache_offset: i64,
    /// `ConstantPool::_pool_holder`
    pub constant_pool_holder_offset: i64,
    /// `ConstantPool::_length`
    pub constant_pool_length_offset: i64,
    /// `ConstantPool::_reference_map`
    pub constant_pool_reference_map_offset: i64,
    /// `sizeof(ConstantPool)`: slots start right after the header
    pub constant_pool_size: i64,
    /// Bias added to rewritten constant-pool-cache operands
    pub constant_pool_cp_cache_index_tag: i64,

    /// `sizeof(ConstantPoolCache)`: entries start right after the header
    pub cp_cache_size: i64,
    /// `ConstantPoolCache::_length`
    pub cp_cache_length_offset: i64,
    /// `sizeof(ConstantPoolCacheEntry)`
    pub cp_cache_entry_size: i64,
    /// `ConstantPoolCacheEntry::_indices`
    pub cp_cache_entry_indices_offset: i64,
    /// `ConstantPoolCacheEntry::_f1`
    pub cp_cache_entry_f1_offset: i64,
    /// `ConstantPoolCacheEntry::_f2`
    pub cp_cache_entry_f2_offset: i64,
    /// `ConstantPoolCacheEntry::_flags`
    pub cp_cache_entry_flags_offset: i64,
    /// Mask selecting the constant pool index from `_indices`
    pub cp_cache_entry_cp_index_mask: i64,
    /// Shift of the first resolved bytecode in `_indices`
    pub cp_cache_entry_bytecode_1_shift: i64,
    /// Shift of the second resolved bytecode in `_indices`
    pub cp_cache_entry_bytecode_2_shift: i64,
    /// Mask applied after either bytecode shift
    pub cp_cache_entry_bytecode_mask: i64,
    /// Flag bit: entry carries an appendix in the resolved references
    pub cp_cache_entry_has_appendix_shift: i64,
    /// Flag bit: `_f2` is a final `Method*`
    pub cp_cache_entry_is_vfinal_shift: i64,

    /// `Array<int>::_length`
    pub array_length_offset: i64,
    /// `Array<u1>::_data`
    pub array_u1_data_offset: i64,
    /// `Array<u2>::_data`
    pub array_u2_data_offset: i64,

    /// `Symbol::_length`
    pub symbol_length_offset: i64,
    /// `Symbol::_body`
    pub symbol_body_offset: i64,

    /// Native constant pool tag encoding
    pub tags: TagTable,

    /// `UseCompressedOops`
    pub use_compressed_oops: bool,
    /// `PreserveFramePointer`
    pub preserve_frame_pointer: bool,
    /// `CodeEntryAlignment`
    pub code_entry_alignment: i64,
    /// `JVMCINMethodSizeLimit`: host cap on installed code size
    pub nmethod_size_limit: i64,

    /// `os.arch` system property
    pub os_arch: String,
    /// `os.name` system property
    pub os_name: String,
}

impl HotSpotVmConfig {
    /// Resolve every entry; the first missing one fails the whole read
    pub fn from_store(store: &VmConfigStore) -> JvmciResult<Self> {
        Ok(HotSpotVmConfig {
            word_size: store.constant("wordSize")? as usize,

            constant_pool_tags_offset: store.field_offset_typed("ConstantPool::_tags", "Array<u1>*")?,
            constant_pool_cache_offset: store.field_offset_typed("ConstantPool::_cache", "ConstantPoolCache*")?,
            constant_pool_holder_offset: store.field_offset_typed("ConstantPool::_pool_holder", "InstanceKlass*")?,
            constant_pool_length_offset: store.field_offset_typed("ConstantPool::_length", "int")?,
            constant_pool_reference_map_offset: store.field_offset_typed("ConstantPool::_reference_map", "Array<u2>*")?,
            constant_pool_size: store.constant("sizeof(ConstantPool)")?,
            constant_pool_cp_cache_index_tag: store.constant("ConstantPool::CPCACHE_INDEX_TAG")?,

            cp_cache_size: store.constant("sizeof(ConstantPoolCache)")?,
            cp_cache_length_offset: store.field_offset_typed("ConstantPoolCache::_length", "int")?,
            cp_cache_entry_size: store.constant("sizeof(ConstantPoolCacheEntry)")?,
            cp_cache_entry_indices_offset: store.field_offset("ConstantPoolCacheEntry::_indices")?,
            cp_cache_entry_f1_offset: store.field_offset("ConstantPoolCacheEntry::_f1")?,
            cp_cache_entry_f2_offset: store.field_offset("ConstantPoolCacheEntry::_f2")?,
            cp_cache_entry_flags_offset: store.field_offset("ConstantPoolCacheEntry::_flags")?,
            cp_cache_entry_cp_index_mask: store.constant("ConstantPoolCacheEntry::cp_index_mask")?,
            cp_cache_entry_bytecode_1_shift: store.constant("ConstantPoolCacheEntry::bytecode_1_shift")?,
            cp_cache_entry_bytecode_2_shift: store.constant("ConstantPoolCacheEntry::bytecode_2_shift")?,
            cp_cache_entry_bytecode_mask: store.constant("ConstantPoolCacheEntry::bytecode_1_mask")?,
            cp_cache_entry_has_appendix_shift: store.constant("ConstantPoolCacheEntry::has_appendix_shift")?,
            cp_cache_entry_is_vfinal_shift: store.constant("ConstantPoolCacheEntry::is_vfinal_shift")?,

            array_length_offset: store.field_offset("Array<int>::_length")?,
            array_u1_data_offset: store.field_offset("Array<u1>::_data")?,
            array_u2_data_offset: store.field_offset("Array<u2>::_data")?,

            symbol_length_offset: store.field_offset_typed("Symbol::_length", "u2")?,
            symbol_body_offset: store.field_offset_typed("Symbol::_body", "u1")?,

            tags: TagTable::from_store(store)?,

            use_compressed_oops: store.flag_bool("UseCompressedOops")?,
            preserve_frame_pointer: store.flag_bool_or("PreserveFramePointer", false),
            code_entry_alignment: store.flag_int("CodeEntryAlignment")?,
            nmethod_size_limit: store.flag_int("JVMCINMethodSizeLimit")?,

            os_arch: store.property("os.arch").unwrap_or("unknown").to_string(),
            os_name: store.property("os.name").unwrap_or("unknown").to_string(),
        })
    }

    /// Whether the host runs on Windows, which changes the native ABI
    pub fn is_windows(&self) -> bool {
        self.os_name.to_ascii_lowercase().starts_with("windows")
    }
}
