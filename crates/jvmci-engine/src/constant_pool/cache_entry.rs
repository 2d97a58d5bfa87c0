//! Read-only view of a constant pool cache entry
//!
//! The host fills entries while other threads read them. Every word is read
//! volatile, and a resolved bytecode in `_indices` is published only after
//! `_f1`/`_f2` are written, so a reader that sees the bytecode sees the data.

use super::bytecode::Bytecode;
use crate::config::HotSpotVmConfig;
use crate::memory::UnsafeAccess;

/// One `ConstantPoolCacheEntry` at a native address
#[derive(Clone, Copy)]
pub struct CpCacheEntry<'a> {
    access: UnsafeAccess<'a>,
    config: &'a HotSpotVmConfig,
    address: u64,
}

impl<'a> CpCacheEntry<'a> {
    /// Entry `index` of the cache at `cache`
    pub fn at(access: UnsafeAccess<'a>, config: &'a HotSpotVmConfig, cache: u64, index: u32) -> Self {
        let address = cache + config.cp_cache_size as u64 + index as u64 * config.cp_cache_entry_size as u64;
        CpCacheEntry { access, config, address }
    }

    /// Native address of the entry
    pub fn address(&self) -> u64 {
        self.address
    }

    fn word(&self, offset: i64) -> u64 {
        self.access.get_address_volatile(self.address + offset as u64)
    }

    /// Raw `_indices` word
    pub fn indices(&self) -> u64 {
        self.word(self.config.cp_cache_entry_indices_offset)
    }

    /// Constant pool index this entry was created for
    pub fn constant_pool_index(&self) -> u32 {
        (self.indices() & self.config.cp_cache_entry_cp_index_mask as u64) as u32
    }

    /// First resolved bytecode, 0 if none
    pub fn bytecode_1(&self) -> u8 {
        self.bytecode_at(self.config.cp_cache_entry_bytecode_1_shift)
    }

    /// Second resolved bytecode, 0 if none
    pub fn bytecode_2(&self) -> u8 {
        self.bytecode_at(self.config.cp_cache_entry_bytecode_2_shift)
    }

    fn bytecode_at(&self, shift: i64) -> u8 {
        ((self.indices() >> shift) & self.config.cp_cache_entry_bytecode_mask as u64) as u8
    }

    /// Whether the host has linked this entry for `bytecode`
    pub fn is_resolved(&self, bytecode: Bytecode) -> bool {
        let recorded = if bytecode.uses_second_cache_slot() { self.bytecode_2() } else { self.bytecode_1() };
        recorded == bytecode.opcode()
    }

    /// `_f1`: a `Klass*` or `Method*` depending on the bytecode
    pub fn f1(&self) -> u64 {
        self.word(self.config.cp_cache_entry_f1_offset)
    }

    /// `_f2`: field offset, vtable index, `Method*` or resolved-references index
    pub fn f2(&self) -> u64 {
        self.word(self.config.cp_cache_entry_f2_offset)
    }

    /// Raw `_flags` word
    pub fn flags(&self) -> u64 {
        self.word(self.config.cp_cache_entry_flags_offset)
    }

    /// Whether a call site appendix is stored in the resolved references
    pub fn has_appendix(&self) -> bool {
        self.flag(self.config.cp_cache_entry_has_appendix_shift)
    }

    /// Whether `_f2` holds a final `Method*` instead of a vtable index
    pub fn is_vfinal(&self) -> bool {
        self.flag(self.config.cp_cache_entry_is_vfinal_shift)
    }

    fn flag(&self, shift: i64) -> bool {
        (self.flags() >> shift) & 1 != 0
    }
}

impl std::fmt::Debug for CpCacheEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpCacheEntry")
            .field("address", &format_args!("{:#x}", self.address))
            .field("cpi", &self.constant_pool_index())
            .field("bytecode_1", &self.bytecode_1())
            .field("bytecode_2", &self.bytecode_2())
            .finish()
    }
}
