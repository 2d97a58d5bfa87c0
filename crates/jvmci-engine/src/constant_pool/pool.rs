//! Constant pool decoder
//!
//! Entries move from tag-only, to linked through a cache entry, to having a
//! resolved value. The host drives every transition and never reverses one,
//! so a value read here stays valid; reads of state the host may still be
//! filling in are volatile.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::bytecode::{Bytecode, OperandKind};
use super::cache_entry::CpCacheEntry;
use super::mutf8;
use super::tag::ConstantTag;
use crate::bridge::PoolKlass;
use crate::error::{JvmciError, JvmciResult};
use crate::meta::{
    Cleanable, ConstantPoolPointer, HotSpotResolvedJavaMethod, HotSpotResolvedObjectType, JavaConstant, JavaField,
    JavaMethod, JavaType, KlassPointer, MetadataContext, MethodPointer, ObjectConstant, UnresolvedJavaField,
    UnresolvedJavaMethod, UnresolvedJavaType,
};

/// Holder of every invokedynamic call site's target type
const METHOD_HANDLE_CLASS: &str = "java/lang/invoke/MethodHandle";
const VAR_HANDLE_CLASS: &str = "java/lang/invoke/VarHandle";

/// Result of [`HotSpotConstantPool::lookup_constant`]
#[derive(Debug, Clone, PartialEq)]
pub enum PoolConstant {
    /// Primitive, string, method handle or method type value
    Value(JavaConstant),
    /// Class literal
    Type(JavaType),
}

/// Wrapper for a host constant pool
pub struct HotSpotConstantPool {
    cp: ConstantPoolPointer,
    holder: KlassPointer,
    _pin: Cleanable,
    /// Last successful `lookup_type`, keyed by constant pool index
    last_type: Mutex<Option<(u32, JavaType)>>,
    /// Constant pool index to resolved-references index
    reference_map: OnceCell<FxHashMap<u32, usize>>,
    resolved_references: OnceCell<ObjectConstant>,
}

impl HotSpotConstantPool {
    pub(crate) fn new(ctx: &MetadataContext, cp: ConstantPoolPointer) -> Self {
        let holder = ctx.unsafe_access().get_address(cp.raw() + ctx.config().constant_pool_holder_offset as u64);
        HotSpotConstantPool {
            cp,
            holder: KlassPointer::new(holder),
            _pin: ctx.pin_metadata(cp.raw()),
            last_type: Mutex::new(None),
            reference_map: OnceCell::new(),
            resolved_references: OnceCell::new(),
        }
    }

    /// Native handle
    pub fn pointer(&self) -> ConstantPoolPointer {
        self.cp
    }

    /// Class owning this pool
    pub fn holder(&self, ctx: &MetadataContext) -> Arc<HotSpotResolvedObjectType> {
        ctx.resolved_type(self.holder)
    }

    /// Number of slots, including the unused slot 0
    pub fn length(&self, ctx: &MetadataContext) -> u32 {
        ctx.unsafe_access().get_int(self.cp.raw() + ctx.config().constant_pool_length_offset as u64) as u32
    }

    /// Tag of entry `cpi`
    pub fn tag_at(&self, ctx: &MetadataContext, cpi: u32) -> ConstantTag {
        debug_assert!(cpi < self.length(ctx), "constant pool index {cpi} out of range");
        let config = ctx.config();
        let access = ctx.unsafe_access();
        let tags = access.get_address(self.cp.raw() + config.constant_pool_tags_offset as u64);
        let raw = access.get_byte_volatile(tags + config.array_u1_data_offset as u64 + cpi as u64) as u8;
        config.tags.decode(raw)
    }

    fn slot_address(&self, ctx: &MetadataContext, cpi: u32) -> u64 {
        let config = ctx.config();
        self.cp.raw() + config.constant_pool_size as u64 + cpi as u64 * config.word_size as u64
    }

    fn int_at(&self, ctx: &MetadataContext, cpi: u32) -> u32 {
        ctx.unsafe_access().get_int(self.slot_address(ctx, cpi)) as u32
    }

    /// Contents of the `Symbol` stored in slot `cpi`
    fn symbol_at(&self, ctx: &MetadataContext, cpi: u32) -> Option<String> {
        let config = ctx.config();
        let access = ctx.unsafe_access();
        let symbol = access.get_address(self.slot_address(ctx, cpi));
        if symbol == 0 {
            return None;
        }
        let len = access.get_char(symbol + config.symbol_length_offset as u64) as usize;
        let body = access.get_bytes(symbol + config.symbol_body_offset as u64, len);
        let decoded = mutf8::decode(&body);
        if decoded.is_none() {
            debug!(cp = ?self.cp, cpi, "malformed modified UTF-8 in symbol");
        }
        decoded
    }

    /// Utf8 entry; `None` if the symbol is malformed
    pub fn lookup_utf8(&self, ctx: &MetadataContext, cpi: u32) -> Option<String> {
        debug_assert_eq!(self.tag_at(ctx, cpi), ConstantTag::Utf8);
        self.symbol_at(ctx, cpi)
    }

    /// Class index of a field or method reference
    pub fn uncached_klass_ref_index_at(&self, ctx: &MetadataContext, cpi: u32) -> u32 {
        debug_assert!(self.tag_at(ctx, cpi).is_member_ref(), "not a member reference at {cpi}");
        self.int_at(ctx, cpi) & 0xffff
    }

    /// NameAndType index of a member reference or invokedynamic entry
    pub fn uncached_name_and_type_ref_index_at(&self, ctx: &MetadataContext, cpi: u32) -> u32 {
        debug_assert!({
            let tag = self.tag_at(ctx, cpi);
            tag.is_member_ref() || tag == ConstantTag::InvokeDynamic
        });
        self.int_at(ctx, cpi) >> 16
    }

    /// Name index of a NameAndType entry
    pub fn name_ref_index_at(&self, ctx: &MetadataContext, nat: u32) -> u32 {
        debug_assert_eq!(self.tag_at(ctx, nat), ConstantTag::NameAndType);
        self.int_at(ctx, nat) & 0xffff
    }

    /// Descriptor index of a NameAndType entry
    pub fn signature_ref_index_at(&self, ctx: &MetadataContext, nat: u32) -> u32 {
        debug_assert_eq!(self.tag_at(ctx, nat), ConstantTag::NameAndType);
        self.int_at(ctx, nat) >> 16
    }

    /// Whether a raw operand is an encoded invokedynamic index
    pub fn is_invokedynamic_index(raw_index: i32) -> bool {
        raw_index < 0
    }

    /// Cache index of an invokedynamic operand
    pub fn decode_invokedynamic_index(raw_index: i32) -> u32 {
        debug_assert!(Self::is_invokedynamic_index(raw_index));
        !raw_index as u32
    }

    fn raw_index_to_cache_index(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> u32 {
        if Self::is_invokedynamic_index(raw_index) {
            debug_assert_eq!(opcode, Bytecode::Invokedynamic);
            Self::decode_invokedynamic_index(raw_index)
        } else {
            debug_assert_eq!(opcode.operand_kind(), OperandKind::CacheIndex, "{opcode:?} has no cache operand");
            (raw_index as i64 - ctx.config().constant_pool_cp_cache_index_tag) as u32
        }
    }

    /// Constant pool index named by an instruction operand
    pub fn raw_index_to_constant_pool_index(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> u32 {
        match opcode.operand_kind() {
            OperandKind::ConstantPoolIndex => {
                debug_assert!(raw_index >= 0, "negative operand {raw_index} for {opcode:?}");
                raw_index as u32
            }
            OperandKind::CacheIndex | OperandKind::InvokeDynamic => {
                let index = self.raw_index_to_cache_index(ctx, raw_index, opcode);
                self.cache_entry(ctx, index).constant_pool_index()
            }
        }
    }

    /// Entry `index` of this pool's cache
    pub fn cache_entry<'c>(&self, ctx: &'c MetadataContext, index: u32) -> CpCacheEntry<'c> {
        let config = ctx.config();
        let access = ctx.unsafe_access();
        let cache = access.get_address(self.cp.raw() + config.constant_pool_cache_offset as u64);
        debug_assert!(cache != 0, "constant pool has no cache");
        debug_assert!(
            (index as i32) < access.get_int(cache + config.cp_cache_length_offset as u64),
            "cache index {index} out of range"
        );
        CpCacheEntry::at(access, config, cache, index)
    }

    /// Whether the operand has been linked by the host
    pub fn is_resolved_operand(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> bool {
        match opcode.operand_kind() {
            OperandKind::ConstantPoolIndex => {
                let tag = self.tag_at(ctx, raw_index as u32);
                !matches!(tag, ConstantTag::UnresolvedClass | ConstantTag::UnresolvedClassInError)
            }
            _ => self.cache_entry(ctx, self.raw_index_to_cache_index(ctx, raw_index, opcode)).is_resolved(opcode),
        }
    }

    /// Name of the member an operand refers to
    pub fn lookup_name(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> Option<String> {
        let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
        let nat = self.uncached_name_and_type_ref_index_at(ctx, cpi);
        self.lookup_utf8(ctx, self.name_ref_index_at(ctx, nat))
    }

    /// Descriptor of the member an operand refers to
    pub fn lookup_signature(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> Option<String> {
        let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
        let nat = self.uncached_name_and_type_ref_index_at(ctx, cpi);
        self.lookup_utf8(ctx, self.signature_ref_index_at(ctx, nat))
    }

    fn reference_index_of(&self, ctx: &MetadataContext, cpi: u32) -> Option<usize> {
        let map = self.reference_map.get_or_init(|| {
            let config = ctx.config();
            let access = ctx.unsafe_access();
            let array = access.get_address(self.cp.raw() + config.constant_pool_reference_map_offset as u64);
            if array == 0 {
                return FxHashMap::default();
            }
            let len = access.get_int(array + config.array_length_offset as u64).max(0) as usize;
            let data = array + config.array_u2_data_offset as u64;
            (0..len).map(|i| (access.get_char(data + 2 * i as u64) as u32, i)).collect()
        });
        map.get(&cpi).copied()
    }

    /// The resolved references array, once the host has allocated it
    pub fn resolved_references(&self, ctx: &MetadataContext) -> Option<ObjectConstant> {
        if let Some(array) = self.resolved_references.get() {
            return Some(array.clone());
        }
        let array = ctx.object_constant(ctx.compiler_to_vm().get_resolved_references(self.cp)?);
        Some(self.resolved_references.get_or_init(|| array).clone())
    }

    /// Element `index` of the resolved references array, if filled
    pub fn resolved_reference_at(&self, ctx: &MetadataContext, index: usize) -> Option<ObjectConstant> {
        let array = self.resolved_references(ctx)?;
        let element = ctx.compiler_to_vm().read_object_array_element(array.handle()?, index)?;
        Some(ctx.object_constant(element))
    }

    /// String entry: the resolved string if the host has one, else built from the symbol
    fn lookup_string(&self, ctx: &MetadataContext, cpi: u32) -> Option<ObjectConstant> {
        if let Some(resolved) = self.reference_index_of(ctx, cpi).and_then(|i| self.resolved_reference_at(ctx, i)) {
            return Some(resolved);
        }
        let s = self.symbol_at(ctx, cpi)?;
        Some(ctx.intern_string(&s))
    }

    /// Value of a loadable entry
    ///
    /// Returns `Ok(None)` for a string whose symbol is malformed. Method
    /// handle and method type entries are resolved through the host, which
    /// may fail with a linkage error.
    pub fn lookup_constant(&self, ctx: &MetadataContext, cpi: u32) -> JvmciResult<Option<PoolConstant>> {
        let tag = self.tag_at(ctx, cpi);
        let access = ctx.unsafe_access();
        let slot = self.slot_address(ctx, cpi);
        let constant = match tag {
            ConstantTag::Integer => PoolConstant::Value(JavaConstant::Int(access.get_int(slot))),
            ConstantTag::Float => PoolConstant::Value(JavaConstant::Float(access.get_float(slot))),
            ConstantTag::Long => PoolConstant::Value(JavaConstant::Long(access.get_long(slot))),
            ConstantTag::Double => PoolConstant::Value(JavaConstant::Double(access.get_double(slot))),
            ConstantTag::String => match self.lookup_string(ctx, cpi) {
                Some(s) => PoolConstant::Value(JavaConstant::Object(s)),
                None => return Ok(None),
            },
            t if t.is_klass() => PoolConstant::Type(self.lookup_type(ctx, cpi, None)),
            ConstantTag::MethodHandle
            | ConstantTag::MethodHandleInError
            | ConstantTag::MethodType
            | ConstantTag::MethodTypeInError => {
                let object = ctx.compiler_to_vm().resolve_possibly_cached_constant_in_pool(self.cp, cpi)?;
                PoolConstant::Value(JavaConstant::Object(ctx.object_constant(object)))
            }
            other => {
                return Err(JvmciError::InvalidState(format!("entry {cpi} has non-loadable tag {other:?}")));
            }
        };
        Ok(Some(constant))
    }

    /// Class entry `cpi`, unresolved if the host has not loaded it
    ///
    /// `opcode`, when given, must take a plain constant pool index.
    pub fn lookup_type(&self, ctx: &MetadataContext, cpi: u32, opcode: Option<Bytecode>) -> JavaType {
        debug_assert!(opcode.map_or(true, |op| op.operand_kind() == OperandKind::ConstantPoolIndex));
        if let Some((last, ty)) = &*self.last_type.lock() {
            if *last == cpi {
                return ty.clone();
            }
        }

        let ty = match ctx.compiler_to_vm().lookup_klass_in_pool(self.cp, cpi) {
            PoolKlass::Resolved(klass) => JavaType::Resolved(ctx.resolved_type(klass)),
            PoolKlass::Unresolved(name) => JavaType::Unresolved(UnresolvedJavaType::new(name)),
        };
        if ty.is_resolved() {
            *self.last_type.lock() = Some((cpi, ty.clone()));
        }
        ty
    }

    /// Class referenced by an operand, directly or through a member reference
    pub fn lookup_referenced_type(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> JvmciResult<JavaType> {
        let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
        let tag = self.tag_at(ctx, cpi);
        if tag.is_member_ref() {
            Ok(self.lookup_type(ctx, self.uncached_klass_ref_index_at(ctx, cpi), None))
        } else if tag.is_klass() {
            Ok(self.lookup_type(ctx, cpi, None))
        } else {
            Err(JvmciError::InvalidState(format!("entry {cpi} with tag {tag:?} references no type")))
        }
    }

    /// Method an invoke operand refers to, read from the cache when linked
    fn linked_method(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> Option<MethodPointer> {
        let entry = self.cache_entry(ctx, self.raw_index_to_cache_index(ctx, raw_index, opcode));
        if entry.is_resolved(opcode) {
            let direct = match opcode {
                Bytecode::Invokestatic | Bytecode::Invokespecial | Bytecode::Invokedynamic | Bytecode::Invokehandle => {
                    entry.f1()
                }
                Bytecode::Invokevirtual if entry.is_vfinal() => entry.f2(),
                _ => 0,
            };
            if direct != 0 {
                trace!(cp = ?self.cp, raw_index, "method from cache entry");
                return Some(MethodPointer::new(direct));
            }
        }
        ctx.compiler_to_vm().lookup_method_in_pool(self.cp, raw_index, opcode.opcode())
    }

    /// Method an invoke operand refers to; unresolved if the host has not linked it
    pub fn lookup_method(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> JvmciResult<JavaMethod> {
        debug_assert!(opcode.is_invoke(), "{opcode:?} is not an invoke");
        if let Some(method) = self.linked_method(ctx, raw_index, opcode) {
            return Ok(JavaMethod::Resolved(ctx.resolved_method(method)?));
        }

        let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
        let nat = self.uncached_name_and_type_ref_index_at(ctx, cpi);
        let name = self.lookup_utf8(ctx, self.name_ref_index_at(ctx, nat)).unwrap_or_default();
        let descriptor = self.lookup_utf8(ctx, self.signature_ref_index_at(ctx, nat)).unwrap_or_default();
        let holder = if opcode == Bytecode::Invokedynamic {
            ctx.lookup_type(METHOD_HANDLE_CLASS, Some(self.holder), false)?
        } else {
            self.lookup_type(ctx, self.uncached_klass_ref_index_at(ctx, cpi), None)
        };
        Ok(JavaMethod::Unresolved(UnresolvedJavaMethod { name, descriptor, holder }))
    }

    /// Field a field-access operand refers to
    ///
    /// Resolution failures are not reported: the field comes back
    /// unresolved so that compilation can continue.
    pub fn lookup_field(
        &self,
        ctx: &MetadataContext,
        raw_index: i32,
        method: Option<&HotSpotResolvedJavaMethod>,
        opcode: Bytecode,
    ) -> JavaField {
        debug_assert!(opcode.is_field_access(), "{opcode:?} is not a field access");
        let resolved =
            ctx.compiler_to_vm().resolve_field_in_pool(self.cp, raw_index, method.map(|m| m.pointer()), opcode.opcode());
        match resolved {
            Ok(field) => JavaField::Resolved(ctx.resolved_field(field)),
            Err(err) => {
                debug!(cp = ?self.cp, raw_index, %err, "field left unresolved");
                let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
                let holder = self.lookup_type(ctx, self.uncached_klass_ref_index_at(ctx, cpi), None);
                let nat = self.uncached_name_and_type_ref_index_at(ctx, cpi);
                JavaField::Unresolved(UnresolvedJavaField {
                    holder,
                    name: self.lookup_utf8(ctx, self.name_ref_index_at(ctx, nat)).unwrap_or_default(),
                    descriptor: self.lookup_utf8(ctx, self.signature_ref_index_at(ctx, nat)).unwrap_or_default(),
                })
            }
        }
    }

    /// Appendix of a linked invokedynamic or invokehandle site
    pub fn lookup_appendix(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> Option<ObjectConstant> {
        debug_assert!(matches!(opcode, Bytecode::Invokedynamic | Bytecode::Invokehandle));
        let entry = self.cache_entry(ctx, self.raw_index_to_cache_index(ctx, raw_index, opcode));
        if !entry.is_resolved(opcode) || !entry.has_appendix() {
            return None;
        }
        let appendix = ctx.compiler_to_vm().lookup_appendix_in_pool(self.cp, raw_index)?;
        Some(ctx.object_constant(appendix))
    }

    /// Perform the resolution side effects of executing `opcode`
    ///
    /// Resolves the referenced class, initializes it for instructions that
    /// trigger initialization, and links invokedynamic and signature
    /// polymorphic call sites. Repeating the call is a no-op.
    pub fn load_referenced_type(&self, ctx: &MetadataContext, raw_index: i32, opcode: Bytecode) -> JvmciResult<()> {
        let cpi = self.raw_index_to_constant_pool_index(ctx, raw_index, opcode);
        let tag = self.tag_at(ctx, cpi);
        let c2v = ctx.compiler_to_vm();
        if tag.is_member_ref() || tag.is_klass() {
            let klass_cpi = if tag.is_member_ref() { self.uncached_klass_ref_index_at(ctx, cpi) } else { cpi };
            let klass = c2v.resolve_klass_in_pool(self.cp, klass_cpi)?;
            let ty = ctx.resolved_type(klass);
            if opcode.initializes_class() && !ty.is_array() {
                ty.initialize(ctx)?;
            }
            let polymorphic_holder = matches!(ty.name(), METHOD_HANDLE_CLASS | VAR_HANDLE_CLASS);
            if tag == ConstantTag::Methodref
                && polymorphic_holder
                && matches!(opcode, Bytecode::Invokevirtual | Bytecode::Invokehandle)
            {
                c2v.resolve_invoke_handle_in_pool(self.cp, raw_index)?;
            }
        } else if tag == ConstantTag::InvokeDynamic && Self::is_invokedynamic_index(raw_index) {
            c2v.resolve_invoke_dynamic_in_pool(self.cp, raw_index)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HotSpotConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSpotConstantPool<{:?}, holder {:?}>", self.cp, self.holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invokedynamic_index_encoding() {
        assert!(HotSpotConstantPool::is_invokedynamic_index(-1));
        assert!(!HotSpotConstantPool::is_invokedynamic_index(0));
        assert_eq!(HotSpotConstantPool::decode_invokedynamic_index(-1), 0);
        assert_eq!(HotSpotConstantPool::decode_invokedynamic_index(!5), 5);
    }
}
