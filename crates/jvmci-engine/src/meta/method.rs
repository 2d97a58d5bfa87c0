//! Resolved and unresolved Java methods

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::cleaner::Cleanable;
use super::context::MetadataContext;
use super::handle::MethodPointer;
use super::signature::Signature;
use super::types::{HotSpotResolvedObjectType, JavaType};
use super::{ACC_ABSTRACT, ACC_NATIVE, ACC_STATIC, ACC_SYNCHRONIZED};
use crate::bridge::{LineNumberEntry, LocalVariableEntry, MethodInfo};
use crate::constant_pool::HotSpotConstantPool;
use crate::error::{JvmciError, JvmciResult};

/// An exception handler with its catch type looked up
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// First covered bci
    pub start_bci: u32,
    /// First bci after the covered range
    pub end_bci: u32,
    /// Handler bci
    pub handler_bci: u32,
    /// Constant pool index of the catch type, 0 for catch-all
    pub catch_type_cpi: u16,
    /// Catch type, `None` for catch-all
    pub catch_type: Option<JavaType>,
}

impl ExceptionHandler {
    /// Whether the handler catches everything
    pub fn is_catch_all(&self) -> bool {
        self.catch_type_cpi == 0
    }

    /// Whether `bci` is covered by this handler
    pub fn covers(&self, bci: u32) -> bool {
        (self.start_bci..self.end_bci).contains(&bci)
    }
}

/// Wrapper for a method loaded in the host
///
/// Bytecode and the debug tables are fetched on first use and kept for the
/// wrapper's lifetime.
pub struct HotSpotResolvedJavaMethod {
    method: MethodPointer,
    info: MethodInfo,
    signature: Signature,
    _pin: Cleanable,
    code: OnceCell<Vec<u8>>,
    exception_handlers: OnceCell<Vec<ExceptionHandler>>,
    line_numbers: OnceCell<Vec<LineNumberEntry>>,
    local_variables: OnceCell<Vec<LocalVariableEntry>>,
}

impl HotSpotResolvedJavaMethod {
    pub(crate) fn new(ctx: &MetadataContext, method: MethodPointer) -> JvmciResult<Self> {
        let info = ctx.compiler_to_vm().get_method_info(method);
        let signature = Signature::parse(&info.descriptor)
            .ok_or_else(|| JvmciError::Host(format!("malformed descriptor {} for {:?}", info.descriptor, method)))?;
        Ok(HotSpotResolvedJavaMethod {
            method,
            info,
            signature,
            _pin: ctx.pin_metadata(method.raw()),
            code: OnceCell::new(),
            exception_handlers: OnceCell::new(),
            line_numbers: OnceCell::new(),
            local_variables: OnceCell::new(),
        })
    }

    /// Native handle
    pub fn pointer(&self) -> MethodPointer {
        self.method
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Parsed descriptor
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Access flags
    pub fn modifiers(&self) -> u32 {
        self.info.modifiers
    }

    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.info.modifiers & ACC_STATIC != 0
    }

    /// Whether the method is native
    pub fn is_native(&self) -> bool {
        self.info.modifiers & ACC_NATIVE != 0
    }

    /// Whether the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.info.modifiers & ACC_ABSTRACT != 0
    }

    /// Whether the method is synchronized
    pub fn is_synchronized(&self) -> bool {
        self.info.modifiers & ACC_SYNCHRONIZED != 0
    }

    /// Whether the method has bytecode
    pub fn has_bytecodes(&self) -> bool {
        self.info.code_size > 0 && !self.is_native() && !self.is_abstract()
    }

    /// Local variable slots
    pub fn max_locals(&self) -> u16 {
        self.info.max_locals
    }

    /// Operand stack depth
    pub fn max_stack(&self) -> u16 {
        self.info.max_stack
    }

    /// Bytecode length
    pub fn code_size(&self) -> u32 {
        self.info.code_size
    }

    /// Declaring class
    pub fn holder(&self, ctx: &MetadataContext) -> Arc<HotSpotResolvedObjectType> {
        ctx.resolved_type(self.info.holder)
    }

    /// Constant pool the bytecode indexes into
    pub fn constant_pool(&self, ctx: &MetadataContext) -> Option<Arc<HotSpotConstantPool>> {
        self.holder(ctx).constant_pool(ctx)
    }

    /// Bytecode
    pub fn code(&self, ctx: &MetadataContext) -> &[u8] {
        self.code.get_or_init(|| {
            if self.info.code_size == 0 {
                Vec::new()
            } else {
                ctx.compiler_to_vm().get_bytecode(self.method)
            }
        })
    }

    /// Exception handlers, catch types looked up without resolution
    pub fn exception_handlers(&self, ctx: &MetadataContext) -> &[ExceptionHandler] {
        self.exception_handlers.get_or_init(|| {
            let entries = ctx.compiler_to_vm().get_exception_table(self.method);
            let pool = if entries.iter().any(|e| e.catch_type_cpi != 0) { self.constant_pool(ctx) } else { None };
            entries
                .into_iter()
                .map(|e| ExceptionHandler {
                    start_bci: e.start_bci,
                    end_bci: e.end_bci,
                    handler_bci: e.handler_bci,
                    catch_type_cpi: e.catch_type_cpi,
                    catch_type: match (&pool, e.catch_type_cpi) {
                        (_, 0) | (None, _) => None,
                        (Some(cp), cpi) => Some(cp.lookup_type(ctx, cpi as u32, None)),
                    },
                })
                .collect()
        })
    }

    /// Bci to line mapping
    pub fn line_number_table(&self, ctx: &MetadataContext) -> &[LineNumberEntry] {
        self.line_numbers.get_or_init(|| ctx.compiler_to_vm().get_line_number_table(self.method))
    }

    /// Source line of `bci`, if the method has line numbers
    pub fn line_number_at(&self, ctx: &MetadataContext, bci: u32) -> Option<u32> {
        self.line_number_table(ctx).iter().take_while(|e| e.bci <= bci).last().map(|e| e.line)
    }

    /// Local variable table
    pub fn local_variable_table(&self, ctx: &MetadataContext) -> &[LocalVariableEntry] {
        self.local_variables.get_or_init(|| ctx.compiler_to_vm().get_local_variable_table(self.method))
    }

    /// Discard the host's profile for this method
    pub fn reprofile(&self, ctx: &MetadataContext) {
        ctx.compiler_to_vm().reprofile(self.method)
    }

    /// Implementation invoked for `receiver` when called from `caller`
    pub fn resolve_for(
        &self,
        ctx: &MetadataContext,
        receiver: &HotSpotResolvedObjectType,
        caller: &HotSpotResolvedObjectType,
    ) -> JvmciResult<Option<Arc<HotSpotResolvedJavaMethod>>> {
        ctx.compiler_to_vm()
            .resolve_method(receiver.klass(), self.method, caller.klass())
            .map(|m| ctx.resolved_method(m))
            .transpose()
    }
}

impl fmt::Debug for HotSpotResolvedJavaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSpotMethod<{}{}, {:?}>", self.info.name, self.info.descriptor, self.method)
    }
}

/// A method referenced symbolically that the host has not linked
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedJavaMethod {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Declaring type as referenced
    pub holder: JavaType,
}

/// A method as seen by the compiler
#[derive(Debug, Clone)]
pub enum JavaMethod {
    /// Linked method wrapper
    Resolved(Arc<HotSpotResolvedJavaMethod>),
    /// Symbolic reference only
    Unresolved(UnresolvedJavaMethod),
}

impl JavaMethod {
    /// Method name
    pub fn name(&self) -> &str {
        match self {
            JavaMethod::Resolved(m) => m.name(),
            JavaMethod::Unresolved(u) => &u.name,
        }
    }

    /// Method descriptor
    pub fn descriptor(&self) -> &str {
        match self {
            JavaMethod::Resolved(m) => m.signature().descriptor(),
            JavaMethod::Unresolved(u) => &u.descriptor,
        }
    }

    /// Whether the method is linked
    pub fn is_resolved(&self) -> bool {
        matches!(self, JavaMethod::Resolved(_))
    }

    /// The wrapper, if linked
    pub fn as_resolved(&self) -> Option<&Arc<HotSpotResolvedJavaMethod>> {
        match self {
            JavaMethod::Resolved(m) => Some(m),
            JavaMethod::Unresolved(_) => None,
        }
    }
}

impl PartialEq for JavaMethod {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JavaMethod::Resolved(a), JavaMethod::Resolved(b)) => Arc::ptr_eq(a, b),
            (JavaMethod::Unresolved(a), JavaMethod::Unresolved(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::UnresolvedJavaType;

    #[test]
    fn test_exception_handler_coverage() {
        let h = ExceptionHandler { start_bci: 2, end_bci: 10, handler_bci: 12, catch_type_cpi: 0, catch_type: None };
        assert!(h.is_catch_all());
        assert!(h.covers(2));
        assert!(!h.covers(10));
    }

    #[test]
    fn test_unresolved_method_accessors() {
        let m = JavaMethod::Unresolved(UnresolvedJavaMethod {
            name: "run".into(),
            descriptor: "()V".into(),
            holder: JavaType::Unresolved(UnresolvedJavaType::new("app/Task")),
        });
        assert_eq!(m.name(), "run");
        assert_eq!(m.descriptor(), "()V");
        assert!(!m.is_resolved());
        assert_eq!(m, m.clone());
    }
}
