//! Compiler service interfaces and factory selection

use std::sync::Arc;

use super::JvmciRuntime;
use crate::code::{CompiledCode, InstalledCode};
use crate::error::{JvmciError, JvmciResult};
use crate::meta::{CompileId, HotSpotResolvedJavaMethod};

/// One request to compile a method
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    /// Method to compile
    pub method: Arc<HotSpotResolvedJavaMethod>,
    /// `-1` for a normal entry, otherwise the OSR bci
    pub entry_bci: i32,
    /// Host-assigned request id
    pub compile_id: CompileId,
}

/// Outcome of a compilation request
#[derive(Debug, Clone, Default)]
pub struct CompilationRequestResult {
    /// Why compilation failed, `None` on success
    pub failure_message: Option<String>,
    /// Whether the host should retry the request later
    pub retry: bool,
    /// Bytecodes processed, including inlined methods
    pub inlined_bytecodes: u64,
    /// The code that was installed
    pub installed: Option<Arc<InstalledCode>>,
}

impl CompilationRequestResult {
    /// Successful compilation
    pub fn success(installed: Arc<InstalledCode>, inlined_bytecodes: u64) -> Self {
        CompilationRequestResult { failure_message: None, retry: false, inlined_bytecodes, installed: Some(installed) }
    }

    /// Failed compilation
    pub fn failure(message: impl Into<String>, retry: bool) -> Self {
        CompilationRequestResult { failure_message: Some(message.into()), retry, ..Default::default() }
    }

    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }
}

/// A compiler serving requests from the host
pub trait JvmciCompiler: Send + Sync {
    /// Compile and install code for `request`
    fn compile_method(&self, runtime: &JvmciRuntime, request: &CompilationRequest) -> CompilationRequestResult;
}

/// Registered provider of a [`JvmciCompiler`]
pub trait JvmciCompilerFactory: Send + Sync {
    /// Name used for explicit selection
    fn name(&self) -> &str;

    /// Create the compiler; called once, on first use
    fn create_compiler(&self, runtime: &JvmciRuntime) -> Arc<dyn JvmciCompiler>;
}

/// Observer of host events
pub trait HotSpotVmEventListener: Send + Sync {
    /// Code was installed
    fn notify_install(&self, _code: &CompiledCode, _installed: &InstalledCode) {}

    /// The host finished bootstrapping the compiler
    fn notify_bootstrap_finished(&self) {}

    /// The host is shutting down
    fn notify_shutdown(&self) {}
}

/// Pick exactly one factory, by name when `selected` is given
///
/// Two candidates with nothing to choose between them is a fatal
/// [`JvmciError::AmbiguousService`] naming both.
pub fn select_factory(
    factories: Vec<Arc<dyn JvmciCompilerFactory>>,
    selected: Option<&str>,
) -> JvmciResult<Arc<dyn JvmciCompilerFactory>> {
    let mut candidates = factories.into_iter().filter(|f| selected.map_or(true, |name| f.name() == name));
    let first = candidates.next().ok_or_else(|| JvmciError::MissingService {
        service: "JvmciCompilerFactory",
        selected: selected.map(str::to_string),
    })?;
    if let Some(second) = candidates.next() {
        return Err(JvmciError::AmbiguousService {
            service: "JvmciCompilerFactory",
            first: first.name().to_string(),
            second: second.name().to_string(),
        });
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    struct Never;

    impl JvmciCompiler for Never {
        fn compile_method(&self, _: &JvmciRuntime, _: &CompilationRequest) -> CompilationRequestResult {
            CompilationRequestResult::failure("unsupported", false)
        }
    }

    impl JvmciCompilerFactory for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn create_compiler(&self, _: &JvmciRuntime) -> Arc<dyn JvmciCompiler> {
            Arc::new(Never)
        }
    }

    fn factories(names: &[&'static str]) -> Vec<Arc<dyn JvmciCompilerFactory>> {
        names.iter().map(|n| Arc::new(Named(*n)) as Arc<dyn JvmciCompilerFactory>).collect()
    }

    #[test]
    fn test_single_factory_selected() {
        let f = select_factory(factories(&["graal"]), None).unwrap();
        assert_eq!(f.name(), "graal");
    }

    #[test]
    fn test_two_factories_ambiguous() {
        let err = select_factory(factories(&["graal", "c1x"]), None).err().unwrap();
        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("graal") && message.contains("c1x"), "{message}");
    }

    #[test]
    fn test_selection_by_name() {
        let f = select_factory(factories(&["graal", "c1x"]), Some("c1x")).unwrap();
        assert_eq!(f.name(), "c1x");
        let err = select_factory(factories(&["graal"]), Some("nope")).err().unwrap();
        assert!(matches!(err, JvmciError::MissingService { selected: Some(_), .. }));
        assert!(select_factory(Vec::new(), None).is_err());
    }
}
