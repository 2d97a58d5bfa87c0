//! Error taxonomy for the compiler-to-VM interface
//!
//! Host-reported failures are recoverable and travel back to the calling
//! compiler unchanged. Configuration mismatches and service ambiguity are
//! fatal: runtime initialization fails and the embedder is expected to abort.
//! Caller-contract violations (bad handles, out-of-range indices) are not
//! represented here; they are debug assertions.

/// Errors surfaced by the interface layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JvmciError {
    /// Class, field or method linkage failed in the host
    #[error("LinkageError: {0}")]
    Linkage(String),

    /// A named configuration entry is absent from the host snapshot
    #[error("VM config entry missing: {kind} {name}")]
    MissingConfig {
        /// Entry category (field, constant, address, flag)
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// A configuration entry exists but carries the wrong type
    #[error("VM config entry {name} has type {actual}, expected {expected}")]
    ConfigTypeMismatch {
        /// Requested name
        name: String,
        /// Type the caller asked for
        expected: String,
        /// Type the host declared
        actual: String,
    },

    /// More than one implementation registered where exactly one is required
    #[error("Multiple {service} implementations found: {first} and {second}")]
    AmbiguousService {
        /// Service interface name
        service: &'static str,
        /// First conflicting implementation
        first: String,
        /// Second conflicting implementation
        second: String,
    },

    /// No implementation registered where exactly one is required
    #[error("No {service} implementation found{}", selected_suffix(.selected))]
    MissingService {
        /// Service interface name
        service: &'static str,
        /// Explicitly selected name, if any
        selected: Option<String>,
    },

    /// Compilation or installation gave up with a reason
    #[error("Bailout: {0}")]
    Bailout(String),

    /// Operation not permitted in the current object state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other failure reported by the host
    #[error("Host error: {0}")]
    Host(String),
}

impl JvmciError {
    /// Create a missing-field error
    pub fn missing_field(name: impl Into<String>) -> Self {
        JvmciError::MissingConfig { kind: "field", name: name.into() }
    }

    /// Create a missing-constant error
    pub fn missing_constant(name: impl Into<String>) -> Self {
        JvmciError::MissingConfig { kind: "constant", name: name.into() }
    }

    /// Create a missing-address error
    pub fn missing_address(name: impl Into<String>) -> Self {
        JvmciError::MissingConfig { kind: "address", name: name.into() }
    }

    /// Create a missing-flag error
    pub fn missing_flag(name: impl Into<String>) -> Self {
        JvmciError::MissingConfig { kind: "flag", name: name.into() }
    }

    /// Whether this error leaves no safe way to continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JvmciError::MissingConfig { .. }
                | JvmciError::ConfigTypeMismatch { .. }
                | JvmciError::AmbiguousService { .. }
                | JvmciError::MissingService { .. }
        )
    }
}

fn selected_suffix(selected: &Option<String>) -> String {
    selected.as_ref().map(|s| format!(" named {s}")).unwrap_or_default()
}

/// Result alias used throughout the crate
pub type JvmciResult<T> = Result<T, JvmciError>;
