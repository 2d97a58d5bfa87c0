//! Installed code handles and installation outcomes

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of asking the host to install code
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum InstallResult {
    /// Installed
    Ok,
    /// No room left in the code cache
    CodeCacheFull,
    /// The blob exceeds the host's size limit
    CodeTooLarge,
    /// A hierarchy assumption no longer holds
    DependenciesFailed,
    /// The dependency recording itself is invalid (class redefinition raced)
    DependenciesInvalid,
}

impl InstallResult {
    /// Whether the code was installed
    pub fn is_ok(self) -> bool {
        self == InstallResult::Ok
    }

    /// Whether trying again later could succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, InstallResult::CodeCacheFull | InstallResult::DependenciesInvalid)
    }

    /// Human readable description
    pub fn describe(self) -> &'static str {
        match self {
            InstallResult::Ok => "ok",
            InstallResult::CodeCacheFull => "code cache is full",
            InstallResult::CodeTooLarge => "code is too large",
            InstallResult::DependenciesFailed => "dependencies failed",
            InstallResult::DependenciesInvalid => "dependencies invalid",
        }
    }
}

impl fmt::Display for InstallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Handle to code in the host's code cache
///
/// Doubles as the output parameter of installation: the host fills in the
/// address and entry point on success. A zero entry point means the code can
/// no longer be entered; a zero address means the blob has been freed.
#[derive(Debug)]
pub struct InstalledCode {
    name: String,
    address: AtomicU64,
    entry_point: AtomicU64,
    version: AtomicU64,
    size: AtomicU64,
}

impl InstalledCode {
    /// A handle not yet bound to any code
    pub fn new(name: impl Into<String>) -> Self {
        InstalledCode {
            name: name.into(),
            address: AtomicU64::new(0),
            entry_point: AtomicU64::new(0),
            version: AtomicU64::new(0),
            size: AtomicU64::new(0),
        }
    }

    /// Name given at creation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address of the code blob, 0 when not installed or freed
    pub fn address(&self) -> u64 {
        self.address.load(Ordering::Acquire)
    }

    /// Entry point, 0 once invalidated
    pub fn entry_point(&self) -> u64 {
        self.entry_point.load(Ordering::Acquire)
    }

    /// Incremented on every install and invalidation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Installed size in bytes
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Whether the code can still be entered
    pub fn is_valid(&self) -> bool {
        self.entry_point() != 0
    }

    /// Whether the blob still exists in the code cache
    pub fn is_alive(&self) -> bool {
        self.address() != 0
    }

    /// Bind to freshly installed code; called by the host
    pub fn set_installed(&self, address: u64, entry_point: u64, size: u64) {
        self.size.store(size, Ordering::Relaxed);
        self.address.store(address, Ordering::Release);
        self.entry_point.store(entry_point, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Make the code non-entrant; called by the host
    pub fn mark_invalid(&self) {
        if self.entry_point.swap(0, Ordering::AcqRel) != 0 {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Forget the blob after the host freed it; called by the host
    pub fn mark_dead(&self) {
        self.mark_invalid();
        self.address.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let code = InstalledCode::new("foo");
        assert!(!code.is_valid());
        assert!(!code.is_alive());

        code.set_installed(0x1000, 0x1020, 64);
        assert!(code.is_valid());
        assert!(code.is_alive());
        assert_eq!(code.version(), 1);

        code.mark_invalid();
        assert!(!code.is_valid());
        assert!(code.is_alive());
        assert_eq!(code.version(), 2);

        // Invalidating twice does not bump the version again
        code.mark_invalid();
        assert_eq!(code.version(), 2);

        code.mark_dead();
        assert!(!code.is_alive());
    }

    #[test]
    fn test_result_classification() {
        assert!(InstallResult::Ok.is_ok());
        assert!(!InstallResult::CodeTooLarge.is_ok());
        assert!(!InstallResult::CodeTooLarge.is_retryable());
        assert!(InstallResult::CodeCacheFull.is_retryable());
        assert_eq!(InstallResult::DependenciesFailed.to_string(), "dependencies failed");
    }
}
