//! Runtime options

use std::str::FromStr;

/// Options controlling the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmciOptions {
    /// Write the configuration store dump to the host log at startup
    pub print_config: bool,
    /// Installation size cap in bytes, checked before the host is asked (default: none)
    pub max_code_size: Option<usize>,
    /// Log every installation at info level
    pub trace_installs: bool,
    /// Sweep released handles every N registrations (default: 64)
    pub cleaner_sweep_interval: u64,
    /// Name of the compiler factory to use when several are registered
    pub compiler: Option<String>,
}

impl Default for JvmciOptions {
    fn default() -> Self {
        JvmciOptions {
            print_config: false,
            max_code_size: None,
            trace_installs: false,
            cleaner_sweep_interval: 64,
            compiler: None,
        }
    }
}

impl JvmciOptions {
    /// Options from `JVMCI_*` environment variables; unparseable values keep their default
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Options from an arbitrary variable source
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = JvmciOptions::default();
        JvmciOptions {
            print_config: get("JVMCI_PRINT_CONFIG").and_then(|v| parse_bool(&v)).unwrap_or(defaults.print_config),
            max_code_size: get("JVMCI_MAX_CODE_SIZE").and_then(|v| parse(&v)).or(defaults.max_code_size),
            trace_installs: get("JVMCI_TRACE_INSTALLS").and_then(|v| parse_bool(&v)).unwrap_or(defaults.trace_installs),
            cleaner_sweep_interval: get("JVMCI_CLEANER_SWEEP_INTERVAL")
                .and_then(|v| parse(&v))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cleaner_sweep_interval),
            compiler: get("JVMCI_COMPILER").filter(|v| !v.trim().is_empty()).or(defaults.compiler),
        }
    }
}

fn parse<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn lookup(vars: &[(&str, &str)]) -> JvmciOptions {
        let vars: FxHashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        JvmciOptions::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_without_variables() {
        assert_eq!(lookup(&[]), JvmciOptions::default());
    }

    #[test]
    fn test_parses_variables() {
        let opts = lookup(&[
            ("JVMCI_PRINT_CONFIG", "true"),
            ("JVMCI_MAX_CODE_SIZE", "4096"),
            ("JVMCI_TRACE_INSTALLS", "1"),
            ("JVMCI_CLEANER_SWEEP_INTERVAL", "8"),
            ("JVMCI_COMPILER", "graal"),
        ]);
        assert!(opts.print_config);
        assert_eq!(opts.max_code_size, Some(4096));
        assert!(opts.trace_installs);
        assert_eq!(opts.cleaner_sweep_interval, 8);
        assert_eq!(opts.compiler.as_deref(), Some("graal"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let opts = lookup(&[
            ("JVMCI_PRINT_CONFIG", "maybe"),
            ("JVMCI_MAX_CODE_SIZE", "-3"),
            ("JVMCI_CLEANER_SWEEP_INTERVAL", "0"),
            ("JVMCI_COMPILER", "  "),
        ]);
        assert_eq!(opts, JvmciOptions::default());
    }
}
