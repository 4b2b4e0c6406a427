//! Host identity
//!
//! Published artifact names are prefixed with the host name.

use sysinfo::System;

/// Fallback used when the OS does not report a host name
pub const UNKNOWN_HOST: &str = "localhost";

/// Resolve the host name once
///
/// `override_name` wins when set and non-empty; otherwise the OS host name is
/// used, then [`UNKNOWN_HOST`].
pub fn resolve_hostname(override_name: Option<&str>) -> String {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match System::host_name() {
        Some(name) if !name.is_empty() => name,
        _ => {
            tracing::warn!("Host name unavailable, using {}", UNKNOWN_HOST);
            UNKNOWN_HOST.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        assert_eq!(resolve_hostname(Some("node-7")), "node-7");
    }

    #[test]
    fn test_blank_override_ignored() {
        let name = resolve_hostname(Some("  "));
        assert!(!name.is_empty());
        assert_ne!(name.trim(), "");
    }
}
