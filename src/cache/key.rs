//! Tier Key Codec
//!
//! Both tiers address entries by the same fully-qualified key:
//!
//! ```text
//! <prefix><namespace>:<key>      e.g. "cache:profiles:u1"
//! ```
//!
//! L1 and L2 use the exact same string, so a key written through one path
//! is always found by any other.

/// Separator between namespace and key
pub const NAMESPACE_SEPARATOR: char = ':';

/// Build the fully-qualified cache key.
#[inline]
pub fn build_key(prefix: &str, namespace: &str, key: &str) -> String {
    let mut full = String::with_capacity(prefix.len() + namespace.len() + key.len() + 1);
    full.push_str(prefix);
    full.push_str(namespace);
    full.push(NAMESPACE_SEPARATOR);
    full.push_str(key);
    full
}

/// Namespace prefix without a trailing key, used for starts-with matching.
#[inline]
pub fn namespace_prefix(prefix: &str, namespace: &str) -> String {
    build_key(prefix, namespace, "")
}

/// Glob pattern matching every key of a namespace in the remote store.
#[inline]
pub fn namespace_pattern(prefix: &str, namespace: &str) -> String {
    build_key(prefix, namespace, "*")
}

/// Split a fully-qualified key back into `(namespace, key)`.
///
/// The namespace ends at the first separator after the prefix, so keys may
/// themselves contain `:`.
pub fn parse_key<'a>(prefix: &str, full_key: &'a str) -> Option<(&'a str, &'a str)> {
    full_key
        .strip_prefix(prefix)?
        .split_once(NAMESPACE_SEPARATOR)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("cache:", "profiles", "u1"), "cache:profiles:u1");
        assert_eq!(build_key("", "ns", "k"), "ns:k");
    }

    #[test]
    fn test_namespace_prefix_and_pattern() {
        assert_eq!(namespace_prefix("cache:", "a"), "cache:a:");
        assert_eq!(namespace_pattern("cache:", "a"), "cache:a:*");
        assert!(build_key("cache:", "a", "x").starts_with(&namespace_prefix("cache:", "a")));
    }

    #[test]
    fn test_namespace_prefix_does_not_match_longer_namespace() {
        // "a:" must not match keys of namespace "ab"
        let key = build_key("cache:", "ab", "x");
        assert!(!key.starts_with(&namespace_prefix("cache:", "a")));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("cache:", "cache:profiles:u1"), Some(("profiles", "u1")));
        assert_eq!(
            parse_key("cache:", "cache:reports:2024:q1"),
            Some(("reports", "2024:q1"))
        );
        assert_eq!(parse_key("cache:", "other:profiles:u1"), None);
        assert_eq!(parse_key("cache:", "cache:nosep"), None);
    }
}
