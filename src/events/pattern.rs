//! Registration pattern matching.
//!
//! Three forms, checked in order: the universal `*`, an exact identifier,
//! and a trailing `domain.*` prefix subscription. No mid-pattern wildcards
//! and no character classes, so matching is O(pattern length) and fully
//! deterministic.

/// Check whether a registration pattern matches an operation identifier.
///
/// `"accounting.*"` matches `"accounting.entry.create"` (any depth below the
/// prefix) but not `"accounting"` itself; `"pay.*"` does not match
/// `"payment.approve"` because prefixes bind at dot boundaries.
pub fn matches(pattern: &str, operation_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern == operation_id {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return operation_id
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'));
    }
    false
}
