//! Version-name ordering: semver where valid, lexical fallback otherwise, with
//! the unversioned (empty-string) variant sorted first.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SemverKey {
    major: u64,
    minor: u64,
    patch: u64,
    rest: String,
}

fn parse_semver(name: &str) -> Option<SemverKey> {
    let trimmed = name.strip_prefix('v').unwrap_or(name);
    let mut parts = trimmed.splitn(2, |c| c == '-' || c == '+');
    let core = parts.next()?;
    let rest = parts.next().unwrap_or("").to_string();

    let mut nums = core.split('.');
    let major = nums.next()?.parse().ok()?;
    let minor = nums.next().unwrap_or("0").parse().ok()?;
    let patch = nums.next().unwrap_or("0").parse().ok()?;
    if nums.next().is_some() {
        return None;
    }

    Some(SemverKey {
        major,
        minor,
        patch,
        rest,
    })
}

/// Orders two normalized version names. The unversioned variant (`""`)
/// sorts first regardless of comparison direction the caller applies
/// afterwards; callers reverse the whole ordering for "descending" listings,
/// so unversioned-first is preserved at both ends by special-casing it here.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    match (parse_semver(a), parse_semver(b)) {
        (Some(sa), Some(sb)) => sa
            .major
            .cmp(&sb.major)
            .then(sa.minor.cmp(&sb.minor))
            .then(sa.patch.cmp(&sb.patch))
            .then_with(|| match (sa.rest.is_empty(), sb.rest.is_empty()) {
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => sa.rest.cmp(&sb.rest),
            }),
        _ => a.cmp(b),
    }
}

/// Sorts version names ascending, unversioned first, falling back to lexical
/// order for any pair that doesn't both parse as semver.
pub fn sort_versions(names: &mut [String]) {
    names.sort_by(|a, b| compare_versions(a, b));
}

/// Whether `name` is the unversioned variant or parses as semver. `list_versions`
/// (§3) filters out tokens that fail this, rather than folding them into the
/// lexical-fallback ordering `compare_versions` uses elsewhere.
pub fn is_parseable(name: &str) -> bool {
    name.is_empty() || parse_semver(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unversioned_sorts_first() {
        let mut v = vec!["2.0.0".to_string(), "".to_string(), "1.0.0".to_string()];
        sort_versions(&mut v);
        assert_eq!(v, vec!["".to_string(), "1.0.0".to_string(), "2.0.0".to_string()]);
    }

    #[test]
    fn semver_orders_numerically_not_lexically() {
        let mut v = vec!["2.0.0".to_string(), "10.0.0".to_string(), "9.0.0".to_string()];
        sort_versions(&mut v);
        assert_eq!(
            v,
            vec!["2.0.0".to_string(), "9.0.0".to_string(), "10.0.0".to_string()]
        );
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn invalid_semver_falls_back_to_lexical() {
        assert_eq!(compare_versions("latest-unstable", "nightly"), Ordering::Less);
    }

    #[test]
    fn is_parseable_accepts_unversioned_and_semver_only() {
        assert!(is_parseable(""));
        assert!(is_parseable("1.2.3"));
        assert!(is_parseable("v2.0.0-beta"));
        assert!(!is_parseable("latest-unstable"));
        assert!(!is_parseable("nightly"));
    }
}
