// SPDX-License-Identifier: MPL-2.0

//! Package pattern parsing and matching.
//!
//! A pattern is either `NAME<OP>VERSION` with OP one of `>=`, `<=`, `>`,
//! `<`, an exact `NAME-VERSION`, or a shell glob matched against the full
//! `name-version` string.

use std::cmp::Ordering;

use crate::constraint::Constraint;
use crate::version::{version_cmp, Version};

const OPS: [char; 2] = ['>', '<'];
const GLOB: [char; 4] = ['*', '?', '[', ']'];

enum Bounds<'a> {
    Exact(&'a str),
    Interval {
        min: Option<(&'a str, bool)>,
        max: Option<(&'a str, bool)>,
    },
}

fn parse_bounds(pattern: &str) -> Option<(&str, Bounds<'_>)> {
    let cut = pattern.find(OPS).or_else(|| pattern.rfind('-'))?;
    let name = &pattern[..cut];
    let mut rest = &pattern[cut..];
    if let Some(stripped) = rest.strip_prefix('-') {
        rest = stripped;
    }

    let mut min = None;
    let mut max_part = None;
    if let Some(gt) = rest.find('>') {
        let after = &rest[gt + 1..];
        let inclusive = after.starts_with('=');
        let bound = &after[usize::from(inclusive)..];
        if let Some(lt) = bound.find('<') {
            min = Some((&bound[..lt], inclusive));
            max_part = Some(&bound[lt..]);
        } else {
            min = Some((bound, inclusive));
        }
    }
    let max = max_part
        .or_else(|| rest.find('<').map(|i| &rest[i..]))
        .map(|s| {
            let after = &s[1..];
            let inclusive = after.starts_with('=');
            (&after[usize::from(inclusive)..], inclusive)
        });

    if min.is_none() && max.is_none() {
        return Some((name, Bounds::Exact(rest)));
    }
    Some((name, Bounds::Interval { min, max }))
}

fn glob_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        // fnmatch(3) FNM_PERIOD: a leading period must be matched explicitly
        require_literal_leading_dot: true,
    }
}

/// Match a `name-version` string against a pattern.
pub fn pattern_match(pkgver: &str, pattern: &str) -> bool {
    if pattern == pkgver {
        return true;
    }
    if pattern.contains(GLOB) {
        return match glob::Pattern::new(pattern) {
            Ok(p) => p.matches_with(pkgver, glob_options()),
            Err(_) => false,
        };
    }
    let Some((name, bounds)) = parse_bounds(pattern) else {
        return false;
    };
    let Some((pkgname, version)) = pkgver.rsplit_once('-') else {
        return false;
    };
    if pkgname != name {
        return false;
    }
    match bounds {
        Bounds::Exact(v) => version_cmp(version, v) == Ordering::Equal,
        Bounds::Interval { min, max } => {
            if let Some((m, inclusive)) = min {
                match version_cmp(version, m) {
                    Ordering::Less => return false,
                    Ordering::Equal if !inclusive => return false,
                    _ => {}
                }
            }
            if let Some((m, inclusive)) = max {
                match version_cmp(version, m) {
                    Ordering::Greater => return false,
                    Ordering::Equal if !inclusive => return false,
                    _ => {}
                }
            }
            true
        }
    }
}

/// The package name of a pattern containing a comparison operator or glob
/// character, with a trailing `-` stripped. `*nslookup` has no extractable
/// name.
pub fn pattern_name(pattern: &str) -> Option<&str> {
    let idx = pattern.find(|c| OPS.contains(&c) || GLOB.contains(&c))?;
    let name = pattern[..idx].strip_suffix('-').unwrap_or(&pattern[..idx]);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

// Offset of the last `-` that is followed by a digit, splitting a
// name-version dependency expression.
fn rfind_dash_digit(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .rev()
        .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())
}

/// The target package name of a dependency expression: the pattern name for
/// operator and glob forms, the prefix before the version for `NAME-VERSION`
/// forms, and the whole string for a bare name.
pub fn dep_name(dep: &str) -> Option<&str> {
    if dep.contains(OPS) || dep.contains(GLOB) {
        return pattern_name(dep);
    }
    if let Some(idx) = rfind_dash_digit(dep) {
        return Some(&dep[..idx]);
    }
    if dep.is_empty() {
        None
    } else {
        Some(dep)
    }
}

/// Parse a dependency expression into its target package name and the
/// constraint the depender places on it. Glob dependencies carry no interval
/// and parse to `None`.
pub fn parse_dep(dep: &str) -> Option<(&str, Constraint)> {
    if dep.contains(GLOB) {
        return None;
    }
    if dep.contains(OPS) {
        let (name, bounds) = parse_bounds(dep)?;
        if name.is_empty() {
            return None;
        }
        let constraint = match bounds {
            Bounds::Exact(v) => Constraint::exactly(Version::from(v)),
            Bounds::Interval { min, max } => {
                let lower = match min {
                    None => std::ops::Bound::Unbounded,
                    Some((v, true)) => std::ops::Bound::Included(Version::from(v)),
                    Some((v, false)) => std::ops::Bound::Excluded(Version::from(v)),
                };
                let upper = match max {
                    None => std::ops::Bound::Unbounded,
                    Some((v, true)) => std::ops::Bound::Included(Version::from(v)),
                    Some((v, false)) => std::ops::Bound::Excluded(Version::from(v)),
                };
                Constraint::interval(lower, upper)
            }
        };
        return Some((name, constraint));
    }
    if let Some(idx) = rfind_dash_digit(dep) {
        let version = Version::from(&dep[idx + 1..]);
        return Some((&dep[..idx], Constraint::exactly(version)));
    }
    if dep.is_empty() {
        None
    } else {
        Some((dep, Constraint::any()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_patterns() {
        assert!(pattern_match("systemd-43_0", "systemd>=43"));
        assert!(pattern_match("systemd-44_1", "systemd>=43"));
        assert!(!pattern_match("systemd-42_1", "systemd>=43"));
        assert!(!pattern_match("systemd-43_0", "systemd<43"));
        assert!(pattern_match("systemd-43_0", "systemd<=43_0"));
        assert!(pattern_match("systemd-43_5", "systemd>=43<44"));
        assert!(!pattern_match("systemd-44_0", "systemd>=43<44"));
        // names must match exactly
        assert!(!pattern_match("systemd2-43_0", "systemd>=43"));
    }

    #[test]
    fn exact_patterns() {
        assert!(pattern_match("foo-1.2_1", "foo-1.2_1"));
        assert!(pattern_match("foo-1.0_1", "foo-1.0_1"));
        assert!(!pattern_match("foo-1.0_1", "foo-1.0_2"));
        // dewey equality, not string equality
        assert!(pattern_match("foo-1.0", "foo-1"));
    }

    #[test]
    fn glob_patterns() {
        assert!(pattern_match("systemd-1.2_3", "systemd-[0-9]*"));
        assert!(pattern_match("vim-8.2_1", "vim*"));
        assert!(!pattern_match("neovim-0.9_1", "vim*"));
    }

    #[test]
    fn pattern_names() {
        assert_eq!(pattern_name("systemd>=43"), Some("systemd"));
        assert_eq!(pattern_name("systemd>43"), Some("systemd"));
        assert_eq!(pattern_name("systemd<43"), Some("systemd"));
        assert_eq!(pattern_name("systemd<=43"), Some("systemd"));
        assert_eq!(pattern_name("systemd-[0-9]*"), Some("systemd"));
        assert_eq!(pattern_name("systemd>4[3-9]?"), Some("systemd"));
        assert_eq!(pattern_name("systemd<4_1?"), Some("systemd"));
        assert_eq!(pattern_name("*nslookup"), None);
    }

    #[test]
    fn dep_names() {
        assert_eq!(dep_name("systemd>=43"), Some("systemd"));
        assert_eq!(dep_name("B-1.0"), Some("B"));
        assert_eq!(dep_name("python-e_dbus"), Some("python-e_dbus"));
        assert_eq!(dep_name("font-adobe-100dpi-7.8_2"), Some("font-adobe-100dpi"));
        assert_eq!(dep_name("vim"), Some("vim"));
        assert_eq!(dep_name("*nslookup"), None);
    }

    #[test]
    fn dep_parsing() {
        let (name, c) = parse_dep("B>=2.0").unwrap();
        assert_eq!(name, "B");
        assert!(c.contains(&Version::from("2.0")));
        assert!(c.contains(&Version::from("3.1_2")));
        assert!(!c.contains(&Version::from("1.9")));

        let (name, c) = parse_dep("B-1.0").unwrap();
        assert_eq!(name, "B");
        assert!(c.contains(&Version::from("1.0")));
        assert!(!c.contains(&Version::from("1.1")));

        let (name, c) = parse_dep("A>=1<2").unwrap();
        assert_eq!(name, "A");
        assert!(c.contains(&Version::from("1.5")));
        assert!(!c.contains(&Version::from("2")));

        let (name, c) = parse_dep("vim").unwrap();
        assert_eq!(name, "vim");
        assert!(c.is_any());
    }
}
