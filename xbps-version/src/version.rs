// SPDX-License-Identifier: MPL-2.0

//! Version comparison compatible with the NetBSD "dewey" ordering.
//!
//! Instead of parsing the full version strings into an array of numbers,
//! both sides are tokenised lazily while comparing, so no memory is
//! allocated and parsing stops at the first differing component.
//!
//! Versions are split into components, each producing a number. Alphabetic
//! characters produce two numbers, a dot and the offset of the character in
//! the alphabet, so `"a"` is equal to `".1"`. Keywords return predefined
//! numbers ordered below every release: `alpha` < `beta` < `pre`/`rc` <
//! `.`/`pl` < any digit run. An `_` followed by digits sets the revision,
//! which only breaks ties once both component streams are exhausted; the
//! last revision wins.
//!
//! ```text
//! version   <- component*
//! revision  <- '_' DIGIT+
//! component <- DIGIT+ / '.' / revision / keyword / ALPHA
//! keyword   <- "alpha" / "beta" / "pre" / "pl" / "rc"
//! ```

use std::cmp::Ordering;
use std::fmt;

const ALPHA: i64 = -3;
const BETA: i64 = -2;
const RC: i64 = -1;
const DOT: i64 = 0;

struct Components<'a> {
    bytes: &'a [u8],
    pos: usize,
    // a plain letter yields Dot first, then its alphabet offset
    pending_alpha: bool,
    revision: i64,
}

impl<'a> Components<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
            pending_alpha: false,
            revision: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn number(&mut self) -> i64 {
        let mut n: i64 = 0;
        while let Some(c) = self.bytes.get(self.pos) {
            if !c.is_ascii_digit() {
                break;
            }
            n = n.saturating_mul(10).saturating_add(i64::from(c - b'0'));
            self.pos += 1;
        }
        n
    }

    fn keyword(&mut self, kw: &str, value: i64) -> Option<i64> {
        let rest = &self.bytes[self.pos..];
        if rest.len() >= kw.len() && rest[..kw.len()].eq_ignore_ascii_case(kw.as_bytes()) {
            self.pos += kw.len();
            Some(value)
        } else {
            None
        }
    }

    fn next(&mut self) -> i64 {
        if self.exhausted() {
            return 0;
        }
        if self.pending_alpha {
            self.pending_alpha = false;
            let c = self.bytes[self.pos];
            self.pos += 1;
            return i64::from(c.to_ascii_lowercase() - b'a') + 1;
        }
        match self.bytes[self.pos] {
            b'_' => {
                self.pos += 1;
                if !self.exhausted() && self.bytes[self.pos].is_ascii_digit() {
                    // revisions may appear multiple times, the last one wins
                    self.revision = self.number();
                }
                0
            }
            b'.' => {
                self.pos += 1;
                DOT
            }
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() => {
                if let Some(v) = self
                    .keyword("alpha", ALPHA)
                    .or_else(|| self.keyword("beta", BETA))
                    .or_else(|| self.keyword("pre", RC))
                    .or_else(|| self.keyword("rc", RC))
                    .or_else(|| self.keyword("pl", DOT))
                {
                    v
                } else {
                    self.pending_alpha = true;
                    DOT
                }
            }
            _ => {
                // ignore everything else
                self.pos += 1;
                0
            }
        }
    }
}

/// Compare two version strings under the dewey ordering.
///
/// Components are compared pairwise as long as both streams yield them. When
/// one stream runs out, the remaining components of the other are compared
/// against zero. On full component equality the revisions break the tie.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let mut a = Components::new(a);
    let mut b = Components::new(b);
    while !a.exhausted() && !b.exhausted() {
        match a.next().cmp(&b.next()) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    while !a.exhausted() {
        match a.next().cmp(&0) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    while !b.exhausted() {
        match 0.cmp(&b.next()) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    a.revision.cmp(&b.revision)
}

/// An owned version string ordered by [version_cmp].
///
/// Equality follows the comparison, not the spelling: `"1.0"`, `"1"` and
/// `"1pl"` are all equal. For that reason `Version` implements [Ord] but
/// deliberately not [std::hash::Hash].
#[derive(Debug, Clone)]
pub struct Version(String);

impl Version {
    pub fn new(s: impl Into<String>) -> Self {
        Version(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version(s.to_string())
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        version_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        version_cmp(&self.0, &other.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compare the version parts of two `name-version` strings, or two plain
/// versions. Names are not compared.
pub fn pkgver_cmp(a: &str, b: &str) -> Ordering {
    let av = a.rsplit_once('-').map_or(a, |(_, v)| v);
    let bv = b.rsplit_once('-').map_or(b, |(_, v)| v);
    version_cmp(av, bv)
}

/// Split a `name-version` string at its last `-`.
///
/// This is the lenient split used when matching candidates against patterns;
/// use [pkg_name] to decide whether a string carries a version at all.
pub fn pkgver_parts(pkgver: &str) -> Option<(&str, &str)> {
    pkgver.rsplit_once('-')
}

// The version part of a pkgver must carry a `_` revision separator with a
// digit somewhere before it, otherwise the trailing component is part of
// the name ("font-adobe-100dpi" has no version).
fn version_part(pkgver: &str) -> Option<usize> {
    let (name, version) = pkgver.rsplit_once('-')?;
    let rev = version.find('_')?;
    if !version[..rev].bytes().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(name.len())
}

/// The package name of a `name-version` string, if it has a version.
pub fn pkg_name(pkgver: &str) -> Option<&str> {
    version_part(pkgver).map(|n| &pkgver[..n])
}

/// The version of a `name-version` string, if it has one.
pub fn pkg_version(pkgver: &str) -> Option<&str> {
    version_part(pkgver).map(|n| &pkgver[n + 1..])
}

/// The revision of a `name-version` string: the digits after the last `_`.
pub fn pkg_revision(pkgver: &str) -> Option<&str> {
    let (_, rev) = pkgver.rsplit_once('_')?;
    if rev.is_empty() || !rev.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(rev)
}
