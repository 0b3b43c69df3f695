//! Search rank resolution from ordered glob rules.
//!
//! Rules are evaluated in the order they were configured and the **last**
//! matching rule wins. Specificity plays no part: `[("api/index.html", 2),
//! ("*.html", 5)]` ranks `api/index.html` at `5`.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;

/// Rank of a page that no rule matches.
pub const DEFAULT_RANK: i32 = 1;

/// An ordered `(glob pattern, rank)` pair from build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRule {
    pub pattern: String,
    pub rank: i32,
}
impl RankRule {
    pub fn new(pattern: impl Into<String>, rank: i32) -> Self {
        Self { pattern: pattern.into(), rank }
    }
}

/// A shell-style glob compiled once into an anchored regular expression.
///
/// Follows `fnmatch` semantics: `*` matches any run of characters including
/// `/`, `?` matches exactly one character, `[seq]` and `[!seq]` match one
/// character in (or not in) the set, and an unterminated `[` is a literal.
/// The whole path must match, not a substring of it.
#[derive(Debug, Clone)]
struct Glob {
    regex: Regex,
}
impl Glob {
    fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&translate(pattern)).or_raise(|| ErrorKind::InvalidPattern(pattern.to_string()))?;
        Ok(Self { regex })
    }

    fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from(r"\A(?s:");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                while chars.get(i) == Some(&'*') {
                    i += 1;
                }
                out.push_str(".*");
            },
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                // A `]` straight after the opening bracket is a member, not the end.
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                    continue;
                }
                let mut body = &chars[i..j];
                i = j + 1;
                out.push('[');
                if body.first() == Some(&'!') {
                    out.push('^');
                    body = &body[1..];
                }
                for (position, member) in body.iter().enumerate() {
                    match member {
                        '\\' | '[' | ']' | '&' | '~' => {
                            out.push('\\');
                            out.push(*member);
                        },
                        '^' if position == 0 => out.push_str(r"\^"),
                        other => out.push(*other),
                    }
                }
                out.push(']');
            },
            other => {
                let mut buffer = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buffer)));
            },
        }
    }
    out.push_str(r")\z");
    out
}

/// Ordered rank rules, compiled.
///
/// # Examples
///
/// ```
/// use docsync_catalog::{RankRule, Ranker};
///
/// let ranker = Ranker::new(&[RankRule::new("*.html", 5), RankRule::new("api/index.html", 2)]).unwrap();
/// assert_eq!(ranker.rank("api/index.html"), 2);
/// assert_eq!(ranker.rank("test.html"), 5);
/// assert_eq!(ranker.rank("style.css"), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    rules: Vec<(Glob, i32)>,
}
impl Ranker {
    /// Compile the rules, preserving their order.
    ///
    /// Returns [`InvalidPattern`](ErrorKind::InvalidPattern) for the first
    /// pattern that cannot be compiled.
    pub fn new<'a>(rules: impl IntoIterator<Item = &'a RankRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| Ok((Glob::new(&rule.pattern)?, rule.rank)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Rank of `path`: the rank of the last rule matching it, or
    /// [`DEFAULT_RANK`] if none does.
    pub fn rank(&self, path: &str) -> i32 {
        self.rules.iter().fold(DEFAULT_RANK, |best, (glob, rank)| match glob.is_match(path) {
            true => *rank,
            false => best,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// One-shot form of [`Ranker::rank`] that compiles `rules` on every call.
pub fn rank(path: &str, rules: &[RankRule]) -> Result<i32> {
    Ok(Ranker::new(rules)?.rank(path))
}

/// Unordered glob patterns where any match counts, such as the pages
/// excluded from search indexing.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    globs: Vec<Glob>,
}
impl PatternSet {
    pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let globs = patterns.into_iter().map(|p| Glob::new(p.as_ref())).collect::<Result<Vec<_>>>()?;
        Ok(Self { globs })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.globs.iter().any(|glob| glob.is_match(path))
    }
}
