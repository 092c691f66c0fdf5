//! Pattern matching: regular expressions and shell-style wildcards.
//!
//! | Mode | Used by | Description |
//! |------|---------|-------------|
//! | [`MatchMode::Regexp`]   | `contains`, `find`, `replace`, `~=` | [`regex`] crate |
//! | [`MatchMode::Wildcard`] | `CONFIG` tests, `exists`, `files`   | `*`, `?`, `[…]` |
//!
//! Matching is case-sensitive unless a regex is compiled with
//! [`Pattern::regex_ci`].

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

// ── Public types ─────────────────────────────────────────────────────────────

/// Which matching algorithm a [`Pattern`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Regexp,
    Wildcard,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex(regex::Error),
    InvalidWildcard(String),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::InvalidRegex(e) => write!(f, "regex error: {e}"),
            PatternError::InvalidWildcard(msg) => write!(f, "wildcard error: {msg}"),
        }
    }
}

impl std::error::Error for PatternError {}

// Arc wrappers make Clone a reference-count increment instead of a recompile.
#[derive(Clone)]
enum Compiled {
    Regex { search: Arc<Regex>, exact: Arc<Regex> },
    Wildcard,
}

/// A compiled pattern ready for matching.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    mode: MatchMode,
    compiled: Compiled,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("src", &self.src)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Pattern {
    /// Compile `src` using `mode`.
    pub fn new(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        match mode {
            MatchMode::Regexp => Self::compile_regex(src, false),
            MatchMode::Wildcard => {
                check_wildcard(src).map_err(PatternError::InvalidWildcard)?;
                Ok(Self {
                    src: src.to_owned(),
                    mode,
                    compiled: Compiled::Wildcard,
                })
            }
        }
    }

    /// Compile a case-sensitive regular expression.
    pub fn regex(src: &str) -> Result<Self, PatternError> {
        Self::compile_regex(src, false)
    }

    /// Compile a case-insensitive regular expression.
    pub fn regex_ci(src: &str) -> Result<Self, PatternError> {
        Self::compile_regex(src, true)
    }

    fn compile_regex(src: &str, case_insensitive: bool) -> Result<Self, PatternError> {
        let build = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(PatternError::InvalidRegex)
        };
        let search = build(src)?;
        let exact = build(&format!("^(?:{src})$"))?;
        Ok(Self {
            src: src.to_owned(),
            mode: MatchMode::Regexp,
            compiled: Compiled::Regex {
                search: Arc::new(search),
                exact: Arc::new(exact),
            },
        })
    }

    /// The original source string.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// The match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns `true` if the pattern matches the whole of `text`.
    pub fn exact_match(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Regex { exact, .. } => exact.is_match(text),
            Compiled::Wildcard => wildcard_match(&self.src, text),
        }
    }

    /// Returns `true` if the pattern matches anywhere in `text`.
    ///
    /// Wildcards always match whole strings.
    pub fn is_match(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Regex { search, .. } => search.is_match(text),
            Compiled::Wildcard => wildcard_match(&self.src, text),
        }
    }

    /// Substitute matches of this pattern in `text`.
    ///
    /// `after` uses `\1`-style back-references.  When `all` is `false` only
    /// the leftmost match is replaced.  Wildcard patterns replace the whole
    /// text when they match.
    pub fn replace(&self, text: &str, after: &str, all: bool) -> String {
        match &self.compiled {
            Compiled::Regex { search, .. } => {
                let rep = backref_replacement(after);
                let limit = if all { 0 } else { 1 };
                search.replacen(text, limit, rep.as_str()).into_owned()
            }
            Compiled::Wildcard => {
                if wildcard_match(&self.src, text) {
                    after.to_owned()
                } else {
                    text.to_owned()
                }
            }
        }
    }
}

/// Escape every regex metacharacter in `text`.
pub fn escape(text: &str) -> String {
    regex::escape(text)
}

/// Translate a `\1`-style replacement string into the `${1}` syntax the
/// [`regex`] crate expects, escaping literal `$`.
pub fn backref_replacement(after: &str) -> String {
    let chars: Vec<char> = after.chars().collect();
    let mut out = String::with_capacity(after.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '$' => out.push_str("$$"),
            '\\' if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() && end - start < 2 {
                    end += 1;
                }
                let n: String = chars[start..end].iter().collect();
                out.push_str("${");
                out.push_str(&n);
                out.push('}');
                i = end;
                continue;
            }
            '\\' if i + 1 < chars.len() && chars[i + 1] == '\\' => {
                out.push('\\');
                i += 1;
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}

// ── Wildcard matching ────────────────────────────────────────────────────────

/// Match `text` against a shell-style wildcard covering the whole string.
pub fn wildcard_match(pat: &str, text: &str) -> bool {
    let p: Vec<char> = pat.chars().collect();
    let s: Vec<char> = text.chars().collect();
    wmatch(&p, &s)
}

/// Returns `true` if `text` contains any wildcard metacharacter.
pub fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Iterative matcher with a single backtrack point at the most recent `*`.
///
/// Only the latest star ever needs to be retried, so this stays
/// O(pattern × subject) where the recursive form goes exponential.
fn wmatch(pat: &[char], s: &[char]) -> bool {
    let (mut p, mut i) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while i < s.len() {
        let step = match pat.get(p).copied() {
            Some('*') => {
                star = Some((p + 1, i));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('\\') if p + 1 < pat.len() => (pat[p + 1] == s[i]).then_some(p + 2),
            Some('[') => class_match(&pat[p + 1..], s[i]).map(|rest| pat.len() - rest.len()),
            Some(c) => (c == s[i]).then_some(p + 1),
            None => None,
        };
        match step {
            Some(next) => {
                p = next;
                i += 1;
            }
            None => match star {
                Some((sp, si)) => {
                    p = sp;
                    i = si + 1;
                    star = Some((sp, si + 1));
                }
                None => return false,
            },
        }
    }

    pat[p..].iter().all(|&c| c == '*')
}

/// Match a character class `[…]` against `ch`.
///
/// `class` is the slice after the opening `[`.  Returns the slice after the
/// closing `]` on match, `None` on non-match or when the class is unclosed.
fn class_match(mut class: &[char], ch: char) -> Option<&[char]> {
    let negated = matches!(class.first(), Some('^' | '!'));
    if negated {
        class = &class[1..];
    }

    let mut matched = false;
    let mut first = true;
    loop {
        match class.first().copied() {
            None => return None,
            Some(']') if !first => break,
            Some(lo) => {
                if class.len() >= 3 && class[1] == '-' && class[2] != ']' {
                    if ch >= lo && ch <= class[2] {
                        matched = true;
                    }
                    class = &class[3..];
                } else {
                    if lo == ch {
                        matched = true;
                    }
                    class = &class[1..];
                }
            }
        }
        first = false;
    }

    let rest = &class[1..];
    if matched ^ negated {
        Some(rest)
    } else {
        None
    }
}

/// Validate wildcard syntax: every `[` needs a closing `]`.
pub fn check_wildcard(pat: &str) -> Result<(), String> {
    let chars: Vec<char> = pat.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => {
                let mut j = i + 1;
                if matches!(chars.get(j), Some('^' | '!')) {
                    j += 1;
                }
                // A `]` directly after the opener is a literal member.
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(format!("unmatched '[' in \"{pat}\""));
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
