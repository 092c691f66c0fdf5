//! Statement scanner and assignment-operator parsing.
//!
//! A logical statement is a chain of scope tests followed by either a block
//! opener or an assignment:
//!
//! ```text
//! win32:!debug|CONFIG(release, debug|release) { ... }
//! unix:LIBS += -lm
//! for(f, FILES):exists($$f):SOURCES += $$f
//! ```
//!
//! [`Scanner`] walks the text once and yields [`Token`]s.  It knows nothing
//! about evaluation: the interpreter decides after each token whether to keep
//! scanning, open a block, or hand the rest of the line to an assignment.

use crate::error::ErrorKind;

// ── Tokens ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A scope-test segment (trimmed) and the character that ended it:
    /// `:`, `|`, `{`, or the `)` closing a call (which is kept in `scope`).
    Test { scope: String, term: char },
    /// A `}` outside parentheses.
    Close,
    /// An assignment operator starts at the scanner's position; `var` is the
    /// trimmed left-hand side.
    Operator { var: String },
    /// End of statement; `var` is whatever text was left over.
    End { var: String },
}

// ── Scanner ───────────────────────────────────────────────────────────────────

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    parens: i32,
    quote: Option<char>,
    var: String,
    seg_start: usize,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

impl Scanner {
    pub fn new(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let pos = chars.iter().take_while(|c| is_blank(**c)).count();
        Self {
            chars,
            pos,
            parens: 0,
            quote: None,
            var: String::new(),
            seg_start: pos,
        }
    }

    /// Text after the last token.
    pub fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    /// Text from the start of the segment being scanned to the end of the
    /// statement.
    pub fn segment_tail(&self) -> String {
        self.chars[self.seg_start..].iter().collect::<String>().trim().to_owned()
    }

    pub fn next_token(&mut self) -> Result<Token, ErrorKind> {
        while let Some(&c) = self.chars.get(self.pos) {
            if self.parens == 0 {
                if c == '=' {
                    return Ok(self.operator());
                }
                if matches!(c, '+' | '-' | '*' | '~') {
                    match self.chars.get(self.pos + 1) {
                        Some('=') => return Ok(self.operator()),
                        Some(' ') => {
                            let next = self.chars[self.pos + 1..].iter().find(|k| !is_blank(**k));
                            if next == Some(&'=') {
                                return Err(ErrorKind::OperatorSpacing(c));
                            }
                        }
                        _ => {}
                    }
                }
            }

            match self.quote {
                Some(q) => {
                    if c == q {
                        self.quote = None;
                    }
                }
                None => match c {
                    '(' => self.parens += 1,
                    ')' => self.parens -= 1,
                    '"' => self.quote = Some(c),
                    _ => {}
                },
            }
            self.pos += 1;

            if self.parens == 0 && self.quote.is_none() && matches!(c, ':' | '{' | ')' | '|') {
                let mut scope = std::mem::take(&mut self.var).trim().to_owned();
                if c == ')' {
                    scope.push(')');
                }
                self.seg_start = self.pos;
                return Ok(Token::Test { scope, term: c });
            }
            if self.parens == 0 && c == '}' {
                self.seg_start = self.pos;
                return Ok(Token::Close);
            }
            self.var.push(c);
        }
        Ok(Token::End {
            var: std::mem::take(&mut self.var).trim().to_owned(),
        })
    }

    fn operator(&mut self) -> Token {
        Token::Operator {
            var: std::mem::take(&mut self.var).trim().to_owned(),
        }
    }

    /// After [`Token::Operator`]: the operator text (whitespace removed, up to
    /// and including `=`) and the trimmed value text.
    pub fn assignment(&self) -> (String, String) {
        let mut i = self.pos;
        let mut op = String::new();
        while let Some(&c) = self.chars.get(i) {
            i += 1;
            if !c.is_whitespace() {
                op.push(c);
            }
            if c == '=' {
                break;
            }
        }
        let vals: String = self.chars[i.min(self.chars.len())..].iter().collect();
        (op, vals.trim().to_owned())
    }
}

// ── Assignment operators ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Append,
    /// `*=`
    AppendUnique,
    /// `-=`
    Remove,
    /// `~=`
    Substitute,
}

impl AssignOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" => AssignOp::Set,
            "+=" => AssignOp::Append,
            "*=" => AssignOp::AppendUnique,
            "-=" => AssignOp::Remove,
            "~=" => AssignOp::Substitute,
            _ => return None,
        })
    }
}

/// A parsed `s/from/to/flags` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
    /// `g`: every match in an element, not just the first.
    pub global: bool,
    /// `i`
    pub case_insensitive: bool,
    /// `q`: `from` is literal text.
    pub quote: bool,
}

impl Substitution {
    /// Parse `s<sep>from<sep>to[<sep>flags]`; any character may be the
    /// separator.
    pub fn parse(text: &str) -> Result<Self, ErrorKind> {
        let bad = || ErrorKind::BadSubstitution(text.to_owned());
        let mut chars = text.chars();
        if text.chars().count() < 4 || chars.next() != Some('s') {
            return Err(bad());
        }
        let sep = chars.next().ok_or_else(bad)?;
        let parts: Vec<&str> = text.split(sep).collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(bad());
        }
        let flags = parts.get(3).copied().unwrap_or("");
        Ok(Self {
            from: parts[1].to_owned(),
            to: parts[2].to_owned(),
            global: flags.contains('g'),
            case_insensitive: flags.contains('i'),
            quote: flags.contains('q'),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
