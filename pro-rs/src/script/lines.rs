//! Line assembler: physical lines to logical statements.
//!
//! - Each physical line is trimmed and cut at the first unescaped `#`
//!   (`\#` stands for a literal hash).
//! - A line ending in an odd number of backslashes continues onto the next;
//!   the pieces are joined with a single space.
//! - A line that held only a comment does not end a continuation; a truly
//!   blank line does.
//! - Runs of whitespace inside a statement collapse to one space.

/// One logical statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    /// 1-based number of the first physical line.
    pub line: usize,
    /// Physical lines spanned.
    pub num_lines: usize,
}

/// Iterator over the logical statements of a source text.
pub struct LineAssembler<'a> {
    lines: std::str::Lines<'a>,
    line_no: usize,
}

/// Assemble `src` into logical statements.
pub fn assemble(src: &str) -> LineAssembler<'_> {
    LineAssembler {
        lines: src.lines(),
        line_no: 0,
    }
}

impl Iterator for LineAssembler<'_> {
    type Item = Statement;

    fn next(&mut self) -> Option<Statement> {
        let mut buf = String::new();
        let mut start = 0;
        let mut num_lines = 0;

        for raw in self.lines.by_ref() {
            self.line_no += 1;
            let trimmed = raw.trim();
            let line = strip_comment(trimmed);
            let line = line.trim();

            if let Some(body) = continuation(line) {
                if num_lines == 0 {
                    start = self.line_no;
                }
                buf.push_str(body);
                buf.push(' ');
                num_lines += 1;
                continue;
            }

            if line.is_empty() && !trimmed.is_empty() {
                // comment-only line
                continue;
            }
            if line.is_empty() && buf.trim().is_empty() {
                buf.clear();
                num_lines = 0;
                continue;
            }
            if num_lines == 0 {
                start = self.line_no;
            }
            buf.push_str(line);
            num_lines += 1;
            return Some(Statement {
                text: simplify(&buf),
                line: start,
                num_lines,
            });
        }

        let text = simplify(&buf);
        if text.is_empty() {
            None
        } else {
            Some(Statement {
                text,
                line: start,
                num_lines,
            })
        }
    }
}

/// The line without its trailing continuation backslash, if it has one.
fn continuation(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
    if trailing % 2 == 1 {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

/// Cut `line` at the first unescaped `#`, turning `\#` into `#`.
pub fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'#') => {
                out.push('#');
                chars.next();
            }
            '#' => break,
            _ => out.push(c),
        }
    }
    out
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn simplify(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
