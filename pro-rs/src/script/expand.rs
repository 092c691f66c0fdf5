//! Variable expansion.
//!
//! Resolves the `$$` reference forms inside a string into a list of values:
//!
//! | Sequence        | Meaning                                              |
//! |-----------------|------------------------------------------------------|
//! | `$$name`        | Variable `name` (letters, digits, `.`, `_`)          |
//! | `$${name}`      | Same, delimited so it can sit inside a larger token  |
//! | `$$(NAME)`      | Environment variable, split as a value list          |
//! | `$$[name]`      | Build property (the context decides; usually empty)  |
//! | `$$name(args)`  | Replace-function call; `$${name(args)}` also works   |
//! | `\x`            | Literal `x` for `x` in ``[]{}()$\'"``               |
//!
//! Outside quotes, unescaped spaces and tabs separate output values and a
//! multi-valued reference splits the output: its first value is glued to the
//! text before it, its last value to the text after it, and the ones in
//! between become entries of their own.  Inside quotes a multi-valued
//! reference is joined with spaces.  The quotes themselves are dropped.
//!
//! A string containing no reference, escape, or quote comes back as a single
//! value, unchanged.

use crate::error::{ErrorKind, EvalError, EvalResult, Position};

use super::split::split_value_list;

/// Callbacks the expander needs from its evaluator.
pub trait ExpandContext {
    /// Values of a variable (builtins included).
    fn lookup(&mut self, name: &str) -> Vec<String>;

    /// An environment variable.
    fn env(&self, name: &str) -> Option<String>;

    /// A build property; none are defined unless the context says so.
    fn property(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Call a replace function with its raw, unsplit argument text.
    fn call(&mut self, name: &str, args: &str) -> EvalResult<Vec<String>>;

    /// Where errors are reported.
    fn position(&self) -> Position;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Var,
    Env,
    Function,
    Property,
}

fn is_name_char(c: char) -> bool {
    c as u32 > 0xFF || c.is_ascii_alphanumeric() || c == '.' || c == '_'
}

const ESCAPABLE: &[char] = &['[', ']', '{', '}', '(', ')', '$', '\\', '\'', '"'];

/// Expand every reference in `text`.
pub fn expand(text: &str, ctx: &mut dyn ExpandContext) -> EvalResult<Vec<String>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let s: Vec<char> = text.chars().collect();
    let len = s.len();
    let at = |i: usize| s.get(i).copied().unwrap_or('\0');
    let left = |n: usize| s[..n].iter().collect::<String>();

    let mut ret: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut replaced = false;
    let mut quote: Option<char> = None;

    let mut i = 0;
    while i < len {
        let start = i;
        // `None` once the character has been consumed.
        let mut ch = Some(s[i]);

        if s[i] == '$' && len > i + 2 {
            i += 1;
            if s[i] == '$' {
                i += 1;
                let mut kind = RefKind::Var;
                let mut term: Option<char> = None;
                let mut c = at(i);
                match c {
                    '[' => {
                        kind = RefKind::Property;
                        term = Some(']');
                        i += 1;
                        c = at(i);
                    }
                    '{' => {
                        term = Some('}');
                        i += 1;
                        c = at(i);
                    }
                    '(' => {
                        kind = RefKind::Env;
                        term = Some(')');
                        i += 1;
                        c = at(i);
                    }
                    _ => {}
                }

                let mut name = String::new();
                while is_name_char(c) {
                    name.push(c);
                    i += 1;
                    if i >= len {
                        break;
                    }
                    c = at(i);
                }

                let mut args = String::new();
                if kind == RefKind::Var && c == '(' {
                    kind = RefKind::Function;
                    let mut depth = 0usize;
                    loop {
                        i += 1;
                        if i >= len {
                            break;
                        }
                        c = at(i);
                        if c == '(' {
                            depth += 1;
                        } else if c == ')' {
                            if depth == 0 {
                                break;
                            }
                            depth -= 1;
                        }
                        args.push(c);
                    }
                    i += 1;
                    c = at(i);
                }

                match term {
                    Some(t) if c != t => {
                        let found = if c == '\0' {
                            "end-of-line".to_owned()
                        } else {
                            c.to_string()
                        };
                        return Err(EvalError::new(
                            ctx.position(),
                            ErrorKind::MissingTerminator { expected: t, found },
                        ));
                    }
                    Some(_) => {}
                    // back onto the last character of the reference
                    None => i -= 1,
                }
                ch = None;

                let mut replacement = match kind {
                    RefKind::Env => split_value_list(&ctx.env(&name).unwrap_or_default(), false),
                    RefKind::Property => ctx.property(&name),
                    RefKind::Function => ctx.call(&name, &args)?,
                    RefKind::Var => ctx.lookup(&name),
                };
                tracing::trace!(text, name = %name, ?replacement, "var replace");

                if !replaced {
                    replaced = true;
                    current = left(start);
                }
                if !replacement.is_empty() {
                    if quote.is_some() {
                        current.push_str(&replacement.join(" "));
                    } else {
                        current.push_str(&replacement.remove(0));
                        if let Some(last) = replacement.pop() {
                            if !current.is_empty() {
                                ret.push(std::mem::take(&mut current));
                            }
                            current = last;
                            ret.append(&mut replacement);
                        }
                    }
                }
            } else {
                if replaced {
                    current.push('$');
                }
                ch = Some(s[i]);
            }
        }

        match ch {
            Some(c) if quote == Some(c) => {
                ch = None;
                quote = None;
            }
            Some('\\') => {
                let next = at(i + 1);
                let escape = ESCAPABLE.contains(&next);
                if escape {
                    i += 1;
                    if !replaced {
                        replaced = true;
                        current = left(start);
                    }
                    current.push(next);
                }
                if escape || !replaced {
                    ch = None;
                }
            }
            Some(c @ ('\'' | '"')) if quote.is_none() => {
                quote = Some(c);
                ch = None;
                if !replaced {
                    replaced = true;
                    current = left(i);
                }
            }
            Some(' ' | '\t') if quote.is_none() => {
                ch = None;
                if !current.is_empty() {
                    ret.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }

        if let (true, Some(c)) = (replaced, ch) {
            current.push(c);
        }
        i += 1;
    }

    if !replaced {
        return Ok(vec![text.to_owned()]);
    }
    if !current.is_empty() {
        ret.push(current);
    }
    Ok(ret)
}

/// Expand and join the result with single spaces.
pub fn expand_joined(text: &str, ctx: &mut dyn ExpandContext) -> EvalResult<String> {
    Ok(expand(text, ctx)?.join(" "))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
