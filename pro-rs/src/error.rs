//! Error and diagnostic types.
//!
//! Fatal conditions are carried as [`EvalError`] through `Result` returns and
//! unwind to the nearest file boundary (top-level evaluation, an include, or
//! an `eval()` string).  Everything else is a [`Diagnostic`] recorded in the
//! session and mirrored to `tracing`.

use std::fmt;

use thiserror::Error;

// ── Positions ─────────────────────────────────────────────────────────────────

/// Where a statement came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    /// Path of the file being parsed, or a label such as `(eval)`.
    pub file: String,
    /// 1-based line of the first physical line of the statement; 0 outside
    /// any statement.
    pub line: usize,
    /// `true` when the text comes from a file rather than an in-memory string.
    pub from_file: bool,
}

impl Position {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file: path.into(),
            line: 0,
            from_file: true,
        }
    }

    pub fn memory(label: impl Into<String>) -> Self {
        Self {
            file: label.into(),
            line: 0,
            from_file: false,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ── Fatal errors ──────────────────────────────────────────────────────────────

/// The fatal conditions that abort evaluation of the current file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Braces mismatch")]
    BraceMismatch,
    #[error("Unterminated conditional block at end of file")]
    UnterminatedBlock,
    #[error("{0} operator must be followed immediately by =")]
    OperatorSpacing(char),
    #[error("Unexpected else")]
    UnexpectedElse,
    #[error("Function missing right paren: {0}")]
    MissingRightParen(String),
    #[error("No tests can come after a function definition")]
    TestAfterDefinition,
    #[error("Invalid arguments to for()")]
    ForArguments,
    #[error("for() cannot be nested on a single line")]
    NestedFor,
    #[error("Cannot define a function within another definition")]
    NestedDefinition,
    #[error("{0}(function) requires one argument")]
    DefineArguments(String),
    #[error("Parse Error ('{0}')")]
    Syntax(String),
    #[error("~= operator only accepts s/// function ({0})")]
    BadSubstitution(String),
    #[error("Missing {expected} terminator [found {found}]")]
    MissingTerminator { expected: char, found: String },
    #[error("{0}")]
    User(String),
    #[error("Function {0} recursed too deeply")]
    RecursionLimit(String),
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// A fatal error tagged with the statement position it was raised at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: {kind}")]
pub struct EvalError {
    pub position: Position,
    pub kind: ErrorKind,
}

impl EvalError {
    pub fn new(position: Position, kind: ErrorKind) -> Self {
        Self { position, kind }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

// ── Diagnostics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded warning or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Position,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{}: {tag}: {}", self.position, self.message)
    }
}

impl From<&EvalError> for Diagnostic {
    fn from(e: &EvalError) -> Self {
        Self {
            severity: Severity::Error,
            position: e.position.clone(),
            message: e.kind.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
