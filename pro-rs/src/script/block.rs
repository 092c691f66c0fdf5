//! Block state: scope stack entries, loop and function bodies, and the
//! capture state machine that collects multi-line bodies.
//!
//! Body capture runs one of three modes:
//!
//! | State | Entered by | Left when |
//! |-------|------------|-----------|
//! | [`Capture::Normal`]   | start, or a body closing | never (default) |
//! | [`Capture::Function`] | `defineTest(x) {` / `defineReplace(x) {` without a closing brace on the line | brace depth returns to 0; the function is registered |
//! | [`Capture::Loop`]     | `for(...) {` without a closing brace on the line | brace depth returns to 0; the loop runs |

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Position;

// ── Scope stack ──────────────────────────────────────────────────────────────

/// Whether an `else` at this level would run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElseStatus {
    /// No preceding scope test; `else` is an error.
    #[default]
    None,
    /// The preceding test failed; `else` runs.
    Seek,
    /// The preceding test passed; `else` is skipped.
    Found,
}

impl ElseStatus {
    pub fn after(test_passed: bool) -> Self {
        if test_passed {
            ElseStatus::Found
        } else {
            ElseStatus::Seek
        }
    }
}

/// One level of `{ }` nesting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeBlock {
    /// Statements at this level are skipped.
    pub ignore: bool,
    pub else_status: ElseStatus,
}

impl ScopeBlock {
    pub fn new(ignore: bool) -> Self {
        Self {
            ignore,
            else_status: ElseStatus::None,
        }
    }
}

// ── Scope-test chains ────────────────────────────────────────────────────────

/// Folds a `:`/`|` chain of scope tests into one result.
///
/// `a:b` is AND, `a|b` is OR; the operator applies to the pairing of the
/// accumulated result with the next test.  A test is only evaluated when it
/// can still change the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestChain {
    failed: bool,
    or_op: bool,
}

impl TestChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next test can change the result.
    pub fn wants_eval(&self) -> bool {
        self.or_op == self.failed
    }

    /// The chain has failed so far.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Record the value of a test; `or_next` is set when it was followed by `|`.
    pub fn record(&mut self, test: bool, or_next: bool) {
        if test == self.or_op {
            self.failed = !test;
        }
        self.or_op = or_next;
    }
}

/// A scope test attached to a loop, re-evaluated every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub test: String,
    pub invert: bool,
    /// Followed by `|` rather than `:`.
    pub or_next: bool,
}

// ── Bodies ───────────────────────────────────────────────────────────────────

/// A captured statement and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLine {
    pub text: String,
    pub position: Position,
}

/// Counts `{`/`}` to find where a captured body ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BraceDepth(usize);

impl BraceDepth {
    /// A counter just past an opening brace.
    pub fn opened() -> Self {
        BraceDepth(1)
    }

    pub fn depth(&self) -> usize {
        self.0
    }

    /// Feed `text`; returns the byte offset of the brace that brings the
    /// depth back to zero, if any.  The counter is left at zero then.
    pub fn scan(&mut self, text: &str) -> Option<usize> {
        for (i, c) in text.char_indices() {
            match c {
                '{' => self.0 += 1,
                '}' => {
                    self.0 = self.0.saturating_sub(1);
                    if self.0 == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// What a `for()` iterates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopItems {
    List(Vec<String>),
    Forever,
}

/// Expand `a..b` into the inclusive integer range, counting down when
/// `a > b`.
pub fn numeric_range(text: &str) -> Option<Vec<String>> {
    let (start, end) = text.split_once("..")?;
    let start: i64 = start.parse().ok()?;
    let end: i64 = end.parse().ok()?;
    let values = if start < end {
        (start..=end).map(|i| i.to_string()).collect()
    } else {
        (end..=start).rev().map(|i| i.to_string()).collect()
    };
    Some(values)
}

/// A `for()` loop waiting to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorBlock {
    pub variable: String,
    pub items: LoopItems,
    pub guards: Vec<Guard>,
    pub body: Vec<BodyLine>,
}

impl IteratorBlock {
    pub fn new(variable: impl Into<String>, items: LoopItems) -> Self {
        Self {
            variable: variable.into(),
            items,
            guards: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// Transient per-loop control flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopSignal {
    pub next: bool,
    pub brk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Test,
    Replace,
}

impl FunctionKind {
    pub fn keyword(self) -> &'static str {
        match self {
            FunctionKind::Test => "defineTest",
            FunctionKind::Replace => "defineReplace",
        }
    }
}

/// A user-defined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub body: Vec<BodyLine>,
}

/// Bookkeeping for one active user-function call.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    /// Index of the call's local frame.
    pub frame: usize,
    /// Index of the frame the call was made from.
    pub caller: usize,
    pub return_value: Vec<String>,
    pub returning: bool,
}

/// Body-capture state of the evaluator.
#[derive(Debug, Clone, Default)]
pub enum Capture {
    #[default]
    Normal,
    Function { def: FunctionDef, depth: BraceDepth },
    Loop { block: IteratorBlock, depth: BraceDepth },
}

impl Capture {
    pub fn is_normal(&self) -> bool {
        matches!(self, Capture::Normal)
    }
}

// ── Registries ───────────────────────────────────────────────────────────────

/// The user-function registries of one evaluator.
///
/// Bodies are shared through `Rc`, so handing a copy to a child parse is a
/// reference-count bump per function.
#[derive(Debug, Clone, Default)]
pub struct Functions {
    test: HashMap<String, Rc<FunctionDef>>,
    replace: HashMap<String, Rc<FunctionDef>>,
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: FunctionKind) -> &HashMap<String, Rc<FunctionDef>> {
        match kind {
            FunctionKind::Test => &self.test,
            FunctionKind::Replace => &self.replace,
        }
    }

    pub fn insert(&mut self, def: FunctionDef) {
        let table = match def.kind {
            FunctionKind::Test => &mut self.test,
            FunctionKind::Replace => &mut self.replace,
        };
        table.insert(def.name.clone(), Rc::new(def));
    }

    pub fn get(&self, kind: FunctionKind, name: &str) -> Option<Rc<FunctionDef>> {
        self.table(kind).get(name).cloned()
    }

    pub fn contains(&self, kind: FunctionKind, name: &str) -> bool {
        self.table(kind).contains_key(name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
