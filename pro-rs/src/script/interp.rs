//! Project-file interpreter.
//!
//! The [`Evaluator`] owns the variable frames, the scope stack and the
//! user-function registries.  Source text goes through the line assembler
//! and then, one logical statement at a time, through [`Evaluator::dispatch`]:
//!
//! 1. while a function or loop body is being captured, the statement is
//!    appended to that body until its closing brace turns up;
//! 2. inside a block whose tests failed, only braces are tracked;
//! 3. otherwise the statement is scanned into scope tests and either opens a
//!    block or performs an assignment.
//!
//! Text left over after a `{` or `}` on the same line is dispatched again as
//! a statement of its own, so one-line blocks work:
//!
//! ```text
//! debug { DEFINES += TRACE } else { DEFINES += NDEBUG }
//! ```
//!
//! The evaluator implements [`ExpandContext`] so `$$` references resolve
//! against the current frame.

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::rc::Rc;

use chrono::Local;
use tracing::{debug, error, trace, warn};

use crate::config::Config;
use crate::error::{Diagnostic, ErrorKind, EvalError, EvalResult, Position, Severity};
use crate::host::{self, Host, OsHost};
use crate::pattern::{self, Pattern};
use crate::var::{ValueStore, BUILTIN_PREFIX};

use super::block::{
    numeric_range, BodyLine, BraceDepth, CallState, Capture, ElseStatus, FunctionDef,
    FunctionKind, Functions, Guard, IteratorBlock, LoopItems, LoopSignal, ScopeBlock, TestChain,
};
use super::expand::{expand, expand_joined, ExpandContext};
use super::lines::assemble;
use super::split::{is_path_list_var, split_arg_list, split_value_list};
use super::stmt::{AssignOp, Scanner, Substitution, Token};

/// Nested user-function calls allowed before evaluation gives up.
const MAX_CALL_DEPTH: usize = 100;

const DATE_FORMAT: &str = "%a %b %-d %H:%M:%S %Y";

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// A `for()` or function definition met on the current statement, waiting
/// for its body.
enum Pending {
    None,
    Loop(IteratorBlock),
    Define(FunctionDef),
}

/// Evaluates project files.
///
/// One evaluator handles a whole tree of files: includes and `fromfile()`
/// parse into extra frames of the same evaluator, so user functions and the
/// loaded-feature set are shared by every file it reads.
pub struct Evaluator {
    pub(crate) host: Box<dyn Host>,
    pub(crate) config: Config,
    /// Frame 0 is the top-level file; calls and child parses push more.
    pub(crate) frames: Vec<ValueStore>,
    /// Frame statements read and write.
    pub(crate) place: usize,
    /// Frame of the file being parsed (`Global` for `eval()`).
    pub(crate) file_frame: usize,
    pub(crate) scope_blocks: Vec<ScopeBlock>,
    /// Blocks below this depth belong to an enclosing body or file.
    pub(crate) block_floor: usize,
    pub(crate) capture: Capture,
    pub(crate) functions: Functions,
    pub(crate) calls: Vec<CallState>,
    pub(crate) loops: Vec<LoopSignal>,
    pub(crate) pos: Position,
    /// Physical lines of the statement being evaluated.
    pub(crate) num_lines: usize,
    pub(crate) cwd: PathBuf,
    pub(crate) loaded_features: HashSet<PathBuf>,
    pub(crate) list_counter: usize,
    diagnostics: Vec<Diagnostic>,
    output: Vec<String>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// An evaluator on the real filesystem, configured from the environment.
    pub fn new() -> Self {
        Self::with_host(OsHost, Config::from_env())
    }

    pub fn with_host(host: impl Host + 'static, config: Config) -> Self {
        let cwd = host.current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut frame = ValueStore::new();
        for preset in &config.presets {
            preset.apply(&mut frame);
        }
        Self {
            host: Box::new(host),
            config,
            frames: vec![frame],
            place: 0,
            file_frame: 0,
            scope_blocks: vec![ScopeBlock::default()],
            block_floor: 1,
            capture: Capture::Normal,
            functions: Functions::new(),
            calls: Vec::new(),
            loops: Vec::new(),
            pos: Position::default(),
            num_lines: 1,
            cwd,
            loaded_features: HashSet::new(),
            list_counter: 0,
            diagnostics: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Directory relative paths resolve against.
    pub fn set_current_dir(&mut self, dir: impl Into<PathBuf>) {
        self.cwd = dir.into();
    }

    /// Evaluate a project file (`-` reads standard input).
    pub fn evaluate(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let path = if path == Path::new("-") {
            path.to_path_buf()
        } else {
            host::resolve(&self.cwd, &path.to_string_lossy())
        };
        self.read_file(&path)
    }

    /// Evaluate in-memory project text; `name` labels diagnostics.
    pub fn evaluate_str(&mut self, name: &str, text: &str) -> bool {
        self.read_source(text, Position::memory(name))
    }

    /// Evaluate a scope-test expression such as `debug`, `!win32` or
    /// `contains(CONFIG, qt)` against a scratch copy of the variables.
    pub fn test(&mut self, expr: &str) -> bool {
        self.scratch("(test)", |ev| ev.test_condition(expr))
            .unwrap_or(false)
    }

    /// Expand `expr` against a scratch copy of the variables.
    ///
    /// Text with a `$$` reference is expanded as written; a bare
    /// `name(args)` calls the replace function `name`.
    pub fn expand(&mut self, expr: &str) -> Vec<String> {
        let expr = expr.trim();
        self.scratch("(expand)", |ev| match bare_call(expr) {
            Some((name, args)) => ev.expand_function(name, args),
            None => expand(expr, ev),
        })
        .unwrap_or_default()
    }

    /// Variables of the top-level file.
    pub fn variables(&self) -> &ValueStore {
        &self.frames[0]
    }

    pub fn into_variables(mut self) -> ValueStore {
        self.frames.swap_remove(0)
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.frames[0].values(name)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the `message()`/`warning()`/`error()` lines produced so far.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn scratch<T>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        self.frames.push(self.frames[0].clone());
        let index = self.frames.len() - 1;
        let saved_place = std::mem::replace(&mut self.place, index);
        let saved_file = std::mem::replace(&mut self.file_frame, index);
        let saved_pos = std::mem::replace(&mut self.pos, Position::memory(label));
        let result = f(self);
        if let Err(e) = &result {
            self.report(e);
        }
        self.pos = saved_pos;
        self.file_frame = saved_file;
        self.place = saved_place;
        self.frames.truncate(index);
        result
    }

    // ── Frames and diagnostics ────────────────────────────────────────────

    pub(crate) fn frame(&self) -> &ValueStore {
        &self.frames[self.place]
    }

    pub(crate) fn frame_mut(&mut self) -> &mut ValueStore {
        &mut self.frames[self.place]
    }

    /// Values of `name` in the current frame, builtin variables included.
    pub(crate) fn values_of(&mut self, name: &str) -> Vec<String> {
        if let Some(value) = self.builtin_var(name) {
            self.frame_mut()
                .set(format!("{BUILTIN_PREFIX}{name}"), vec![value.clone()]);
            return vec![value];
        }
        self.frame().values(name).to_vec()
    }

    fn builtin_var(&self, name: &str) -> Option<String> {
        Some(match name {
            "LITERAL_WHITESPACE" => "\t".to_owned(),
            "LITERAL_DOLLAR" => "$".to_owned(),
            "LITERAL_HASH" => "#".to_owned(),
            "PWD" | "IN_PWD" => host::display(&self.cwd),
            "DIR_SEPARATOR" => MAIN_SEPARATOR.to_string(),
            "DIRLIST_SEPARATOR" => ";".to_owned(),
            "_LINE_" => self.pos.line.to_string(),
            "_FILE_" => self.pos.file.clone(),
            "_DATE_" => Local::now().format(DATE_FORMAT).to_string(),
            _ => return None,
        })
    }

    pub(crate) fn fail(&self, kind: ErrorKind) -> EvalError {
        EvalError::new(self.pos.clone(), kind)
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", self.pos, message);
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            position: self.pos.clone(),
            message,
        });
    }

    pub(crate) fn report(&mut self, e: &EvalError) {
        error!("{e}");
        self.diagnostics.push(Diagnostic::from(e));
    }

    pub(crate) fn emit(&mut self, line: String) {
        self.output.push(line);
    }

    fn top(&self) -> ScopeBlock {
        self.scope_blocks.last().copied().unwrap_or_default()
    }

    pub(crate) fn top_mut(&mut self) -> &mut ScopeBlock {
        if self.scope_blocks.is_empty() {
            self.scope_blocks.push(ScopeBlock::default());
        }
        let last = self.scope_blocks.len() - 1;
        &mut self.scope_blocks[last]
    }

    fn pop_block(&mut self) -> EvalResult<()> {
        if self.scope_blocks.len() <= self.block_floor {
            return Err(self.fail(ErrorKind::BraceMismatch));
        }
        self.scope_blocks.pop();
        trace!("{}: leaving block {}", self.pos, self.scope_blocks.len() + 1);
        Ok(())
    }

    /// A `next()`, `break()` or `return()` stops the body being executed.
    fn body_interrupted(&self) -> bool {
        self.loops.last().map_or(false, |l| l.next || l.brk) || self.returning()
    }

    pub(crate) fn returning(&self) -> bool {
        self.calls.last().map_or(false, |c| c.returning)
    }

    // ── Reading ───────────────────────────────────────────────────────────

    /// Read a project file into the current frame.  The working directory
    /// follows the file for the duration of the parse.
    pub(crate) fn read_file(&mut self, path: &Path) -> bool {
        if path == Path::new("-") {
            return match self.host.read_stdin() {
                Ok(text) => self.read_source(&text, Position::file("-")),
                Err(e) => self.unreadable(path, e),
            };
        }
        if self.host.is_dir(path) {
            return false;
        }
        let text = match self.host.read_to_string(path) {
            Ok(text) => text,
            Err(e) => return self.unreadable(path, e),
        };
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.cwd.clone());
        let saved_cwd = std::mem::replace(&mut self.cwd, dir);
        let ok = self.read_source(&text, Position::file(host::display(path)));
        self.cwd = saved_cwd;
        ok
    }

    fn unreadable(&mut self, path: &Path, e: std::io::Error) -> bool {
        let file = host::display(path);
        let err = EvalError::new(
            Position::file(file.clone()),
            ErrorKind::Unreadable { path: file, reason: e.to_string() },
        );
        self.report(&err);
        false
    }

    /// Parse `src` as a file of its own: fresh scope stack, position
    /// restored afterwards.  A fatal error ends this source only.
    pub(crate) fn read_source(&mut self, src: &str, position: Position) -> bool {
        let saved_pos = std::mem::replace(&mut self.pos, position);
        let saved_blocks = std::mem::replace(&mut self.scope_blocks, vec![ScopeBlock::default()]);
        let saved_floor = std::mem::replace(&mut self.block_floor, 1);
        let saved_capture = std::mem::take(&mut self.capture);
        let saved_lines = self.num_lines;

        let ok = match self.parse_source(src) {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        };

        self.num_lines = saved_lines;
        self.capture = saved_capture;
        self.block_floor = saved_floor;
        self.scope_blocks = saved_blocks;
        self.pos = saved_pos;
        ok
    }

    fn parse_source(&mut self, src: &str) -> EvalResult<()> {
        for stmt in assemble(src) {
            self.pos.line = stmt.line;
            self.num_lines = stmt.num_lines;
            self.dispatch(&stmt.text)?;
            if self.body_interrupted() {
                break;
            }
        }
        if self.scope_blocks.len() != 1 || !self.capture.is_normal() {
            return Err(self.fail(ErrorKind::UnterminatedBlock));
        }
        Ok(())
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    /// Evaluate one logical statement, and whatever is left of it after a
    /// block boundary.
    pub(crate) fn dispatch(&mut self, text: &str) -> EvalResult<()> {
        let mut text = text.trim().to_owned();
        while !text.is_empty() {
            let rest = if !self.capture.is_normal() {
                self.capture_line(&text)?
            } else if self.top().ignore {
                self.skip_ignored(&text)?
            } else {
                self.statement(&text)?
            };
            match rest {
                Some(rest) => text = rest.trim().to_owned(),
                None => break,
            }
        }
        Ok(())
    }

    /// Append `text` to the body being captured.  When the body's closing
    /// brace is on this line the body is finished and the text after the
    /// brace is returned.
    fn capture_line(&mut self, text: &str) -> EvalResult<Option<String>> {
        let close = match &mut self.capture {
            Capture::Normal => return Ok(Some(text.to_owned())),
            Capture::Function { depth, .. } | Capture::Loop { depth, .. } => depth.scan(text),
        };
        let (piece, rest) = match close {
            Some(i) => (&text[..i], Some(text[i + 1..].to_owned())),
            None => (text, None),
        };
        let piece = piece.trim();
        if !piece.is_empty() {
            let line = BodyLine {
                text: piece.to_owned(),
                position: self.pos.clone(),
            };
            match &mut self.capture {
                Capture::Function { def, .. } => def.body.push(line),
                Capture::Loop { block, .. } => block.body.push(line),
                Capture::Normal => {}
            }
        }
        let Some(rest) = rest else {
            return Ok(None);
        };
        match std::mem::take(&mut self.capture) {
            Capture::Function { def, .. } => self.define(def),
            Capture::Loop { block, .. } => self.run_loop(block)?,
            Capture::Normal => {}
        }
        Ok(Some(rest))
    }

    /// Track braces inside a skipped block.  Returns the text after the
    /// brace that leaves it, if execution resumes on this line.
    fn skip_ignored(&mut self, text: &str) -> EvalResult<Option<String>> {
        for (i, c) in text.char_indices() {
            match c {
                '{' => self.scope_blocks.push(ScopeBlock::new(true)),
                '}' => {
                    self.pop_block()?;
                    if !self.top().ignore {
                        return Ok(Some(text[i + 1..].to_owned()));
                    }
                }
                _ => {}
            }
        }
        trace!("{}: ignored", self.pos);
        Ok(None)
    }

    // ── Statements ────────────────────────────────────────────────────────

    fn statement(&mut self, text: &str) -> EvalResult<Option<String>> {
        trace!("{}: {}", self.pos, text);
        let mut sc = Scanner::new(text);
        let mut chain = TestChain::new();
        let mut scope_count = 0;
        let mut else_line = false;
        let mut pending = Pending::None;

        loop {
            match sc.next_token().map_err(|k| self.fail(k))? {
                Token::Close => self.pop_block()?,
                Token::Test { scope, term } => {
                    scope_count += 1;
                    let or_next = term == '|';
                    let test = if scope.is_empty() {
                        true
                    } else if scope.eq_ignore_ascii_case("else") {
                        let status = self.top().else_status;
                        if scope_count != 1 || status == ElseStatus::None {
                            return Err(self.fail(ErrorKind::UnexpectedElse));
                        }
                        else_line = true;
                        status == ElseStatus::Seek
                    } else if chain.wants_eval() {
                        self.scope_test(&scope, or_next, &mut pending)?
                    } else {
                        chain.failed()
                    };
                    if !test && !chain.failed() {
                        trace!("{}: test ({scope}) failed", self.pos);
                    }
                    chain.record(test, or_next);

                    if term == '{' {
                        self.settle_else(chain.failed(), else_line, scope_count, false);
                        return Ok(Some(self.open_block(sc.rest(), chain.failed(), pending)));
                    }
                }
                Token::End { var } => {
                    self.settle_else(chain.failed(), else_line, scope_count, !var.is_empty());
                    if self.run_pending(pending, sc.segment_tail(), chain.failed())? {
                        return Ok(None);
                    }
                    if !var.is_empty() {
                        return Err(self.fail(ErrorKind::Syntax(text.to_owned())));
                    }
                    return Ok(None);
                }
                Token::Operator { var } => {
                    self.settle_else(chain.failed(), else_line, scope_count, true);
                    if self.run_pending(pending, sc.segment_tail(), chain.failed())? {
                        return Ok(None);
                    }
                    let (op, vals) = sc.assignment();
                    let (vals, rest) = self.cut_at_block_end(&vals);
                    if !chain.failed() {
                        self.assign(&var, &op, &vals)?;
                    }
                    return Ok(rest);
                }
            }
        }
    }

    /// Record the outcome of this statement's tests for a following `else`.
    fn settle_else(&mut self, failed: bool, else_line: bool, scope_count: usize, has_var: bool) {
        let top = self.top_mut();
        if scope_count > 0 && !(else_line && failed) {
            top.else_status = ElseStatus::after(!failed);
        }
        if (scope_count == 0 && has_var) || (scope_count == 1 && else_line) {
            top.else_status = ElseStatus::None;
        }
    }

    fn scope_test(&mut self, scope: &str, or_next: bool, pending: &mut Pending) -> EvalResult<bool> {
        let (invert, comp) = match scope.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, scope),
        };
        let Some(lparen) = comp.find('(') else {
            let name = expand_joined(comp.trim(), self)?;
            return Ok(self.is_active_config(name.trim(), true) != invert);
        };
        let rparen = match comp.rfind(')') {
            Some(r) if r > lparen => r,
            _ => return Err(self.fail(ErrorKind::MissingRightParen(comp.to_owned()))),
        };
        let func = comp[..lparen].trim();
        let args = split_arg_list(&comp[lparen + 1..rparen]);

        if matches!(pending, Pending::Define(_)) {
            return Err(self.fail(ErrorKind::TestAfterDefinition));
        }
        if let Pending::Loop(block) = &mut *pending {
            if func == "for" {
                return Err(self.fail(ErrorKind::NestedFor));
            }
            block.guards.push(Guard {
                test: comp.to_owned(),
                invert,
                or_next,
            });
            return Ok(true);
        }
        match func {
            "for" => {
                *pending = Pending::Loop(self.for_header(&args)?);
                Ok(true)
            }
            "defineTest" | "defineReplace" => {
                if !self.calls.is_empty() {
                    return Err(self.fail(ErrorKind::NestedDefinition));
                }
                let [name] = args.as_slice() else {
                    return Err(self.fail(ErrorKind::DefineArguments(func.to_owned())));
                };
                let kind = if func == "defineTest" {
                    FunctionKind::Test
                } else {
                    FunctionKind::Replace
                };
                *pending = Pending::Define(FunctionDef {
                    name: name.clone(),
                    kind,
                    body: Vec::new(),
                });
                Ok(!invert)
            }
            _ => Ok(self.test_function(func, &args)? != invert),
        }
    }

    fn open_block(&mut self, rest: String, failed: bool, pending: Pending) -> String {
        match pending {
            _ if failed => self.scope_blocks.push(ScopeBlock::new(true)),
            Pending::None => self.scope_blocks.push(ScopeBlock::new(false)),
            Pending::Define(def) => {
                self.capture = Capture::Function {
                    def,
                    depth: BraceDepth::opened(),
                }
            }
            Pending::Loop(block) => {
                self.capture = Capture::Loop {
                    block,
                    depth: BraceDepth::opened(),
                }
            }
        }
        trace!("{}: entering block {} (ignore={failed})", self.pos, self.scope_blocks.len());
        rest
    }

    /// A loop or definition with no block of its own.  Returns `true` if the
    /// statement was consumed.
    fn run_pending(&mut self, pending: Pending, tail: String, failed: bool) -> EvalResult<bool> {
        match pending {
            Pending::None => Ok(false),
            Pending::Loop(mut block) => {
                if !failed {
                    if !tail.is_empty() {
                        block.body.push(BodyLine {
                            text: tail,
                            position: self.pos.clone(),
                        });
                    }
                    self.run_loop(block)?;
                }
                Ok(true)
            }
            Pending::Define(def) => {
                if !failed {
                    self.define(def);
                }
                Ok(true)
            }
        }
    }

    /// Split off a `}` that closes the current block from an assignment's
    /// values.
    fn cut_at_block_end(&mut self, vals: &str) -> (String, Option<String>) {
        let mut depth = 0i32;
        for (i, c) in vals.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 && self.scope_blocks.len() > self.block_floor {
                        return (vals[..i].trim_end().to_owned(), Some(vals[i..].to_owned()));
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            self.warn(format!("Possible braces mismatch {{{vals}}}"));
        }
        (vals.to_owned(), None)
    }

    // ── Assignment ────────────────────────────────────────────────────────

    fn assign(&mut self, var: &str, op: &str, vals: &str) -> EvalResult<()> {
        let var = expand_joined(var, self)?;
        let op = AssignOp::parse(op)
            .ok_or_else(|| self.fail(ErrorKind::Syntax(format!("{var} {op} {vals}"))))?;

        if vals.contains('=') && self.num_lines > 1 {
            self.warn(format!("Possible accidental line continuation: {{{var}}}"));
        }

        if op == AssignOp::Substitute {
            return self.substitute(&var, vals);
        }

        let mut values = Vec::new();
        for field in split_value_list(vals, is_path_list_var(&var)) {
            values.extend(expand(&field, self)?);
        }

        if op == AssignOp::Set && var != "TEMPLATE" && var != "TARGET" {
            let old = self.frame().values(&var);
            if !old.is_empty() && !values.iter().any(|v| old.contains(v)) {
                self.warn(format!("Operator=({var}) clears variables previously set"));
            }
        }

        let list = self.frame_mut().entry(&var);
        if op == AssignOp::Set {
            list.clear();
        }
        for value in values.iter().filter(|v| !v.is_empty()) {
            match op {
                AssignOp::Set | AssignOp::Append => list.push(value.clone()),
                AssignOp::AppendUnique => {
                    if !list.contains(value) {
                        list.push(value.clone());
                    }
                }
                AssignOp::Remove => list.retain(|v| v != value),
                AssignOp::Substitute => {}
            }
        }

        if var == "REQUIRES" {
            self.check_requirements(&values)?;
        }
        Ok(())
    }

    fn substitute(&mut self, var: &str, vals: &str) -> EvalResult<()> {
        let text = expand_joined(vals, self)?;
        let sub = Substitution::parse(&text).map_err(|k| self.fail(k))?;
        let from = if sub.quote {
            pattern::escape(&sub.from)
        } else {
            sub.from.clone()
        };
        let compiled = if sub.case_insensitive {
            Pattern::regex_ci(&from)
        } else {
            Pattern::regex(&from)
        };
        let re = match compiled {
            Ok(re) => re,
            Err(e) => {
                self.warn(format!("~= {e}"));
                return Ok(());
            }
        };
        self.frame_mut().entry(var).retain_mut(|v| {
            if !re.is_match(v) {
                return true;
            }
            *v = re.replace(v, &sub.to, sub.global);
            !v.is_empty()
        });
        Ok(())
    }

    // ── Loops ─────────────────────────────────────────────────────────────

    fn for_header(&mut self, args: &[String]) -> EvalResult<IteratorBlock> {
        match args {
            [single] => {
                if expand_joined(single, self)? != "ever" {
                    return Err(self.fail(ErrorKind::ForArguments));
                }
                Ok(IteratorBlock::new("", LoopItems::Forever))
            }
            [variable, list] => {
                let name = expand_joined(list, self)?;
                let mut values = self.frame().values(&name).to_vec();
                if values.is_empty() {
                    if name == "forever" {
                        return Ok(IteratorBlock::new(variable.as_str(), LoopItems::Forever));
                    }
                    if let Some(range) = numeric_range(&name) {
                        values = range;
                    }
                }
                Ok(IteratorBlock::new(variable.as_str(), LoopItems::List(values)))
            }
            _ => Err(self.fail(ErrorKind::ForArguments)),
        }
    }

    /// Run a loop.  The loop variable is restored afterwards, or removed if
    /// it did not exist before.
    pub(crate) fn run_loop(&mut self, block: IteratorBlock) -> EvalResult<()> {
        trace!("{}: running loop over {}", self.pos, block.variable);
        let saved = self.frame().get(&block.variable).map(<[String]>::to_vec);
        self.loops.push(LoopSignal::default());
        let result = self.iterate(&block);
        self.loops.pop();
        if !block.variable.is_empty() {
            match saved {
                Some(values) => self.frame_mut().set(block.variable.as_str(), values),
                None => {
                    self.frame_mut().unset(&block.variable);
                }
            }
        }
        result
    }

    fn iterate(&mut self, block: &IteratorBlock) -> EvalResult<()> {
        let mut items = match &block.items {
            LoopItems::List(list) => Some(list.iter()),
            LoopItems::Forever => None,
        };
        let mut count = 0usize;
        loop {
            let value = match items.as_mut() {
                Some(it) => match it.next() {
                    Some(v) if v.is_empty() => continue,
                    Some(v) => v.clone(),
                    None => break,
                },
                None => count.to_string(),
            };
            if !block.variable.is_empty() {
                self.frame_mut().set(block.variable.as_str(), vec![value]);
            }
            if let Some(signal) = self.loops.last_mut() {
                *signal = LoopSignal::default();
            }
            if self.guards_pass(&block.guards)? {
                self.exec_body(&block.body)?;
            }
            count += 1;
            if self.loops.last().map_or(false, |s| s.brk) || self.returning() {
                break;
            }
        }
        Ok(())
    }

    fn guards_pass(&mut self, guards: &[Guard]) -> EvalResult<bool> {
        let mut chain = TestChain::new();
        for guard in guards {
            let test = if chain.wants_eval() {
                self.test_condition(&guard.test)? != guard.invert
            } else {
                chain.failed()
            };
            chain.record(test, guard.or_next);
        }
        Ok(!chain.failed())
    }

    /// Execute captured body lines in a block of their own.  Blocks left
    /// open by `next()`, `break()` or `return()` are discarded.
    fn exec_body(&mut self, body: &[BodyLine]) -> EvalResult<()> {
        let base = self.scope_blocks.len();
        let saved_pos = self.pos.clone();
        let saved_capture = std::mem::take(&mut self.capture);
        let saved_floor = std::mem::replace(&mut self.block_floor, base + 1);
        let saved_lines = std::mem::replace(&mut self.num_lines, 1);
        self.scope_blocks.push(ScopeBlock::default());

        let mut result = Ok(());
        for line in body {
            self.pos = line.position.clone();
            if let Err(e) = self.dispatch(&line.text) {
                result = Err(e);
                break;
            }
            if self.body_interrupted() {
                break;
            }
        }

        self.scope_blocks.truncate(base);
        self.num_lines = saved_lines;
        self.block_floor = saved_floor;
        self.capture = saved_capture;
        self.pos = saved_pos;
        result
    }

    // ── Functions ─────────────────────────────────────────────────────────

    fn define(&mut self, def: FunctionDef) {
        debug!("{}: {}({})", self.pos, def.kind.keyword(), def.name);
        self.functions.insert(def);
    }

    /// Call a user function.  The callee starts from a copy of the caller's
    /// frame with `ARGS` and `1`..`n` bound; only `export()` leaks back.
    pub(crate) fn call_function(
        &mut self,
        def: Rc<FunctionDef>,
        args: Vec<Vec<String>>,
    ) -> EvalResult<Vec<String>> {
        if self.calls.len() >= MAX_CALL_DEPTH {
            return Err(self.fail(ErrorKind::RecursionLimit(def.name.clone())));
        }
        debug!("{}: calling {}({})", self.pos, def.name, args.len());

        let mut frame = self.frame().clone();
        frame.set("ARGS", args.iter().flatten().cloned().collect());
        for (i, arg) in args.into_iter().enumerate() {
            frame.set((i + 1).to_string(), arg);
        }
        self.frames.push(frame);
        let index = self.frames.len() - 1;
        self.calls.push(CallState {
            frame: index,
            caller: self.place,
            ..CallState::default()
        });
        let saved_place = std::mem::replace(&mut self.place, index);
        let saved_loops = std::mem::take(&mut self.loops);

        let result = self.exec_body(&def.body);

        self.loops = saved_loops;
        self.place = saved_place;
        let state = self.calls.pop().unwrap_or_default();
        self.frames.truncate(index);
        result.map(|()| state.return_value)
    }

    /// Interpret a user test function's return value.
    pub(crate) fn test_result(&mut self, func: &str, ret: &[String]) -> bool {
        match ret.first().map(String::as_str) {
            None | Some("true") => true,
            Some("false") => false,
            Some(v) => match v.parse::<i64>() {
                Ok(n) => n != 0,
                Err(_) => {
                    self.warn(format!(
                        "Unexpected return value from test {func} [{}]",
                        ret.join("::")
                    ));
                    false
                }
            },
        }
    }
}

/// `name(args)` with an identifier name and nothing after the `)`.
fn bare_call(expr: &str) -> Option<(&str, &str)> {
    if expr.contains("$$") {
        return None;
    }
    let inner = expr.strip_suffix(')')?;
    let (name, args) = inner.split_once('(')?;
    let is_ident = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    is_ident.then_some((name, args))
}

// ── ExpandContext impl ────────────────────────────────────────────────────────

impl ExpandContext for Evaluator {
    fn lookup(&mut self, name: &str) -> Vec<String> {
        self.values_of(name)
    }

    fn env(&self, name: &str) -> Option<String> {
        self.host.env_var(name)
    }

    fn call(&mut self, name: &str, args: &str) -> EvalResult<Vec<String>> {
        self.expand_function(name, args)
    }

    fn position(&self) -> Position {
        self.pos.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (Evaluator, bool) {
        let mut ev = Evaluator::with_host(OsHost, Config::new());
        let ok = ev.evaluate_str("test.pro", src);
        (ev, ok)
    }

    fn ok(src: &str) -> Evaluator {
        let (ev, ok) = run(src);
        assert!(ok, "{:?}", ev.diagnostics());
        ev
    }

    fn fails(src: &str) -> Vec<Diagnostic> {
        let (ev, ok) = run(src);
        assert!(!ok);
        ev.diagnostics().to_vec()
    }

    fn warned(ev: &Evaluator, needle: &str) -> bool {
        ev.diagnostics()
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains(needle))
    }

    // ── Assignment ────────────────────────────────────────────────────────

    #[test]
    fn assign_and_append() {
        let ev = ok("SOURCES = a.cpp\nSOURCES += b.cpp c.cpp");
        assert_eq!(ev.values("SOURCES"), ["a.cpp", "b.cpp", "c.cpp"]);
    }

    #[test]
    fn append_then_remove_is_empty() {
        let ev = ok("X += a\nX -= a");
        assert!(ev.values("X").is_empty());
        assert!(ev.variables().contains("X"));
    }

    #[test]
    fn remove_takes_every_occurrence() {
        let ev = ok("X = a b a c a\nX -= a");
        assert_eq!(ev.values("X"), ["b", "c"]);
    }

    #[test]
    fn append_unique_twice() {
        let ev = ok("X *= a\nX *= a");
        assert_eq!(ev.values("X"), ["a"]);
    }

    #[test]
    fn assignment_expands_references() {
        let ev = ok("BASE = lib\nDIRS = $$BASE/a $${BASE}b");
        assert_eq!(ev.values("DIRS"), ["lib/a", "libb"]);
    }

    #[test]
    fn assignment_name_is_expanded() {
        let ev = ok("N = FOO\n$$N = 1");
        assert_eq!(ev.values("FOO"), ["1"]);
    }

    #[test]
    fn path_list_vars_split_on_semicolon() {
        let ev = ok("INCLUDEPATH = a;b c\nOTHER = a;b");
        assert_eq!(ev.values("INCLUDEPATH"), ["a", "b", "c"]);
        assert_eq!(ev.values("OTHER"), ["a;b"]);
    }

    #[test]
    fn empty_values_are_dropped() {
        let ev = ok("X = a $$NOTHING b");
        assert_eq!(ev.values("X"), ["a", "b"]);
    }

    #[test]
    fn clobber_warning() {
        let ev = ok("X = a\nX = b");
        assert!(warned(&ev, "Operator=(X)"));
        let ev = ok("TARGET = a\nTARGET = b\nY = a b\nY = b");
        assert!(!warned(&ev, "Operator="));
    }

    #[test]
    fn continuation_warning() {
        let ev = ok("X = a \\\n  B = c");
        assert!(warned(&ev, "line continuation"));
    }

    #[test]
    fn substitution() {
        let ev = ok("X = foo.cpp bar.cpp foo.h\nX ~= s/foo/baz/");
        assert_eq!(ev.values("X"), ["baz.cpp", "bar.cpp", "baz.h"]);
    }

    #[test]
    fn substitution_global_and_case() {
        let ev = ok("X = aAa\nX ~= s/a/b/gi");
        assert_eq!(ev.values("X"), ["bbb"]);
        let ev = ok("X = aAa\nX ~= s/a/b/");
        assert_eq!(ev.values("X"), ["bAa"]);
    }

    #[test]
    fn substitution_quoted_and_emptying() {
        let ev = ok("X = a.b axb a.\nX ~= s/a./Q/q\nY = drop keep\nY ~= s/drop//");
        assert_eq!(ev.values("X"), ["Qb", "axb", "Q"]);
        assert_eq!(ev.values("Y"), ["keep"]);
    }

    #[test]
    fn substitution_backreference() {
        let ev = ok("X = lib_core.a\nX ~= s/lib_(.*)\\.a/\\1/");
        assert_eq!(ev.values("X"), ["core"]);
    }

    #[test]
    fn malformed_substitution_is_fatal() {
        let diags = fails("X = a\nX ~= q/a/b/\nY = 1");
        assert!(diags[0].message.contains("s/// function"));
        assert_eq!(diags[0].position.line, 2);
    }

    #[test]
    fn operator_spacing_is_fatal() {
        let diags = fails("X + = 1");
        assert!(diags[0].message.contains("followed immediately by ="));
    }

    #[test]
    fn stray_words_are_a_parse_error() {
        let diags = fails("A = 1\njust words");
        assert!(diags[0].message.starts_with("Parse Error"));
        assert_eq!(diags[0].position.line, 2);
    }

    // ── Scopes ────────────────────────────────────────────────────────────

    #[test]
    fn config_scope() {
        let ev = ok("CONFIG += debug\ndebug: X = 1\nCONFIG -= debug\ndebug: Y = 1");
        assert_eq!(ev.values("X"), ["1"]);
        assert!(ev.values("Y").is_empty());
    }

    #[test]
    fn wildcard_config_scope() {
        let ev = ok("CONFIG = win32-g++\nwin32-*: X = 1\nmac*: Y = 1");
        assert_eq!(ev.values("X"), ["1"]);
        assert!(ev.values("Y").is_empty());
    }

    #[test]
    fn negated_scope() {
        let ev = ok("!debug: X = 1\n!true: Y = 1");
        assert_eq!(ev.values("X"), ["1"]);
        assert!(ev.values("Y").is_empty());
    }

    #[test]
    fn and_or_chains() {
        let ev = ok(
            "CONFIG = a b\n\
             a:b: AND = 1\n\
             a:c: NOPE = 1\n\
             c|b: OR = 1\n\
             c|d: NOPE2 = 1",
        );
        assert_eq!(ev.values("AND"), ["1"]);
        assert_eq!(ev.values("OR"), ["1"]);
        assert!(ev.values("NOPE").is_empty());
        assert!(ev.values("NOPE2").is_empty());
    }

    #[test]
    fn multi_line_block() {
        let ev = ok("CONFIG += qt\nqt {\n  QT += core\n  X = 1\n}\nfalse {\n  Y = 1\n}");
        assert_eq!(ev.values("QT"), ["core"]);
        assert!(ev.values("Y").is_empty());
    }

    #[test]
    fn nested_blocks_inside_ignored_block() {
        let ev = ok("false {\n  true {\n    X = 1\n  }\n  Y = 1\n}\nZ = 1");
        assert!(ev.values("X").is_empty());
        assert!(ev.values("Y").is_empty());
        assert_eq!(ev.values("Z"), ["1"]);
    }

    #[test]
    fn else_multi_line() {
        let ev = ok("false {\n  A = 1\n}\nelse {\n  A = 2\n}");
        assert_eq!(ev.values("A"), ["2"]);
    }

    #[test]
    fn else_on_closing_line() {
        let ev = ok("true {\n  A = 1\n} else {\n  A = 2\n}");
        assert_eq!(ev.values("A"), ["1"]);
    }

    #[test]
    fn else_single_line() {
        let ev = ok("false { A = 1 } else { A = 2 }");
        assert_eq!(ev.values("A"), ["2"]);
        let ev = ok("true { A = 1 } else { A = 2 }");
        assert_eq!(ev.values("A"), ["1"]);
    }

    #[test]
    fn second_else_is_an_error() {
        let diags = fails("false { A = 1 } else { A = 2 }\nelse { A = 3 }");
        assert_eq!(diags[0].message, "Unexpected else");
        assert_eq!(diags[0].position.line, 2);
    }

    #[test]
    fn else_without_test_is_an_error() {
        let diags = fails("X = 1\nelse { A = 3 }");
        assert_eq!(diags[0].message, "Unexpected else");
    }

    #[test]
    fn else_colon_form() {
        let ev = ok("false: A = 1\nelse: A = 2");
        assert_eq!(ev.values("A"), ["2"]);
    }

    #[test]
    fn else_if_chain() {
        let src = "CONFIG = b\n\
                   a {\n  R = a\n} else:b {\n  R = b\n} else {\n  R = c\n}";
        assert_eq!(ok(src).values("R"), ["b"]);
        let src = "CONFIG = z\n\
                   a {\n  R = a\n} else:b {\n  R = b\n} else {\n  R = c\n}";
        assert_eq!(ok(src).values("R"), ["c"]);
    }

    #[test]
    fn statement_after_block_close_on_same_line() {
        let ev = ok("true { A = 1 } B = 2");
        assert_eq!(ev.values("A"), ["1"]);
        assert_eq!(ev.values("B"), ["2"]);
    }

    #[test]
    fn unterminated_block_is_fatal() {
        let diags = fails("{ A = 1");
        assert_eq!(diags[0].message, "Unterminated conditional block at end of file");
    }

    #[test]
    fn unterminated_block_keeps_earlier_assignments() {
        let mut ev = Evaluator::with_host(OsHost, Config::new());
        assert!(!ev.evaluate_str("t.pro", "A = 1\ntrue {\nB = 2"));
        assert_eq!(ev.values("A"), ["1"]);
    }

    #[test]
    fn extra_close_brace_is_fatal() {
        let diags = fails("A = 1\n}");
        assert_eq!(diags[0].message, "Braces mismatch");
    }

    #[test]
    fn bare_call_statement() {
        let mut ev = ok("message(hello)");
        assert_eq!(ev.take_output(), vec!["Project MESSAGE: hello"]);
    }

    #[test]
    fn missing_right_paren_is_fatal() {
        let diags = fails("contains(A, b: X = 1");
        assert!(!diags.is_empty());
    }

    // ── Loops ─────────────────────────────────────────────────────────────

    #[test]
    fn for_over_range() {
        let ev = ok("for(i, 1..3) {\n  LIST += $$i\n}");
        assert_eq!(ev.values("LIST"), ["1", "2", "3"]);
    }

    #[test]
    fn for_single_line() {
        let ev = ok("for(i, 1..3) { LIST += $$i }");
        assert_eq!(ev.values("LIST"), ["1", "2", "3"]);
    }

    #[test]
    fn for_descending_range() {
        let ev = ok("for(i, 3..1): LIST += $$i");
        assert_eq!(ev.values("LIST"), ["3", "2", "1"]);
    }

    #[test]
    fn for_over_variable() {
        let ev = ok("L = a b c\nfor(x, L) {\n  OUT += pre_$$x\n}");
        assert_eq!(ev.values("OUT"), ["pre_a", "pre_b", "pre_c"]);
    }

    #[test]
    fn loop_variable_is_restored() {
        let ev = ok("x = keep\nL = a b\nfor(x, L): OUT += $$x\nfor(y, L): OUT += $$y");
        assert_eq!(ev.values("x"), ["keep"]);
        assert!(!ev.variables().contains("y"));
        assert_eq!(ev.values("OUT"), ["a", "b", "a", "b"]);
    }

    #[test]
    fn loop_guards_filter_iterations() {
        let ev = ok("L = a b c\nfor(x, L):!equals(x, b) {\n  OUT += $$x\n}");
        assert_eq!(ev.values("OUT"), ["a", "c"]);
    }

    #[test]
    fn loop_guard_or_chain() {
        let ev = ok("L = a b c\nfor(x, L):equals(x, a)|equals(x, c): OUT += $$x");
        assert_eq!(ev.values("OUT"), ["a", "c"]);
    }

    #[test]
    fn loop_with_nested_block() {
        let ev = ok("L = a b\nfor(x, L) {\n  equals(x, b) {\n    OUT += got_$$x\n  }\n}");
        assert_eq!(ev.values("OUT"), ["got_b"]);
    }

    #[test]
    fn loop_break_and_next() {
        let ev = ok(
            "for(i, 1..10) {\n\
               equals(i, 2): next()\n\
               equals(i, 4): break()\n\
               OUT += $$i\n\
             }",
        );
        assert_eq!(ev.values("OUT"), ["1", "3"]);
    }

    #[test]
    fn forever_runs_until_break() {
        let ev = ok("for(n, forever) {\n  OUT += $$n\n  count(OUT, 3): break()\n}");
        assert_eq!(ev.values("OUT"), ["0", "1", "2"]);
    }

    #[test]
    fn for_ever_needs_break() {
        let ev = ok("for(ever) {\n  OUT += x\n  count(OUT, 2): break()\n}");
        assert_eq!(ev.values("OUT"), ["x", "x"]);
    }

    #[test]
    fn skipped_loop_does_not_run() {
        let ev = ok("false:for(i, 1..3): OUT += $$i\nfalse {\n  for(i, 1..3) {\n    OUT += $$i\n  }\n}");
        assert!(ev.values("OUT").is_empty());
    }

    #[test]
    fn bad_for_arguments() {
        assert_eq!(fails("for(a, b, c) {\n}")[0].message, "Invalid arguments to for()");
        assert_eq!(fails("for(sometimes) {\n}")[0].message, "Invalid arguments to for()");
    }

    #[test]
    fn nested_for_on_one_line() {
        let diags = fails("for(a, 1..2):for(b, 1..2): X += 1");
        assert_eq!(diags[0].message, "for() cannot be nested on a single line");
    }

    #[test]
    fn break_outside_loop_skips_rest_of_block() {
        let ev = ok("true {\n  A = 1\n  break()\n  B = 1\n}\nC = 1");
        assert_eq!(ev.values("A"), ["1"]);
        assert!(ev.values("B").is_empty());
        assert_eq!(ev.values("C"), ["1"]);
    }

    // ── Functions ─────────────────────────────────────────────────────────

    #[test]
    fn replace_function() {
        let ev = ok("defineReplace(double) { return($$1 $$1) }\nX = $$double(a)");
        assert_eq!(ev.values("X"), ["a", "a"]);
    }

    #[test]
    fn replace_function_same_line() {
        let ev = ok("defineReplace(double) { return($$1 $$1) } X = $$double(a)");
        assert_eq!(ev.values("X"), ["a", "a"]);
    }

    #[test]
    fn multi_line_function_with_args() {
        let ev = ok(
            "defineReplace(wrap) {\n\
               out = $$1\n\
               for(a, ARGS) {\n\
                 out += <$$a>\n\
               }\n\
               return($$out)\n\
             }\n\
             X = $$wrap(a, b)",
        );
        assert_eq!(ev.values("X"), ["a", "<a>", "<b>"]);
        assert!(!ev.variables().contains("out"));
    }

    #[test]
    fn test_function_results() {
        let ev = ok(
            "defineTest(yes) { return(true) }\n\
             defineTest(no) { return(false) }\n\
             defineTest(one) { return(1) }\n\
             defineTest(zero) { return(0) }\n\
             defineTest(silent) { X = 1 }\n\
             yes: A += yes\n\
             no: A += no\n\
             one: A += one\n\
             zero: A += zero\n\
             silent: A += silent",
        );
        assert_eq!(ev.values("A"), ["yes", "one", "silent"]);
        assert!(!ev.variables().contains("X"));
    }

    #[test]
    fn test_function_odd_result_warns() {
        let ev = ok("defineTest(odd) { return(maybe) }\nodd: A = 1");
        assert!(ev.values("A").is_empty());
        assert!(warned(&ev, "Unexpected return value from test odd"));
    }

    #[test]
    fn test_function_call_with_args() {
        let ev = ok(
            "defineTest(has) {\n\
               contains($$1, $$2): return(true)\n\
               return(false)\n\
             }\n\
             L = a b\n\
             has(L, b): A = 1\n\
             has(L, c): B = 1",
        );
        assert_eq!(ev.values("A"), ["1"]);
        assert!(ev.values("B").is_empty());
    }

    #[test]
    fn return_stops_the_body() {
        let ev = ok(
            "defineReplace(first_big) {\n\
               for(x, ARGS) {\n\
                 greaterThan(x, 5): return($$x)\n\
               }\n\
               return(none)\n\
             }\n\
             X = $$first_big(1, 7, 9)\n\
             Y = $$first_big(1, 2)",
        );
        assert_eq!(ev.values("X"), ["7"]);
        assert_eq!(ev.values("Y"), ["none"]);
    }

    #[test]
    fn function_writes_stay_local() {
        let ev = ok("X = outer\ndefineTest(f) {\n  X = inner\n  Y = 1\n}\nf()");
        assert_eq!(ev.values("X"), ["outer"]);
        assert!(!ev.variables().contains("Y"));
    }

    #[test]
    fn export_reaches_caller() {
        let ev = ok("defineTest(f) {\n  X = inner\n  export(X)\n}\nf()");
        assert_eq!(ev.values("X"), ["inner"]);
    }

    #[test]
    fn export_through_nested_calls() {
        let ev = ok(
            "defineTest(inner) {\n  V = deep\n  export(V)\n}\n\
             defineTest(outer) {\n  inner()\n  W = $$V\n  export(W)\n  export(V)\n}\n\
             outer()",
        );
        assert_eq!(ev.values("V"), ["deep"]);
        assert_eq!(ev.values("W"), ["deep"]);
    }

    #[test]
    fn unknown_test_function_warns() {
        let ev = ok("nosuch(a): X = 1");
        assert!(ev.values("X").is_empty());
        assert!(warned(&ev, "Unknown test function: nosuch"));
    }

    #[test]
    fn nested_definition_is_fatal() {
        let diags = fails("defineTest(f) {\n  defineTest(g) {\n  }\n}\nf()");
        assert!(diags
            .iter()
            .any(|d| d.message == "Cannot define a function within another definition"));
    }

    #[test]
    fn define_needs_one_argument() {
        let diags = fails("defineTest(a, b) {\n}");
        assert_eq!(diags[0].message, "defineTest(function) requires one argument");
    }

    #[test]
    fn test_after_definition_is_fatal() {
        let diags = fails("defineTest(f):true() {\n}");
        assert_eq!(diags[0].message, "No tests can come after a function definition");
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let handle = std::thread::Builder::new()
            .stack_size(64 << 20)
            .spawn(|| fails("defineTest(f) {\n  f()\n}\nf()"))
            .unwrap();
        let diags = handle.join().unwrap();
        assert!(diags.iter().any(|d| d.message.contains("recursed too deeply")));
    }

    // ── Builtin variables and errors ──────────────────────────────────────

    #[test]
    fn builtin_variables() {
        let ev = ok("A = $$LITERAL_HASH\nB = $$_LINE_\nC = $$_FILE_\nD = x$${LITERAL_DOLLAR}y");
        assert_eq!(ev.values("A"), ["#"]);
        assert_eq!(ev.values("B"), ["2"]);
        assert_eq!(ev.values("C"), ["test.pro"]);
        assert_eq!(ev.values("D"), ["x$y"]);
        assert!(ev.variables().contains(".BUILTIN.LITERAL_HASH"));
    }

    #[test]
    fn date_and_separators() {
        let ev = ok("L = $$DIRLIST_SEPARATOR\nS = $$DIR_SEPARATOR\nD = $$_DATE_");
        assert_eq!(ev.values("L"), [";"]);
        assert_eq!(ev.values("S"), [MAIN_SEPARATOR.to_string()]);
        let date = ev.values("D").join(" ");
        let shape = regex::Regex::new(r"^[A-Z][a-z]{2} [A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2} \d{4}$").unwrap();
        assert!(shape.is_match(&date), "{date}");
        assert!(date.ends_with(&Local::now().format("%Y").to_string()));
    }

    #[test]
    fn unbalanced_braces_in_values_warn() {
        let (ev, _) = run("X = a {b");
        assert!(warned(&ev, "Possible braces mismatch {a {b}"));
        let ev = ok("Y = {a}");
        assert!(!warned(&ev, "Possible braces mismatch"));
    }

    #[test]
    fn line_numbers_follow_physical_lines() {
        let diags = fails("# comment\n\nA = 1 \\\n  2\nbogus words");
        assert_eq!(diags[0].position.line, 5);
    }

    #[test]
    fn error_aborts_the_file() {
        let mut ev = Evaluator::with_host(OsHost, Config::new());
        assert!(!ev.evaluate_str("t.pro", "A = 1\nerror(stop here)\nB = 1"));
        assert_eq!(ev.values("A"), ["1"]);
        assert!(ev.values("B").is_empty());
        assert_eq!(ev.take_output(), vec!["Project ERROR: stop here"]);
    }

    #[test]
    fn requires_records_failures() {
        let ev = ok("CONFIG = qt\nREQUIRES = qt opengl");
        assert_eq!(ev.values("QMAKE_FAILED_REQUIREMENTS"), ["opengl"]);
    }

    // ── Outward API ───────────────────────────────────────────────────────

    #[test]
    fn api_test_uses_scratch_copy() {
        let mut ev = ok("CONFIG = debug\nL = a b");
        assert!(ev.test("debug"));
        assert!(!ev.test("release"));
        assert!(ev.test("contains(L, b)"));
        assert!(ev.test("!contains(L, z)"));
        assert!(ev.test("eval(L = z)"));
        assert_eq!(ev.values("L"), ["a", "b"]);
    }

    #[test]
    fn api_expand() {
        let mut ev = ok("L = a b c");
        assert_eq!(ev.expand("$$L"), ["a", "b", "c"]);
        assert_eq!(ev.expand("first(L)"), ["a"]);
        assert_eq!(ev.expand("$$join(L, -)"), ["a-b-c"]);
        assert_eq!(ev.expand("plain"), ["plain"]);
    }

    #[test]
    fn presets_are_applied() {
        let config = Config::new()
            .with_preset(crate::config::Preset::parse("CONFIG=debug").unwrap());
        let mut ev = Evaluator::with_host(OsHost, config);
        assert!(ev.evaluate_str("t.pro", "debug: X = 1"));
        assert_eq!(ev.values("X"), ["1"]);
    }

    #[test]
    fn bare_call_detection() {
        assert_eq!(bare_call("first(L)"), Some(("first", "L")));
        assert_eq!(bare_call("$$first(L)"), None);
        assert_eq!(bare_call("a b(c)"), None);
        assert_eq!(bare_call("plain"), None);
    }
}
