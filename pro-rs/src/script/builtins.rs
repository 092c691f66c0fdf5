//! Built-in test and replace functions.
//!
//! Both tables map a lower-cased name to an operation.  User functions are
//! looked up first, so a project may shadow any builtin.
//!
//! | Table | Called from | Unknown name |
//! |-------|-------------|--------------|
//! | [`TestFunc`]   | scope tests, `if()`, loop guards, `REQUIRES` | warning, `false` |
//! | [`ExpandFunc`] | `$$name(args)` references                   | warning, empty list |
//!
//! Arguments arrive as raw text.  Each comma-separated argument is split as
//! a value list and every field expanded; builtins then see each argument
//! joined back with single spaces, while user functions get the lists.

use std::collections::{HashMap, VecDeque};
use std::path::MAIN_SEPARATOR;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::error::{ErrorKind, EvalResult, Position};
use crate::host;
use crate::pattern::{self, has_wildcard, wildcard_match, Pattern};

use super::block::FunctionKind;
use super::expand::{expand, expand_joined};
use super::include::{IncludeMode, IncludeStatus};
use super::interp::Evaluator;
use super::split::{remove_quotes, split_arg_list, split_value_list};

// ── Function tables ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestFunc {
    Requires,
    GreaterThan,
    LessThan,
    Equals,
    Exists,
    Export,
    Clear,
    Unset,
    Eval,
    Config,
    System,
    Return,
    Break,
    Next,
    Defined,
    Contains,
    Infile,
    Count,
    IsEmpty,
    Include,
    Load,
    Debug,
    Error,
    Message,
    Warning,
    If,
}

const TEST_FUNCTIONS: &[(&str, TestFunc)] = &[
    ("requires", TestFunc::Requires),
    ("greaterthan", TestFunc::GreaterThan),
    ("lessthan", TestFunc::LessThan),
    ("equals", TestFunc::Equals),
    ("isequal", TestFunc::Equals),
    ("exists", TestFunc::Exists),
    ("export", TestFunc::Export),
    ("clear", TestFunc::Clear),
    ("unset", TestFunc::Unset),
    ("eval", TestFunc::Eval),
    ("config", TestFunc::Config),
    ("isactiveconfig", TestFunc::Config),
    ("system", TestFunc::System),
    ("return", TestFunc::Return),
    ("break", TestFunc::Break),
    ("next", TestFunc::Next),
    ("defined", TestFunc::Defined),
    ("contains", TestFunc::Contains),
    ("infile", TestFunc::Infile),
    ("count", TestFunc::Count),
    ("isempty", TestFunc::IsEmpty),
    ("include", TestFunc::Include),
    ("load", TestFunc::Load),
    ("debug", TestFunc::Debug),
    ("error", TestFunc::Error),
    ("message", TestFunc::Message),
    ("warning", TestFunc::Warning),
    ("if", TestFunc::If),
];

impl TestFunc {
    pub const ALL: [TestFunc; 26] = [
        TestFunc::Requires,
        TestFunc::GreaterThan,
        TestFunc::LessThan,
        TestFunc::Equals,
        TestFunc::Exists,
        TestFunc::Export,
        TestFunc::Clear,
        TestFunc::Unset,
        TestFunc::Eval,
        TestFunc::Config,
        TestFunc::System,
        TestFunc::Return,
        TestFunc::Break,
        TestFunc::Next,
        TestFunc::Defined,
        TestFunc::Contains,
        TestFunc::Infile,
        TestFunc::Count,
        TestFunc::IsEmpty,
        TestFunc::Include,
        TestFunc::Load,
        TestFunc::Debug,
        TestFunc::Error,
        TestFunc::Message,
        TestFunc::Warning,
        TestFunc::If,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        static TABLE: OnceLock<HashMap<&'static str, TestFunc>> = OnceLock::new();
        TABLE
            .get_or_init(|| TEST_FUNCTIONS.iter().copied().collect())
            .get(name.to_ascii_lowercase().as_str())
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpandFunc {
    Member,
    First,
    Last,
    Cat,
    FromFile,
    Eval,
    List,
    Sprintf,
    Join,
    Split,
    Basename,
    Dirname,
    Section,
    Find,
    System,
    Unique,
    Quote,
    EscapeExpand,
    Upper,
    Lower,
    ReEscape,
    Files,
    Prompt,
    Replace,
}

const EXPAND_FUNCTIONS: &[(&str, ExpandFunc)] = &[
    ("member", ExpandFunc::Member),
    ("first", ExpandFunc::First),
    ("last", ExpandFunc::Last),
    ("cat", ExpandFunc::Cat),
    ("fromfile", ExpandFunc::FromFile),
    ("eval", ExpandFunc::Eval),
    ("list", ExpandFunc::List),
    ("sprintf", ExpandFunc::Sprintf),
    ("join", ExpandFunc::Join),
    ("split", ExpandFunc::Split),
    ("basename", ExpandFunc::Basename),
    ("dirname", ExpandFunc::Dirname),
    ("section", ExpandFunc::Section),
    ("find", ExpandFunc::Find),
    ("system", ExpandFunc::System),
    ("unique", ExpandFunc::Unique),
    ("quote", ExpandFunc::Quote),
    ("escape_expand", ExpandFunc::EscapeExpand),
    ("upper", ExpandFunc::Upper),
    ("lower", ExpandFunc::Lower),
    ("re_escape", ExpandFunc::ReEscape),
    ("files", ExpandFunc::Files),
    ("prompt", ExpandFunc::Prompt),
    ("replace", ExpandFunc::Replace),
];

impl ExpandFunc {
    pub const ALL: [ExpandFunc; 24] = [
        ExpandFunc::Member,
        ExpandFunc::First,
        ExpandFunc::Last,
        ExpandFunc::Cat,
        ExpandFunc::FromFile,
        ExpandFunc::Eval,
        ExpandFunc::List,
        ExpandFunc::Sprintf,
        ExpandFunc::Join,
        ExpandFunc::Split,
        ExpandFunc::Basename,
        ExpandFunc::Dirname,
        ExpandFunc::Section,
        ExpandFunc::Find,
        ExpandFunc::System,
        ExpandFunc::Unique,
        ExpandFunc::Quote,
        ExpandFunc::EscapeExpand,
        ExpandFunc::Upper,
        ExpandFunc::Lower,
        ExpandFunc::ReEscape,
        ExpandFunc::Files,
        ExpandFunc::Prompt,
        ExpandFunc::Replace,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        static TABLE: OnceLock<HashMap<&'static str, ExpandFunc>> = OnceLock::new();
        TABLE
            .get_or_init(|| EXPAND_FUNCTIONS.iter().copied().collect())
            .get(name.to_ascii_lowercase().as_str())
            .copied()
    }
}

/// `true`, `TRUE`, or a non-zero integer.
fn truthy(flag: &str) -> bool {
    flag.eq_ignore_ascii_case("true") || flag.parse::<i64>().map_or(false, |n| n != 0)
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.is_empty()).collect()
}

/// The last element of `list` that belongs to the `|`-separated `group`.
fn last_of_group<'a>(list: &'a [String], group: &str) -> Option<&'a String> {
    let mutuals: Vec<&str> = group.split('|').map(str::trim).collect();
    list.iter().rev().find(|v| mutuals.contains(&v.as_str()))
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

impl Evaluator {
    /// Split and expand raw call arguments into one value list per argument.
    pub(crate) fn prepare_args(&mut self, raw: &[String]) -> EvalResult<Vec<Vec<String>>> {
        let mut lists = Vec::with_capacity(raw.len());
        for arg in raw {
            let mut list = Vec::new();
            for field in split_value_list(arg, false) {
                list.extend(expand(&field, self)?);
            }
            lists.push(list);
        }
        Ok(lists)
    }

    fn usage<T: Default>(&mut self, usage: &str) -> T {
        self.warn(format!("{usage}: wrong number of arguments"));
        T::default()
    }

    /// Run the test function `func` with raw arguments.
    pub(crate) fn test_function(&mut self, func: &str, raw: &[String]) -> EvalResult<bool> {
        let func = func.trim();
        let lists = self.prepare_args(raw)?;
        if let Some(def) = self.functions.get(FunctionKind::Test, func) {
            let ret = self.call_function(def, lists)?;
            return Ok(self.test_result(func, &ret));
        }
        let Some(which) = TestFunc::lookup(func) else {
            self.warn(format!("Unknown test function: {func}"));
            return Ok(false);
        };
        let args: Vec<String> = lists.iter().map(|l| l.join(" ")).collect();
        trace!("{}: test {func}({})", self.pos, args.join("::"));
        self.builtin_test(which, func, &args, &lists)
    }

    /// Call the replace function `func` with its raw argument text.
    pub(crate) fn expand_function(&mut self, func: &str, raw: &str) -> EvalResult<Vec<String>> {
        let func = func.trim();
        let lists = self.prepare_args(&split_arg_list(raw))?;
        if let Some(def) = self.functions.get(FunctionKind::Replace, func) {
            return self.call_function(def, lists);
        }
        let Some(which) = ExpandFunc::lookup(func) else {
            self.warn(format!("Unknown replace function: {func}"));
            return Ok(Vec::new());
        };
        let args: Vec<String> = lists.iter().map(|l| l.join(" ")).collect();
        trace!("{}: expand {func}({})", self.pos, args.join("::"));
        self.builtin_expand(which, func, &args)
    }

    /// Evaluate a single test written out as text: `name`, `!name` or
    /// `func(args)`.
    pub(crate) fn test_condition(&mut self, text: &str) -> EvalResult<bool> {
        let text = remove_quotes(text.trim()).trim();
        if text.is_empty() {
            return Ok(true);
        }
        let (invert, chk) = match text.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        let result = match chk.find('(') {
            Some(lparen) => match chk.rfind(')') {
                Some(rparen) if rparen > lparen => {
                    let args = split_arg_list(&chk[lparen + 1..rparen]);
                    self.test_function(&chk[..lparen], &args)?
                }
                _ => {
                    self.warn(format!("Function missing right paren: {chk}"));
                    false
                }
            },
            None => {
                let name = expand_joined(chk, self)?;
                self.is_active_config(name.trim(), true)
            }
        };
        Ok(result != invert)
    }

    /// Whether `config` is set in `CONFIG`; with `wildcards`, a pattern such
    /// as `win32-*` matches any element.
    pub(crate) fn is_active_config(&self, config: &str, wildcards: bool) -> bool {
        match config {
            "" | "true" => return true,
            "false" => return false,
            _ => {}
        }
        let configs = self.frame().values("CONFIG");
        if wildcards && has_wildcard(config) {
            configs.iter().any(|c| wildcard_match(config, c))
        } else {
            configs.iter().any(|c| c == config)
        }
    }

    /// Test every requirement; failures are appended to
    /// `QMAKE_FAILED_REQUIREMENTS`.
    pub(crate) fn check_requirements(&mut self, deps: &[String]) -> EvalResult<bool> {
        let mut all = true;
        for dep in deps.iter().filter(|d| !d.is_empty()) {
            if !self.test_condition(dep)? {
                debug!("{}: failed requirement {dep}", self.pos);
                self.frame_mut()
                    .entry("QMAKE_FAILED_REQUIREMENTS")
                    .push(dep.clone());
                all = false;
            }
        }
        Ok(all)
    }

    // ── Test functions ────────────────────────────────────────────────────

    fn builtin_test(
        &mut self,
        which: TestFunc,
        func: &str,
        args: &[String],
        lists: &[Vec<String>],
    ) -> EvalResult<bool> {
        match which {
            TestFunc::Requires => self.check_requirements(args),
            TestFunc::GreaterThan | TestFunc::LessThan => {
                let [var, rhs] = args else {
                    return Ok(self.usage(&format!("{func}(variable, value)")));
                };
                let lhs = self.values_of(var).join(" ");
                let ord = match (lhs.parse::<i64>(), rhs.parse::<i64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => lhs.as_str().cmp(rhs.as_str()),
                };
                Ok(if which == TestFunc::GreaterThan {
                    ord.is_gt()
                } else {
                    ord.is_lt()
                })
            }
            TestFunc::Equals => {
                let [var, value] = args else {
                    return Ok(self.usage(&format!("{func}(variable, value)")));
                };
                Ok(self.values_of(var).join(" ") == *value)
            }
            TestFunc::Exists => {
                let [file] = args else {
                    return Ok(self.usage("exists(file)"));
                };
                Ok(self.file_exists(file))
            }
            TestFunc::Export => {
                let [var] = args else {
                    return Ok(self.usage("export(variable)"));
                };
                self.export(var);
                Ok(true)
            }
            TestFunc::Clear => {
                let [var] = args else {
                    return Ok(self.usage("clear(variable)"));
                };
                if !self.frame().contains(var) {
                    return Ok(false);
                }
                self.frame_mut().entry(var).clear();
                Ok(true)
            }
            TestFunc::Unset => {
                let [var] = args else {
                    return Ok(self.usage("unset(variable)"));
                };
                Ok(self.frame_mut().unset(var))
            }
            TestFunc::Eval => Ok(self.eval_text(args)),
            TestFunc::Config => match args {
                [config] => Ok(self.is_active_config(config, false)),
                [config, group] => {
                    let configs = self.frame().values("CONFIG");
                    Ok(last_of_group(configs, group).map_or(false, |c| c == config))
                }
                _ => Ok(self.usage("CONFIG(config)")),
            },
            TestFunc::System => {
                // The flag asks for project variables in the child's environment.
                // Commands always run in the evaluator's own environment.
                let (cmd, setup_env) = match args {
                    [cmd] => (cmd, true),
                    [cmd, env] => (cmd, truthy(env)),
                    _ => return Ok(self.usage("system(exec [, setup_env])")),
                };
                match self.host.run(cmd, &self.cwd) {
                    Ok(out) => {
                        debug!(
                            "{}: system({cmd}, setup_env={setup_env}): {}",
                            self.pos,
                            out.stdout.trim_end()
                        );
                        Ok(out.success)
                    }
                    Err(e) => {
                        self.warn(format!("system({cmd}): {e}"));
                        Ok(false)
                    }
                }
            }
            TestFunc::Return => {
                match self.calls.last_mut() {
                    Some(call) => {
                        call.returning = true;
                        if let Some(first) = lists.first() {
                            call.return_value.extend(first.iter().cloned());
                        }
                    }
                    None => self.warn("unexpected return()"),
                }
                Ok(true)
            }
            TestFunc::Break => {
                match self.loops.last_mut() {
                    Some(signal) => signal.brk = true,
                    None => self.top_mut().ignore = true,
                }
                Ok(true)
            }
            TestFunc::Next => {
                match self.loops.last_mut() {
                    Some(signal) => signal.next = true,
                    None => self.warn("unexpected next()"),
                }
                Ok(true)
            }
            TestFunc::Defined => match args {
                [name] => Ok(self.functions.contains(FunctionKind::Test, name)
                    || self.functions.contains(FunctionKind::Replace, name)),
                [name, kind] => match kind.as_str() {
                    "test" => Ok(self.functions.contains(FunctionKind::Test, name)),
                    "replace" => Ok(self.functions.contains(FunctionKind::Replace, name)),
                    _ => {
                        self.warn(format!("defined(function, type): unexpected type [{kind}]"));
                        Ok(false)
                    }
                },
                _ => Ok(self.usage("defined(function)")),
            },
            TestFunc::Contains => {
                let (var, value, group) = match args {
                    [var, value] => (var, value, None),
                    [var, value, group] => (var, value, Some(group)),
                    _ => return Ok(self.usage("contains(var, val)")),
                };
                let re = Pattern::regex(value).ok();
                let matches = |v: &String| v == value || re.as_ref().map_or(false, |r| r.exact_match(v));
                let list = self.values_of(var);
                Ok(match group {
                    None => list.iter().any(matches),
                    Some(group) => last_of_group(&list, group).map_or(false, matches),
                })
            }
            TestFunc::Infile => {
                let (file, var, value) = match args {
                    [file, var] => (file, var, None),
                    [file, var, value] => (file, var, Some(value)),
                    _ => return Ok(self.usage("infile(file, var, val)")),
                };
                let path = host::resolve(&self.cwd, file);
                let Some(vars) = self.parse_fresh(&path) else {
                    return Ok(false);
                };
                Ok(match value {
                    None => vars.contains(var),
                    Some(value) => {
                        let re = Pattern::regex(value).ok();
                        vars.values(var)
                            .iter()
                            .any(|v| v == value || re.as_ref().map_or(false, |r| r.exact_match(v)))
                    }
                })
            }
            TestFunc::Count => {
                let (var, n, op) = match args {
                    [var, n] => (var, n, None),
                    [var, n, op] => (var, n, Some(op.as_str())),
                    _ => return Ok(self.usage("count(var, count)")),
                };
                let len = self.values_of(var).len() as i64;
                let n = n.parse::<i64>().unwrap_or(0);
                Ok(match op {
                    None | Some("equals" | "isEqual" | "=" | "==") => len == n,
                    Some(">" | "greaterThan") => len > n,
                    Some(">=") => len >= n,
                    Some("<" | "lessThan") => len < n,
                    Some("<=") => len <= n,
                    Some(other) => {
                        self.warn(format!("unexpected modifier to count({other})"));
                        false
                    }
                })
            }
            TestFunc::IsEmpty => {
                let [var] = args else {
                    return Ok(self.usage("isEmpty(var)"));
                };
                Ok(self.values_of(var).is_empty())
            }
            TestFunc::Include => {
                let (file, mode) = match args {
                    [file] => (file, IncludeMode::Direct),
                    [file, prefix] if prefix.is_empty() => (file, IncludeMode::Direct),
                    [file, prefix] => (file, IncludeMode::Namespace(prefix.clone())),
                    _ => return Ok(self.usage("include(file)")),
                };
                Ok(match self.include_file(file, mode) {
                    IncludeStatus::Success | IncludeStatus::AlreadyLoaded => true,
                    IncludeStatus::NoExist => {
                        self.warn(format!("Unable to find file for inclusion {file}"));
                        false
                    }
                    IncludeStatus::Failure | IncludeStatus::ParseFailure => false,
                })
            }
            TestFunc::Load => {
                let (name, ignore_error) = match args {
                    [name] => (name, false),
                    [name, flag] => (name, truthy(flag)),
                    _ => return Ok(self.usage("load(feature)")),
                };
                Ok(match self.load_feature(name) {
                    IncludeStatus::Success => true,
                    IncludeStatus::AlreadyLoaded => {
                        debug!("{}: duplicate of loaded feature {name}", self.pos);
                        true
                    }
                    IncludeStatus::NoExist => {
                        if !ignore_error {
                            self.warn(format!("Feature {name} cannot be found."));
                        }
                        false
                    }
                    IncludeStatus::Failure | IncludeStatus::ParseFailure => false,
                })
            }
            TestFunc::Debug => {
                let [level, message] = args else {
                    return Ok(self.usage("debug(level, message)"));
                };
                let verbosity = level.parse::<i64>().unwrap_or(0);
                debug!(verbosity, "Project DEBUG: {message}");
                Ok(true)
            }
            TestFunc::Error | TestFunc::Message | TestFunc::Warning => {
                let [message] = args else {
                    return Ok(self.usage(&format!("{func}(message)")));
                };
                self.emit(format!("Project {}: {message}", func.to_uppercase()));
                if which == TestFunc::Error {
                    return Err(self.fail(ErrorKind::User(message.clone())));
                }
                Ok(true)
            }
            TestFunc::If => {
                let [cond] = args else {
                    return Ok(self.usage("if(condition)"));
                };
                self.if_chain(cond)
            }
        }
    }

    fn file_exists(&mut self, file: &str) -> bool {
        let file = file.replace(MAIN_SEPARATOR, "/");
        if self.host.exists(&host::resolve(&self.cwd, &file)) {
            return true;
        }
        let (dir, name) = match file.rfind('/') {
            Some(i) => (host::resolve(&self.cwd, &file[..=i]), &file[i + 1..]),
            None => (self.cwd.clone(), file.as_str()),
        };
        self.host
            .read_dir(&dir)
            .map_or(false, |names| names.iter().any(|n| wildcard_match(name, n)))
    }

    /// Copy `var` into every active call frame and into the frame the
    /// outermost call was made from.
    fn export(&mut self, var: &str) {
        let values = self.frame().values(var).to_vec();
        for i in 0..self.calls.len() {
            let frame = self.calls[i].frame;
            self.frames[frame].set(var, values.clone());
        }
        if let Some(outer) = self.calls.first() {
            let caller = outer.caller;
            self.frames[caller].set(var, values);
        }
    }

    fn eval_text(&mut self, args: &[String]) -> bool {
        let (text, global) = match args {
            [text, scope] if scope == "Global" => (text.clone(), true),
            [text, scope] if scope == "Local" => (text.clone(), false),
            _ => (args.join(" "), false),
        };
        let target = if global { self.file_frame } else { self.place };
        let saved = std::mem::replace(&mut self.place, target);
        let ok = self.read_source(&text, Position::memory("(eval)"));
        self.place = saved;
        ok
    }

    /// `if()`: a left fold over `:` (and) and `|` (or).  Every sub-test is
    /// evaluated.
    fn if_chain(&mut self, cond: &str) -> EvalResult<bool> {
        let chars: Vec<char> = cond.chars().collect();
        let mut ret = true;
        let mut or_op = false;
        let mut quote = false;
        let mut parens = 0i32;
        let mut test = String::new();

        for (i, &c) in chars.iter().enumerate() {
            if quote {
                if c == '"' {
                    quote = false;
                }
            } else {
                match c {
                    '(' => parens += 1,
                    ')' => parens -= 1,
                    '"' => quote = true,
                    _ => {}
                }
            }
            let last = i + 1 == chars.len();
            let sep = c == ':' || c == '|';
            if parens == 0 && !quote && (sep || last) {
                if !sep {
                    test.push(c);
                }
                if !test.is_empty() {
                    let success = self.test_condition(&std::mem::take(&mut test))?;
                    ret = if or_op { ret || success } else { ret && success };
                }
                match c {
                    ':' => or_op = false,
                    '|' => or_op = true,
                    _ => {}
                }
            } else {
                test.push(c);
            }
        }
        Ok(ret)
    }

    // ── Replace functions ─────────────────────────────────────────────────

    fn builtin_expand(
        &mut self,
        which: ExpandFunc,
        func: &str,
        args: &[String],
    ) -> EvalResult<Vec<String>> {
        let out = match which {
            ExpandFunc::Member => self.member(args),
            ExpandFunc::First | ExpandFunc::Last => {
                let [var] = args else {
                    return Ok(self.usage(&format!("{func}(var)")));
                };
                let list = self.values_of(var);
                let pick = if which == ExpandFunc::First {
                    list.first()
                } else {
                    list.last()
                };
                pick.cloned().into_iter().collect()
            }
            ExpandFunc::Cat => {
                let (file, single_line) = match args {
                    [file] => (file, true),
                    [file, single] => (file, single.eq_ignore_ascii_case("true")),
                    _ => return Ok(self.usage("cat(file)")),
                };
                let path = host::resolve(&self.cwd, &file.replace(MAIN_SEPARATOR, "/"));
                let mut out = Vec::new();
                if let Ok(text) = self.host.read_to_string(&path) {
                    for line in text.lines() {
                        out.extend(non_empty(split_value_list(line.trim(), false)));
                        if !single_line {
                            out.push("\n".to_owned());
                        }
                    }
                }
                out
            }
            ExpandFunc::FromFile => {
                let [file, var] = args else {
                    return Ok(self.usage("fromfile(file, variable)"));
                };
                let path = host::resolve(&self.cwd, file);
                self.parse_fresh(&path)
                    .map(|vars| vars.values(var).to_vec())
                    .unwrap_or_default()
            }
            ExpandFunc::Eval => match args {
                [var] => self.frame().values(var).to_vec(),
                [var, scope] => {
                    let frame = match scope.as_str() {
                        "Global" => self.file_frame,
                        "Local" => self.place,
                        _ => {
                            self.warn("unexpected source to eval.");
                            self.place
                        }
                    };
                    self.frames[frame].values(var).to_vec()
                }
                _ => return Ok(self.usage("eval(variable)")),
            },
            ExpandFunc::List => {
                let name = format!(".QMAKE_INTERNAL_TMP_VAR_{}", self.list_counter);
                self.list_counter += 1;
                let values = args
                    .iter()
                    .flat_map(|a| split_value_list(a, false))
                    .filter(|v| !v.is_empty())
                    .collect();
                self.frame_mut().set(name.as_str(), values);
                vec![name]
            }
            ExpandFunc::Sprintf => {
                let Some((format, rest)) = args.split_first() else {
                    return Ok(self.usage("sprintf(format, ...)"));
                };
                let text = rest
                    .iter()
                    .fold(format.clone(), |text, value| arg_replace(&text, value));
                non_empty(split_value_list(&text, false))
            }
            ExpandFunc::Join => {
                if !(1..=4).contains(&args.len()) {
                    return Ok(self.usage("join(var, glue, before, after)"));
                }
                let part = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
                let list = self.values_of(&args[0]);
                if list.is_empty() {
                    Vec::new()
                } else {
                    let joined = format!("{}{}{}", part(2), list.join(part(1)), part(3));
                    non_empty(split_value_list(&joined, false))
                }
            }
            ExpandFunc::Split => {
                let (var, sep) = match args {
                    [var] => (var, " "),
                    [var, sep] => (var, sep.as_str()),
                    _ => return Ok(self.usage("split(var, sep)")),
                };
                let mut out = Vec::new();
                for value in self.values_of(var) {
                    if sep.is_empty() {
                        out.push(value);
                    } else {
                        out.extend(value.split(sep).map(str::to_owned));
                    }
                }
                out
            }
            ExpandFunc::Section => {
                let (var, sep, begin, end) = match args {
                    [var, sep, begin] => (var, sep, begin, None),
                    [var, sep, begin, end] => (var, sep, begin, Some(end)),
                    _ => return Ok(self.usage("section(var, sep, begin, end)")),
                };
                let begin = begin.parse().unwrap_or(0);
                let end = end.map_or(-1, |e| e.parse().unwrap_or(0));
                self.values_of(var)
                    .iter()
                    .map(|v| section(v, sep, begin, end))
                    .collect()
            }
            ExpandFunc::Basename | ExpandFunc::Dirname => {
                let [var] = args else {
                    return Ok(self.usage(&format!("{func}(var)")));
                };
                let (begin, end) = if which == ExpandFunc::Basename {
                    (-1, -1)
                } else {
                    (0, -2)
                };
                self.values_of(var)
                    .iter()
                    .map(|v| section(&v.replace(MAIN_SEPARATOR, "/"), "/", begin, end))
                    .collect()
            }
            ExpandFunc::Find => {
                let [var, pat] = args else {
                    return Ok(self.usage("find(var, str)"));
                };
                let Some(re) = self.compile(pat) else {
                    return Ok(Vec::new());
                };
                self.values_of(var)
                    .into_iter()
                    .filter(|v| re.is_match(v))
                    .collect()
            }
            ExpandFunc::System => {
                let (cmd, single_line) = match args {
                    [cmd] => (cmd, true),
                    [cmd, single] => (cmd, single.eq_ignore_ascii_case("true")),
                    _ => return Ok(self.usage("system(execute)")),
                };
                match self.host.run(cmd, &self.cwd) {
                    Ok(out) => {
                        let text: String = out
                            .stdout
                            .chars()
                            .map(|c| if c == '\t' || (single_line && c == '\n') { ' ' } else { c })
                            .collect();
                        non_empty(split_value_list(&text, false))
                    }
                    Err(e) => {
                        self.warn(format!("system({cmd}): {e}"));
                        Vec::new()
                    }
                }
            }
            ExpandFunc::Unique => {
                let [var] = args else {
                    return Ok(self.usage("unique(var)"));
                };
                let mut out: Vec<String> = Vec::new();
                for value in self.values_of(var) {
                    if !out.contains(&value) {
                        out.push(value);
                    }
                }
                out
            }
            ExpandFunc::Quote => args.to_vec(),
            ExpandFunc::EscapeExpand => args.iter().map(|a| escape_expand(a)).collect(),
            ExpandFunc::ReEscape => args.iter().map(|a| pattern::escape(a)).collect(),
            ExpandFunc::Upper => args.iter().map(|a| a.to_uppercase()).collect(),
            ExpandFunc::Lower => args.iter().map(|a| a.to_lowercase()).collect(),
            ExpandFunc::Files => {
                let (pattern, recursive) = match args {
                    [pattern] => (pattern, false),
                    [pattern, recursive] => (pattern, truthy(recursive)),
                    _ => return Ok(self.usage("files(pattern)")),
                };
                self.files(&pattern.replace(MAIN_SEPARATOR, "/"), recursive)
            }
            ExpandFunc::Prompt => {
                let [question] = args else {
                    return Ok(self.usage("prompt(question)"));
                };
                if self.config.output_to_stdout {
                    self.warn("prompt(question) cannot be used when output goes to stdout");
                    return Ok(Vec::new());
                }
                let mut question = question.clone();
                if !question.ends_with('?') {
                    question.push('?');
                }
                self.host
                    .prompt(&question)
                    .map(|answer| non_empty(split_value_list(&answer, false)))
                    .unwrap_or_default()
            }
            ExpandFunc::Replace => {
                let [var, before, after] = args else {
                    return Ok(self.usage("replace(var, before, after)"));
                };
                let Some(re) = self.compile(before) else {
                    return Ok(Vec::new());
                };
                self.values_of(var)
                    .iter()
                    .map(|v| re.replace(v, after, true))
                    .collect()
            }
        };
        Ok(out)
    }

    fn compile(&mut self, src: &str) -> Option<Pattern> {
        match Pattern::regex(src) {
            Ok(re) => Some(re),
            Err(e) => {
                self.warn(format!("{src}: {e}"));
                None
            }
        }
    }

    /// `member(var[, start[, end]])`, or `member(var, start..end)`.
    fn member(&mut self, args: &[String]) -> Vec<String> {
        if !(1..=3).contains(&args.len()) {
            return self.usage("member(var, start, end)");
        }
        let list = self.values_of(&args[0]);
        let (mut start, mut end) = (0i64, 0i64);
        if let Some(first) = args.get(1) {
            match first.parse::<i64>() {
                Ok(s) => {
                    start = s;
                    end = s;
                    if let Some(last) = args.get(2) {
                        match last.parse::<i64>() {
                            Ok(e) => end = e,
                            Err(_) => {
                                self.warn(format!("member() argument 3 (end) '{last}' invalid."));
                                return Vec::new();
                            }
                        }
                    }
                }
                Err(_) => {
                    let range = (args.len() == 2)
                        .then(|| first.split_once(".."))
                        .flatten()
                        .and_then(|(a, b)| Some((a.parse::<i64>().ok()?, b.parse::<i64>().ok()?)));
                    match range {
                        Some((s, e)) => (start, end) = (s, e),
                        None => {
                            self.warn(format!("member() argument 2 (start) '{first}' invalid."));
                            return Vec::new();
                        }
                    }
                }
            }
        }
        let n = list.len() as i64;
        if start < 0 {
            start += n;
        }
        if end < 0 {
            end += n;
        }
        if start < 0 || start >= n || end < 0 || end >= n {
            return Vec::new();
        }
        let (s, e) = (start as usize, end as usize);
        if s <= e {
            list[s..=e].to_vec()
        } else {
            list[e..=s].iter().rev().cloned().collect()
        }
    }

    /// Glob `pattern` (wildcards in the last component only), walking
    /// subdirectories breadth-first when `recursive`.
    fn files(&mut self, pattern: &str, recursive: bool) -> Vec<String> {
        let (first, glob) = match pattern.rfind('/') {
            Some(i) => (pattern[..i].to_owned(), &pattern[i + 1..]),
            None => (String::new(), pattern),
        };
        let mut dirs = VecDeque::from([first]);
        let mut out = Vec::new();
        while let Some(dir) = dirs.pop_front() {
            let prefix = if dir.is_empty() || dir.ends_with('/') {
                dir.clone()
            } else {
                format!("{dir}/")
            };
            let abs = host::resolve(&self.cwd, if dir.is_empty() { "." } else { dir.as_str() });
            let Ok(mut names) = self.host.read_dir(&abs) else {
                continue;
            };
            names.sort();
            for name in names {
                if name == "." || name == ".." {
                    continue;
                }
                let fname = format!("{prefix}{name}");
                if recursive && self.host.is_dir(&abs.join(&name)) {
                    dirs.push_back(fname.clone());
                }
                if wildcard_match(glob, &name) {
                    out.push(fname);
                }
            }
        }
        out
    }
}

// ── String helpers ────────────────────────────────────────────────────────────

/// Fields `begin..=end` of `text` split on `sep`; negative indices count
/// from the end.
pub fn section(text: &str, sep: &str, begin: i64, end: i64) -> String {
    if sep.is_empty() {
        return String::new();
    }
    let fields: Vec<&str> = text.split(sep).collect();
    let n = fields.len() as i64;
    let begin = if begin < 0 { begin + n } else { begin };
    let end = if end < 0 { end + n } else { end };
    if begin >= n || end < 0 || begin > end {
        return String::new();
    }
    let begin = begin.max(0) as usize;
    let end = end.min(n - 1) as usize;
    fields[begin..=end].join(sep)
}

/// Replace every `%N` carrying the lowest marker number with `value`.
pub fn arg_replace(text: &str, value: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    // (start, length, number)
    let mut markers = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' {
            let digits: String = chars[i + 1..]
                .iter()
                .take(2)
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(n) = digits.parse::<u32>() {
                markers.push((i, digits.len() + 1, n));
                i += digits.len() + 1;
                continue;
            }
        }
        i += 1;
    }
    let Some(lowest) = markers.iter().map(|m| m.2).min() else {
        return text.to_owned();
    };
    let mut out = String::new();
    let mut pos = 0;
    for (start, len, _) in markers.into_iter().filter(|m| m.2 == lowest) {
        out.extend(&chars[pos..start]);
        out.push_str(value);
        pos = start + len;
    }
    out.extend(&chars[pos..]);
    out
}

/// Decode `\n`, `\t` and `\r`.  A doubled backslash is left as it is.
pub fn escape_expand(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.peek() {
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            _ => None,
        };
        match (decoded, chars.peek()) {
            (Some(d), _) => {
                out.push(d);
                chars.next();
            }
            (None, Some('\\')) => {
                out.push_str("\\\\");
                chars.next();
            }
            (None, _) => out.push('\\'),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
