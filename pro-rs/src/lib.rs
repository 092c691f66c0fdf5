//! Evaluator for qmake-style project files.
//!
//! A project file is read statement by statement into a [`ValueStore`] of
//! list-valued variables.  Scope tests, `for()` loops, user functions,
//! includes and feature loading are all resolved at read time.
//!
//! ```rust,no_run
//! let (vars, ok) = pro::evaluate_file("app.pro");
//! if ok {
//!     println!("{:?}", vars.values("SOURCES"));
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod pattern;
pub mod script;
pub mod var;

use std::path::Path;

pub use config::{Config, Preset};
pub use error::{Diagnostic, ErrorKind, EvalError, Position, Severity};
pub use host::{Host, OsHost};
pub use script::{Evaluator, IncludeStatus};
pub use var::ValueStore;

/// Evaluate `path` with the default configuration.  Returns the top-level
/// variables and whether the file parsed successfully.
pub fn evaluate_file(path: impl AsRef<Path>) -> (ValueStore, bool) {
    let mut ev = Evaluator::new();
    let ok = ev.evaluate(path);
    (ev.into_variables(), ok)
}
