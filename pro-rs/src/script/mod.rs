//! The project-file language.
//!
//! | Module | Role |
//! |--------|------|
//! | [`lines`]    | physical lines to logical statements |
//! | [`split`]    | argument lists and value lists |
//! | [`expand`]   | `$$` references and escapes |
//! | [`stmt`]     | scope tests, assignment operators, `s///` |
//! | [`block`]    | scope stack, loop and function bodies |
//! | [`interp`]   | statement evaluation and the public [`Evaluator`] |
//! | [`builtins`] | built-in test and replace functions |
//! | [`include`]  | `include()`, `load()` and fresh child parses |
//!
//! # Quick start
//!
//! ```rust
//! use pro::script::Evaluator;
//!
//! let mut ev = Evaluator::new();
//! assert!(ev.evaluate_str("demo.pro", "SRC = a.cpp\nSRC += b.cpp\ndebug: DEFINES += DBG"));
//! assert_eq!(ev.values("SRC"), ["a.cpp", "b.cpp"]);
//! assert!(ev.values("DEFINES").is_empty());
//! ```

pub mod block;
pub mod builtins;
pub mod expand;
pub mod include;
pub mod interp;
pub mod lines;
pub mod split;
pub mod stmt;

pub use include::{IncludeMode, IncludeStatus};
pub use interp::Evaluator;
